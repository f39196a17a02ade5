//! Order reconciliation: two order sources in, one order-line table out.
//!
//! The relational export and the spreadsheet carry the same orders under
//! different column names, with overlapping key spaces and two shipment
//! date columns that fill each other's gaps. [`reconcile`] stacks them,
//! enriches the result with the customer, order-detail and product tables,
//! and derives the dates and amounts the dashboard reads.

use std::fmt;

use anyhow::Result;
use itertools::Itertools;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    config::PipelineConfig,
    data::{Cell, DateOrder, Value, coerce_datetime, coerce_f64},
    frame::{Frame, JoinSuffixes},
    keys,
};
use chrono::Datelike;

/// Column names of the reconciled table that later stages rely on.
pub mod columns {
    pub const UNIQUE_ROW_ID_SOURCE: &str = "unique_row_id";
    pub const UNIQUE_ROW_ID: &str = "uniquerowid";
    pub const ORDER_ID: &str = "orderid";
    pub const CUSTOMER_ID: &str = "customerid";
    pub const EMPLOYEE_ID: &str = "employeeid";
    pub const COUNTRY: &str = "country";
    pub const ORDER_DATE: &str = "orderdate_main";
    pub const SHIPPED_DATE: &str = "shippeddate";
    pub const YEAR: &str = "year";
    pub const MONTH: &str = "month";
    pub const UNIT_PRICE: &str = "unitprice";
    pub const QUANTITY: &str = "quantity";
    pub const TOTAL_AMOUNT: &str = "totalamount";

    pub const ORDER_DATE_NEEDLE: &str = "orderdate";
    pub const SHIPPED_DATE_NEEDLE: &str = "shippeddate";
    pub const DETAIL_PRICE: &str = "unitpricex";
    pub const PRODUCT_PRICE: &str = "unitpricey";
}

/// The five tables the reconciliation consumes. `sheet_orders` must
/// already carry the relational column names.
#[derive(Debug, Clone)]
pub struct ReconcileInputs {
    pub db_orders: Frame,
    pub sheet_orders: Frame,
    pub customers: Frame,
    pub order_details: Frame,
    pub products: Frame,
}

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub customer_key: String,
    pub order_key: String,
    pub product_key: String,
    pub missing_markers: Vec<String>,
    pub suffixes: JoinSuffixes,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            customer_key: "CustomerID".to_string(),
            order_key: "OrderID".to_string(),
            product_key: "ProductID".to_string(),
            missing_markers: keys::default_missing_markers(),
            suffixes: JoinSuffixes::default(),
        }
    }
}

impl ReconcileOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        let find = |wanted: &str| {
            config
                .keys
                .iter()
                .find(|k| k.eq_ignore_ascii_case(wanted))
                .cloned()
                .unwrap_or_else(|| wanted.to_string())
        };
        Self {
            customer_key: find("CustomerID"),
            order_key: find("OrderID"),
            product_key: find("ProductID"),
            missing_markers: config.missing_markers.clone(),
            suffixes: JoinSuffixes::default(),
        }
    }

    fn key_columns(&self) -> Vec<String> {
        vec![
            self.customer_key.clone(),
            self.order_key.clone(),
            self.product_key.clone(),
        ]
    }
}

/// Diagnostic summary of one reconciliation. Reporting only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Distinct unique row ids present after the joins.
    pub orders_retained: usize,
    /// Rows in the union before any join.
    pub baseline_rows: usize,
    pub output_rows: usize,
    pub total_amount: f64,
    /// Orders whose first line carries a shipment date.
    pub delivered_orders: usize,
    pub years: Vec<i64>,
    /// Columns discarded because their normalized name was already taken.
    pub dropped_columns: Vec<String>,
}

impl ReconciliationReport {
    pub fn rows(&self) -> Vec<Vec<String>> {
        vec![
            vec![
                "orders retained".to_string(),
                format!("{} / {}", self.orders_retained, self.baseline_rows),
            ],
            vec!["order lines".to_string(), self.output_rows.to_string()],
            vec!["total amount".to_string(), format!("{:.2}", self.total_amount)],
            vec!["delivered orders".to_string(), self.delivered_orders.to_string()],
            vec![
                "years".to_string(),
                self.years.iter().map(|y| y.to_string()).join(", "),
            ],
        ]
    }
}

impl fmt::Display for ReconciliationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} orders retained, {} line(s), total {:.2}, {} delivered, years [{}]",
            self.orders_retained,
            self.baseline_rows,
            self.output_rows,
            self.total_amount,
            self.delivered_orders,
            self.years.iter().join(", ")
        )
    }
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub table: Frame,
    pub report: ReconciliationReport,
}

/// Lower-cases a column name and removes spaces and underscores.
pub fn normalize_column_name(name: &str) -> String {
    name.to_lowercase().replace([' ', '_'], "")
}

pub fn reconcile(inputs: ReconcileInputs, options: &ReconcileOptions) -> Result<Reconciliation> {
    let ReconcileInputs {
        db_orders,
        sheet_orders,
        mut customers,
        mut order_details,
        mut products,
    } = inputs;

    let mut orders = union_orders(&db_orders, &sheet_orders)?;
    let baseline_rows = orders.len();
    info!(
        "Union of {} relational and {} spreadsheet order(s): {baseline_rows} row(s)",
        db_orders.len(),
        sheet_orders.len()
    );

    let key_columns = options.key_columns();
    for frame in [&mut orders, &mut customers, &mut order_details, &mut products] {
        keys::normalize_key_columns(frame, &key_columns, &options.missing_markers);
    }

    let mut table = orders
        .left_join(&customers, &options.customer_key, &options.suffixes)?
        .left_join(&order_details, &options.order_key, &options.suffixes)?
        .left_join(&products, &options.product_key, &options.suffixes)?;
    table.set_name("order_lines");

    let dropped_columns = table.normalize_column_names(normalize_column_name);
    if !dropped_columns.is_empty() {
        warn!(
            "Discarded {} column(s) whose normalized name was already taken: {}",
            dropped_columns.len(),
            dropped_columns.join(", ")
        );
    }

    reconcile_dates(&mut table)?;
    derive_amounts(&mut table)?;

    let report = summarize(&table, baseline_rows, dropped_columns);
    info!("Reconciliation: {report}");
    Ok(Reconciliation { table, report })
}

/// Stacks both order sources and numbers the rows 0..N in stacking order.
pub fn union_orders(db_orders: &Frame, sheet_orders: &Frame) -> Result<Frame> {
    let mut orders = Frame::concat("orders", &[db_orders, sheet_orders]);
    let ids = (0..orders.len())
        .map(|idx| Some(Value::Integer(idx as i64)))
        .collect();
    orders.set_column(columns::UNIQUE_ROW_ID_SOURCE, ids)?;
    Ok(orders)
}

/// Takes `first` unless it is null, then `second`.
pub fn coalesce(first: Option<&Value>, second: Option<&Value>) -> Cell {
    first.or(second).cloned()
}

fn reconcile_dates(table: &mut Frame) -> Result<()> {
    let order_date_columns = table.columns_containing(columns::ORDER_DATE_NEEDLE);
    let order_dates: Vec<Cell> = match order_date_columns.first() {
        Some(&idx) => table
            .column_at(idx)
            .into_iter()
            .map(|cell| coerce_datetime(cell.as_ref(), DateOrder::DayFirst).map(Value::DateTime))
            .collect(),
        None => {
            warn!("No order date column found; order dates, years and months will be empty");
            vec![None; table.len()]
        }
    };

    let years = order_dates
        .iter()
        .map(|cell| date_part(cell, |dt| i64::from(dt.year())))
        .collect();
    let months = order_dates
        .iter()
        .map(|cell| date_part(cell, |dt| i64::from(dt.month())))
        .collect();
    table.set_column(columns::ORDER_DATE, order_dates)?;
    table.set_column(columns::YEAR, years)?;
    table.set_column(columns::MONTH, months)?;

    let ship_columns = table.columns_containing(columns::SHIPPED_DATE_NEEDLE);
    let raw_shipped: Vec<Cell> = match ship_columns.as_slice() {
        [] => vec![None; table.len()],
        [only] => table.column_at(*only).into_iter().cloned().collect(),
        [first, second, ..] => table
            .rows()
            .iter()
            .map(|row| coalesce(row[*first].as_ref(), row[*second].as_ref()))
            .collect(),
    };
    if ship_columns.len() > 2 {
        warn!(
            "{} shipment date columns found; only the first two are coalesced",
            ship_columns.len()
        );
    }
    let shipped = raw_shipped
        .iter()
        .map(|cell| coerce_datetime(cell.as_ref(), DateOrder::MonthFirst).map(Value::DateTime))
        .collect();
    table.set_column(columns::SHIPPED_DATE, shipped)?;
    Ok(())
}

fn date_part(cell: &Cell, part: impl Fn(&chrono::NaiveDateTime) -> i64) -> Cell {
    match cell {
        Some(Value::DateTime(dt)) => Some(Value::Integer(part(dt))),
        _ => None,
    }
}

fn derive_amounts(table: &mut Frame) -> Result<()> {
    // Detail price wins; a plain `unitprice` only exists when the product
    // table carried no price of its own.
    let detail = if table.has_column(columns::DETAIL_PRICE) {
        table.column_or_nulls(columns::DETAIL_PRICE)
    } else {
        table.column_or_nulls(columns::UNIT_PRICE)
    };
    let product = table.column_or_nulls(columns::PRODUCT_PRICE);
    let prices: Vec<f64> = detail
        .iter()
        .zip(&product)
        .map(|(d, p)| {
            coerce_f64(*d)
                .or_else(|| coerce_f64(*p))
                .unwrap_or(0.0)
        })
        .collect();
    let quantities: Vec<f64> = table
        .column_or_nulls(columns::QUANTITY)
        .into_iter()
        .map(|cell| coerce_f64(cell).unwrap_or(0.0))
        .collect();
    let totals = prices
        .iter()
        .zip(&quantities)
        .map(|(price, qty)| Some(Value::Float(price * qty)))
        .collect();

    table.set_column(
        columns::UNIT_PRICE,
        prices.into_iter().map(|p| Some(Value::Float(p))).collect(),
    )?;
    table.set_column(
        columns::QUANTITY,
        quantities.into_iter().map(|q| Some(Value::Float(q))).collect(),
    )?;
    table.set_column(columns::TOTAL_AMOUNT, totals)?;
    Ok(())
}

fn summarize(table: &Frame, baseline_rows: usize, dropped_columns: Vec<String>) -> ReconciliationReport {
    let total_amount = table
        .column_or_nulls(columns::TOTAL_AMOUNT)
        .into_iter()
        .filter_map(coerce_f64)
        .sum();
    let delivered_orders = table
        .group_indices(columns::UNIQUE_ROW_ID)
        .iter()
        .filter(|(_, rows)| table.cell(rows[0], columns::SHIPPED_DATE).is_some())
        .count();
    let years = table
        .column_or_nulls(columns::YEAR)
        .into_iter()
        .flatten()
        .filter_map(Value::as_i64)
        .unique()
        .sorted()
        .collect();

    ReconciliationReport {
        orders_retained: table.distinct_count(columns::UNIQUE_ROW_ID),
        baseline_rows,
        output_rows: table.len(),
        total_amount,
        delivered_orders,
        years,
        dropped_columns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Some(Value::String(s.to_string()))
    }

    fn frame(name: &str, columns: &[&str], rows: Vec<Vec<Cell>>) -> Frame {
        Frame::from_rows(name, columns.iter().map(|c| c.to_string()).collect(), rows).unwrap()
    }

    #[test]
    fn normalize_column_name_strips_spaces_and_underscores() {
        assert_eq!(normalize_column_name("Unit Price"), "unitprice");
        assert_eq!(normalize_column_name("unique_row_id"), "uniquerowid");
        assert_eq!(normalize_column_name("UnitPrice_x"), "unitpricex");
    }

    #[test]
    fn coalesce_prefers_first_non_null() {
        let a = Value::String("a".into());
        let b = Value::String("b".into());
        assert_eq!(coalesce(Some(&a), Some(&b)), Some(a.clone()));
        assert_eq!(coalesce(None, Some(&b)), Some(b));
        assert_eq!(coalesce(None, None), None);
    }

    #[test]
    fn union_assigns_dense_ids_in_stacking_order() {
        let db = frame("Orders", &["OrderID"], vec![vec![text("1")], vec![text("2")]]);
        let sheet = frame("orders", &["OrderID", "Notes"], vec![vec![text("3"), text("n")]]);
        let union = union_orders(&db, &sheet).unwrap();
        let ids = union
            .column_or_nulls(columns::UNIQUE_ROW_ID_SOURCE)
            .into_iter()
            .map(|c| c.and_then(Value::as_i64))
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![Some(0), Some(1), Some(2)]);
        assert_eq!(union.columns(), &["OrderID", "Notes", "unique_row_id"]);
    }

    #[test]
    fn two_shipment_columns_fill_each_other() {
        let mut table = frame(
            "t",
            &["orderdate", "shippeddate", "shippeddatey"],
            vec![
                vec![text("04/07/1996"), text("1996-07-16"), text("1996-07-20")],
                vec![text("garbage"), None, text("1996-08-01")],
                vec![None, None, None],
            ],
        );
        reconcile_dates(&mut table).unwrap();
        let shipped = table.column_or_nulls(columns::SHIPPED_DATE);
        assert_eq!(shipped[0].map(Value::as_display), Some("1996-07-16".to_string()));
        assert_eq!(shipped[1].map(Value::as_display), Some("1996-08-01".to_string()));
        assert_eq!(shipped[2], None);

        let years = table.column_or_nulls(columns::YEAR);
        assert_eq!(years[0], Some(&Value::Integer(1996)));
        assert_eq!(years[1], None);
        let months = table.column_or_nulls(columns::MONTH);
        assert_eq!(months[0], Some(&Value::Integer(7)));
    }

    #[test]
    fn amounts_prefer_detail_price_and_default_to_zero() {
        let mut table = frame(
            "t",
            &["unitpricex", "unitpricey", "quantity"],
            vec![
                vec![text("14"), text("18"), text("12")],
                vec![None, text("10"), text("2")],
                vec![None, None, text("5")],
                vec![text("3"), None, text("lots")],
            ],
        );
        derive_amounts(&mut table).unwrap();
        let totals = table
            .column_or_nulls(columns::TOTAL_AMOUNT)
            .into_iter()
            .map(|c| c.and_then(Value::as_f64))
            .collect::<Vec<_>>();
        assert_eq!(totals, vec![Some(168.0), Some(20.0), Some(0.0), Some(0.0)]);
    }

    #[test]
    fn missing_price_and_quantity_columns_yield_zero_amounts() {
        let mut table = frame("t", &["orderid"], vec![vec![text("1")]]);
        derive_amounts(&mut table).unwrap();
        assert_eq!(table.cell(0, columns::TOTAL_AMOUNT), Some(&Value::Float(0.0)));
        assert_eq!(table.cell(0, columns::UNIT_PRICE), Some(&Value::Float(0.0)));
    }
}

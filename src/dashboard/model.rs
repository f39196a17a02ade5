//! Dashboard computations.
//!
//! Everything here is a pure function of the loaded table and the current
//! filter selection. The HTTP layer recomputes a [`DashboardView`] on every
//! request.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{Datelike, NaiveDateTime};
use itertools::Itertools;
use serde::Serialize;
use url::form_urlencoded;

use crate::{
    data::{Value, compare_values},
    frame::Frame,
    reconcile::columns,
};

/// Query keys carried by the filter form.
pub mod params {
    pub const YEAR: &str = "year";
    pub const EMPLOYEE: &str = "employee";
    pub const CUSTOMER: &str = "customer";
    /// Present once the form has been submitted; from then on an empty year
    /// or employee selection means "none" rather than "all".
    pub const APPLIED: &str = "applied";
}

/// The fields of one order line the dashboard reads.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderLine {
    /// Position in the loaded table, used for the detail view.
    pub row: usize,
    pub unique_row_id: Option<String>,
    pub order_date: Option<NaiveDateTime>,
    pub year: Option<i64>,
    pub month: Option<u32>,
    pub month_name: Option<String>,
    pub employee: Option<String>,
    pub customer: Option<String>,
    pub country: Option<String>,
    pub shipped: bool,
    pub total_amount: f64,
}

/// The loaded table plus its per-line projection. Built once per load.
#[derive(Debug, Clone)]
pub struct DashboardData {
    frame: Frame,
    lines: Vec<OrderLine>,
    options: FilterOptions,
}

/// Values offered by the three multi-selects, sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterOptions {
    pub years: Vec<i64>,
    pub employees: Vec<String>,
    pub customers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Kpis {
    pub total_orders: usize,
    pub delivered: usize,
    pub undelivered: usize,
    /// Percentage of delivered orders; zero when there are no orders.
    pub delivery_rate: f64,
}

/// Current selection. `None` for years or employees selects every value;
/// an empty customer list applies no customer filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    pub years: Option<Vec<i64>>,
    pub employees: Option<Vec<String>>,
    pub customers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyVolume {
    pub month: u32,
    pub name: String,
    pub orders: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryShare {
    pub country: String,
    pub orders: usize,
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub month: u32,
    pub employee: String,
    pub customer: String,
    pub year: Option<i64>,
    pub total_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Everything one page render needs.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub kpis: Kpis,
    pub options: FilterOptions,
    pub filters: Filters,
    pub monthly: Vec<MonthlyVolume>,
    pub delivered_by_country: Vec<CountryShare>,
    pub undelivered_by_country: Vec<CountryShare>,
    pub scatter: Vec<ScatterPoint>,
    pub detail: DetailTable,
}

impl Filters {
    /// Reads a selection from an urlencoded query string.
    pub fn from_query(query: &str) -> Self {
        let mut years = Vec::new();
        let mut employees = Vec::new();
        let mut customers = Vec::new();
        let mut applied = false;
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                params::YEAR => years.extend(value.trim().parse::<i64>().ok()),
                params::EMPLOYEE => employees.push(value.into_owned()),
                params::CUSTOMER => customers.push(value.into_owned()),
                params::APPLIED => applied = true,
                _ => {}
            }
        }
        Self {
            years: (applied || !years.is_empty()).then_some(years),
            employees: (applied || !employees.is_empty()).then_some(employees),
            customers,
        }
    }

    /// Year and employee selections only ever match lines that carry a
    /// value, as the "all" default lists known values only.
    pub fn matches(&self, line: &OrderLine) -> bool {
        let year_ok = match (&self.years, line.year) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(years), Some(year)) => years.contains(&year),
        };
        let employee_ok = match (&self.employees, &line.employee) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(employees), Some(employee)) => employees.contains(employee),
        };
        let customer_ok = self.customers.is_empty()
            || line
                .customer
                .as_ref()
                .is_some_and(|c| self.customers.contains(c));
        year_ok && employee_ok && customer_ok
    }

    pub fn year_selected(&self, year: i64) -> bool {
        self.years.as_ref().is_none_or(|years| years.contains(&year))
    }

    pub fn employee_selected(&self, employee: &str) -> bool {
        self.employees
            .as_ref()
            .is_none_or(|employees| employees.iter().any(|e| e == employee))
    }

    pub fn customer_selected(&self, customer: &str) -> bool {
        self.customers.iter().any(|c| c == customer)
    }
}

impl DashboardData {
    pub fn from_frame(frame: Frame) -> Self {
        let lines = (0..frame.len())
            .map(|row| order_line(&frame, row))
            .collect::<Vec<_>>();
        let options = filter_options(&frame);
        Self {
            frame,
            lines,
            options,
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    /// KPIs over the whole table, independent of the filters.
    pub fn kpis(&self) -> Kpis {
        kpis(&self.lines.iter().collect::<Vec<_>>())
    }

    pub fn filtered(&self, filters: &Filters) -> Vec<&OrderLine> {
        self.lines.iter().filter(|line| filters.matches(line)).collect()
    }

    pub fn view(&self, filters: &Filters) -> DashboardView {
        let filtered = self.filtered(filters);
        DashboardView {
            kpis: self.kpis(),
            options: self.options.clone(),
            filters: filters.clone(),
            monthly: monthly_volume(&filtered),
            delivered_by_country: country_breakdown(&filtered, true),
            undelivered_by_country: country_breakdown(&filtered, false),
            scatter: scatter_points(&filtered),
            detail: self.detail(&filtered),
        }
    }

    pub fn detail(&self, lines: &[&OrderLine]) -> DetailTable {
        let rows = self.frame.rows();
        DetailTable {
            headers: self.frame.columns().to_vec(),
            rows: lines
                .iter()
                .map(|line| {
                    rows[line.row]
                        .iter()
                        .map(|cell| cell.as_ref().map(Value::as_display).unwrap_or_default())
                        .collect()
                })
                .collect(),
        }
    }
}

fn order_line(frame: &Frame, row: usize) -> OrderLine {
    let text = |column: &str| frame.cell(row, column).map(Value::as_display);
    let order_date = match frame.cell(row, columns::ORDER_DATE) {
        Some(Value::DateTime(dt)) => Some(*dt),
        _ => None,
    };
    OrderLine {
        row,
        unique_row_id: text(columns::UNIQUE_ROW_ID),
        order_date,
        year: order_date.map(|dt| i64::from(dt.year())),
        month: order_date.map(|dt| dt.month()),
        month_name: order_date.map(|dt| dt.format("%B").to_string()),
        employee: text(columns::EMPLOYEE_ID),
        customer: text(columns::CUSTOMER_ID),
        country: text(columns::COUNTRY),
        shipped: frame.cell(row, columns::SHIPPED_DATE).is_some(),
        total_amount: frame
            .cell(row, columns::TOTAL_AMOUNT)
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
    }
}

fn filter_options(frame: &Frame) -> FilterOptions {
    let sorted_labels = |column: &str| {
        frame
            .column_or_nulls(column)
            .into_iter()
            .flatten()
            .unique_by(|v| v.as_display())
            .sorted_by(|a, b| compare_values(a, b))
            .map(Value::as_display)
            .collect::<Vec<_>>()
    };
    let years = (0..frame.len())
        .filter_map(|row| match frame.cell(row, columns::ORDER_DATE) {
            Some(Value::DateTime(dt)) => Some(i64::from(dt.year())),
            _ => None,
        })
        .unique()
        .sorted()
        .collect();
    FilterOptions {
        years,
        employees: sorted_labels(columns::EMPLOYEE_ID),
        customers: sorted_labels(columns::CUSTOMER_ID),
    }
}

/// First line of every distinct order, in table order. Lines without a
/// unique row id stand for themselves.
pub fn distinct_orders<'a>(lines: &[&'a OrderLine]) -> Vec<&'a OrderLine> {
    let mut seen: HashSet<&'a str> = HashSet::new();
    let mut orders = Vec::new();
    for &line in lines {
        let first = match line.unique_row_id.as_deref() {
            Some(id) => seen.insert(id),
            None => true,
        };
        if first {
            orders.push(line);
        }
    }
    orders
}

pub fn kpis(lines: &[&OrderLine]) -> Kpis {
    let orders = distinct_orders(lines);
    let total_orders = orders.len();
    let delivered = orders.iter().filter(|line| line.shipped).count();
    let delivery_rate = if total_orders == 0 {
        0.0
    } else {
        delivered as f64 / total_orders as f64 * 100.0
    };
    Kpis {
        total_orders,
        delivered,
        undelivered: total_orders - delivered,
        delivery_rate,
    }
}

/// Distinct orders per calendar month, in month-number order.
pub fn monthly_volume(lines: &[&OrderLine]) -> Vec<MonthlyVolume> {
    let mut months: BTreeMap<u32, MonthlyVolume> = BTreeMap::new();
    for line in distinct_orders(lines) {
        let (Some(month), Some(name)) = (line.month, &line.month_name) else {
            continue;
        };
        months
            .entry(month)
            .or_insert_with(|| MonthlyVolume {
                month,
                name: name.clone(),
                orders: 0,
            })
            .orders += 1;
    }
    months.into_values().collect()
}

/// Share of distinct delivered (or undelivered) orders per customer
/// country, largest first. Orders without a country are left out.
pub fn country_breakdown(lines: &[&OrderLine], shipped: bool) -> Vec<CountryShare> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for line in distinct_orders(lines) {
        if line.shipped != shipped {
            continue;
        }
        if let Some(country) = &line.country {
            *counts.entry(country.as_str()).or_default() += 1;
        }
    }
    let total: usize = counts.values().sum();
    counts
        .into_iter()
        .map(|(country, orders)| CountryShare {
            country: country.to_string(),
            orders,
            share: orders as f64 / total as f64,
        })
        .sorted_by(|a, b| b.orders.cmp(&a.orders).then_with(|| a.country.cmp(&b.country)))
        .collect()
}

/// One point per distinct order with a month, employee and customer. The
/// size is the order's total across its filtered lines.
pub fn scatter_points(lines: &[&OrderLine]) -> Vec<ScatterPoint> {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for line in lines {
        if let Some(id) = &line.unique_row_id {
            *totals.entry(id.as_str()).or_default() += line.total_amount;
        }
    }
    distinct_orders(lines)
        .into_iter()
        .filter_map(|line| {
            let total_amount = match &line.unique_row_id {
                Some(id) => totals.get(id.as_str()).copied().unwrap_or_default(),
                None => line.total_amount,
            };
            Some(ScatterPoint {
                month: line.month?,
                employee: line.employee.clone()?,
                customer: line.customer.clone()?,
                year: line.year,
                total_amount,
            })
        })
        .collect()
}

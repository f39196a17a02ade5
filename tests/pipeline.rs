mod common;

use northwind_bi::{
    data::Value,
    persist, pipeline,
    reconcile::columns,
    warehouse,
};
use rusqlite::Connection;

use common::TestWorkspace;

#[test]
fn full_run_reports_reconciliation_and_load() {
    let workspace = TestWorkspace::northwind();
    let config = workspace.config();

    let summary = pipeline::run_all(&config, true).expect("pipeline");

    assert_eq!(summary.extract.staged.len(), 4);
    assert!(summary.extract.missing.contains(&"Employees".to_string()));
    assert_eq!(summary.reconciliation.baseline_rows, 3);
    assert_eq!(summary.reconciliation.orders_retained, 3);
    assert_eq!(summary.reconciliation.output_rows, 4);
    assert!((summary.reconciliation.total_amount - 503.0).abs() < 1e-6);
    assert_eq!(summary.reconciliation.delivered_orders, 1);
    assert!(summary.load.is_complete());

    let store = summary.warehouse.expect("exported");
    assert_eq!(store.rows_inserted, 3);
    assert_eq!(store.rows_confirmed, 3);
}

#[test]
fn workbook_orders_keep_their_cell_types() {
    let workspace = TestWorkspace::northwind_workbook();
    let mut config = workspace.config();
    config.tables.spreadsheet_orders = "orders.xlsx".into();

    let summary = pipeline::run_all(&config, false).expect("pipeline");
    assert!(
        summary
            .extract
            .staged
            .iter()
            .any(|table| table.name == "orders")
    );
    assert_eq!(summary.reconciliation.orders_retained, 3);
    assert_eq!(summary.reconciliation.delivered_orders, 2);

    let mut frame = persist::read_parquet(&config.final_parquet()).expect("parquet");
    persist::coerce_timestamps(&mut frame);
    let row = (0..frame.len())
        .find(|&row| frame.cell(row, columns::UNIQUE_ROW_ID) == Some(&Value::Integer(2)))
        .expect("workbook order");
    let display = |column: &str| frame.cell(row, column).map(Value::as_display);

    assert_eq!(frame.cell(row, columns::ORDER_ID), Some(&Value::Integer(11078)));
    assert_eq!(display(columns::CUSTOMER_ID), Some("HANAR".to_string()));
    assert_eq!(display(columns::ORDER_DATE), Some("1998-06-05".to_string()));
    assert_eq!(display(columns::SHIPPED_DATE), Some("1998-06-09".to_string()));
    assert_eq!(display(columns::COUNTRY), Some("Brazil".to_string()));
}

#[test]
fn parquet_copy_keeps_counts_and_types() {
    let workspace = TestWorkspace::northwind();
    let config = workspace.config();
    pipeline::run_extract(&config).expect("extract");
    pipeline::run_transform(&config).expect("transform");
    pipeline::run_load(&config).expect("load");

    let csv = persist::read_final_csv(&config.final_csv()).expect("csv");
    let mut parquet = persist::read_parquet(&config.final_parquet()).expect("parquet");
    persist::coerce_timestamps(&mut parquet);

    assert_eq!(csv.len(), parquet.len());
    assert_eq!(
        csv.distinct_count(columns::UNIQUE_ROW_ID),
        parquet.distinct_count(columns::UNIQUE_ROW_ID)
    );
    assert_eq!(csv.columns(), parquet.columns());

    let spreadsheet_row = (0..parquet.len())
        .find(|&row| parquet.cell(row, columns::UNIQUE_ROW_ID) == Some(&Value::Integer(2)))
        .expect("spreadsheet order");
    assert_eq!(
        parquet
            .cell(spreadsheet_row, columns::ORDER_DATE)
            .map(Value::as_display),
        Some("1998-06-05".to_string())
    );
    assert!(matches!(
        parquet.cell(spreadsheet_row, columns::TOTAL_AMOUNT),
        Some(Value::Float(_))
    ));
    assert_eq!(parquet.cell(spreadsheet_row, columns::SHIPPED_DATE), None);
}

#[test]
fn warehouse_columns_carry_inferred_types() {
    let workspace = TestWorkspace::northwind();
    let config = workspace.config();
    pipeline::run_all(&config, false).expect("pipeline");

    let mut frame = persist::read_parquet(&config.final_parquet()).expect("parquet");
    persist::coerce_timestamps(&mut frame);
    let conn = Connection::open_in_memory().expect("memory store");
    warehouse::load_into(&conn, &frame, "Fact_Orders").expect("warehouse");

    let mut stmt = conn
        .prepare("SELECT name, type FROM pragma_table_info('Fact_Orders')")
        .expect("table info");
    let types = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .expect("query")
        .collect::<Result<Vec<_>, _>>()
        .expect("rows");
    let type_of = |column: &str| {
        types
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, ty)| ty.as_str())
    };
    assert_eq!(type_of(columns::UNIQUE_ROW_ID), Some("INTEGER"));
    assert_eq!(type_of(columns::ORDER_DATE), Some("TIMESTAMP"));
    assert_eq!(type_of(columns::TOTAL_AMOUNT), Some("REAL"));
    assert_eq!(type_of(columns::CUSTOMER_ID), Some("TEXT"));

    let delivered: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM Fact_Orders WHERE shippeddate IS NOT NULL",
            [],
            |row| row.get(0),
        )
        .expect("delivered");
    assert_eq!(delivered, 1);
}

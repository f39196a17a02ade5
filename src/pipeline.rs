//! Stage orchestration.
//!
//! Each stage reads the artifacts of the previous one from disk, so any
//! stage can be re-run on its own. Required inputs are checked up front and
//! a missing one aborts the stage before anything is written.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use encoding_rs::UTF_8;
use log::info;

use crate::{
    config::PipelineConfig,
    error::PipelineError,
    extract::{self, ExtractReport},
    frame::Frame,
    io_utils,
    persist::{self, LoadReport},
    reconcile::{self, ReconcileInputs, ReconcileOptions, ReconciliationReport},
    source, table,
    warehouse::{self, WarehouseReport},
};

pub fn run_extract(config: &PipelineConfig) -> Result<ExtractReport> {
    info!("Extract: staging raw tables");
    let report = extract::extract(config)?;
    table::print_report("staged table", &report.rows_for_display());
    Ok(report)
}

/// Paths the transform stage reads, in the order they are checked.
pub fn transform_inputs(config: &PipelineConfig) -> Vec<PathBuf> {
    vec![
        config.processed_table(&config.tables.customers),
        config.processed_table(&config.tables.orders),
        config.processed_table(&config.tables.order_details),
        config.processed_table(&config.tables.products),
        config.spreadsheet_orders_path(),
    ]
}

pub fn run_transform(config: &PipelineConfig) -> Result<ReconciliationReport> {
    info!("Transform: reconciling order sources");
    let inputs = transform_inputs(config);
    if let Some(missing) = inputs.iter().find(|path| !path.exists()) {
        return Err(PipelineError::missing_input(missing).into());
    }

    let customers = source::read_table(&inputs[0], UTF_8)?;
    let db_orders = source::read_table(&inputs[1], UTF_8)?;
    let order_details = source::read_table(&inputs[2], UTF_8)?;
    let products = source::read_table(&inputs[3], UTF_8)?;
    let sheet_orders = read_spreadsheet_orders(config, &inputs[4])?;

    let reconciliation = reconcile::reconcile(
        ReconcileInputs {
            db_orders,
            sheet_orders,
            customers,
            order_details,
            products,
        },
        &ReconcileOptions::from_config(config),
    )?;

    let target = config.final_csv();
    persist::write_csv(&reconciliation.table, &target)
        .with_context(|| format!("Writing final table {target:?}"))?;
    table::print_report("reconciliation", &reconciliation.report.rows());
    Ok(reconciliation.report)
}

fn read_spreadsheet_orders(config: &PipelineConfig, path: &Path) -> Result<Frame> {
    let encoding = io_utils::resolve_encoding(config.input_encoding.as_deref())?;
    let mut frame = source::read_table(path, encoding)?;
    let renames: HashMap<String, String> = config
        .spreadsheet_renames
        .iter()
        .map(|(from, to)| (from.clone(), to.clone()))
        .collect();
    frame.rename_columns(&renames);
    Ok(frame)
}

pub fn run_load(config: &PipelineConfig) -> Result<LoadReport> {
    info!("Load: validating and persisting the final table");
    let csv_path = config.final_csv();
    let frame = persist::read_final_csv(&csv_path)
        .with_context(|| format!("Reloading final table {csv_path:?}"))?;
    let report = LoadReport::new(&frame, config.expected_orders);
    report.log();

    let parquet_path = config.final_parquet();
    persist::persist_and_verify(&frame, &parquet_path)?;
    info!("Parquet copy verified at {parquet_path:?}");
    table::print_report("load", &report.rows_for_display());
    Ok(report)
}

pub fn run_export(config: &PipelineConfig) -> Result<WarehouseReport> {
    info!("Export: loading the analytical store");
    let parquet_path = config.final_parquet();
    if !parquet_path.exists() {
        return Err(PipelineError::missing_input(&parquet_path).into());
    }
    let mut frame = persist::read_parquet(&parquet_path)?;
    persist::coerce_timestamps(&mut frame);
    let report = warehouse::load(&frame, &config.warehouse_path(), &config.warehouse.table)?;
    table::print_report(
        "warehouse",
        &[
            vec!["table".to_string(), report.table.clone()],
            vec!["columns".to_string(), report.columns.to_string()],
            vec!["rows inserted".to_string(), report.rows_inserted.to_string()],
            vec!["rows confirmed".to_string(), report.rows_confirmed.to_string()],
        ],
    );
    Ok(report)
}

/// Summary of a full batch run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub extract: ExtractReport,
    pub reconciliation: ReconciliationReport,
    pub load: LoadReport,
    pub warehouse: Option<WarehouseReport>,
}

/// Runs extract, transform and load, then the warehouse export when
/// `export` is set.
pub fn run_all(config: &PipelineConfig, export: bool) -> Result<RunSummary> {
    let extract = run_extract(config)?;
    let reconciliation = run_transform(config)?;
    let load = run_load(config)?;
    let warehouse = if export {
        Some(run_export(config)?)
    } else {
        None
    };
    info!("Pipeline finished");
    Ok(RunSummary {
        extract,
        reconciliation,
        load,
        warehouse,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn transform_fails_fast_on_missing_input() {
        let dir = tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.paths.processed = dir.path().join("processed");
        config.paths.final_dir = dir.path().join("final");
        let err = run_transform(&config).expect_err("nothing staged");
        let typed = err.downcast_ref::<PipelineError>().expect("typed error");
        assert!(matches!(
            typed,
            PipelineError::MissingInput { path } if path.ends_with("Customers.csv")
        ));
        assert!(!config.final_csv().exists());
    }

    #[test]
    fn csv_spreadsheet_orders_use_the_input_encoding() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orders.csv");
        let (bytes, _, _) = encoding_rs::WINDOWS_1252.encode("Order ID,Customer\n11078,Périer\n");
        std::fs::write(&path, bytes).unwrap();
        let mut config = PipelineConfig::default();
        config.input_encoding = Some("windows-1252".to_string());

        let frame = read_spreadsheet_orders(&config, &path).unwrap();
        assert_eq!(frame.columns(), ["OrderID", "CustomerID"]);
        assert_eq!(
            frame.rows()[0][1],
            Some(crate::data::Value::String("Périer".into()))
        );
    }

    #[test]
    fn export_requires_parquet() {
        let dir = tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.paths.final_dir = dir.path().to_path_buf();
        let err = run_export(&config).expect_err("no parquet");
        assert!(err.to_string().contains("northwind_bi.parquet"));
    }
}

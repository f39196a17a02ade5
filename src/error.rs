use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort a pipeline stage.
///
/// Bad values never show up here: unparseable dates and numbers degrade to
/// null or zero inside the stage that reads them.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("required input {path:?} does not exist")]
    MissingInput { path: PathBuf },

    #[error("table '{table}' has no '{column}' column")]
    MissingColumn { table: String, column: String },

    #[error("warehouse load into '{table}' failed{}: {source}", column_suffix(.column))]
    Warehouse {
        table: String,
        column: Option<String>,
        #[source]
        source: rusqlite::Error,
    },

    #[error(
        "round trip through {path:?} changed the table: {expected_rows} -> {actual_rows} rows, \
         {expected_orders} -> {actual_orders} distinct orders"
    )]
    RoundTrip {
        path: PathBuf,
        expected_rows: usize,
        actual_rows: usize,
        expected_orders: usize,
        actual_orders: usize,
    },
}

fn column_suffix(column: &Option<String>) -> String {
    column
        .as_ref()
        .map(|name| format!(" at column '{name}'"))
        .unwrap_or_default()
}

impl PipelineError {
    pub fn missing_input(path: impl Into<PathBuf>) -> Self {
        PipelineError::MissingInput { path: path.into() }
    }

    pub fn missing_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        PipelineError::MissingColumn {
            table: table.into(),
            column: column.into(),
        }
    }
}

//! Pipeline configuration.
//!
//! Every field has a default matching the conventional `data/` layout, so
//! the pipeline runs without a config file. A YAML file passed with
//! `--config` overrides any subset of fields, and command-line flags
//! override the file.

use std::{
    collections::BTreeMap,
    fs::File,
    io::BufReader,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::keys::default_missing_markers;

const WAREHOUSE_FILE: &str = "warehouse.sqlite";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub tables: TablesConfig,
    /// Spreadsheet order columns renamed onto the relational names before
    /// the union.
    pub spreadsheet_renames: BTreeMap<String, String>,
    pub keys: Vec<String>,
    pub missing_markers: Vec<String>,
    /// Distinct orders the final table should contain; `null` disables the
    /// check.
    pub expected_orders: Option<usize>,
    /// Encoding label of every raw CSV input: the relational exports and a
    /// spreadsheet orders file saved as CSV. Workbooks ignore it.
    pub input_encoding: Option<String>,
    pub warehouse: WarehouseConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub raw_spreadsheets: PathBuf,
    pub raw_exports: PathBuf,
    pub processed: PathBuf,
    pub final_dir: PathBuf,
    /// File stem of the final CSV and Parquet artifacts.
    pub final_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TablesConfig {
    /// Relational tables expected in the export directory.
    pub expected: Vec<String>,
    pub orders: String,
    pub customers: String,
    pub order_details: String,
    pub products: String,
    /// Order workbook, relative to `paths.raw_spreadsheets`.
    pub spreadsheet_orders: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WarehouseConfig {
    /// SQLite file; `null` places it in `paths.final_dir`.
    pub path: Option<PathBuf>,
    pub table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    pub bind: SocketAddr,
    pub title: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let spreadsheet_renames = [
            ("Order ID", "OrderID"),
            ("Order Date", "OrderDate"),
            ("Shipped Date", "ShippedDate"),
            ("Customer", "CustomerID"),
            ("Employee", "EmployeeID"),
        ]
        .into_iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect();
        Self {
            paths: PathsConfig::default(),
            tables: TablesConfig::default(),
            spreadsheet_renames,
            keys: ["CustomerID", "OrderID", "ProductID"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            missing_markers: default_missing_markers(),
            expected_orders: Some(878),
            input_encoding: None,
            warehouse: WarehouseConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_spreadsheets: PathBuf::from("data/raw/excel"),
            raw_exports: PathBuf::from("data/raw/sqlserver"),
            processed: PathBuf::from("data/processed"),
            final_dir: PathBuf::from("data/final"),
            final_name: "northwind_bi".to_string(),
        }
    }
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            expected: [
                "Customers",
                "Orders",
                "Order Details",
                "Employees",
                "Categories",
                "Shippers",
                "Suppliers",
                "Products",
            ]
            .iter()
            .map(|t| t.to_string())
            .collect(),
            orders: "Orders".to_string(),
            customers: "Customers".to_string(),
            order_details: "Order_Details".to_string(),
            products: "Products".to_string(),
            spreadsheet_orders: PathBuf::from("orders.xlsx"),
        }
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            path: None,
            table: "Fact_Orders".to_string(),
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8501)),
            title: "Northwind BI".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config {path:?}"))?;
        let config: PipelineConfig = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing config {path:?}"))?;
        Ok(config)
    }

    /// Loads `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Serializing config to YAML")
    }

    /// Staged CSV for a relational or spreadsheet table.
    pub fn processed_table(&self, table: &str) -> PathBuf {
        self.paths
            .processed
            .join(format!("{}.csv", staged_table_name(table)))
    }

    pub fn spreadsheet_orders_path(&self) -> PathBuf {
        self.paths.raw_spreadsheets.join(&self.tables.spreadsheet_orders)
    }

    pub fn final_csv(&self) -> PathBuf {
        self.paths
            .final_dir
            .join(format!("{}.csv", self.paths.final_name))
    }

    pub fn final_parquet(&self) -> PathBuf {
        self.paths
            .final_dir
            .join(format!("{}.parquet", self.paths.final_name))
    }

    pub fn warehouse_path(&self) -> PathBuf {
        self.warehouse
            .path
            .clone()
            .unwrap_or_else(|| self.paths.final_dir.join(WAREHOUSE_FILE))
    }
}

/// File stem a table is staged under: spaces become underscores so
/// `Order Details` lands in `Order_Details.csv`.
pub fn staged_table_name(table: &str) -> String {
    table.trim().replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = "expected_orders: 3\npaths:\n  final_dir: out\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(config.expected_orders, Some(3));
        assert_eq!(config.paths.final_dir, PathBuf::from("out"));
        assert_eq!(config.paths.processed, PathBuf::from("data/processed"));
        assert_eq!(config.final_parquet(), PathBuf::from("out/northwind_bi.parquet"));
        assert_eq!(config.spreadsheet_renames["Customer"], "CustomerID");
        assert_eq!(config.warehouse_path(), PathBuf::from("out/warehouse.sqlite"));
    }

    #[test]
    fn explicit_warehouse_path_wins_over_final_dir() {
        let yaml = "paths:\n  final_dir: out\nwarehouse:\n  path: store/nw.sqlite\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.warehouse_path(), PathBuf::from("store/nw.sqlite"));
    }

    #[test]
    fn null_expected_orders_disables_check() {
        let config: PipelineConfig = serde_yaml::from_str("expected_orders: null\n").unwrap();
        assert_eq!(config.expected_orders, None);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_yaml::from_str::<PipelineConfig>("expected_order: 3\n").is_err());
    }

    #[test]
    fn defaults_round_trip_through_yaml() {
        let config = PipelineConfig::default();
        let yaml = config.to_yaml().unwrap();
        let back: PipelineConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn staged_names_replace_spaces() {
        let config = PipelineConfig::default();
        assert_eq!(
            config.processed_table("Order Details"),
            PathBuf::from("data/processed/Order_Details.csv")
        );
    }
}

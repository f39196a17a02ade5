use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand};

use crate::config::PipelineConfig;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Reconcile Northwind order sources into a BI fact table",
    long_about = None
)]
pub struct Cli {
    /// YAML configuration file; every field is optional
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Stage spreadsheet and relational export tables as CSV in the processed area
    Extract(ExtractArgs),
    /// Reconcile both order sources into the final order-line table
    Transform(TransformArgs),
    /// Validate the final table and write its Parquet copy
    Load(LoadArgs),
    /// Bulk load the final table into the analytical store
    Export(ExportArgs),
    /// Serve the interactive dashboard
    Dashboard(DashboardArgs),
    /// Run extract, transform and load in sequence
    Run(RunArgs),
    /// Print the effective configuration as YAML
    Config(PathArgs),
}

#[derive(Debug, Args, Default)]
pub struct PathArgs {
    /// Directory holding the spreadsheet order workbook
    #[arg(long = "raw-spreadsheets")]
    pub raw_spreadsheets: Option<PathBuf>,
    /// Directory holding the relational CSV exports
    #[arg(long = "raw-exports")]
    pub raw_exports: Option<PathBuf>,
    /// Directory for the staged per-table CSVs
    #[arg(long)]
    pub processed: Option<PathBuf>,
    /// Directory for the final CSV and Parquet tables
    #[arg(long = "final-dir")]
    pub final_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub paths: PathArgs,
    /// Character encoding of raw CSV inputs: relational exports and CSV spreadsheet orders (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct TransformArgs {
    #[command(flatten)]
    pub paths: PathArgs,
}

#[derive(Debug, Args)]
pub struct ExpectationArgs {
    /// Distinct orders the final table should contain
    #[arg(long = "expected-orders", conflicts_with = "no_expected_orders")]
    pub expected_orders: Option<usize>,
    /// Skip the distinct-order count check
    #[arg(long = "no-expected-orders")]
    pub no_expected_orders: bool,
}

#[derive(Debug, Args)]
pub struct LoadArgs {
    #[command(flatten)]
    pub paths: PathArgs,
    #[command(flatten)]
    pub expectation: ExpectationArgs,
}

#[derive(Debug, Args)]
pub struct WarehouseArgs {
    /// SQLite file of the analytical store
    #[arg(long)]
    pub warehouse: Option<PathBuf>,
    /// Table replaced on every export
    #[arg(long)]
    pub table: Option<String>,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub paths: PathArgs,
    #[command(flatten)]
    pub warehouse: WarehouseArgs,
}

#[derive(Debug, Args)]
pub struct DashboardArgs {
    #[command(flatten)]
    pub paths: PathArgs,
    /// Address to listen on
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Page title
    #[arg(long)]
    pub title: Option<String>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub paths: PathArgs,
    #[command(flatten)]
    pub expectation: ExpectationArgs,
    #[command(flatten)]
    pub warehouse: WarehouseArgs,
    /// Character encoding of raw CSV inputs: relational exports and CSV spreadsheet orders (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Also load the analytical store after the final table is written
    #[arg(long)]
    pub export: bool,
}

impl PathArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.raw_spreadsheets {
            config.paths.raw_spreadsheets = dir.clone();
        }
        if let Some(dir) = &self.raw_exports {
            config.paths.raw_exports = dir.clone();
        }
        if let Some(dir) = &self.processed {
            config.paths.processed = dir.clone();
        }
        if let Some(dir) = &self.final_dir {
            config.paths.final_dir = dir.clone();
        }
    }
}

impl ExpectationArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if self.no_expected_orders {
            config.expected_orders = None;
        } else if let Some(expected) = self.expected_orders {
            config.expected_orders = Some(expected);
        }
    }
}

impl WarehouseArgs {
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(path) = &self.warehouse {
            config.warehouse.path = Some(path.clone());
        }
        if let Some(table) = &self.table {
            config.warehouse.table = table.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_config_values() {
        let cli = Cli::parse_from([
            "northwind-bi",
            "run",
            "--final-dir",
            "out",
            "--no-expected-orders",
            "--table",
            "Facts",
            "--export",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let mut config = PipelineConfig::default();
        args.paths.apply(&mut config);
        args.expectation.apply(&mut config);
        args.warehouse.apply(&mut config);
        assert_eq!(config.paths.final_dir, PathBuf::from("out"));
        assert_eq!(config.expected_orders, None);
        assert_eq!(config.warehouse.table, "Facts");
        assert!(args.export);
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::parse_from(["northwind-bi", "load", "--config", "bi.yaml"]);
        assert_eq!(cli.config, Some(PathBuf::from("bi.yaml")));
    }

    #[test]
    fn expected_orders_conflicts_with_disable() {
        let parsed = Cli::try_parse_from([
            "northwind-bi",
            "load",
            "--expected-orders",
            "5",
            "--no-expected-orders",
        ]);
        assert!(parsed.is_err());
    }
}

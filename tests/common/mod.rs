#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use northwind_bi::config::PipelineConfig;
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Scratch directory seeded with the raw Northwind fixtures. Cleans up on
/// drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates an empty scratch directory.
    pub fn empty() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Creates a scratch directory holding a copy of `tests/data/northwind`.
    pub fn northwind() -> Self {
        let workspace = Self::empty();
        copy_dir(&fixture_path("northwind"), workspace.path());
        workspace
    }

    /// Like [`TestWorkspace::northwind`], with the spreadsheet orders held in
    /// `raw/excel/orders.xlsx` instead of the CSV fixture.
    pub fn northwind_workbook() -> Self {
        let workspace = Self::northwind();
        fs::copy(
            fixture_path("workbooks/orders.xlsx"),
            workspace.path().join("raw/excel/orders.xlsx"),
        )
        .expect("copy workbook fixture");
        workspace
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, contents).expect("write temp file contents");
        path
    }

    /// Configuration pointing every path into the workspace.
    pub fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.paths.raw_spreadsheets = self.path().join("raw/excel");
        config.paths.raw_exports = self.path().join("raw/sqlserver");
        config.paths.processed = self.path().join("processed");
        config.paths.final_dir = self.path().join("final");
        config.tables.spreadsheet_orders = PathBuf::from("orders.csv");
        config.expected_orders = Some(3);
        config
    }

    /// Writes [`TestWorkspace::config`] as YAML and returns its path.
    pub fn write_config(&self) -> PathBuf {
        let yaml = self.config().to_yaml().expect("serialize config");
        self.write("northwind.yaml", &yaml)
    }
}

fn copy_dir(from: &Path, to: &Path) {
    fs::create_dir_all(to).expect("create target dir");
    for entry in fs::read_dir(from).expect("read fixture dir") {
        let entry = entry.expect("fixture entry");
        let target = to.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), &target).expect("copy fixture");
        }
    }
}

//! Extraction: stage every raw table as a UTF-8 CSV in the processed area.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::{info, warn};

use crate::{
    config::{PipelineConfig, staged_table_name},
    io_utils, source,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Spreadsheet,
    RelationalExport,
}

impl SourceKind {
    pub fn label(self) -> &'static str {
        match self {
            SourceKind::Spreadsheet => "spreadsheet",
            SourceKind::RelationalExport => "relational export",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StagedTable {
    pub name: String,
    pub kind: SourceKind,
    pub rows: usize,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractReport {
    pub staged: Vec<StagedTable>,
    /// Expected relational tables with no export file.
    pub missing: Vec<String>,
}

impl ExtractReport {
    pub fn rows_for_display(&self) -> Vec<Vec<String>> {
        let mut rows = self
            .staged
            .iter()
            .map(|t| vec![format!("{} ({})", t.name, t.kind.label()), t.rows.to_string()])
            .collect::<Vec<_>>();
        rows.extend(
            self.missing
                .iter()
                .map(|name| vec![format!("{name} (relational export)"), "missing".to_string()]),
        );
        rows
    }
}

pub fn extract(config: &PipelineConfig) -> Result<ExtractReport> {
    let encoding = io_utils::resolve_encoding(config.input_encoding.as_deref())?;
    let spreadsheets =
        source::list_tables(&config.paths.raw_spreadsheets, source::SPREADSHEET_EXTENSIONS)?;
    let exports = source::list_tables(&config.paths.raw_exports, source::CSV_EXTENSIONS)?;

    let mut report = ExtractReport {
        missing: missing_expected(&config.tables.expected, &exports),
        ..ExtractReport::default()
    };
    for name in &report.missing {
        warn!(
            "Expected relational table '{name}' has no export in {:?}",
            config.paths.raw_exports
        );
    }

    let mut staged_names: HashMap<String, String> = HashMap::new();
    let inputs = spreadsheets
        .iter()
        .map(|p| (p, SourceKind::Spreadsheet))
        .chain(exports.iter().map(|p| (p, SourceKind::RelationalExport)));
    for (path, kind) in inputs {
        let staged = stage_table(config, path, kind, encoding)?;
        if let Some(previous) = staged_names.insert(staged.name.to_lowercase(), staged.name.clone()) {
            warn!(
                "Staged table '{}' replaces '{previous}' on case-insensitive file systems",
                staged.name
            );
        }
        report.staged.push(staged);
    }

    info!(
        "Extraction staged {} table(s) in {:?}",
        report.staged.len(),
        config.paths.processed
    );
    Ok(report)
}

fn stage_table(
    config: &PipelineConfig,
    path: &Path,
    kind: SourceKind,
    encoding: &'static Encoding,
) -> Result<StagedTable> {
    let frame = match kind {
        SourceKind::Spreadsheet => source::read_spreadsheet(path)?,
        SourceKind::RelationalExport => {
            source::read_csv(path, encoding, source::CellMode::Text)?
        }
    };
    let name = staged_table_name(&source::table_name(path));
    let target = config.processed_table(&name);
    source::write_csv(&frame, &target).with_context(|| format!("Staging {path:?}"))?;
    info!(
        "Staged {} '{name}' ({} row(s)) at {target:?}",
        kind.label(),
        frame.len()
    );
    Ok(StagedTable {
        name,
        kind,
        rows: frame.len(),
        path: target,
    })
}

fn missing_expected(expected: &[String], exports: &[PathBuf]) -> Vec<String> {
    let present = exports
        .iter()
        .map(|p| staged_table_name(&source::table_name(p)).to_lowercase())
        .collect::<Vec<_>>();
    expected
        .iter()
        .filter(|name| !present.contains(&staged_table_name(name).to_lowercase()))
        .cloned()
        .collect()
}

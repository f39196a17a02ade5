//! In-memory tables.
//!
//! A [`Frame`] holds an ordered list of column names and row-major cells.
//! It carries exactly the operations the pipeline needs: schema-aligned
//! concatenation, renames, left joins with collision suffixes, column-name
//! normalization, and the distinct/dedup helpers the diagnostics rely on.

use std::collections::{HashMap, HashSet};

use anyhow::{Result, ensure};

use crate::{
    data::{Cell, Value},
    error::PipelineError,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

/// Suffixes appended to overlapping non-key columns in a join.
#[derive(Debug, Clone)]
pub struct JoinSuffixes {
    pub left: String,
    pub right: String,
}

impl Default for JoinSuffixes {
    fn default() -> Self {
        Self {
            left: "_x".to_string(),
            right: "_y".to_string(),
        }
    }
}

impl Frame {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(
        name: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Vec<Cell>>,
    ) -> Result<Self> {
        let mut frame = Self::new(name, columns);
        for row in rows {
            frame.push_row(row)?;
        }
        Ok(frame)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        ensure!(
            row.len() == self.columns.len(),
            "Row has {} cell(s) but '{}' has {} column(s)",
            row.len(),
            self.name,
            self.columns.len()
        );
        self.rows.push(row);
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Cells of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&Cell>> {
        let idx = self.column_index(name)?;
        Some(self.column_at(idx))
    }

    pub fn column_at(&self, idx: usize) -> Vec<&Cell> {
        self.rows.iter().map(|row| &row[idx]).collect()
    }

    /// Like [`Frame::column`] but yields one null per row when the column
    /// does not exist.
    pub fn column_or_nulls(&self, name: &str) -> Vec<Option<&Value>> {
        match self.column_index(name) {
            Some(idx) => self.rows.iter().map(|row| row[idx].as_ref()).collect(),
            None => vec![None; self.rows.len()],
        }
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_ref()
    }

    /// Indices of every column whose name contains `needle`, in schema order.
    pub fn columns_containing(&self, needle: &str) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, name)| name.contains(needle))
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn rename_columns(&mut self, renames: &HashMap<String, String>) {
        for column in &mut self.columns {
            if let Some(target) = renames.get(column.as_str()) {
                *column = target.clone();
            }
        }
    }

    /// Replaces the named column in place, or appends it when absent.
    pub fn set_column(&mut self, name: &str, values: Vec<Cell>) -> Result<()> {
        ensure!(
            values.len() == self.rows.len(),
            "Column '{name}' has {} value(s) but '{}' has {} row(s)",
            values.len(),
            self.name,
            self.rows.len()
        );
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    /// Applies `f` to every cell of an existing column. Missing columns are
    /// left alone and reported as `false`.
    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> bool
    where
        F: FnMut(Cell) -> Cell,
    {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        for row in &mut self.rows {
            let value = row[idx].take();
            row[idx] = f(value);
        }
        true
    }

    /// Stacks frames on top of each other. Columns are aligned by name in
    /// order of first appearance; a frame lacking a column contributes nulls.
    pub fn concat(name: impl Into<String>, frames: &[&Frame]) -> Frame {
        let mut columns: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for frame in frames {
            for column in &frame.columns {
                if seen.insert(column.clone()) {
                    columns.push(column.clone());
                }
            }
        }

        let mut rows = Vec::with_capacity(frames.iter().map(|f| f.len()).sum());
        for frame in frames {
            let mapping = columns
                .iter()
                .map(|c| frame.column_index(c))
                .collect::<Vec<_>>();
            for row in &frame.rows {
                rows.push(
                    mapping
                        .iter()
                        .map(|idx| idx.and_then(|i| row[i].clone()))
                        .collect(),
                );
            }
        }

        Frame {
            name: name.into(),
            columns,
            rows,
        }
    }

    /// Left join on a single key column present on both sides.
    ///
    /// Every left row is kept. A left row with several matches fans out in
    /// right-table order; a row without a match gets nulls. Null keys never
    /// match. Non-key columns present on both sides receive the left and
    /// right suffixes, the key column appears once.
    pub fn left_join(&self, right: &Frame, key: &str, suffixes: &JoinSuffixes) -> Result<Frame> {
        let left_key = self
            .column_index(key)
            .ok_or_else(|| PipelineError::missing_column(&self.name, key))?;
        let right_key = right
            .column_index(key)
            .ok_or_else(|| PipelineError::missing_column(&right.name, key))?;

        let lookup = build_lookup(right, right_key);
        let (columns, right_columns) = joined_headers(self, right, right_key, suffixes);

        let mut rows = Vec::with_capacity(self.rows.len());
        let mut matched = 0usize;
        for row in &self.rows {
            let bucket = row[left_key]
                .as_ref()
                .and_then(|value| lookup.get(&value.as_display()));
            match bucket {
                Some(indices) => {
                    matched += 1;
                    for &right_idx in indices {
                        let right_row = &right.rows[right_idx];
                        let mut combined = row.clone();
                        combined.extend(right_columns.iter().map(|&c| right_row[c].clone()));
                        rows.push(combined);
                    }
                }
                None => {
                    let mut combined = row.clone();
                    combined.extend(right_columns.iter().map(|_| None));
                    rows.push(combined);
                }
            }
        }

        log::debug!(
            "Joined '{}' to '{}' on {key}: {matched}/{} left row(s) matched, {} output row(s)",
            self.name,
            right.name,
            self.rows.len(),
            rows.len()
        );

        Ok(Frame {
            name: self.name.clone(),
            columns,
            rows,
        })
    }

    /// Rewrites every column name through `normalize` and keeps only the
    /// first column for each resulting name. Returns the original names of
    /// the columns that were discarded.
    ///
    /// Dropping later duplicates is lossy: two unrelated columns that
    /// normalize to the same name keep only the first one's values.
    pub fn normalize_column_names<F>(&mut self, normalize: F) -> Vec<String>
    where
        F: Fn(&str) -> String,
    {
        let mut seen = HashSet::new();
        let mut keep = Vec::with_capacity(self.columns.len());
        let mut columns = Vec::with_capacity(self.columns.len());
        let mut dropped = Vec::new();
        for (idx, original) in self.columns.iter().enumerate() {
            let normalized = normalize(original);
            if seen.insert(normalized.clone()) {
                keep.push(idx);
                columns.push(normalized);
            } else {
                dropped.push(original.clone());
            }
        }

        if !dropped.is_empty() {
            for row in &mut self.rows {
                let mut old = std::mem::take(row);
                *row = keep.iter().map(|&idx| old[idx].take()).collect();
            }
        }
        self.columns = columns;
        dropped
    }

    /// Number of distinct non-null values in a column; zero when absent.
    pub fn distinct_count(&self, column: &str) -> usize {
        let Some(idx) = self.column_index(column) else {
            return 0;
        };
        self.rows
            .iter()
            .filter_map(|row| row[idx].as_ref())
            .map(Value::as_display)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Keeps the first row for each distinct value of `column`. Rows whose
    /// value is null are all kept.
    pub fn dedup_by(&self, column: &str) -> Frame {
        let Some(idx) = self.column_index(column) else {
            return self.clone();
        };
        let mut seen = HashSet::new();
        let rows = self
            .rows
            .iter()
            .filter(|row| match &row[idx] {
                Some(value) => seen.insert(value.as_display()),
                None => true,
            })
            .cloned()
            .collect();
        Frame {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Row indices grouped by the display value of `column`, in order of
    /// first appearance. Null values are skipped.
    pub fn group_indices(&self, column: &str) -> Vec<(String, Vec<usize>)> {
        let Some(idx) = self.column_index(column) else {
            return Vec::new();
        };
        let mut order: Vec<(String, Vec<usize>)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for (row_idx, row) in self.rows.iter().enumerate() {
            let Some(value) = &row[idx] else { continue };
            let key = value.as_display();
            match positions.get(&key) {
                Some(&pos) => order[pos].1.push(row_idx),
                None => {
                    positions.insert(key.clone(), order.len());
                    order.push((key, vec![row_idx]));
                }
            }
        }
        order
    }

    pub fn filter_rows<F>(&self, mut keep: F) -> Frame
    where
        F: FnMut(usize, &[Cell]) -> bool,
    {
        let rows = self
            .rows
            .iter()
            .enumerate()
            .filter(|(idx, row)| keep(*idx, row))
            .map(|(_, row)| row.clone())
            .collect();
        Frame {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows,
        }
    }
}

fn build_lookup(frame: &Frame, key_idx: usize) -> HashMap<String, Vec<usize>> {
    let mut map: HashMap<String, Vec<usize>> = HashMap::new();
    for (row_idx, row) in frame.rows.iter().enumerate() {
        if let Some(value) = &row[key_idx] {
            map.entry(value.as_display()).or_default().push(row_idx);
        }
    }
    map
}

fn joined_headers(
    left: &Frame,
    right: &Frame,
    right_key: usize,
    suffixes: &JoinSuffixes,
) -> (Vec<String>, Vec<usize>) {
    let key = &right.columns[right_key];
    let right_names: HashSet<&str> = right
        .columns
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != right_key)
        .map(|(_, name)| name.as_str())
        .collect();
    let left_names: HashSet<&str> = left
        .columns
        .iter()
        .filter(|name| *name != key)
        .map(String::as_str)
        .collect();

    let mut headers = left
        .columns
        .iter()
        .map(|name| {
            if name != key && right_names.contains(name.as_str()) {
                format!("{name}{}", suffixes.left)
            } else {
                name.clone()
            }
        })
        .collect::<Vec<_>>();

    let mut right_columns = Vec::new();
    for (idx, name) in right.columns.iter().enumerate() {
        if idx == right_key {
            continue;
        }
        if left_names.contains(name.as_str()) {
            headers.push(format!("{name}{}", suffixes.right));
        } else {
            headers.push(name.clone());
        }
        right_columns.push(idx);
    }
    (headers, right_columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Some(Value::String(s.to_string()))
    }

    fn frame(name: &str, columns: &[&str], rows: Vec<Vec<Cell>>) -> Frame {
        Frame::from_rows(
            name,
            columns.iter().map(|c| c.to_string()).collect(),
            rows,
        )
        .expect("frame")
    }

    #[test]
    fn concat_aligns_columns_by_name() {
        let a = frame("a", &["id", "x"], vec![vec![text("1"), text("ax")]]);
        let b = frame("b", &["y", "id"], vec![vec![text("by"), text("2")]]);
        let merged = Frame::concat("u", &[&a, &b]);
        assert_eq!(merged.columns(), &["id", "x", "y"]);
        assert_eq!(merged.rows()[0], vec![text("1"), text("ax"), None]);
        assert_eq!(merged.rows()[1], vec![text("2"), None, text("by")]);
    }

    #[test]
    fn left_join_keeps_unmatched_and_fans_out() {
        let left = frame(
            "orders",
            &["OrderID", "Note"],
            vec![
                vec![text("1"), text("first")],
                vec![text("2"), text("second")],
                vec![None, text("keyless")],
            ],
        );
        let right = frame(
            "details",
            &["OrderID", "Note", "Qty"],
            vec![
                vec![text("1"), text("d1"), text("3")],
                vec![text("1"), text("d2"), text("4")],
            ],
        );
        let joined = left
            .left_join(&right, "OrderID", &JoinSuffixes::default())
            .expect("join");
        assert_eq!(joined.columns(), &["OrderID", "Note_x", "Note_y", "Qty"]);
        assert_eq!(joined.len(), 4);
        assert_eq!(joined.rows()[1][2], text("d2"));
        assert_eq!(joined.rows()[2], vec![text("2"), text("second"), None, None]);
        assert_eq!(joined.rows()[3][0], None);
    }

    #[test]
    fn left_join_reports_missing_key_column() {
        let left = frame("orders", &["OrderID"], vec![]);
        let right = frame("customers", &["CustomerID"], vec![]);
        let err = left
            .left_join(&right, "OrderID", &JoinSuffixes::default())
            .expect_err("missing key");
        assert!(err.to_string().contains("customers"));
    }

    #[test]
    fn normalize_column_names_keeps_first_duplicate() {
        let mut f = frame(
            "t",
            &["Unit Price", "unit_price", "Qty"],
            vec![vec![text("1"), text("2"), text("3")]],
        );
        let dropped = f.normalize_column_names(|n| n.to_lowercase().replace([' ', '_'], ""));
        assert_eq!(dropped, vec!["unit_price".to_string()]);
        assert_eq!(f.columns(), &["unitprice", "qty"]);
        assert_eq!(f.rows()[0], vec![text("1"), text("3")]);
    }

    #[test]
    fn set_column_replaces_in_place_or_appends() {
        let mut f = frame("t", &["a", "b"], vec![vec![text("1"), text("2")]]);
        f.set_column("a", vec![text("9")]).unwrap();
        f.set_column("c", vec![text("3")]).unwrap();
        assert_eq!(f.columns(), &["a", "b", "c"]);
        assert_eq!(f.rows()[0], vec![text("9"), text("2"), text("3")]);
        assert!(f.set_column("d", vec![]).is_err());
    }

    #[test]
    fn dedup_and_distinct_ignore_nulls() {
        let f = frame(
            "t",
            &["id"],
            vec![vec![text("1")], vec![text("1")], vec![None], vec![text("2")]],
        );
        assert_eq!(f.distinct_count("id"), 2);
        assert_eq!(f.dedup_by("id").len(), 3);
        assert_eq!(f.distinct_count("missing"), 0);
    }
}

//! Durable storage of the reconciled table.
//!
//! The final table is written twice: a wide CSV for people and a Parquet
//! twin for the dashboard. Both are full overwrites. Reloading re-derives the
//! two timestamp columns and checks the distinct-order count against the
//! configured expectation.

use std::{fs::File, path::Path, sync::Arc};

use anyhow::{Context, Result, anyhow};
use arrow::{
    array::{
        Array, ArrayRef, Float64Array, Float64Builder, Int64Array, Int64Builder, StringArray,
        StringBuilder, TimestampMillisecondArray, TimestampMillisecondBuilder,
    },
    datatypes::{DataType, Field, Schema, TimeUnit},
    record_batch::RecordBatch,
};
use chrono::DateTime;
use encoding_rs::UTF_8;
use log::{info, warn};
use parquet::{
    arrow::{ArrowWriter, arrow_reader::ParquetRecordBatchReaderBuilder},
    basic::Compression,
    file::properties::WriterProperties,
};
use serde::Serialize;

use crate::{
    data::{Cell, DateOrder, Value, ValueKind, coerce_datetime, infer_kind},
    error::PipelineError,
    frame::Frame,
    io_utils,
    reconcile::columns,
    source::{self, CellMode},
};

/// Outcome of reloading the final table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub rows: usize,
    pub distinct_orders: usize,
    pub expected_orders: Option<usize>,
}

impl LoadReport {
    pub fn new(frame: &Frame, expected_orders: Option<usize>) -> Self {
        Self {
            rows: frame.len(),
            distinct_orders: frame.distinct_count(columns::UNIQUE_ROW_ID),
            expected_orders,
        }
    }

    /// Orders missing relative to the expectation; negative when there are
    /// more than expected.
    pub fn shortfall(&self) -> Option<i64> {
        self.expected_orders
            .map(|expected| expected as i64 - self.distinct_orders as i64)
            .filter(|gap| *gap != 0)
    }

    pub fn is_complete(&self) -> bool {
        self.shortfall().is_none()
    }

    /// Logs the counts and, when they diverge from the expectation, a
    /// warning naming the gap. Never fails.
    pub fn log(&self) {
        info!(
            "Reloaded {} row(s) covering {} distinct order(s)",
            self.rows, self.distinct_orders
        );
        match (self.expected_orders, self.shortfall()) {
            (Some(expected), Some(gap)) if gap > 0 => warn!(
                "Expected {expected} distinct orders but found {}: {gap} order(s) missing",
                self.distinct_orders
            ),
            (Some(expected), Some(gap)) => warn!(
                "Expected {expected} distinct orders but found {}: {} more than expected",
                self.distinct_orders,
                -gap
            ),
            (Some(expected), None) => info!("All {expected} expected orders are present"),
            (None, _) => {}
        }
    }

    pub fn rows_for_display(&self) -> Vec<Vec<String>> {
        let mut rows = vec![
            vec!["rows".to_string(), self.rows.to_string()],
            vec!["distinct orders".to_string(), self.distinct_orders.to_string()],
        ];
        if let Some(expected) = self.expected_orders {
            rows.push(vec!["expected orders".to_string(), expected.to_string()]);
        }
        if let Some(gap) = self.shortfall() {
            rows.push(vec!["shortfall".to_string(), gap.to_string()]);
        }
        rows
    }
}

pub fn write_csv(frame: &Frame, path: &Path) -> Result<()> {
    source::write_csv(frame, path)?;
    info!("Wrote {} row(s) to {path:?}", frame.len());
    Ok(())
}

/// Reads a CSV this crate wrote, narrowing cells to their natural types and
/// re-deriving the timestamp columns.
pub fn read_final_csv(path: &Path) -> Result<Frame> {
    if !path.exists() {
        return Err(PipelineError::missing_input(path).into());
    }
    let mut frame = source::read_csv(path, UTF_8, CellMode::Inferred)?;
    coerce_timestamps(&mut frame);
    Ok(frame)
}

/// Re-derives the order and shipment dates as timestamps; values that do
/// not parse become null.
pub fn coerce_timestamps(frame: &mut Frame) {
    for (column, order) in [
        (columns::ORDER_DATE, DateOrder::DayFirst),
        (columns::SHIPPED_DATE, DateOrder::MonthFirst),
    ] {
        frame.map_column(column, |cell| {
            coerce_datetime(cell.as_ref(), order).map(Value::DateTime)
        });
    }
}

fn arrow_type(kind: ValueKind) -> DataType {
    match kind {
        ValueKind::Integer => DataType::Int64,
        ValueKind::Float => DataType::Float64,
        ValueKind::Timestamp => DataType::Timestamp(TimeUnit::Millisecond, None),
        ValueKind::Text => DataType::Utf8,
    }
}

fn build_array(cells: &[&Cell], kind: ValueKind) -> ArrayRef {
    match kind {
        ValueKind::Integer => {
            let mut builder = Int64Builder::with_capacity(cells.len());
            for cell in cells.iter().copied() {
                builder.append_option(cell.as_ref().and_then(Value::as_i64));
            }
            Arc::new(builder.finish())
        }
        ValueKind::Float => {
            let mut builder = Float64Builder::with_capacity(cells.len());
            for cell in cells.iter().copied() {
                builder.append_option(cell.as_ref().and_then(Value::as_f64));
            }
            Arc::new(builder.finish())
        }
        ValueKind::Timestamp => {
            let mut builder = TimestampMillisecondBuilder::with_capacity(cells.len());
            for cell in cells.iter().copied() {
                let millis = match cell {
                    Some(Value::DateTime(dt)) => Some(dt.and_utc().timestamp_millis()),
                    _ => None,
                };
                builder.append_option(millis);
            }
            Arc::new(builder.finish())
        }
        ValueKind::Text => {
            let mut builder = StringBuilder::new();
            for cell in cells.iter().copied() {
                builder.append_option(cell.as_ref().map(Value::as_display));
            }
            Arc::new(builder.finish())
        }
    }
}

pub fn to_record_batch(frame: &Frame) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(frame.columns().len());
    let mut arrays = Vec::with_capacity(frame.columns().len());
    for (idx, name) in frame.columns().iter().enumerate() {
        let cells = frame.column_at(idx);
        let kind = infer_kind(cells.iter().copied());
        fields.push(Field::new(name, arrow_type(kind), true));
        arrays.push(build_array(&cells, kind));
    }
    let schema = Arc::new(Schema::new(fields));
    if arrays.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }
    RecordBatch::try_new(schema, arrays).context("Assembling record batch")
}

/// Writes `frame` to `path` in one shot, replacing any previous file.
pub fn write_parquet(frame: &Frame, path: &Path) -> Result<()> {
    io_utils::ensure_parent_dir(path)?;
    let batch = to_record_batch(frame)?;
    let file = File::create(path).with_context(|| format!("Creating {path:?}"))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .with_context(|| format!("Opening Parquet writer for {path:?}"))?;
    writer
        .write(&batch)
        .with_context(|| format!("Writing Parquet data to {path:?}"))?;
    writer
        .close()
        .with_context(|| format!("Finalizing {path:?}"))?;
    info!("Wrote {} row(s) to {path:?}", frame.len());
    Ok(())
}

pub fn read_parquet(path: &Path) -> Result<Frame> {
    if !path.exists() {
        return Err(PipelineError::missing_input(path).into());
    }
    let file = File::open(path).with_context(|| format!("Opening {path:?}"))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("Reading Parquet metadata of {path:?}"))?;
    let columns = builder
        .schema()
        .fields()
        .iter()
        .map(|field| field.name().clone())
        .collect::<Vec<_>>();
    let reader = builder
        .build()
        .with_context(|| format!("Opening Parquet reader for {path:?}"))?;

    let mut frame = Frame::new(source::table_name(path), columns);
    for batch in reader {
        let batch = batch.with_context(|| format!("Reading record batch from {path:?}"))?;
        let decoded = batch
            .columns()
            .iter()
            .map(|array| decode_array(array.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        for row_idx in 0..batch.num_rows() {
            frame.push_row(decoded.iter().map(|col| col[row_idx].clone()).collect())?;
        }
    }
    Ok(frame)
}

fn decode_array(array: &dyn Array) -> Result<Vec<Cell>> {
    let any = array.as_any();
    let cells = match array.data_type() {
        DataType::Int64 => {
            let values = downcast::<Int64Array>(any)?;
            (0..values.len())
                .map(|i| values.is_valid(i).then(|| Value::Integer(values.value(i))))
                .collect()
        }
        DataType::Float64 => {
            let values = downcast::<Float64Array>(any)?;
            (0..values.len())
                .map(|i| values.is_valid(i).then(|| Value::Float(values.value(i))))
                .collect()
        }
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            let values = downcast::<TimestampMillisecondArray>(any)?;
            (0..values.len())
                .map(|i| {
                    if values.is_valid(i) {
                        DateTime::from_timestamp_millis(values.value(i))
                            .map(|dt| Value::DateTime(dt.naive_utc()))
                    } else {
                        None
                    }
                })
                .collect()
        }
        DataType::Utf8 => {
            let values = downcast::<StringArray>(any)?;
            (0..values.len())
                .map(|i| {
                    values
                        .is_valid(i)
                        .then(|| Value::String(values.value(i).to_string()))
                })
                .collect()
        }
        other => return Err(anyhow!("Unsupported Parquet column type {other:?}")),
    };
    Ok(cells)
}

fn downcast<T: 'static>(any: &dyn std::any::Any) -> Result<&T> {
    any.downcast_ref::<T>()
        .ok_or_else(|| anyhow!("Parquet column does not match its declared type"))
}

/// Writes the Parquet twin of the final table and re-reads it; a change in
/// row or distinct-order count is an error.
pub fn persist_and_verify(frame: &Frame, path: &Path) -> Result<Frame> {
    write_parquet(frame, path)?;
    let mut reloaded = read_parquet(path)?;
    coerce_timestamps(&mut reloaded);
    let before = LoadReport::new(frame, None);
    let after = LoadReport::new(&reloaded, None);
    if before.rows != after.rows || before.distinct_orders != after.distinct_orders {
        return Err(PipelineError::RoundTrip {
            path: path.to_path_buf(),
            expected_rows: before.rows,
            actual_rows: after.rows,
            expected_orders: before.distinct_orders,
            actual_orders: after.distinct_orders,
        }
        .into());
    }
    Ok(reloaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn sample() -> Frame {
        let day = NaiveDate::from_ymd_opt(1996, 7, 4)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        Frame::from_rows(
            "final",
            vec![
                columns::UNIQUE_ROW_ID.to_string(),
                columns::ORDER_DATE.to_string(),
                columns::TOTAL_AMOUNT.to_string(),
                "companyname".to_string(),
            ],
            vec![
                vec![
                    Some(Value::Integer(0)),
                    Some(Value::DateTime(day)),
                    Some(Value::Float(168.0)),
                    Some(Value::String("Vins et alcools".into())),
                ],
                vec![
                    Some(Value::Integer(0)),
                    Some(Value::DateTime(day)),
                    Some(Value::Float(98.5)),
                    None,
                ],
                vec![Some(Value::Integer(1)), None, Some(Value::Float(0.0)), None],
            ],
        )
        .unwrap()
    }

    #[test]
    fn parquet_round_trip_preserves_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("final.parquet");
        let frame = sample();
        let reloaded = persist_and_verify(&frame, &path).expect("round trip");
        assert_eq!(reloaded.columns(), frame.columns());
        assert_eq!(reloaded.rows(), frame.rows());
    }

    #[test]
    fn record_batch_types_follow_cell_kinds() {
        let batch = to_record_batch(&sample()).unwrap();
        let schema = batch.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(
            schema.field(1).data_type(),
            &DataType::Timestamp(TimeUnit::Millisecond, None)
        );
        assert_eq!(schema.field(2).data_type(), &DataType::Float64);
        assert_eq!(schema.field(3).data_type(), &DataType::Utf8);
    }

    #[test]
    fn load_report_names_the_shortfall() {
        let report = LoadReport::new(&sample(), Some(5));
        assert_eq!(report.distinct_orders, 2);
        assert_eq!(report.shortfall(), Some(3));
        assert!(!report.is_complete());
        assert!(LoadReport::new(&sample(), Some(2)).is_complete());
        assert!(LoadReport::new(&sample(), None).is_complete());
    }

    #[test]
    fn read_final_csv_rederives_timestamps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("final.csv");
        std::fs::write(
            &path,
            "uniquerowid,orderdate_main,shippeddate\n0,04/07/1996,07/16/1996\n1,bad,\n",
        )
        .unwrap();
        let frame = read_final_csv(&path).unwrap();
        assert_eq!(
            frame.cell(0, columns::ORDER_DATE).map(Value::as_display),
            Some("1996-07-04".to_string())
        );
        assert_eq!(
            frame.cell(0, columns::SHIPPED_DATE).map(Value::as_display),
            Some("1996-07-16".to_string())
        );
        assert_eq!(frame.cell(1, columns::ORDER_DATE), None);
    }
}

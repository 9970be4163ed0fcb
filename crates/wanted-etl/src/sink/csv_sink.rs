//! CSV writer and reader.
//!
//! Written files carry one header row of column names and quote every
//! non-numeric field. Missing cells are written as empty fields and read
//! back as `Missing`. Empty text (an empty joined list) is written the same
//! way, so it also reads back as `Missing`.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};

use crate::clean::{coerce_types, ColumnType};
use crate::error::PipelineResult;
use crate::table::{Column, Table};
use crate::types::Cell;

/// Writes a table to a CSV file.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `table`, creating parent directories. Returns the row count.
    pub fn write(&self, table: &Table) -> PipelineResult<usize> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::File::create(&self.path)?;
        write_csv(table, file)?;
        tracing::info!(
            path = %self.path.display(),
            rows = table.row_count(),
            "csv written"
        );
        Ok(table.row_count())
    }
}

/// Write `table` as CSV to any writer.
pub fn write_csv<W: Write>(table: &Table, writer: W) -> PipelineResult<()> {
    let mut out = WriterBuilder::new()
        .quote_style(QuoteStyle::NonNumeric)
        .from_writer(writer);

    out.write_record(table.column_names())?;
    for row in table.rows() {
        out.write_record(row.iter().map(|cell| cell.render().unwrap_or_default()))?;
    }
    out.flush()?;
    Ok(())
}

/// Read a CSV file back into a table, coercing the declared columns.
///
/// Every empty field becomes `Missing`; the file cannot tell a missing cell
/// from empty text.
pub fn read_csv(path: &Path, types: &BTreeMap<String, ColumnType>) -> PipelineResult<Table> {
    let file = std::fs::File::open(path)?;
    read_csv_from(file, types)
}

pub fn read_csv_from<R: Read>(reader: R, types: &BTreeMap<String, ColumnType>) -> PipelineResult<Table> {
    let mut input = ReaderBuilder::new().has_headers(true).from_reader(reader);

    let mut columns: Vec<Column> = input
        .headers()?
        .iter()
        .map(|name| Column::new(name, Vec::new()))
        .collect();

    for record in input.records() {
        let record = record?;
        for (column, field) in columns.iter_mut().zip(record.iter()) {
            column.values.push(if field.is_empty() {
                Cell::Missing
            } else {
                Cell::Text(field.to_string())
            });
        }
    }

    Ok(coerce_types(Table::new(columns)?, types))
}

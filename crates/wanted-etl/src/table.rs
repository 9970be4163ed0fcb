//! Column-oriented table and the assembler that builds it from records.

use serde::Serialize;

use crate::error::{PipelineError, PipelineResult};
use crate::types::{Cell, NormalizedRecord};

/// A named column of cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|c| c.is_missing()).count()
    }
}

/// Column-oriented table. All columns have the same length.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Build a table, rejecting columns of unequal length.
    pub fn new(columns: Vec<Column>) -> PipelineResult<Self> {
        if let Some(first) = columns.first() {
            let expected = first.values.len();
            if let Some(bad) = columns.iter().find(|c| c.values.len() != expected) {
                return Err(PipelineError::RaggedColumn {
                    column: bad.name.clone(),
                    expected,
                    found: bad.values.len(),
                });
            }
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Cells of row `index` in column order.
    pub fn row(&self, index: usize) -> Option<Vec<&Cell>> {
        if index >= self.row_count() {
            return None;
        }
        Some(self.columns.iter().map(|c| &c.values[index]).collect())
    }

    pub fn rows(&self) -> impl Iterator<Item = Vec<&Cell>> + '_ {
        (0..self.row_count()).filter_map(move |i| self.row(i))
    }

    /// Apply `f` to every cell of the named column. Unknown names are
    /// ignored. Used by the cleaner on its own copy.
    pub(crate) fn map_column<F>(&mut self, name: &str, mut f: F)
    where
        F: FnMut(Cell) -> Cell,
    {
        if let Some(col) = self.columns.iter_mut().find(|c| c.name == name) {
            col.values = std::mem::take(&mut col.values).into_iter().map(&mut f).collect();
        }
    }

    pub(crate) fn map_all<F>(&mut self, mut f: F)
    where
        F: FnMut(Cell) -> Cell,
    {
        for col in &mut self.columns {
            col.values = std::mem::take(&mut col.values).into_iter().map(&mut f).collect();
        }
    }
}

/// Pivot records into one vector per column, preserving record order.
/// A record lacking a column contributes `Missing`.
pub fn pivot_columns<S: AsRef<str>>(records: &[NormalizedRecord], columns: &[S]) -> Vec<Vec<Cell>> {
    columns
        .iter()
        .map(|name| {
            records
                .iter()
                .map(|r| r.get(name.as_ref()).cloned().unwrap_or_default())
                .collect()
        })
        .collect()
}

/// Pair column names with pivoted data. The counts must agree.
pub fn zip_columns<S: AsRef<str>>(names: &[S], data: Vec<Vec<Cell>>) -> PipelineResult<Vec<Column>> {
    if names.len() != data.len() {
        return Err(PipelineError::SchemaMismatch {
            declared: names.len(),
            produced: data.len(),
        });
    }
    Ok(names
        .iter()
        .zip(data)
        .map(|(name, values)| Column::new(name.as_ref(), values))
        .collect())
}

/// Pivot, validate and materialize records into a [`Table`].
pub fn assemble<S: AsRef<str>>(records: &[NormalizedRecord], columns: &[S]) -> PipelineResult<Table> {
    let data = pivot_columns(records, columns);
    let columns = zip_columns(columns, data)?;
    let table = Table::new(columns)?;
    tracing::debug!(
        rows = table.row_count(),
        columns = table.column_count(),
        "table assembled"
    );
    Ok(table)
}

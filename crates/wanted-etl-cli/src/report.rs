//! Run summaries and table reports printed by the CLI.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use wanted_etl::{PipelineRun, Table};

/// Widest cell printed by `preview`.
const PREVIEW_CELL_WIDTH: usize = 24;

/// Outcome of a pipeline subcommand, printed with `--json`.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pages: usize,
    pub records: usize,
    pub complete: bool,
    pub attempts: u32,
    pub sessions: u32,
    pub failures: Vec<String>,
    pub output: Option<String>,
}

impl RunSummary {
    pub fn new(run: &PipelineRun, started_at: DateTime<Utc>, output: Option<String>) -> Self {
        Self {
            run_id: run.run_id.clone(),
            started_at,
            finished_at: Utc::now(),
            pages: run.fetch.pages.len(),
            records: run.record_count,
            complete: run.fetch.complete,
            attempts: run.fetch.attempts_used,
            sessions: run.fetch.sessions_opened,
            failures: run.fetch.failures.iter().map(|e| e.to_string()).collect(),
            output,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ColumnReport {
    pub name: String,
    pub missing: usize,
}

/// Shape of a CSV file read back from disk.
#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub path: String,
    pub rows: usize,
    pub columns: Vec<ColumnReport>,
}

impl InspectReport {
    pub fn from_table(path: &str, table: &Table) -> Self {
        Self {
            path: path.to_string(),
            rows: table.row_count(),
            columns: table
                .columns()
                .iter()
                .map(|c| ColumnReport {
                    name: c.name.clone(),
                    missing: c.missing_count(),
                })
                .collect(),
        }
    }
}

impl fmt::Display for InspectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {} rows, {} columns", self.path, self.rows, self.columns.len())?;
        let width = self.columns.iter().map(|c| c.name.len()).max().unwrap_or(0);
        for column in &self.columns {
            writeln!(f, "  {:<width$}  {} missing", column.name, column.missing)?;
        }
        Ok(())
    }
}

/// First `rows` rows as an aligned text grid. Missing cells print as `NaN`.
pub fn render_preview(table: &Table, rows: usize) -> String {
    let header: Vec<String> = table.column_names().iter().map(|n| clip(n)).collect();
    let body: Vec<Vec<String>> = table
        .rows()
        .take(rows)
        .map(|row| {
            row.iter()
                .map(|cell| clip(&cell.render().unwrap_or_else(|| "NaN".to_string())))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = header
        .iter()
        .enumerate()
        .map(|(i, h)| {
            body.iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!("{c:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = String::new();
    out.push_str(&line(&header));
    out.push('\n');
    for row in &body {
        out.push_str(&line(row));
        out.push('\n');
    }
    out
}

fn clip(text: &str) -> String {
    let flat = text.replace(['\r', '\n'], " ");
    if flat.chars().count() <= PREVIEW_CELL_WIDTH {
        flat
    } else {
        let mut cut: String = flat.chars().take(PREVIEW_CELL_WIDTH - 3).collect();
        cut.push_str("...");
        cut
    }
}

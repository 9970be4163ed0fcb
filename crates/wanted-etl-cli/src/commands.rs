//! Subcommand handlers.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Args;

use wanted_etl::fetch::{DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_PAGES, DEFAULT_PAGES_PER_SESSION};
use wanted_etl::sink::{read_csv, CsvSink, SqliteSink, WriteMode};
use wanted_etl::{
    progress, resolve_source_path, FetchBudget, Pipeline, PipelineRun, PipelineSettings,
    RetryPolicy, SourceConfig,
};

use crate::progress_bar;
use crate::report::{render_preview, InspectReport, RunSummary};

/// How results are presented.
#[derive(Debug, Clone, Copy)]
pub struct OutputMode {
    pub json: bool,
    pub progress: bool,
}

/// Source and fetch knobs shared by every pipeline subcommand.
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Source config JSON (url and headers). Also reads WANTED_ETL_SOURCE.
    #[arg(short, long)]
    pub source: Option<String>,

    /// Highest page number to fetch.
    #[arg(long, default_value_t = DEFAULT_MAX_PAGES)]
    pub max_pages: u32,

    /// Pages served by one session before it is replaced.
    #[arg(long, default_value_t = DEFAULT_PAGES_PER_SESSION)]
    pub pages_per_session: u32,

    /// Outer attempts; each resumes at the first missing page.
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Retries per request for transient statuses.
    #[arg(long, default_value_t = 5)]
    pub retries: u32,

    /// Exponential backoff factor in seconds.
    #[arg(long, default_value_t = 2.0)]
    pub backoff_factor: f64,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

impl PipelineArgs {
    pub fn settings(&self) -> anyhow::Result<PipelineSettings> {
        anyhow::ensure!(
            self.backoff_factor.is_finite() && self.backoff_factor >= 0.0,
            "--backoff-factor must be a non-negative number"
        );
        anyhow::ensure!(self.timeout_secs > 0, "--timeout-secs must be at least 1");
        let budget = FetchBudget::new(self.max_pages, self.pages_per_session, self.max_attempts)?;
        Ok(PipelineSettings {
            budget,
            retry: RetryPolicy {
                total: self.retries,
                backoff_factor: self.backoff_factor,
                ..RetryPolicy::default()
            },
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }

    fn load_source(&self) -> anyhow::Result<SourceConfig> {
        load_source(self.source.as_deref())
    }
}

fn load_source(explicit: Option<&str>) -> anyhow::Result<SourceConfig> {
    let path = resolve_source_path(explicit);
    SourceConfig::load(&path).with_context(|| format!("loading source config {}", path.display()))
}

/// Run the pipeline, rendering progress events while it works.
async fn execute(args: &PipelineArgs, mode: OutputMode) -> anyhow::Result<(SourceConfig, PipelineRun)> {
    let source = args.load_source()?;
    let settings = args.settings()?;

    let (tx, rx) = progress::channel();
    let bar = mode
        .progress
        .then(|| tokio::spawn(progress_bar::render(rx, settings.budget.max_pages())));

    let pipeline = Pipeline::from_config(&source, &settings, Some(tx))?;
    let result = pipeline.run().await;
    // Closes the channel so the renderer exits.
    drop(pipeline);
    if let Some(handle) = bar {
        let _ = handle.await;
    }

    let run = result.context("pipeline failed")?;
    if !run.fetch.complete {
        tracing::warn!(
            pages = run.fetch.pages.len(),
            max_pages = settings.budget.max_pages(),
            "fetch incomplete, continuing with partial data"
        );
    }
    Ok((source, run))
}

pub async fn fetch(args: &PipelineArgs, output: &str, mode: OutputMode) -> anyhow::Result<()> {
    let started_at = Utc::now();
    let (_, run) = execute(args, mode).await?;

    let written = CsvSink::new(output)
        .write(&run.table)
        .with_context(|| format!("writing {output}"))?;

    let summary = RunSummary::new(&run, started_at, Some(output.to_string()));
    if mode.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Wrote {written} rows to {output}");
        print_fetch_status(&summary);
    }
    Ok(())
}

pub async fn load(
    args: &PipelineArgs,
    database: &str,
    table: &str,
    replace: bool,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let started_at = Utc::now();
    let (source, run) = execute(args, mode).await?;

    let write_mode = if replace {
        WriteMode::Replace
    } else {
        WriteMode::Append
    };
    let mut sink = SqliteSink::open(Path::new(database))
        .with_context(|| format!("opening database {database}"))?;
    let written = sink
        .write(table, &run.table, &source.cleaning_policy().column_types, write_mode)
        .with_context(|| format!("writing table {table}"))?;

    let summary = RunSummary::new(&run, started_at, Some(format!("{database}#{table}")));
    if mode.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Wrote {written} rows to {database} (table {table})");
        print_fetch_status(&summary);
    }
    Ok(())
}

pub async fn preview(args: &PipelineArgs, rows: usize, mode: OutputMode) -> anyhow::Result<()> {
    let (_, run) = execute(args, mode).await?;

    if mode.json {
        let head: Vec<serde_json::Value> = run
            .table
            .rows()
            .take(rows)
            .map(|row| {
                serde_json::Value::Object(
                    run.table
                        .column_names()
                        .into_iter()
                        .zip(row)
                        .map(|(name, cell)| (name.to_string(), serde_json::json!(cell)))
                        .collect(),
                )
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&head)?);
    } else {
        print!("{}", render_preview(&run.table, rows));
        println!("[{} rows x {} columns]", run.table.row_count(), run.table.column_count());
    }
    Ok(())
}

pub fn inspect(path: &str, source: Option<&str>, mode: OutputMode) -> anyhow::Result<()> {
    let report = inspect_report(path, source)?;

    if mode.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}

fn inspect_report(path: &str, source: Option<&str>) -> anyhow::Result<InspectReport> {
    // Without a source config only the default column types apply.
    let types = match source {
        Some(explicit) => load_source(Some(explicit))?.cleaning_policy().column_types,
        None => wanted_etl::CleaningPolicy::wanted_persons().column_types,
    };
    let table = read_csv(Path::new(path), &types).with_context(|| format!("reading {path}"))?;
    Ok(InspectReport::from_table(path, &table))
}

fn print_fetch_status(summary: &RunSummary) {
    println!(
        "Fetched {} pages, {} records in {} attempt(s){}",
        summary.pages,
        summary.records,
        summary.attempts,
        if summary.complete { "" } else { " (incomplete)" }
    );
    for failure in &summary.failures {
        println!("  failed: {failure}");
    }
}

//! End-to-end pipeline: fetch, normalize, assemble, clean.

use std::time::Duration;

use crate::clean::{clean, CleaningPolicy};
use crate::config::SourceConfig;
use crate::error::PipelineResult;
use crate::fetch::{FetchBudget, FetchOutcome, PageFetcher};
use crate::http::{RetryPolicy, SessionFactory};
use crate::normalize::{normalize_pages, ExtractionPolicy};
use crate::progress::ProgressSender;
use crate::table::{assemble, Table};
use crate::types::Page;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Knobs not carried by the source config.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub budget: FetchBudget,
    pub retry: RetryPolicy,
    pub timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            budget: FetchBudget::default(),
            retry: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Output of one run.
#[derive(Debug)]
pub struct PipelineRun {
    pub run_id: String,
    pub fetch: FetchOutcome,
    pub record_count: usize,
    /// Cleaned table, ready for a sink.
    pub table: Table,
}

pub struct Pipeline {
    fetcher: PageFetcher,
    extraction: ExtractionPolicy,
    cleaning: CleaningPolicy,
}

impl Pipeline {
    pub fn new(fetcher: PageFetcher, extraction: ExtractionPolicy, cleaning: CleaningPolicy) -> Self {
        Self {
            fetcher,
            extraction,
            cleaning,
        }
    }

    /// Build every stage from a source config.
    pub fn from_config(
        source: &SourceConfig,
        settings: &PipelineSettings,
        progress: Option<ProgressSender>,
    ) -> PipelineResult<Self> {
        let factory = SessionFactory::new(&source.headers, settings.retry.clone(), settings.timeout)?;
        let mut fetcher = PageFetcher::new(&source.url, factory, settings.budget);
        if let Some(tx) = progress {
            fetcher = fetcher.with_progress(tx);
        }
        Ok(Self::new(
            fetcher,
            source.extraction_policy()?,
            source.cleaning_policy(),
        ))
    }

    pub fn run_id(&self) -> &str {
        self.fetcher.run_id()
    }

    pub fn schema(&self) -> Vec<String> {
        self.extraction.schema()
    }

    pub async fn run(&self) -> PipelineResult<PipelineRun> {
        let fetch = self.fetcher.fetch_all().await?;
        let (table, record_count) = process_pages(&fetch.pages, &self.extraction, &self.cleaning)?;
        tracing::info!(
            run_id = self.run_id(),
            pages = fetch.pages.len(),
            records = record_count,
            complete = fetch.complete,
            "pipeline finished"
        );
        Ok(PipelineRun {
            run_id: self.run_id().to_string(),
            fetch,
            record_count,
            table,
        })
    }
}

/// Normalize, assemble and clean already-fetched pages. Returns the cleaned
/// table and the record count.
pub fn process_pages(
    pages: &[Page],
    extraction: &ExtractionPolicy,
    cleaning: &CleaningPolicy,
) -> PipelineResult<(Table, usize)> {
    let records = normalize_pages(pages, extraction)?;
    let table = assemble(&records, &extraction.schema())?;
    Ok((clean(&table, cleaning), records.len()))
}

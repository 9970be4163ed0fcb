//! wanted-etl: paginated fetch, normalize and clean pipeline for a public
//! wanted-persons JSON API.
//!
//! Stages run strictly in sequence, each returning a fresh value:
//! [`http`] sessions feed the [`fetch`] loop, whose pages go through
//! [`normalize`], [`table`] and [`clean`] before a [`sink`] persists them.

pub mod clean;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod sink;
pub mod table;
pub mod types;

pub use clean::{clean, CleaningPolicy, ColumnType};
pub use config::{resolve_source_path, SourceConfig};
pub use error::{PipelineError, PipelineResult};
pub use fetch::{FetchBudget, FetchOutcome, PageFetcher};
pub use http::{FetchError, RetryPolicy, Session, SessionFactory, SessionSource};
pub use normalize::{normalize_pages, ExtractionPolicy, FieldKind, FieldSpec};
pub use pipeline::{process_pages, Pipeline, PipelineRun, PipelineSettings};
pub use table::{assemble, Column, Table};
pub use types::{Cell, NormalizedRecord, Page};

//! Source configuration loading and resolution.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::clean::{CleaningPolicy, ColumnType};
use crate::error::{PipelineError, PipelineResult};
use crate::normalize::{ExtractionPolicy, FieldSpec};

/// Environment variable naming the source config file.
pub const SOURCE_ENV: &str = "WANTED_ETL_SOURCE";

pub const DEFAULT_SOURCE_PATH: &str = "request_data.json";

/// Static description of the paginated source. `url` and `headers` are
/// required; the rest selects extraction and cleaning policy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceConfig {
    pub url: String,
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub fields: Option<Vec<FieldSpec>>,
    #[serde(default)]
    pub column_types: BTreeMap<String, ColumnType>,
}

impl SourceConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = Self::parse(&text)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), url = %config.url, "source config loaded");
        Ok(config)
    }

    /// Parse and validate config JSON.
    pub fn parse(text: &str) -> PipelineResult<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> PipelineResult<()> {
        let url = url::Url::parse(&self.url)
            .map_err(|e| PipelineError::Config(format!("invalid url '{}': {e}", self.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PipelineError::Config(format!(
                "unsupported url scheme '{}'",
                url.scheme()
            )));
        }
        Ok(())
    }

    /// The configured field list, or the wanted-persons map.
    pub fn extraction_policy(&self) -> PipelineResult<ExtractionPolicy> {
        match &self.fields {
            Some(fields) => ExtractionPolicy::new(fields.clone()),
            None => Ok(ExtractionPolicy::wanted_persons()),
        }
    }

    pub fn cleaning_policy(&self) -> CleaningPolicy {
        CleaningPolicy::wanted_persons().with_column_types(self.column_types.clone())
    }
}

/// Resolve the source config path: explicit flag, then env var, then the
/// working-directory default.
pub fn resolve_source_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var(SOURCE_ENV) {
        if !env_path.trim().is_empty() {
            return PathBuf::from(env_path);
        }
    }

    PathBuf::from(DEFAULT_SOURCE_PATH)
}

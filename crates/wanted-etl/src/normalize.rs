//! Record normalizer: maps variably-shaped items onto a fixed record shape.
//!
//! An [`ExtractionPolicy`] is an ordered list of [`FieldSpec`]s selected once
//! when the pipeline is built. Each spec names the output column, the source
//! key it reads, and whether an absent value defaults to `Missing` (scalar)
//! or to an empty list.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PipelineError, PipelineResult};
use crate::types::{Cell, NormalizedRecord, Page};

/// Key every page payload must carry.
pub const ITEMS_KEY: &str = "items";

/// How an absent source value is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Scalar,
    List,
}

/// One output column and where its value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub column: String,
    /// Source key; defaults to the column name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn scalar(column: &str) -> Self {
        Self {
            column: column.to_string(),
            source: None,
            kind: FieldKind::Scalar,
        }
    }

    pub fn list(column: &str) -> Self {
        Self {
            kind: FieldKind::List,
            ..Self::scalar(column)
        }
    }

    /// Read the value from `source` instead of the column name.
    pub fn from_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    pub fn source_key(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.column)
    }

    fn extract(&self, item: &Map<String, Value>) -> Cell {
        let value = item.get(self.source_key());
        match self.kind {
            FieldKind::Scalar => value.map(Cell::from_json).unwrap_or_default(),
            FieldKind::List => match value.map(Cell::from_json) {
                Some(cell) if !is_empty_value(&cell) => cell,
                _ => Cell::List(Vec::new()),
            },
        }
    }
}

/// Values a list field treats as "no list": null, `""`, `false` and zero.
fn is_empty_value(cell: &Cell) -> bool {
    match cell {
        Cell::Missing => true,
        Cell::Bool(b) => !b,
        Cell::Integer(i) => *i == 0,
        Cell::Float(f) => *f == 0.0,
        Cell::Text(s) => s.is_empty(),
        Cell::List(_) => false,
    }
}

/// Ordered field-extraction map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionPolicy {
    fields: Vec<FieldSpec>,
}

impl ExtractionPolicy {
    /// Build a policy; column names must be unique and non-empty.
    pub fn new(fields: Vec<FieldSpec>) -> PipelineResult<Self> {
        if fields.is_empty() {
            return Err(PipelineError::Config(
                "extraction policy needs at least one field".into(),
            ));
        }
        let mut seen = HashSet::new();
        for field in &fields {
            if field.column.trim().is_empty() {
                return Err(PipelineError::Config("empty column name".into()));
            }
            if !seen.insert(field.column.as_str()) {
                return Err(PipelineError::Config(format!(
                    "duplicate column '{}'",
                    field.column
                )));
            }
        }
        Ok(Self { fields })
    }

    /// The fixed wanted-persons record shape.
    pub fn wanted_persons() -> Self {
        Self {
            fields: vec![
                FieldSpec::scalar("name").from_source("title"),
                FieldSpec::scalar("age_max"),
                FieldSpec::scalar("age_min"),
                FieldSpec::scalar("sex"),
                FieldSpec::scalar("warning_message"),
                FieldSpec::scalar("race").from_source("race_raw"),
                FieldSpec::scalar("place_of_birth"),
                FieldSpec::scalar("details"),
                FieldSpec::list("occupations"),
                FieldSpec::list("locations"),
                FieldSpec::list("subjects"),
                FieldSpec::list("aliases"),
                FieldSpec::scalar("reward_text"),
                FieldSpec::scalar("scars_and_marks"),
                FieldSpec::scalar("caution"),
            ],
        }
    }

    /// Caller-supplied scalar fields, each read from the key of the same name.
    pub fn from_fields<S: AsRef<str>>(names: &[S]) -> PipelineResult<Self> {
        Self::new(
            names
                .iter()
                .map(|n| FieldSpec::scalar(n.as_ref()))
                .collect(),
        )
    }

    /// A single scalar field.
    pub fn single(name: &str) -> Self {
        Self {
            fields: vec![FieldSpec::scalar(name)],
        }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// The canonical column-name sequence.
    pub fn schema(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.column.clone()).collect()
    }

    /// Normalize one raw item. Non-object items yield an all-default record.
    pub fn extract(&self, item: &Value) -> NormalizedRecord {
        let empty = Map::new();
        let obj = item.as_object().unwrap_or(&empty);
        self.fields
            .iter()
            .map(|f| (f.column.clone(), f.extract(obj)))
            .collect()
    }
}

impl Default for ExtractionPolicy {
    fn default() -> Self {
        Self::wanted_persons()
    }
}

/// Flatten every page's `items` into normalized records, page order then
/// item order.
pub fn normalize_pages(
    pages: &[Page],
    policy: &ExtractionPolicy,
) -> PipelineResult<Vec<NormalizedRecord>> {
    let mut records = Vec::new();
    for page in pages {
        let items = page_items(page)?;
        records.extend(items.iter().map(|item| policy.extract(item)));
        tracing::debug!(page = page.number, items = items.len(), "page normalized");
    }
    Ok(records)
}

fn page_items(page: &Page) -> PipelineResult<&Vec<Value>> {
    let items = page
        .payload
        .as_object()
        .and_then(|obj| obj.get(ITEMS_KEY))
        .ok_or_else(|| PipelineError::MissingKey {
            page: page.number,
            key: ITEMS_KEY.to_string(),
            available: page.keys(),
        })?;

    items.as_array().ok_or_else(|| PipelineError::Shape {
        page: page.number,
        message: format!("'{ITEMS_KEY}' is not a list"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wanted_schema_order() {
        let schema = ExtractionPolicy::wanted_persons().schema();
        assert_eq!(schema.len(), 15);
        assert_eq!(schema[0], "name");
        assert_eq!(schema[5], "race");
        assert_eq!(schema[14], "caution");
    }

    #[test]
    fn test_extract_all_keys_present_with_defaults() {
        let policy = ExtractionPolicy::wanted_persons();
        let record = policy.extract(&json!({}));
        assert_eq!(record.len(), 15);
        for column in policy.schema() {
            assert!(record.contains(&column), "missing {column}");
        }
        assert_eq!(record.get("name"), Some(&Cell::Missing));
        assert_eq!(record.get("occupations"), Some(&Cell::List(vec![])));
        assert_eq!(record.get("aliases"), Some(&Cell::List(vec![])));
    }

    #[test]
    fn test_extract_renamed_sources() {
        let record = ExtractionPolicy::wanted_persons()
            .extract(&json!({"title": "John Doe", "race_raw": "White", "race": "white"}));
        assert_eq!(record.get("name"), Some(&Cell::from("John Doe")));
        assert_eq!(record.get("race"), Some(&Cell::from("White")));
    }

    #[test]
    fn test_null_list_becomes_empty() {
        let record = ExtractionPolicy::wanted_persons()
            .extract(&json!({"subjects": null, "aliases": ["Johnny"]}));
        assert_eq!(record.get("subjects"), Some(&Cell::List(vec![])));
        assert_eq!(
            record.get("aliases"),
            Some(&Cell::List(vec![Cell::from("Johnny")]))
        );
    }

    #[test]
    fn test_falsy_list_values_become_empty() {
        let record = ExtractionPolicy::wanted_persons().extract(&json!({
            "aliases": "",
            "subjects": false,
            "locations": 0,
            "occupations": "Driver"
        }));
        for column in ["aliases", "subjects", "locations"] {
            assert_eq!(record.get(column), Some(&Cell::List(vec![])), "{column}");
        }
        assert_eq!(record.get("occupations"), Some(&Cell::from("Driver")));
        // Scalar fields keep empty text as-is.
        let record = ExtractionPolicy::wanted_persons().extract(&json!({"sex": ""}));
        assert_eq!(record.get("sex"), Some(&Cell::from("")));
    }

    #[test]
    fn test_non_object_item_defaults() {
        let record = ExtractionPolicy::wanted_persons().extract(&json!("garbage"));
        assert_eq!(record.len(), 15);
        assert_eq!(record.get("age_max"), Some(&Cell::Missing));
    }

    #[test]
    fn test_missing_items_reports_keys() {
        let pages = vec![Page::new(4, json!({"total": 0, "page": 4}))];
        let err = normalize_pages(&pages, &ExtractionPolicy::default()).unwrap_err();
        match err {
            PipelineError::MissingKey {
                page,
                key,
                available,
            } => {
                assert_eq!(page, 4);
                assert_eq!(key, "items");
                assert_eq!(available, vec!["page", "total"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_object_payload_is_missing_key() {
        let pages = vec![Page::new(1, json!([1, 2]))];
        let err = normalize_pages(&pages, &ExtractionPolicy::default()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingKey { available, .. } if available.is_empty()));
    }

    #[test]
    fn test_items_not_a_list() {
        let pages = vec![Page::new(2, json!({"items": {"a": 1}}))];
        let err = normalize_pages(&pages, &ExtractionPolicy::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Shape { page: 2, .. }));
    }

    #[test]
    fn test_order_spans_pages() {
        let pages = vec![
            Page::new(1, json!({"items": [{"title": "a"}, {"title": "b"}]})),
            Page::new(2, json!({"items": []})),
            Page::new(3, json!({"items": [{"title": "c"}]})),
        ];
        let records = normalize_pages(&pages, &ExtractionPolicy::default()).unwrap();
        let names: Vec<_> = records
            .iter()
            .map(|r| r.get("name").and_then(Cell::as_text).unwrap_or_default().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_policy_rejects_duplicates() {
        let err = ExtractionPolicy::from_fields(&["title", "title"]).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(ExtractionPolicy::new(vec![]).is_err());
    }

    #[test]
    fn test_from_fields_and_single() {
        let policy = ExtractionPolicy::from_fields(&["title", "age_range"]).unwrap();
        let record = policy.extract(&json!({"title": "x", "age_range": "20-30", "sex": "Male"}));
        assert_eq!(record.len(), 2);
        assert!(!record.contains("sex"));

        let single = ExtractionPolicy::single("title");
        assert_eq!(single.schema(), vec!["title"]);
    }

    #[test]
    fn test_field_spec_deserialize_defaults() {
        let spec: FieldSpec = serde_json::from_value(json!({"column": "name", "source": "title"})).unwrap();
        assert_eq!(spec.kind, FieldKind::Scalar);
        assert_eq!(spec.source_key(), "title");

        let spec: FieldSpec = serde_json::from_value(json!({"column": "aliases", "kind": "list"})).unwrap();
        assert_eq!(spec, FieldSpec::list("aliases"));
    }
}

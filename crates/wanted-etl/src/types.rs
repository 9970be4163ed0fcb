//! Core data types shared by every pipeline stage.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One decoded page of the paginated source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number the payload was requested with.
    pub number: u32,
    pub payload: Value,
}

impl Page {
    pub fn new(number: u32, payload: Value) -> Self {
        Self { number, payload }
    }

    /// Top-level keys of the payload, sorted. Empty when the payload is not
    /// a JSON object.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = match &self.payload {
            Value::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        };
        keys.sort();
        keys
    }
}

/// A single table cell.
///
/// `Missing` is the one missing-value marker used across the pipeline: JSON
/// `null`, absent fields, the `"Null"` sentinel and failed numeric coercions
/// all end up here.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum Cell {
    #[default]
    Missing,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<Cell>),
}

impl Cell {
    /// Convert a loosely-typed JSON value as delivered by the source.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Missing,
            Value::Bool(b) => Cell::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Cell::Integer(i),
                None => Cell::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Cell::Text(s.clone()),
            Value::Array(items) => Cell::List(items.iter().map(Cell::from_json).collect()),
            Value::Object(_) => Cell::Text(value.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Render the cell as text, `None` for a missing cell. Lists are joined
    /// with `", "`, skipping missing elements.
    pub fn render(&self) -> Option<String> {
        match self {
            Cell::Missing => None,
            Cell::Bool(b) => Some(b.to_string()),
            Cell::Integer(i) => Some(i.to_string()),
            Cell::Float(f) => Some(f.to_string()),
            Cell::Text(s) => Some(s.clone()),
            Cell::List(items) => Some(
                items
                    .iter()
                    .filter_map(Cell::render)
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.render() {
            Some(s) => f.write_str(&s),
            None => f.write_str("<missing>"),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<i64> for Cell {
    fn from(i: i64) -> Self {
        Cell::Integer(i)
    }
}

impl From<f64> for Cell {
    fn from(f: f64) -> Self {
        Cell::Float(f)
    }
}

/// A record with exactly the columns of an extraction policy.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct NormalizedRecord {
    fields: HashMap<String, Cell>,
}

impl NormalizedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Cell) {
        self.fields.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.fields.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.fields.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

impl FromIterator<(String, Cell)> for NormalizedRecord {
    fn from_iter<I: IntoIterator<Item = (String, Cell)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

//! Field cleaner: list joining, sentinel replacement, markup stripping and
//! declared column-type coercion.
//!
//! Every step takes a table by value and returns the cleaned table; [`clean`]
//! works on a copy, leaving its input untouched. Cleaning a cleaned table
//! changes nothing. Coercion never fails: values that cannot be represented
//! in the declared type become `Missing`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::table::Table;
use crate::types::Cell;

/// Source stand-in for a missing value.
pub const DEFAULT_SENTINEL: &str = "Null";

pub const DEFAULT_LIST_SEPARATOR: &str = ", ";

/// Markup fragments removed from free-text columns.
pub const DEFAULT_STRIP_TOKENS: [&str; 10] = [
    "<p>", "</p>", "<ul>", "</ul>", "\r", "\n", "<li>", "</li>", "<a>", "</a>",
];

/// Target type of a column after cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    #[serde(rename = "integer", alias = "nullable_integer")]
    NullableInteger,
    #[serde(rename = "float", alias = "nullable_float")]
    NullableFloat,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::NullableInteger => write!(f, "integer"),
            Self::NullableFloat => write!(f, "float"),
        }
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "str" | "string" => Ok(Self::Text),
            "integer" | "int" | "nullable_integer" => Ok(Self::NullableInteger),
            "float" | "nullable_float" => Ok(Self::NullableFloat),
            other => Err(format!(
                "unknown column type '{other}' (expected text, integer or float)"
            )),
        }
    }
}

/// Declared cleaning behavior, fixed at pipeline construction.
#[derive(Debug, Clone, PartialEq)]
pub struct CleaningPolicy {
    /// Cells equal to this text become `Missing`; `None` disables the step.
    pub sentinel: Option<String>,
    pub list_columns: Vec<String>,
    pub list_separator: String,
    pub strip_columns: Vec<String>,
    pub strip_tokens: Vec<String>,
    pub column_types: BTreeMap<String, ColumnType>,
}

impl CleaningPolicy {
    /// Cleaning rules for the wanted-persons table.
    pub fn wanted_persons() -> Self {
        Self {
            sentinel: Some(DEFAULT_SENTINEL.to_string()),
            list_columns: to_strings(&["details", "occupations", "locations", "subjects", "aliases"]),
            list_separator: DEFAULT_LIST_SEPARATOR.to_string(),
            strip_columns: to_strings(&["details", "reward_text", "caution"]),
            strip_tokens: to_strings(&DEFAULT_STRIP_TOKENS),
            column_types: [
                ("age_max".to_string(), ColumnType::NullableInteger),
                ("age_min".to_string(), ColumnType::NullableInteger),
            ]
            .into_iter()
            .collect(),
        }
    }

    /// Override or add declared column types.
    pub fn with_column_types(mut self, types: BTreeMap<String, ColumnType>) -> Self {
        self.column_types.extend(types);
        self
    }

    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.column_types.get(column).copied()
    }
}

impl Default for CleaningPolicy {
    fn default() -> Self {
        Self::wanted_persons()
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Run every cleaning step on a copy of `table`.
pub fn clean(table: &Table, policy: &CleaningPolicy) -> Table {
    let mut out = join_lists(table.clone(), &policy.list_columns, &policy.list_separator);
    // Strip before the sentinel check so wrapped sentinels (`<p>Null</p>`)
    // are caught on the first pass.
    out = strip_markup(out, &policy.strip_columns, &policy.strip_tokens);
    if let Some(sentinel) = &policy.sentinel {
        out = replace_sentinel(out, sentinel);
    }
    out = coerce_types(out, &policy.column_types);
    tracing::debug!(rows = out.row_count(), "table cleaned");
    out
}

/// Join list cells of `columns` into one text cell.
pub fn join_lists(mut table: Table, columns: &[String], separator: &str) -> Table {
    for column in columns {
        table.map_column(column, |cell| match cell {
            Cell::List(items) => Cell::Text(join_cells(&items, separator)),
            other => other,
        });
    }
    table
}

fn join_cells(items: &[Cell], separator: &str) -> String {
    items
        .iter()
        .filter_map(Cell::render)
        .collect::<Vec<_>>()
        .join(separator)
}

/// Replace text cells equal to `sentinel` with `Missing`, in every column.
pub fn replace_sentinel(mut table: Table, sentinel: &str) -> Table {
    table.map_all(|cell| match cell {
        Cell::Text(ref s) if s == sentinel => Cell::Missing,
        other => other,
    });
    table
}

/// Remove every token from the text cells of `columns`.
pub fn strip_markup(mut table: Table, columns: &[String], tokens: &[String]) -> Table {
    for column in columns {
        table.map_column(column, |cell| match cell {
            Cell::Text(s) => Cell::Text(strip_tokens(&s, tokens)),
            other => other,
        });
    }
    table
}

/// Removing one token can splice another together (`<<p>p>`), so repeat
/// until nothing changes.
fn strip_tokens(text: &str, tokens: &[String]) -> String {
    let mut current = text.to_string();
    loop {
        let next = tokens
            .iter()
            .filter(|t| !t.is_empty())
            .fold(current.clone(), |acc, t| acc.replace(t.as_str(), ""));
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Coerce each declared column to its type.
pub fn coerce_types(mut table: Table, types: &BTreeMap<String, ColumnType>) -> Table {
    for (column, ty) in types {
        let ty = *ty;
        table.map_column(column, |cell| coerce_cell(cell, ty));
    }
    table
}

/// Coerce one cell. Unrepresentable values become `Missing`.
pub fn coerce_cell(cell: Cell, ty: ColumnType) -> Cell {
    match ty {
        ColumnType::NullableInteger => to_integer(&cell).map_or(Cell::Missing, Cell::Integer),
        ColumnType::NullableFloat => to_float(&cell).map_or(Cell::Missing, Cell::Float),
        ColumnType::Text => match cell {
            Cell::Text(s) => Cell::Text(s),
            other => other.render().map_or(Cell::Missing, Cell::Text),
        },
    }
}

/// Parse as a number, then truncate to a whole number.
fn to_integer(cell: &Cell) -> Option<i64> {
    match cell {
        Cell::Integer(i) => Some(*i),
        Cell::Float(f) => truncate(*f),
        Cell::Bool(b) => Some(i64::from(*b)),
        Cell::Text(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(truncate))
        }
        Cell::Missing | Cell::List(_) => None,
    }
}

fn to_float(cell: &Cell) -> Option<f64> {
    let n = match cell {
        Cell::Integer(i) => *i as f64,
        Cell::Float(f) => *f,
        Cell::Bool(b) => f64::from(u8::from(*b)),
        Cell::Text(s) => s.trim().parse::<f64>().ok()?,
        Cell::Missing | Cell::List(_) => return None,
    };
    n.is_finite().then_some(n)
}

fn truncate(n: f64) -> Option<i64> {
    // 2^63 is exactly representable; anything at or past it overflows i64.
    let bound = 2f64.powi(63);
    (n.is_finite() && n >= -bound && n < bound).then(|| n.trunc() as i64)
}

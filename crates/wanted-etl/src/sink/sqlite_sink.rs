//! SQLite table writer.
//!
//! One table per write, no primary key. Column names mirror the table
//! schema; declared column types pick the INTEGER/REAL affinity, everything
//! else is TEXT.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};

use crate::clean::ColumnType;
use crate::error::{PipelineError, PipelineResult};
use crate::table::Table;
use crate::types::Cell;

/// What to do with an existing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    #[default]
    Append,
    /// Drop and recreate the table first.
    Replace,
}

pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Open or create a database file.
    pub fn open(path: &Path) -> PipelineResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "sqlite database opened");
        Ok(Self { conn })
    }

    pub fn in_memory() -> PipelineResult<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Write every row of `table` into `name` inside one transaction.
    /// Returns the number of rows inserted.
    pub fn write(
        &mut self,
        name: &str,
        table: &Table,
        types: &BTreeMap<String, ColumnType>,
        mode: WriteMode,
    ) -> PipelineResult<usize> {
        validate_table_name(name)?;
        if table.column_count() == 0 {
            return Err(PipelineError::Config("cannot store a table without columns".into()));
        }

        let names = table.column_names();
        let table_ident = quote_ident(name);
        let column_defs = names
            .iter()
            .map(|c| format!("{} {}", quote_ident(c), affinity(types.get(*c).copied())))
            .collect::<Vec<_>>()
            .join(", ");
        let column_list = names.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
        let placeholders = (1..=names.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");

        let tx = self.conn.transaction()?;
        if mode == WriteMode::Replace {
            tx.execute(&format!("DROP TABLE IF EXISTS {table_ident}"), [])?;
        }
        tx.execute(
            &format!("CREATE TABLE IF NOT EXISTS {table_ident} ({column_defs})"),
            [],
        )?;

        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {table_ident} ({column_list}) VALUES ({placeholders})"
            ))?;
            for row in table.rows() {
                inserted += stmt.execute(params_from_iter(row.into_iter().map(to_sql)))?;
            }
        }
        tx.commit()?;

        tracing::info!(table = name, rows = inserted, "sqlite rows written");
        Ok(inserted)
    }
}

fn validate_table_name(name: &str) -> PipelineResult<()> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(PipelineError::Config(format!("invalid table name '{name}'")))
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn affinity(ty: Option<ColumnType>) -> &'static str {
    match ty {
        Some(ColumnType::NullableInteger) => "INTEGER",
        Some(ColumnType::NullableFloat) => "REAL",
        Some(ColumnType::Text) | None => "TEXT",
    }
}

fn to_sql(cell: &Cell) -> SqlValue {
    match cell {
        Cell::Missing => SqlValue::Null,
        Cell::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Cell::Integer(i) => SqlValue::Integer(*i),
        Cell::Float(f) => SqlValue::Real(*f),
        Cell::Text(s) => SqlValue::Text(s.clone()),
        Cell::List(_) => cell.render().map_or(SqlValue::Null, SqlValue::Text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn sample() -> Table {
        Table::new(vec![
            Column::new("name", vec![Cell::from("John Doe"), Cell::from("Jane")]),
            Column::new("age_max", vec![Cell::Integer(45), Cell::Missing]),
        ])
        .unwrap()
    }

    fn int_types() -> BTreeMap<String, ColumnType> {
        let mut types = BTreeMap::new();
        types.insert("age_max".to_string(), ColumnType::NullableInteger);
        types
    }

    #[test]
    fn test_write_and_query() {
        let mut sink = SqliteSink::in_memory().unwrap();
        let n = sink
            .write("wanted", &sample(), &int_types(), WriteMode::Append)
            .unwrap();
        assert_eq!(n, 2);

        let (count, nulls): (i64, i64) = sink
            .connection()
            .query_row(
                "SELECT COUNT(*), SUM(age_max IS NULL) FROM wanted",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(nulls, 1);

        let age: i64 = sink
            .connection()
            .query_row("SELECT age_max FROM wanted WHERE name = 'John Doe'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(age, 45);
    }

    #[test]
    fn test_append_then_replace() {
        let mut sink = SqliteSink::in_memory().unwrap();
        sink.write("wanted", &sample(), &int_types(), WriteMode::Append).unwrap();
        sink.write("wanted", &sample(), &int_types(), WriteMode::Append).unwrap();
        let count = |s: &SqliteSink| -> i64 {
            s.connection()
                .query_row("SELECT COUNT(*) FROM wanted", [], |r| r.get(0))
                .unwrap()
        };
        assert_eq!(count(&sink), 4);

        sink.write("wanted", &sample(), &int_types(), WriteMode::Replace).unwrap();
        assert_eq!(count(&sink), 2);
    }

    #[test]
    fn test_rejects_bad_table_name() {
        let mut sink = SqliteSink::in_memory().unwrap();
        for name in ["", "1abc", "drop table; --", "a-b"] {
            assert!(
                sink.write(name, &sample(), &BTreeMap::new(), WriteMode::Append).is_err(),
                "{name} accepted"
            );
        }
    }

    #[test]
    fn test_affinity() {
        assert_eq!(affinity(Some(ColumnType::NullableInteger)), "INTEGER");
        assert_eq!(affinity(Some(ColumnType::NullableFloat)), "REAL");
        assert_eq!(affinity(None), "TEXT");
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}

//! Sinks consuming a cleaned table.

pub mod csv_sink;
pub mod sqlite_sink;

pub use csv_sink::{read_csv, read_csv_from, write_csv, CsvSink};
pub use sqlite_sink::{SqliteSink, WriteMode};

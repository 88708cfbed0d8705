pub mod csv_writer;

pub use csv_writer::{header_line, strip_header, ConsolidatedCsv, CsvAssembler, CsvConfig, SessionBlock};

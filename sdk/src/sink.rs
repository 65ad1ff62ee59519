use std::io::Write;

use crate::{error::SinkError, flatten::Row};

/// Consumer of flattened rows. The header is written once, before any row.
pub trait RowSink {
    fn write_header(&mut self, columns: &[String]) -> Result<(), SinkError>;
    fn write_row(&mut self, row: &[String]) -> Result<(), SinkError>;
    fn flush(&mut self) -> Result<(), SinkError>;
}

/// Writes comma-separated rows with RFC 4180 quoting and `\n` line endings.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvSink<W> {
    pub fn new(inner: W) -> CsvSink<W> {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(inner);
        CsvSink { writer }
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(self) -> Result<W, SinkError> {
        self.writer
            .into_inner()
            .map_err(|err| SinkError::Io(err.into_error()))
    }
}

impl<W: Write> RowSink for CsvSink<W> {
    fn write_header(&mut self, columns: &[String]) -> Result<(), SinkError> {
        self.writer.write_record(columns)?;
        Ok(())
    }

    fn write_row(&mut self, row: &[String]) -> Result<(), SinkError> {
        self.writer.write_record(row)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps everything in memory.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct VecSink {
    pub header: Option<Vec<String>>,
    pub rows:   Vec<Row>,
}

impl VecSink {
    pub fn new() -> VecSink {
        VecSink::default()
    }
}

impl RowSink for VecSink {
    fn write_header(&mut self, columns: &[String]) -> Result<(), SinkError> {
        self.header = Some(columns.to_vec());
        Ok(())
    }

    fn write_row(&mut self, row: &[String]) -> Result<(), SinkError> {
        self.rows.push(row.to_vec());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

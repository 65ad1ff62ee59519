use protoflat_compiler::SchemaError;
use protoflat_schema::DecodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Output error: {0}")]
    Sink(#[from] SinkError),

    /// `record` is the zero-based index of the top-level record that failed.
    #[error("Decode error in record {record}: {source}")]
    Decode { record: usize, source: DecodeError },
}

//! protoflat
//!
//! Converts streams of protocol buffer messages into CSV rows using a `.proto`
//! schema loaded at run time.
//!
//! - [compile_schema] turns `.proto` text into a [Schema]
//! - [StreamPipeline] decodes records and flattens them into rows
//! - [RowSink] receives the header and rows; [CsvSink] writes CSV
//!
//! ```
//! use protoflat::{compile_schema, convert, PipelineOptions, VecSink};
//!
//! let schema = compile_schema("message Point { sint32 x = 1; sint32 y = 2; }").unwrap();
//! let mut sink = VecSink::new();
//! let input: &[u8] = &[0x08, 0x02, 0x10, 0x03, 0x08, 0x01];
//! convert(&schema, &PipelineOptions::default(), input, &mut sink).unwrap();
//!
//! assert_eq!(sink.header, Some(vec!["x".to_owned(), "y".to_owned()]));
//! assert_eq!(sink.rows, vec![vec!["1", "-2"], vec!["-1", ""]]);
//! ```

pub mod error;
pub mod flatten;
mod frames;
pub mod pipeline;
pub mod sink;

pub use error::{PipelineError, SinkError};
pub use flatten::{render_cell, FieldShape, Header, Row, ShapeKind};
pub use pipeline::{convert, PipelineOptions, StreamPipeline};
pub use sink::{CsvSink, RowSink, VecSink};

pub use protoflat_compiler::{compile_schema, compile_schema_file, describe_schema, root_message, SchemaError};
pub use protoflat_schema::{DecodeError, Framing, MessageId, RecordDecoder, Schema, Value, WireError, WireReader};

pub mod schema {
    pub use protoflat_schema::*;
}

pub mod compiler {
    pub use protoflat_compiler::*;
}

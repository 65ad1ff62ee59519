//! protoflat-compiler
//!
//! This crate implements:
//!  1) A tokenizer + parser for `.proto` schema files,
//!  2) A schema verifier (duplicate names, field numbers, unresolved and recursive types),
//!  3) Lowering of the parsed file into the runtime [Schema](protoflat_schema::Schema) arena,
//!  4) Error types (`SchemaError`).

pub mod compiler;
pub mod error;
pub mod parser;
pub mod tokenizer;
pub mod types;
pub mod utils;
pub mod verifier;

pub use compiler::{build_schema, compile_schema, compile_schema_file, describe_schema, parse_proto, root_message};
pub use error::SchemaError;
pub use types::ProtoFile;

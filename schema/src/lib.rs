//! Runtime pieces for decoding protocol buffer messages against a schema that
//! is only known at run time: a cursor over wire-format bytes, the resolved
//! schema arena, and a decoder that turns messages into dynamic [Value] trees.
//!
//! ```
//! use protoflat_schema::*;
//!
//! let schema = Schema::new(
//!     vec![MessageDef::new("Person", vec![
//!         FieldDef::new(1, "id", FieldType::Int32, false),
//!         FieldDef::new(2, "name", FieldType::String, false),
//!     ])],
//!     vec![],
//! );
//!
//! let value = Value::decode(&schema, 0, &[0x08, 0x2A, 0x12, 0x02, b'h', b'i']).unwrap();
//! assert_eq!(format!("{:?}", value), "Person {id: 42, name: \"hi\"}");
//! assert_eq!(value.encode(&schema, 0), [0x08, 0x2A, 0x12, 0x02, b'h', b'i']);
//! ```

pub mod decode;
pub mod error;
pub mod schema;
pub mod value;
pub mod wire;

pub use decode::*;
pub use error::*;
pub use schema::*;
pub use value::*;
pub use wire::*;

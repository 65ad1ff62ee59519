use thiserror::Error;

use crate::wire::WireType;

/// Low-level failures raised by [WireReader](crate::WireReader). Every
/// variant carries the absolute byte offset at which the failing read started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("input truncated at byte {offset}")]
    Truncated { offset: usize },

    #[error("varint at byte {offset} runs past 10 bytes")]
    MalformedVarint { offset: usize },

    #[error("invalid wire type {wire_type} at byte {offset}")]
    InvalidWireType { offset: usize, wire_type: u8 },

    #[error("invalid field number {number} at byte {offset}")]
    InvalidFieldNumber { offset: usize, number: u64 },

    #[error("end-group tag for field {field} at byte {offset} has no matching start-group")]
    UnexpectedEndGroup { offset: usize, field: u32 },
}

impl WireError {
    pub fn offset(&self) -> usize {
        match *self {
            WireError::Truncated { offset }
            | WireError::MalformedVarint { offset }
            | WireError::InvalidWireType { offset, .. }
            | WireError::InvalidFieldNumber { offset, .. }
            | WireError::UnexpectedEndGroup { offset, .. } => offset,
        }
    }
}

/// Errors raised while decoding a record or flattening it into a row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("input truncated at byte {offset}{}", in_field(.field))]
    Truncated { offset: usize, field: Option<u32> },

    #[error("varint at byte {offset} runs past 10 bytes{}", in_field(.field))]
    MalformedVarint { offset: usize, field: Option<u32> },

    #[error("invalid wire type {wire_type} at byte {offset}{}", in_field(.field))]
    InvalidWireType {
        offset:    usize,
        field:     Option<u32>,
        wire_type: u8,
    },

    #[error("invalid field number {number} at byte {offset}")]
    InvalidFieldNumber { offset: usize, number: u64 },

    #[error("end-group tag for field {field} at byte {offset} has no matching start-group")]
    UnexpectedEndGroup { offset: usize, field: u32 },

    #[error("field \"{field}\" at byte {offset} is declared {expected} but was encoded as {found}")]
    WireTypeMismatch {
        offset:   usize,
        field:    String,
        expected: WireType,
        found:    WireType,
    },

    #[error("column group \"{column}\" allows {allowed} repetitions but the record has {found}")]
    UnexpectedShape {
        column:  String,
        allowed: usize,
        found:   usize,
    },
}

impl DecodeError {
    /// Attach the number of the field being read to a wire failure.
    pub fn from_wire(err: WireError, field: Option<u32>) -> DecodeError {
        match err {
            WireError::Truncated { offset } => DecodeError::Truncated { offset, field },
            WireError::MalformedVarint { offset } => DecodeError::MalformedVarint { offset, field },
            WireError::InvalidWireType { offset, wire_type } => DecodeError::InvalidWireType {
                offset,
                field,
                wire_type,
            },
            WireError::InvalidFieldNumber { offset, number } => {
                DecodeError::InvalidFieldNumber { offset, number }
            }
            WireError::UnexpectedEndGroup { offset, field } => {
                DecodeError::UnexpectedEndGroup { offset, field }
            }
        }
    }

    /// The byte offset the error refers to, if it arose from the wire.
    pub fn offset(&self) -> Option<usize> {
        match *self {
            DecodeError::Truncated { offset, .. }
            | DecodeError::MalformedVarint { offset, .. }
            | DecodeError::InvalidWireType { offset, .. }
            | DecodeError::InvalidFieldNumber { offset, .. }
            | DecodeError::UnexpectedEndGroup { offset, .. }
            | DecodeError::WireTypeMismatch { offset, .. } => Some(offset),
            DecodeError::UnexpectedShape { .. } => None,
        }
    }
}

fn in_field(field: &Option<u32>) -> String {
    match field {
        Some(number) => format!(" while reading field {}", number),
        None => String::new(),
    }
}

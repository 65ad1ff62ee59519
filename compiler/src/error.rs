use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error at line {line}, column {column}: {msg}")]
    ParseError {
        msg:    String,
        line:   usize,
        column: usize,
    },

    #[error("Verifier error: {0}")]
    VerifierError(String),

    #[error("The type \"{type_name}\" of field \"{field}\" at line {line}, column {column} is not defined")]
    UnresolvedType {
        type_name: String,
        field:     String,
        line:      usize,
        column:    usize,
    },

    #[error("Recursive nesting of \"{0}\" is not allowed")]
    RecursiveType(String),

    #[error("The schema does not define any message")]
    NoMessages,

    #[error("No message named \"{0}\" in the schema")]
    UnknownMessage(String),
}

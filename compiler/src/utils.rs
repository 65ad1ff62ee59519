use crate::error::SchemaError;

pub fn quote(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text))
}

pub fn error(msg: &str, line: usize, column: usize) -> SchemaError {
    SchemaError::ParseError {
        msg: msg.to_owned(),
        line,
        column,
    }
}

/// `parent_scope("a.b.C")` is `"a.b"`, `parent_scope("C")` is `""`.
pub fn parent_scope(scope: &str) -> &str {
    match scope.rfind('.') {
        Some(i) => &scope[..i],
        None => "",
    }
}

/// Joins a scope and a name with a dot, skipping the dot for the root scope.
pub fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_owned()
    } else {
        format!("{}.{}", scope, name)
    }
}

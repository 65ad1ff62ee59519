use serde::Serialize;

/// A parsed `.proto` file. Nested definitions are flattened into
/// `definitions` with fully-qualified names, each enclosing message listed
/// before the definitions nested in it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtoFile {
    pub syntax:      Syntax,
    pub package:     Option<String>,
    pub imports:     Vec<String>,
    pub definitions: Vec<Definition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Syntax {
    Proto2,
    Proto3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DefinitionKind {
    Enum,
    Message,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    /// No label; proto3 singular fields.
    Implicit,
    Optional,
    Required,
    Repeated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name:   String,
    pub line:   usize,
    pub column: usize,
    pub label:  Label,
    /// The type exactly as written, e.g. `int32`, `Inner` or `.pkg.Outer`.
    #[serde(rename = "type")]
    pub type_:  String,
    pub number: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oneof:  Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnumValue {
    pub name:   String,
    pub line:   usize,
    pub column: usize,
    pub number: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Definition {
    /// Fully-qualified name, including the package.
    pub name:   String,
    pub line:   usize,
    pub column: usize,
    pub kind:   DefinitionKind,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<EnumValue>,
}

use std::{collections::HashMap, fs, path::Path};

use protoflat_schema::{EnumDef, EnumValue, FieldDef, FieldType, MessageDef, MessageId, Schema};

use crate::{
    error::SchemaError,
    parser::parse_schema,
    tokenizer::tokenize_schema,
    types::{DefinitionKind, Label, ProtoFile},
    utils::quote,
    verifier::{definition_map, resolve_type, verify_schema},
};

/// Tokenizes and parses `.proto` text without verifying it.
pub fn parse_proto(text: &str) -> Result<ProtoFile, SchemaError> {
    let tokens = tokenize_schema(text)?;
    parse_schema(&tokens)
}

/// Compile `.proto` text into a resolved [Schema].
/// Returns `Err(SchemaError)` if tokenization/parsing/verification fails.
pub fn compile_schema(text: &str) -> Result<Schema, SchemaError> {
    let file = parse_proto(text)?;
    verify_schema(&file)?;
    build_schema(&file)
}

pub fn compile_schema_file<P: AsRef<Path>>(path: P) -> Result<Schema, SchemaError> {
    let text = fs::read_to_string(path)?;
    compile_schema(&text)
}

/// Renders the parsed file as pretty-printed JSON.
pub fn describe_schema(text: &str) -> Result<String, SchemaError> {
    let file = parse_proto(text)?;
    verify_schema(&file)?;
    Ok(serde_json::to_string_pretty(&file)?)
}

/// Lowers a verified [ProtoFile] into the index-based runtime [Schema].
/// Messages and enums keep their order from `file.definitions`.
pub fn build_schema(file: &ProtoFile) -> Result<Schema, SchemaError> {
    let definitions = definition_map(file);

    let mut message_ids: HashMap<&str, MessageId> = HashMap::new();
    let mut enum_ids: HashMap<&str, usize> = HashMap::new();
    for def in &file.definitions {
        match def.kind {
            DefinitionKind::Message => {
                let id = message_ids.len();
                message_ids.insert(&def.name, id);
            }
            DefinitionKind::Enum => {
                let id = enum_ids.len();
                enum_ids.insert(&def.name, id);
            }
        }
    }

    let mut messages = Vec::with_capacity(message_ids.len());
    let mut enums = Vec::with_capacity(enum_ids.len());

    for def in &file.definitions {
        if def.kind == DefinitionKind::Enum {
            let values = def
                .values
                .iter()
                .map(|value| EnumValue {
                    name:   value.name.clone(),
                    number: value.number,
                })
                .collect();
            enums.push(EnumDef::new(&def.name, values));
            continue;
        }

        let mut fields = Vec::with_capacity(def.fields.len());
        for field in &def.fields {
            let field_type = match FieldType::from_scalar_name(&field.type_) {
                Some(scalar) => scalar,
                None => {
                    let unresolved = || SchemaError::UnresolvedType {
                        type_name: field.type_.clone(),
                        field:     field.name.clone(),
                        line:      field.line,
                        column:    field.column,
                    };
                    let target = resolve_type(&definitions, &def.name, &field.type_).ok_or_else(unresolved)?;
                    match target.kind {
                        DefinitionKind::Message => {
                            FieldType::Message(*message_ids.get(target.name.as_str()).ok_or_else(unresolved)?)
                        }
                        DefinitionKind::Enum => {
                            FieldType::Enum(*enum_ids.get(target.name.as_str()).ok_or_else(unresolved)?)
                        }
                    }
                }
            };

            let number = u32::try_from(field.number).map_err(|_| {
                SchemaError::VerifierError(format!("The number of field {} is out of range", quote(&field.name)))
            })?;

            fields.push(FieldDef::new(number, &field.name, field_type, field.label == Label::Repeated));
        }
        messages.push(MessageDef::new(&def.name, fields));
    }

    Ok(Schema::new(messages, enums))
}

/// Picks the message records are decoded as: `name` when given, otherwise
/// the first message declared in the file.
pub fn root_message(schema: &Schema, name: Option<&str>) -> Result<MessageId, SchemaError> {
    match name {
        Some(name) => schema
            .message_id(name)
            .ok_or_else(|| SchemaError::UnknownMessage(name.to_owned())),
        None => schema.default_root().ok_or(SchemaError::NoMessages),
    }
}

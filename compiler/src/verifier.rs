use std::collections::HashMap;

use protoflat_schema::{FieldType, MAX_FIELD_NUMBER};

use crate::{
    error::SchemaError,
    types::{Definition, DefinitionKind, ProtoFile},
    utils::{parent_scope, qualify, quote},
};

/// Field numbers reserved for the protobuf implementation itself.
pub const RESERVED_NUMBERS: std::ops::RangeInclusive<i64> = 19000..=19999;

/// Definitions by fully-qualified name.
pub type DefinitionMap<'a> = HashMap<String, &'a Definition>;

pub fn definition_map(file: &ProtoFile) -> DefinitionMap<'_> {
    file.definitions
        .iter()
        .map(|def| (def.name.clone(), def))
        .collect()
}

/// Resolves a non-scalar type name used inside the message `scope`. A leading
/// dot makes the name fully qualified; otherwise it is looked up from the
/// innermost scope outward to the root.
pub fn resolve_type<'a>(definitions: &DefinitionMap<'a>, scope: &str, type_name: &str) -> Option<&'a Definition> {
    if let Some(absolute) = type_name.strip_prefix('.') {
        return definitions.get(absolute).copied();
    }

    let mut scope = scope;
    loop {
        if let Some(def) = definitions.get(&qualify(scope, type_name)) {
            return Some(def);
        }
        if scope.is_empty() {
            return None;
        }
        scope = parent_scope(scope);
    }
}

/// Returns `Ok(())` if the parsed file describes a decodable schema.
pub fn verify_schema(file: &ProtoFile) -> Result<(), SchemaError> {
    let mut definitions: DefinitionMap = HashMap::new();

    // 1) Check duplicate type names
    for def in &file.definitions {
        if definitions.insert(def.name.clone(), def).is_some() {
            return Err(SchemaError::VerifierError(format!(
                "The type {} is defined twice",
                quote(&def.name)
            )));
        }
    }

    if !file.definitions.iter().any(|def| def.kind == DefinitionKind::Message) {
        return Err(SchemaError::NoMessages);
    }

    // 2) Check the members of each definition
    for def in &file.definitions {
        match def.kind {
            DefinitionKind::Enum => verify_enum(def)?,
            DefinitionKind::Message => verify_message(def, &definitions)?,
        }
    }

    // 3) Check that messages do not contain themselves
    let mut state: HashMap<&str, u8> = HashMap::new();
    fn check_recursion<'a>(
        def: &'a Definition,
        definitions: &DefinitionMap<'a>,
        state: &mut HashMap<&'a str, u8>,
    ) -> Result<(), SchemaError> {
        match state.get(def.name.as_str()) {
            Some(1) => return Err(SchemaError::RecursiveType(def.name.clone())),
            Some(_) => return Ok(()),
            None => {}
        }

        state.insert(&def.name, 1);
        for field in &def.fields {
            if FieldType::from_scalar_name(&field.type_).is_some() {
                continue;
            }
            if let Some(nested) = resolve_type(definitions, &def.name, &field.type_) {
                if nested.kind == DefinitionKind::Message {
                    check_recursion(nested, definitions, state)?;
                }
            }
        }
        state.insert(&def.name, 2);
        Ok(())
    }

    for def in &file.definitions {
        if def.kind == DefinitionKind::Message {
            check_recursion(def, &definitions, &mut state)?;
        }
    }

    Ok(())
}

fn verify_enum(def: &Definition) -> Result<(), SchemaError> {
    if def.values.is_empty() {
        return Err(SchemaError::VerifierError(format!(
            "The enum {} has no values",
            quote(&def.name)
        )));
    }

    let mut names = Vec::new();
    for value in &def.values {
        if names.contains(&value.name.as_str()) {
            return Err(SchemaError::VerifierError(format!(
                "The value {} is defined twice in {}",
                quote(&value.name),
                quote(&def.name)
            )));
        }
        names.push(value.name.as_str());
    }
    Ok(())
}

fn verify_message(def: &Definition, definitions: &DefinitionMap) -> Result<(), SchemaError> {
    let mut names = Vec::new();
    let mut numbers = Vec::new();

    for field in &def.fields {
        if names.contains(&field.name.as_str()) {
            return Err(SchemaError::VerifierError(format!(
                "The field {} is defined twice in {}",
                quote(&field.name),
                quote(&def.name)
            )));
        }
        if numbers.contains(&field.number) {
            return Err(SchemaError::VerifierError(format!(
                "The number {} of field {} is used twice in {}",
                field.number,
                quote(&field.name),
                quote(&def.name)
            )));
        }
        if field.number < 1 || field.number > MAX_FIELD_NUMBER as i64 {
            return Err(SchemaError::VerifierError(format!(
                "The number of field {} must be between 1 and {}",
                quote(&field.name),
                MAX_FIELD_NUMBER
            )));
        }
        if RESERVED_NUMBERS.contains(&field.number) {
            return Err(SchemaError::VerifierError(format!(
                "The number of field {} is in the reserved range 19000 to 19999",
                quote(&field.name)
            )));
        }

        if FieldType::from_scalar_name(&field.type_).is_none()
            && resolve_type(definitions, &def.name, &field.type_).is_none()
        {
            return Err(SchemaError::UnresolvedType {
                type_name: field.type_.clone(),
                field:     field.name.clone(),
                line:      field.line,
                column:    field.column,
            });
        }

        names.push(field.name.as_str());
        numbers.push(field.number);
    }
    Ok(())
}

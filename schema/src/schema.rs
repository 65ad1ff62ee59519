use std::collections::HashMap;

use crate::wire::WireType;

/// Index of a [MessageDef] inside [Schema::messages].
pub type MessageId = usize;

/// Index of an [EnumDef] inside [Schema::enums].
pub type EnumId = usize;

/// The declared type of a field. Message and enum references point into the
/// owning [Schema]'s arenas, so recursive layouts never form ownership cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Double,
    Float,
    Int32,
    Int64,
    UInt32,
    UInt64,
    SInt32,
    SInt64,
    Fixed32,
    Fixed64,
    SFixed32,
    SFixed64,
    Bool,
    String,
    Bytes,
    Enum(EnumId),
    Message(MessageId),
}

impl FieldType {
    /// Resolves one of the `.proto` scalar type keywords.
    pub fn from_scalar_name(name: &str) -> Option<FieldType> {
        let field_type = match name {
            "double" => FieldType::Double,
            "float" => FieldType::Float,
            "int32" => FieldType::Int32,
            "int64" => FieldType::Int64,
            "uint32" => FieldType::UInt32,
            "uint64" => FieldType::UInt64,
            "sint32" => FieldType::SInt32,
            "sint64" => FieldType::SInt64,
            "fixed32" => FieldType::Fixed32,
            "fixed64" => FieldType::Fixed64,
            "sfixed32" => FieldType::SFixed32,
            "sfixed64" => FieldType::SFixed64,
            "bool" => FieldType::Bool,
            "string" => FieldType::String,
            "bytes" => FieldType::Bytes,
            _ => return None,
        };
        Some(field_type)
    }

    /// The wire type a single, unpacked value of this type is encoded with.
    pub fn wire_type(self) -> WireType {
        match self {
            FieldType::Int32
            | FieldType::Int64
            | FieldType::UInt32
            | FieldType::UInt64
            | FieldType::SInt32
            | FieldType::SInt64
            | FieldType::Bool
            | FieldType::Enum(_) => WireType::Varint,
            FieldType::Fixed64 | FieldType::SFixed64 | FieldType::Double => WireType::Fixed64,
            FieldType::Fixed32 | FieldType::SFixed32 | FieldType::Float => WireType::Fixed32,
            FieldType::String | FieldType::Bytes | FieldType::Message(_) => {
                WireType::LengthDelimited
            }
        }
    }

    /// Repeated fields of packable types may arrive as one length-delimited
    /// blob of concatenated values.
    pub fn is_packable(self) -> bool {
        self.wire_type() != WireType::LengthDelimited
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub number:     u32,
    pub name:       String,
    pub field_type: FieldType,
    pub repeated:   bool,
}

impl FieldDef {
    pub fn new(number: u32, name: &str, field_type: FieldType, repeated: bool) -> FieldDef {
        FieldDef {
            number,
            name: name.to_owned(),
            field_type,
            repeated,
        }
    }
}

/// A message type. Fields keep their declaration order, which is also the
/// order decoded records and derived columns follow.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDef {
    pub name:            String,
    pub fields:          Vec<FieldDef>,
    number_to_index:     HashMap<u32, usize>,
    field_name_to_index: HashMap<String, usize>,
}

impl MessageDef {
    pub fn new(name: &str, fields: Vec<FieldDef>) -> MessageDef {
        let mut number_to_index = HashMap::new();
        let mut field_name_to_index = HashMap::new();

        for (i, field) in fields.iter().enumerate() {
            number_to_index.insert(field.number, i);
            field_name_to_index.insert(field.name.clone(), i);
        }

        MessageDef {
            name: name.to_owned(),
            fields,
            number_to_index,
            field_name_to_index,
        }
    }

    pub fn index_of_number(&self, number: u32) -> Option<usize> {
        self.number_to_index.get(&number).copied()
    }

    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        self.field_name_to_index.get(name).copied()
    }

    pub fn field_by_number(&self, number: u32) -> Option<&FieldDef> {
        self.index_of_number(number).map(|i| &self.fields[i])
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDef> {
        self.index_of_name(name).map(|i| &self.fields[i])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    pub name:   String,
    pub number: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub name:        String,
    pub values:      Vec<EnumValue>,
    number_to_index: HashMap<i32, usize>,
}

impl EnumDef {
    pub fn new(name: &str, values: Vec<EnumValue>) -> EnumDef {
        let mut number_to_index = HashMap::new();
        for (i, value) in values.iter().enumerate() {
            // With aliases the first declared symbol names the number.
            number_to_index.entry(value.number).or_insert(i);
        }

        EnumDef {
            name: name.to_owned(),
            values,
            number_to_index,
        }
    }

    /// The symbol declared for `number`, if any.
    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.number_to_index
            .get(&number)
            .map(|&i| self.values[i].name.as_str())
    }
}

/// A fully resolved schema: arenas of message and enum definitions that refer
/// to each other by index. Immutable once built and shared by every decode.
///
/// Messages are stored in declaration order with enclosing messages before the
/// messages nested in them, so the first message is the first top-level
/// message of the schema file.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub messages:         Vec<MessageDef>,
    pub enums:            Vec<EnumDef>,
    message_name_to_index: HashMap<String, MessageId>,
}

impl Schema {
    pub fn new(messages: Vec<MessageDef>, enums: Vec<EnumDef>) -> Schema {
        let mut message_name_to_index = HashMap::new();
        for (i, message) in messages.iter().enumerate() {
            message_name_to_index.insert(message.name.clone(), i);
        }

        Schema {
            messages,
            enums,
            message_name_to_index,
        }
    }

    pub fn message(&self, id: MessageId) -> &MessageDef {
        &self.messages[id]
    }

    pub fn enum_def(&self, id: EnumId) -> &EnumDef {
        &self.enums[id]
    }

    /// The message decoded when no other one is requested.
    pub fn default_root(&self) -> Option<MessageId> {
        if self.messages.is_empty() {
            None
        } else {
            Some(0)
        }
    }

    /// Looks a message up by its fully-qualified name (with or without a
    /// leading dot), or by a trailing part of it when only one message matches.
    pub fn message_id(&self, name: &str) -> Option<MessageId> {
        let name = name.strip_prefix('.').unwrap_or(name);
        if let Some(&id) = self.message_name_to_index.get(name) {
            return Some(id);
        }

        let suffix = format!(".{}", name);
        let mut matches = self
            .messages
            .iter()
            .enumerate()
            .filter(|(_, message)| message.name.ends_with(&suffix))
            .map(|(i, _)| i);

        match (matches.next(), matches.next()) {
            (Some(id), None) => Some(id),
            _ => None,
        }
    }
}

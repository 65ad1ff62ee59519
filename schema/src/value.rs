use crate::{
    error::DecodeError,
    schema::{FieldDef, FieldType, MessageDef, MessageId, Schema},
    wire::{WireReader, WireType, WireWriter},
};

use std::fmt;

/// This type holds one decoded protobuf message, or a part of one.
///
/// Scalars carry their typed value, repeated fields become a
/// [List](#variant.List) and messages become a [Record](#variant.Record)
/// whose fields follow the schema's declaration order. Field, message and enum
/// symbol names are string slices borrowed from the [Schema], so a Value can
/// outlive the bytes it was decoded from but not the schema.
#[derive(Clone, PartialEq)]
pub enum Value<'a> {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    /// The enum number and, when the schema declares it, its symbol.
    Enum(i32, Option<&'a str>),
    List(Vec<Value<'a>>),
    /// Message name and the fields present on the wire.
    Record(&'a str, Vec<(&'a str, Value<'a>)>),
}

impl<'a> Value<'a> {
    /// A convenience method to extract a field out of a [Record](#variant.Record).
    /// Returns `None` for other value kinds or if the field isn't present.
    pub fn get(&self, name: &str) -> Option<&Value<'a>> {
        match *self {
            Value::Record(_, ref fields) => fields
                .iter()
                .find(|(field, _)| *field == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// A convenience method to get the elements out of a [List](#variant.List).
    /// Returns an empty slice for other value kinds.
    pub fn as_list(&self) -> &[Value<'a>] {
        match *self {
            Value::List(ref values) => values.as_slice(),
            _ => &[],
        }
    }

    /// A convenience method to get the present fields out of a
    /// [Record](#variant.Record). Returns an empty slice for other value kinds.
    pub fn fields(&self) -> &[(&'a str, Value<'a>)] {
        match *self {
            Value::Record(_, ref fields) => fields.as_slice(),
            _ => &[],
        }
    }

    /// Returns `""` for values that are not a [String](#variant.String) or a
    /// named [Enum](#variant.Enum).
    pub fn as_str(&self) -> &str {
        match *self {
            Value::String(ref value) => value.as_str(),
            Value::Enum(_, Some(name)) => name,
            _ => "",
        }
    }

    /// Number of elements in a [List](#variant.List), `0` for everything else.
    pub fn len(&self) -> usize {
        match *self {
            Value::List(ref values) => values.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decodes all of `bytes` as one message of type `message`.
    pub fn decode(
        schema: &'a Schema,
        message: MessageId,
        bytes: &[u8],
    ) -> Result<Value<'a>, DecodeError> {
        Value::decode_from(schema, message, &mut WireReader::new(bytes))
    }

    /// Decodes a message of type `message` from `reader`, consuming every
    /// remaining byte. Unknown fields are skipped.
    pub fn decode_from(
        schema: &'a Schema,
        message: MessageId,
        reader: &mut WireReader<'_>,
    ) -> Result<Value<'a>, DecodeError> {
        Value::decode_seeded(schema, message, None, reader)
    }

    fn decode_seeded(
        schema: &'a Schema,
        message: MessageId,
        seed: Option<Value<'a>>,
        reader: &mut WireReader<'_>,
    ) -> Result<Value<'a>, DecodeError> {
        let mut builder = MessageBuilder::new(schema, message, seed);
        while reader.has_remaining() {
            builder.read_field(reader)?;
        }
        Ok(builder.finish())
    }

    /// Encodes this record as a message of type `message`. Only used to build
    /// fixtures: values whose kind does not match the declared field type are
    /// left out.
    pub fn encode(&self, schema: &Schema, message: MessageId) -> Vec<u8> {
        let mut writer = WireWriter::new();
        self.encode_into(schema, message, &mut writer);
        writer.data()
    }

    pub fn encode_into(&self, schema: &Schema, message: MessageId, writer: &mut WireWriter) {
        let def = schema.message(message);
        for (name, value) in self.fields() {
            let field = match def.field_by_name(name) {
                Some(field) => field,
                None => continue,
            };
            match *value {
                Value::List(ref values) if field.repeated => {
                    for value in values {
                        encode_field(schema, field, value, writer);
                    }
                }
                _ => encode_field(schema, field, value, writer),
            }
        }
    }
}

fn encode_field(schema: &Schema, field: &FieldDef, value: &Value, writer: &mut WireWriter) {
    let wire_type = field.field_type.wire_type();
    let number = field.number;

    match (field.field_type, value) {
        (FieldType::Message(id), Value::Record(..)) => {
            writer.write_tag(number, wire_type);
            writer.write_length_delimited(&value.encode(schema, id));
        }
        (FieldType::String, Value::String(text)) => {
            writer.write_tag(number, wire_type);
            writer.write_length_delimited(text.as_bytes());
        }
        (FieldType::Bytes, Value::Bytes(bytes)) => {
            writer.write_tag(number, wire_type);
            writer.write_length_delimited(bytes);
        }
        (FieldType::Int32, Value::Int32(v)) => {
            writer.write_tag(number, wire_type);
            writer.write_var_uint64(*v as i64 as u64);
        }
        (FieldType::Int64, Value::Int64(v)) => {
            writer.write_tag(number, wire_type);
            writer.write_var_uint64(*v as u64);
        }
        (FieldType::UInt32, Value::UInt32(v)) => {
            writer.write_tag(number, wire_type);
            writer.write_var_uint64(*v as u64);
        }
        (FieldType::UInt64, Value::UInt64(v)) => {
            writer.write_tag(number, wire_type);
            writer.write_var_uint64(*v);
        }
        (FieldType::SInt32, Value::Int32(v)) => {
            writer.write_tag(number, wire_type);
            writer.write_var_sint64(*v as i64);
        }
        (FieldType::SInt64, Value::Int64(v)) => {
            writer.write_tag(number, wire_type);
            writer.write_var_sint64(*v);
        }
        (FieldType::Bool, Value::Bool(v)) => {
            writer.write_tag(number, wire_type);
            writer.write_var_uint64(*v as u64);
        }
        (FieldType::Enum(_), Value::Enum(v, _)) => {
            writer.write_tag(number, wire_type);
            writer.write_var_uint64(*v as i64 as u64);
        }
        (FieldType::Fixed32, Value::UInt32(v)) => {
            writer.write_tag(number, wire_type);
            writer.write_fixed32(*v);
        }
        (FieldType::SFixed32, Value::Int32(v)) => {
            writer.write_tag(number, wire_type);
            writer.write_fixed32(*v as u32);
        }
        (FieldType::Float, Value::Float(v)) => {
            writer.write_tag(number, wire_type);
            writer.write_fixed32(v.to_bits());
        }
        (FieldType::Fixed64, Value::UInt64(v)) => {
            writer.write_tag(number, wire_type);
            writer.write_fixed64(*v);
        }
        (FieldType::SFixed64, Value::Int64(v)) => {
            writer.write_tag(number, wire_type);
            writer.write_fixed64(*v as u64);
        }
        (FieldType::Double, Value::Double(v)) => {
            writer.write_tag(number, wire_type);
            writer.write_fixed64(v.to_bits());
        }
        _ => {}
    }
}

/// Reads a single value of `field`'s type. Repetition is handled by the caller.
fn read_value<'a>(
    schema: &'a Schema,
    field: &FieldDef,
    reader: &mut WireReader<'_>,
) -> Result<Value<'a>, DecodeError> {
    let number = field.number;
    let wire = move |err| DecodeError::from_wire(err, Some(number));

    let value = match field.field_type {
        FieldType::Int32 => Value::Int32(reader.read_var_uint64().map_err(wire)? as i32),
        FieldType::Int64 => Value::Int64(reader.read_var_uint64().map_err(wire)? as i64),
        FieldType::UInt32 => Value::UInt32(reader.read_var_uint64().map_err(wire)? as u32),
        FieldType::UInt64 => Value::UInt64(reader.read_var_uint64().map_err(wire)?),
        FieldType::SInt32 => Value::Int32(reader.read_var_sint64().map_err(wire)? as i32),
        FieldType::SInt64 => Value::Int64(reader.read_var_sint64().map_err(wire)?),
        FieldType::Bool => Value::Bool(reader.read_var_uint64().map_err(wire)? != 0),
        FieldType::Enum(id) => {
            let number = reader.read_var_uint64().map_err(wire)? as i32;
            Value::Enum(number, schema.enum_def(id).name_of(number))
        }
        FieldType::Fixed32 => Value::UInt32(reader.read_fixed32().map_err(wire)?),
        FieldType::SFixed32 => Value::Int32(reader.read_fixed32().map_err(wire)? as i32),
        FieldType::Float => Value::Float(f32::from_bits(reader.read_fixed32().map_err(wire)?)),
        FieldType::Fixed64 => Value::UInt64(reader.read_fixed64().map_err(wire)?),
        FieldType::SFixed64 => Value::Int64(reader.read_fixed64().map_err(wire)? as i64),
        FieldType::Double => Value::Double(f64::from_bits(reader.read_fixed64().map_err(wire)?)),
        FieldType::String => {
            let bytes = reader.read_length_delimited().map_err(wire)?;
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
        FieldType::Bytes => Value::Bytes(reader.read_length_delimited().map_err(wire)?.to_vec()),
        FieldType::Message(id) => {
            let mut nested = reader.read_message().map_err(wire)?;
            Value::decode_from(schema, id, &mut nested)?
        }
    };

    Ok(value)
}

enum Slot<'a> {
    Empty,
    Single(Value<'a>),
    Repeated(Vec<Value<'a>>),
}

/// Accumulates the fields of one message while its tags are read.
pub(crate) struct MessageBuilder<'a> {
    schema: &'a Schema,
    def:    &'a MessageDef,
    slots:  Vec<Slot<'a>>,
}

impl<'a> MessageBuilder<'a> {
    /// `seed` is an earlier occurrence of the same message that the new
    /// fields are merged into.
    pub(crate) fn new(
        schema: &'a Schema,
        message: MessageId,
        seed: Option<Value<'a>>,
    ) -> MessageBuilder<'a> {
        let def = schema.message(message);
        let mut slots: Vec<Slot<'a>> = def.fields.iter().map(|_| Slot::Empty).collect();

        if let Some(Value::Record(_, fields)) = seed {
            for (name, value) in fields {
                if let Some(i) = def.index_of_name(name) {
                    slots[i] = match value {
                        Value::List(values) if def.fields[i].repeated => Slot::Repeated(values),
                        value => Slot::Single(value),
                    };
                }
            }
        }

        MessageBuilder { schema, def, slots }
    }

    pub(crate) fn def(&self) -> &'a MessageDef {
        self.def
    }

    fn push(&mut self, index: usize, value: Value<'a>) {
        match &mut self.slots[index] {
            Slot::Repeated(values) => values.push(value),
            slot => *slot = Slot::Repeated(vec![value]),
        }
    }

    /// Reads one tag and its value. Unknown field numbers are skipped.
    pub(crate) fn read_field(&mut self, reader: &mut WireReader<'_>) -> Result<(), DecodeError> {
        let offset = reader.offset();
        let (number, wire_type) = reader
            .read_tag()
            .map_err(|err| DecodeError::from_wire(err, None))?;

        let index = match self.def.index_of_number(number) {
            Some(index) => index,
            None => {
                return reader
                    .skip_field(number, wire_type)
                    .map_err(|err| DecodeError::from_wire(err, Some(number)));
            }
        };

        let def = self.def;
        let field = &def.fields[index];

        if field.repeated
            && field.field_type.is_packable()
            && wire_type == WireType::LengthDelimited
        {
            let mut packed = reader
                .read_message()
                .map_err(|err| DecodeError::from_wire(err, Some(number)))?;
            while packed.has_remaining() {
                let value = read_value(self.schema, field, &mut packed)?;
                self.push(index, value);
            }
            return Ok(());
        }

        let expected = field.field_type.wire_type();
        if wire_type != expected {
            return Err(DecodeError::WireTypeMismatch {
                offset,
                field: field.name.clone(),
                expected,
                found: wire_type,
            });
        }

        match field.field_type {
            FieldType::Message(id) if !field.repeated => {
                // A message field seen twice merges into the earlier occurrence.
                let seed = match std::mem::replace(&mut self.slots[index], Slot::Empty) {
                    Slot::Single(value) => Some(value),
                    _ => None,
                };
                let mut nested = reader
                    .read_message()
                    .map_err(|err| DecodeError::from_wire(err, Some(number)))?;
                let value = Value::decode_seeded(self.schema, id, seed, &mut nested)?;
                self.slots[index] = Slot::Single(value);
            }
            _ => {
                let value = read_value(self.schema, field, reader)?;
                if field.repeated {
                    self.push(index, value);
                } else {
                    self.slots[index] = Slot::Single(value);
                }
            }
        }

        Ok(())
    }

    /// Collects the present fields, in declaration order, into a record.
    pub(crate) fn finish(self) -> Value<'a> {
        let fields = self
            .def
            .fields
            .iter()
            .zip(self.slots)
            .filter_map(|(field, slot)| match slot {
                Slot::Empty => None,
                Slot::Single(value) => Some((field.name.as_str(), value)),
                Slot::Repeated(values) => Some((field.name.as_str(), Value::List(values))),
            })
            .collect();

        Value::Record(self.def.name.as_str(), fields)
    }
}

impl<'a> fmt::Debug for Value<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        match *self {
            Value::Bool(value) => value.fmt(f),
            Value::Int32(value) => value.fmt(f),
            Value::Int64(value) => value.fmt(f),
            Value::UInt32(value) => value.fmt(f),
            Value::UInt64(value) => value.fmt(f),
            Value::Float(value) => value.fmt(f),
            Value::Double(value) => value.fmt(f),
            Value::String(ref value) => value.fmt(f),
            Value::Bytes(ref value) => value.fmt(f),
            Value::Enum(_, Some(name)) => f.write_str(name),
            Value::Enum(number, None) => number.fmt(f),
            Value::List(ref values) => values.fmt(f),

            Value::Record(name, ref fields) => {
                write!(f, "{} {{", name)?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {:?}", key, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EnumDef, EnumValue};

    const PERSON: MessageId = 0;

    fn schema() -> Schema {
        Schema::new(
            vec![
                MessageDef::new(
                    "Person",
                    vec![
                        FieldDef::new(1, "id", FieldType::Int32, false),
                        FieldDef::new(2, "name", FieldType::String, false),
                        FieldDef::new(3, "tags", FieldType::String, true),
                        FieldDef::new(4, "scores", FieldType::SInt32, true),
                        FieldDef::new(5, "address", FieldType::Message(1), false),
                        FieldDef::new(6, "kind", FieldType::Enum(0), false),
                        FieldDef::new(7, "ratio", FieldType::Double, false),
                        FieldDef::new(8, "weight", FieldType::Float, false),
                        FieldDef::new(9, "blob", FieldType::Bytes, false),
                    ],
                ),
                MessageDef::new(
                    "Address",
                    vec![
                        FieldDef::new(1, "city", FieldType::String, false),
                        FieldDef::new(2, "zip", FieldType::UInt32, false),
                        FieldDef::new(3, "lines", FieldType::String, true),
                        FieldDef::new(4, "geo", FieldType::Message(2), false),
                    ],
                ),
                MessageDef::new(
                    "Geo",
                    vec![
                        FieldDef::new(1, "lat", FieldType::Double, false),
                        FieldDef::new(2, "lon", FieldType::Double, false),
                    ],
                ),
            ],
            vec![EnumDef::new(
                "Kind",
                vec![
                    EnumValue { name: "A".to_owned(), number: 0 },
                    EnumValue { name: "B".to_owned(), number: 1 },
                ],
            )],
        )
    }

    #[test]
    fn skips_unknown_fields() {
        let schema = schema();
        // {1: 1, 99: 5, 2: "a"}
        let bytes = [0x08, 0x01, 0x98, 0x06, 0x05, 0x12, 0x01, b'a'];
        let value = Value::decode(&schema, PERSON, &bytes).unwrap();
        assert_eq!(
            value,
            Value::Record(
                "Person",
                vec![("id", Value::Int32(1)), ("name", Value::String("a".to_owned()))]
            )
        );
    }

    #[test]
    fn record_follows_declaration_order() {
        let schema = schema();
        let bytes = [0x12, 0x01, b'a', 0x08, 0x01];
        let value = Value::decode(&schema, PERSON, &bytes).unwrap();
        let names: Vec<&str> = value.fields().iter().map(|(name, _)| *name).collect();
        assert_eq!(names, ["id", "name"]);
    }

    #[test]
    fn packed_and_unpacked_repeated_scalars() {
        let schema = schema();
        // scores packed [1, -1, 2] then one unpacked -2
        let bytes = [0x22, 0x03, 0x02, 0x01, 0x04, 0x20, 0x03];
        let value = Value::decode(&schema, PERSON, &bytes).unwrap();
        assert_eq!(
            value.get("scores"),
            Some(&Value::List(vec![
                Value::Int32(1),
                Value::Int32(-1),
                Value::Int32(2),
                Value::Int32(-2),
            ]))
        );
    }

    #[test]
    fn repeated_strings_keep_order() {
        let schema = schema();
        let bytes = [0x1A, 0x01, b'x', 0x08, 0x07, 0x1A, 0x01, b'y'];
        let value = Value::decode(&schema, PERSON, &bytes).unwrap();
        assert_eq!(value.get("tags").map(|tags| tags.len()), Some(2));
        assert_eq!(value.get("tags").unwrap().as_list()[1].as_str(), "y");
    }

    #[test]
    fn message_field_seen_twice_merges() {
        let schema = schema();
        let bytes = [0x2A, 0x03, 0x0A, 0x01, b'x', 0x2A, 0x02, 0x10, 0x05];
        let value = Value::decode(&schema, PERSON, &bytes).unwrap();
        assert_eq!(
            format!("{:?}", value),
            "Person {address: Address {city: \"x\", zip: 5}}"
        );
    }

    #[test]
    fn merged_message_appends_repeated_and_merges_nested() {
        let schema = schema();

        let mut first = WireWriter::new();
        first.write_tag(1, WireType::LengthDelimited);
        first.write_length_delimited(b"x");
        first.write_tag(3, WireType::LengthDelimited);
        first.write_length_delimited(b"a");
        first.write_tag(4, WireType::LengthDelimited);
        first.write_length_delimited(&[0x09, 0, 0, 0, 0, 0, 0, 0xF0, 0x3F]);

        let mut second = WireWriter::new();
        second.write_tag(3, WireType::LengthDelimited);
        second.write_length_delimited(b"b");
        second.write_tag(4, WireType::LengthDelimited);
        second.write_length_delimited(&[0x11, 0, 0, 0, 0, 0, 0, 0, 0x40]);

        let mut writer = WireWriter::new();
        writer.write_tag(5, WireType::LengthDelimited);
        writer.write_length_delimited(&first.data());
        writer.write_tag(5, WireType::LengthDelimited);
        writer.write_length_delimited(&second.data());

        let value = Value::decode(&schema, PERSON, &writer.data()).unwrap();
        assert_eq!(
            format!("{:?}", value),
            "Person {address: Address {city: \"x\", lines: [\"a\", \"b\"], geo: Geo {lat: 1.0, lon: 2.0}}}"
        );
    }

    #[test]
    fn packed_field_split_across_blobs() {
        let schema = schema();
        // scores packed [1, -1] then packed [2]
        let bytes = [0x22, 0x02, 0x02, 0x01, 0x22, 0x01, 0x04];
        let value = Value::decode(&schema, PERSON, &bytes).unwrap();
        assert_eq!(
            value.get("scores"),
            Some(&Value::List(vec![Value::Int32(1), Value::Int32(-1), Value::Int32(2)]))
        );
    }

    #[test]
    fn last_scalar_wins() {
        let schema = schema();
        let value = Value::decode(&schema, PERSON, &[0x08, 0x01, 0x08, 0x02]).unwrap();
        assert_eq!(value.get("id"), Some(&Value::Int32(2)));
    }

    #[test]
    fn negative_int32_uses_ten_bytes() {
        let schema = schema();
        let bytes = [0x08, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        let value = Value::decode(&schema, PERSON, &bytes).unwrap();
        assert_eq!(value.get("id"), Some(&Value::Int32(-1)));
    }

    #[test]
    fn enums_fixed_width_and_bytes() {
        let schema = schema();
        let mut writer = WireWriter::new();
        writer.write_tag(6, WireType::Varint);
        writer.write_var_uint64(1);
        writer.write_tag(7, WireType::Fixed64);
        writer.write_fixed64(1.5f64.to_bits());
        writer.write_tag(8, WireType::Fixed32);
        writer.write_fixed32(0.25f32.to_bits());
        writer.write_tag(9, WireType::LengthDelimited);
        writer.write_length_delimited(&[0, 255]);
        let value = Value::decode(&schema, PERSON, &writer.data()).unwrap();

        assert_eq!(value.get("kind"), Some(&Value::Enum(1, Some("B"))));
        assert_eq!(value.get("ratio"), Some(&Value::Double(1.5)));
        assert_eq!(value.get("weight"), Some(&Value::Float(0.25)));
        assert_eq!(value.get("blob"), Some(&Value::Bytes(vec![0, 255])));

        let unknown = Value::decode(&schema, PERSON, &[0x30, 0x07]).unwrap();
        assert_eq!(unknown.get("kind"), Some(&Value::Enum(7, None)));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let schema = schema();
        let value = Value::decode(&schema, PERSON, &[0x12, 0x02, 0xFF, b'a']).unwrap();
        assert_eq!(value.get("name").map(|v| v.as_str()), Some("\u{FFFD}a"));
    }

    #[test]
    fn wire_type_mismatch_is_an_error() {
        let schema = schema();
        assert_eq!(
            Value::decode(&schema, PERSON, &[0x08, 0x01, 0x10, 0x01]),
            Err(DecodeError::WireTypeMismatch {
                offset:   2,
                field:    "name".to_owned(),
                expected: WireType::LengthDelimited,
                found:    WireType::Varint,
            })
        );
    }

    #[test]
    fn truncated_nested_message_reports_absolute_offset() {
        let schema = schema();
        let bytes = [0x2A, 0x03, 0x0A, 0x05, b'x'];
        assert_eq!(
            Value::decode(&schema, PERSON, &bytes),
            Err(DecodeError::Truncated { offset: 3, field: Some(1) })
        );
    }

    #[test]
    fn deeply_nested_unknown_groups_are_truncated() {
        let schema = schema();
        let mut bytes = vec![0x08, 0x01];
        bytes.extend(std::iter::repeat(0x7B).take(200_000));
        assert_eq!(
            Value::decode(&schema, PERSON, &bytes),
            Err(DecodeError::Truncated { offset: 200_002, field: Some(15) })
        );
    }

    #[test]
    fn encode_then_decode() {
        let schema = schema();
        let value = Value::Record(
            "Person",
            vec![
                ("id", Value::Int32(-7)),
                ("name", Value::String("Ada".to_owned())),
                (
                    "tags",
                    Value::List(vec![Value::String("x".to_owned()), Value::String("y".to_owned())]),
                ),
                ("scores", Value::List(vec![Value::Int32(-3), Value::Int32(4)])),
                (
                    "address",
                    Value::Record(
                        "Address",
                        vec![
                            ("city", Value::String("Oslo".to_owned())),
                            ("zip", Value::UInt32(150)),
                        ],
                    ),
                ),
                ("kind", Value::Enum(0, Some("A"))),
                ("ratio", Value::Double(-0.5)),
            ],
        );

        let bytes = value.encode(&schema, PERSON);
        assert_eq!(Value::decode(&schema, PERSON, &bytes), Ok(value));
    }
}

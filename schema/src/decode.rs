use crate::{
    error::DecodeError,
    schema::{MessageDef, MessageId, Schema},
    value::{MessageBuilder, Value},
    wire::WireReader,
};

/// How successive top-level messages are laid out in the input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Framing {
    /// Messages are written back to back with no framing. A new message
    /// starts when the field numbers stop ascending.
    #[default]
    Concatenated,
    /// Every message is preceded by its varint-encoded length.
    Delimited,
}

/// Decodes top-level records of one message type from a byte stream.
///
/// The decoder holds no per-stream state: the cursor lives in the
/// [WireReader] passed to [decode_one](#method.decode_one).
///
/// ```
/// use protoflat_schema::*;
///
/// let schema = Schema::new(
///     vec![MessageDef::new("Point", vec![
///         FieldDef::new(1, "x", FieldType::SInt32, false),
///         FieldDef::new(2, "y", FieldType::SInt32, false),
///     ])],
///     vec![],
/// );
///
/// let decoder = RecordDecoder::new(&schema, 0);
/// let mut reader = WireReader::new(&[0x08, 0x02, 0x10, 0x03, 0x08, 0x01]);
/// let first = decoder.decode_one(&mut reader).unwrap().unwrap();
/// assert_eq!(format!("{:?}", first), "Point {x: 1, y: -2}");
/// let second = decoder.decode_one(&mut reader).unwrap().unwrap();
/// assert_eq!(format!("{:?}", second), "Point {x: -1}");
/// assert_eq!(decoder.decode_one(&mut reader), Ok(None));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RecordDecoder<'a> {
    schema:  &'a Schema,
    root:    MessageId,
    framing: Framing,
}

impl<'a> RecordDecoder<'a> {
    pub fn new(schema: &'a Schema, root: MessageId) -> RecordDecoder<'a> {
        RecordDecoder {
            schema,
            root,
            framing: Framing::default(),
        }
    }

    pub fn with_framing(mut self, framing: Framing) -> RecordDecoder<'a> {
        self.framing = framing;
        self
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    pub fn root(&self) -> MessageId {
        self.root
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Decodes the next top-level record. Returns `Ok(None)` when the reader
    /// is exhausted exactly at a message boundary.
    pub fn decode_one(&self, reader: &mut WireReader<'_>) -> Result<Option<Value<'a>>, DecodeError> {
        if !reader.has_remaining() {
            return Ok(None);
        }

        match self.framing {
            Framing::Delimited => {
                let mut message = reader
                    .read_message()
                    .map_err(|err| DecodeError::from_wire(err, None))?;
                Value::decode_from(self.schema, self.root, &mut message).map(Some)
            }
            Framing::Concatenated => self.decode_concatenated(reader).map(Some),
        }
    }

    fn decode_concatenated(&self, reader: &mut WireReader<'_>) -> Result<Value<'a>, DecodeError> {
        let mut builder = MessageBuilder::new(self.schema, self.root, None);
        let mut previous = None;

        while reader.has_remaining() {
            let (number, _) = reader
                .peek_tag()
                .map_err(|err| DecodeError::from_wire(err, None))?;

            if let Some(previous) = previous {
                if starts_new_record(builder.def(), previous, number) {
                    break;
                }
            }

            builder.read_field(reader)?;
            if builder.def().index_of_number(number).is_some() {
                previous = Some(number);
            }
        }

        Ok(builder.finish())
    }
}

/// Serializers write fields in ascending field-number order, so a known
/// field number going backwards, or a non-repeated field showing up again,
/// opens the next record. Unknown fields never open a record and do not take
/// part in the ordering.
fn starts_new_record(def: &MessageDef, previous: u32, next: u32) -> bool {
    match def.field_by_number(next) {
        Some(field) => next < previous || (next == previous && !field.repeated),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::WireError,
        schema::{FieldDef, FieldType},
        wire::{WireType, WireWriter},
    };

    fn schema() -> Schema {
        Schema::new(
            vec![MessageDef::new(
                "Row",
                vec![
                    FieldDef::new(1, "id", FieldType::Int32, false),
                    FieldDef::new(2, "name", FieldType::String, false),
                    FieldDef::new(3, "tags", FieldType::String, true),
                ],
            )],
            vec![],
        )
    }

    fn row(writer: &mut WireWriter, id: u64, name: &str, tags: &[&str]) {
        writer.write_tag(1, WireType::Varint);
        writer.write_var_uint64(id);
        writer.write_tag(2, WireType::LengthDelimited);
        writer.write_length_delimited(name.as_bytes());
        for tag in tags {
            writer.write_tag(3, WireType::LengthDelimited);
            writer.write_length_delimited(tag.as_bytes());
        }
    }

    fn decode_all<'a>(decoder: &RecordDecoder<'a>, bytes: &[u8]) -> Result<Vec<Value<'a>>, DecodeError> {
        let mut reader = WireReader::new(bytes);
        let mut records = Vec::new();
        while let Some(record) = decoder.decode_one(&mut reader)? {
            records.push(record);
        }
        Ok(records)
    }

    #[test]
    fn empty_input_is_end_of_stream() {
        let schema = schema();
        let decoder = RecordDecoder::new(&schema, 0);
        assert_eq!(decoder.decode_one(&mut WireReader::new(&[])), Ok(None));
        let decoder = decoder.with_framing(Framing::Delimited);
        assert_eq!(decoder.decode_one(&mut WireReader::new(&[])), Ok(None));
    }

    #[test]
    fn concatenated_records_split_on_descending_numbers() {
        let schema = schema();
        let mut writer = WireWriter::new();
        row(&mut writer, 1, "a", &["x", "y"]);
        row(&mut writer, 2, "b", &["z"]);

        let records = decode_all(&RecordDecoder::new(&schema, 0), &writer.data()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(format!("{:?}", records[0]), "Row {id: 1, name: \"a\", tags: [\"x\", \"y\"]}");
        assert_eq!(format!("{:?}", records[1]), "Row {id: 2, name: \"b\", tags: [\"z\"]}");
    }

    #[test]
    fn concatenated_records_split_on_repeated_singular_field() {
        let schema = schema();
        // {id: 1} {id: 2}
        let records = decode_all(&RecordDecoder::new(&schema, 0), &[0x08, 0x01, 0x08, 0x02]).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("id"), Some(&Value::Int32(2)));
    }

    #[test]
    fn unknown_fields_do_not_split_records() {
        let schema = schema();
        // {1: 1, 99: 5, 99: 6, 2: "a"}
        let bytes = [0x08, 0x01, 0x98, 0x06, 0x05, 0x98, 0x06, 0x06, 0x12, 0x01, b'a'];
        let records = decode_all(&RecordDecoder::new(&schema, 0), &bytes).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("name").map(|v| v.as_str()), Some("a"));
    }

    #[test]
    fn delimited_records() {
        let schema = schema();
        let mut first = WireWriter::new();
        row(&mut first, 1, "a", &[]);
        let mut second = WireWriter::new();
        // Field order inside a delimited message does not matter.
        second.write_tag(2, WireType::LengthDelimited);
        second.write_length_delimited(b"b");
        second.write_tag(1, WireType::Varint);
        second.write_var_uint64(2);

        let mut writer = WireWriter::new();
        writer.write_length_delimited(&first.data());
        writer.write_length_delimited(&second.data());

        let decoder = RecordDecoder::new(&schema, 0).with_framing(Framing::Delimited);
        let records = decode_all(&decoder, &writer.data()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(format!("{:?}", records[1]), "Row {id: 2, name: \"b\"}");
    }

    #[test]
    fn truncated_field_is_an_error() {
        let schema = schema();
        let decoder = RecordDecoder::new(&schema, 0);
        let mut reader = WireReader::new(&[0x08, 0x01, 0x12, 0x05, b'a']);
        assert_eq!(
            decoder.decode_one(&mut reader),
            Err(DecodeError::Truncated { offset: 3, field: Some(2) })
        );
    }

    #[test]
    fn truncated_delimited_message_is_an_error() {
        let schema = schema();
        let decoder = RecordDecoder::new(&schema, 0).with_framing(Framing::Delimited);
        let mut reader = WireReader::new(&[0x04, 0x08, 0x01]);
        assert_eq!(
            decoder.decode_one(&mut reader),
            Err(DecodeError::from_wire(WireError::Truncated { offset: 0 }, None))
        );
    }
}

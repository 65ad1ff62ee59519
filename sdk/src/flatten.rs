use base64::{engine::general_purpose::STANDARD, Engine as _};
use protoflat_schema::{DecodeError, FieldType, MessageId, Schema, Value};

/// One output row, one cell per header column.
pub type Row = Vec<String>;

/// How one schema field expands into columns.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeKind {
    /// A single column.
    Scalar,
    /// The columns of a nested message, prefixed with the field name.
    Message(Vec<FieldShape>),
    /// `count` groups of `element` columns named `field[i]`.
    Repeated { count: usize, element: Box<ShapeKind> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldShape {
    pub name:  String,
    pub kind:  ShapeKind,
}

/// The column layout of a run, fixed by the first record.
///
/// Every field of the root message yields columns whether or not the first
/// record sets it. Nested messages expand to dotted columns. A repeated field
/// expands to as many indexed columns as the first record has elements, so a
/// later record with more elements cannot be flattened.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    fields:  Vec<FieldShape>,
    columns: Vec<String>,
}

impl Header {
    pub fn derive(schema: &Schema, root: MessageId, record: &Value<'_>) -> Header {
        let fields = derive_fields(schema, root, &[record]);
        let mut columns = Vec::new();
        push_columns(&mut columns, "", &fields);
        Header { fields, columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn fields(&self) -> &[FieldShape] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Renders `record` into exactly [len](#method.len) cells. Absent values
    /// become empty cells.
    pub fn flatten(&self, record: &Value<'_>) -> Result<Row, DecodeError> {
        let mut row = Vec::with_capacity(self.columns.len());
        push_cells(&mut row, "", &self.fields, Some(record))?;
        Ok(row)
    }
}

/// Derives the shapes of the fields of `message` from every instance of it in
/// `records`. Repetition counts are the maximum over all instances.
fn derive_fields(schema: &Schema, message: MessageId, records: &[&Value<'_>]) -> Vec<FieldShape> {
    schema
        .message(message)
        .fields
        .iter()
        .map(|field| {
            let present: Vec<&Value> = records
                .iter()
                .filter_map(|record| record.get(&field.name))
                .collect();

            let single = |values: &[&Value]| match field.field_type {
                FieldType::Message(nested) => ShapeKind::Message(derive_fields(schema, nested, values)),
                _ => ShapeKind::Scalar,
            };

            let kind = if field.repeated {
                let count = present.iter().map(|list| list.len()).max().unwrap_or(0);
                let elements: Vec<&Value> = present.iter().flat_map(|list| list.as_list()).collect();
                ShapeKind::Repeated {
                    count,
                    element: Box::new(single(&elements)),
                }
            } else {
                single(&present)
            };

            FieldShape {
                name: field.name.clone(),
                kind,
            }
        })
        .collect()
}

fn column_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn push_columns(columns: &mut Vec<String>, prefix: &str, fields: &[FieldShape]) {
    for field in fields {
        let name = column_name(prefix, &field.name);
        match field.kind {
            ShapeKind::Scalar => columns.push(name),
            ShapeKind::Message(ref nested) => push_columns(columns, &name, nested),
            ShapeKind::Repeated { count, ref element } => {
                for i in 0..count {
                    let item = format!("{}[{}]", name, i);
                    match **element {
                        ShapeKind::Message(ref nested) => push_columns(columns, &item, nested),
                        _ => columns.push(item),
                    }
                }
            }
        }
    }
}

fn push_cells(
    row: &mut Row,
    prefix: &str,
    fields: &[FieldShape],
    record: Option<&Value<'_>>,
) -> Result<(), DecodeError> {
    for field in fields {
        let value = record.and_then(|record| record.get(&field.name));
        match field.kind {
            ShapeKind::Scalar => row.push(value.map(render_cell).unwrap_or_default()),
            ShapeKind::Message(ref nested) => {
                push_cells(row, &column_name(prefix, &field.name), nested, value)?
            }
            ShapeKind::Repeated { count, ref element } => {
                let items = value.map(|list| list.as_list()).unwrap_or(&[]);
                if items.len() > count {
                    return Err(DecodeError::UnexpectedShape {
                        column:  column_name(prefix, &field.name),
                        allowed: count,
                        found:   items.len(),
                    });
                }

                for i in 0..count {
                    let item = items.get(i);
                    match **element {
                        ShapeKind::Message(ref nested) => {
                            let name = format!("{}[{}]", column_name(prefix, &field.name), i);
                            push_cells(row, &name, nested, item)?
                        }
                        _ => row.push(item.map(render_cell).unwrap_or_default()),
                    }
                }
            }
        }
    }
    Ok(())
}

/// Text of a single scalar cell.
pub fn render_cell(value: &Value<'_>) -> String {
    match *value {
        Value::Bool(value) => value.to_string(),
        Value::Int32(value) => value.to_string(),
        Value::Int64(value) => value.to_string(),
        Value::UInt32(value) => value.to_string(),
        Value::UInt64(value) => value.to_string(),
        Value::Float(value) => value.to_string(),
        Value::Double(value) => value.to_string(),
        Value::String(ref value) => value.clone(),
        Value::Bytes(ref value) => STANDARD.encode(value),
        Value::Enum(_, Some(name)) => name.to_owned(),
        Value::Enum(number, None) => number.to_string(),
        Value::List(_) | Value::Record(..) => format!("{:?}", value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protoflat_schema::{EnumDef, EnumValue, FieldDef, MessageDef};

    fn schema() -> Schema {
        Schema::new(
            vec![
                MessageDef::new(
                    "Order",
                    vec![
                        FieldDef::new(1, "id", FieldType::Int64, false),
                        FieldDef::new(2, "customer", FieldType::Message(1), false),
                        FieldDef::new(3, "lines", FieldType::Message(2), true),
                        FieldDef::new(4, "status", FieldType::Enum(0), false),
                    ],
                ),
                MessageDef::new(
                    "Customer",
                    vec![
                        FieldDef::new(1, "name", FieldType::String, false),
                        FieldDef::new(2, "avatar", FieldType::Bytes, false),
                    ],
                ),
                MessageDef::new(
                    "Line",
                    vec![
                        FieldDef::new(1, "sku", FieldType::String, false),
                        FieldDef::new(2, "notes", FieldType::String, true),
                    ],
                ),
            ],
            vec![EnumDef::new(
                "Status",
                vec![EnumValue { name: "OPEN".to_owned(), number: 0 }],
            )],
        )
    }

    fn line(sku: &str, notes: &[&str]) -> Value<'static> {
        let mut fields = vec![("sku", Value::String(sku.to_owned()))];
        if !notes.is_empty() {
            let notes = notes.iter().map(|note| Value::String(note.to_string())).collect();
            fields.push(("notes", Value::List(notes)));
        }
        Value::Record("Line", fields)
    }

    #[test]
    fn nested_and_repeated_columns() {
        let schema = schema();
        let record = Value::Record(
            "Order",
            vec![
                ("id", Value::Int64(7)),
                ("lines", Value::List(vec![line("a", &["x"]), line("b", &["y", "z"])])),
            ],
        );

        let header = Header::derive(&schema, 0, &record);
        assert_eq!(
            header.columns(),
            [
                "id",
                "customer.name",
                "customer.avatar",
                "lines[0].sku",
                "lines[0].notes[0]",
                "lines[0].notes[1]",
                "lines[1].sku",
                "lines[1].notes[0]",
                "lines[1].notes[1]",
                "status",
            ]
        );
        assert_eq!(
            header.flatten(&record).unwrap(),
            ["7", "", "", "a", "x", "", "b", "y", "z", ""]
        );
    }

    #[test]
    fn absent_repeated_field_has_no_columns() {
        let schema = schema();
        let first = Value::Record("Order", vec![("id", Value::Int64(1))]);
        let header = Header::derive(&schema, 0, &first);
        assert_eq!(header.len(), 4);
        assert!(!header.columns().iter().any(|column| column.starts_with("lines")));

        let second = Value::Record("Order", vec![("lines", Value::List(vec![line("a", &[])]))]);
        assert_eq!(
            header.flatten(&second),
            Err(DecodeError::UnexpectedShape {
                column:  "lines".to_owned(),
                allowed: 0,
                found:   1,
            })
        );
    }

    #[test]
    fn nested_repetition_overflow_names_the_column() {
        let schema = schema();
        let first = Value::Record("Order", vec![("lines", Value::List(vec![line("a", &["x"])]))]);
        let header = Header::derive(&schema, 0, &first);

        let second = Value::Record("Order", vec![("lines", Value::List(vec![line("a", &["x", "y"])]))]);
        assert_eq!(
            header.flatten(&second),
            Err(DecodeError::UnexpectedShape {
                column:  "lines[0].notes".to_owned(),
                allowed: 1,
                found:   2,
            })
        );
    }

    #[test]
    fn cells() {
        assert_eq!(render_cell(&Value::Bool(true)), "true");
        assert_eq!(render_cell(&Value::Int32(-5)), "-5");
        assert_eq!(render_cell(&Value::UInt64(u64::MAX)), "18446744073709551615");
        assert_eq!(render_cell(&Value::Double(0.1)), "0.1");
        assert_eq!(render_cell(&Value::Float(1.5)), "1.5");
        assert_eq!(render_cell(&Value::Double(f64::NAN)), "NaN");
        assert_eq!(render_cell(&Value::Double(f64::NEG_INFINITY)), "-inf");
        assert_eq!(render_cell(&Value::Bytes(vec![0, 1, 2, 255])), "AAEC/w==");
        assert_eq!(render_cell(&Value::Enum(0, Some("OPEN"))), "OPEN");
        assert_eq!(render_cell(&Value::Enum(9, None)), "9");
        assert_eq!(render_cell(&Value::String("a,b".to_owned())), "a,b");
    }

    #[test]
    fn rows_match_header_width() {
        let schema = schema();
        let first = Value::Record(
            "Order",
            vec![
                ("customer", Value::Record("Customer", vec![("name", Value::String("Ann".to_owned()))])),
                ("status", Value::Enum(0, Some("OPEN"))),
            ],
        );
        let header = Header::derive(&schema, 0, &first);
        let empty = Value::Record("Order", vec![]);
        assert_eq!(header.flatten(&first).unwrap(), ["", "Ann", "", "OPEN"]);
        assert_eq!(header.flatten(&empty).unwrap().len(), header.len());
    }
}

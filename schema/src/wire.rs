use std::fmt;

use crate::error::WireError;

/// Varints never take more than ten bytes to hold 64 bits.
pub const MAX_VARINT_LEN: usize = 10;

/// The largest field number a tag may carry.
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

/// How a field's value is physically laid out after its tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    StartGroup,
    EndGroup,
    Fixed32,
}

impl WireType {
    /// Maps the low three bits of a tag to a wire type.
    pub fn from_id(id: u8) -> Option<WireType> {
        match id {
            0 => Some(WireType::Varint),
            1 => Some(WireType::Fixed64),
            2 => Some(WireType::LengthDelimited),
            3 => Some(WireType::StartGroup),
            4 => Some(WireType::EndGroup),
            5 => Some(WireType::Fixed32),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        match self {
            WireType::Varint => 0,
            WireType::Fixed64 => 1,
            WireType::LengthDelimited => 2,
            WireType::StartGroup => 3,
            WireType::EndGroup => 4,
            WireType::Fixed32 => 5,
        }
    }
}

impl fmt::Display for WireType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            WireType::Varint => "varint",
            WireType::Fixed64 => "fixed64",
            WireType::LengthDelimited => "length-delimited",
            WireType::StartGroup => "start-group",
            WireType::EndGroup => "end-group",
            WireType::Fixed32 => "fixed32",
        };
        f.write_str(name)
    }
}

/// Maps a signed integer onto an unsigned one so that small magnitudes stay
/// small: 0 -> 0, -1 -> 1, 1 -> 2, -2 -> 3, ...
pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

/// Inverse of [zigzag_encode].
pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// A cursor over protobuf wire data meant for reading.
///
/// Every read either succeeds and advances the cursor by exactly the bytes it
/// consumed, or fails and leaves the cursor where it was.
///
/// Example usage:
///
/// ```
/// use protoflat_schema::{WireReader, WireType};
///
/// let mut reader = WireReader::new(&[0x08, 0x96, 0x01, 0x12, 0x02, b'h', b'i']);
/// assert_eq!(reader.read_tag(), Ok((1, WireType::Varint)));
/// assert_eq!(reader.read_var_uint64(), Ok(150));
/// assert_eq!(reader.read_tag(), Ok((2, WireType::LengthDelimited)));
/// assert_eq!(reader.read_length_delimited(), Ok(&b"hi"[..]));
/// assert!(!reader.has_remaining());
/// ```
///
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    data:  &'a [u8],
    index: usize,
    base:  usize,
}

impl<'a> WireReader<'a> {
    /// Create a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> WireReader<'a> {
        WireReader { data, index: 0, base: 0 }
    }

    /// Create a reader over `data` that was found at byte `base` of a larger
    /// input, so reported offsets stay absolute.
    pub fn at_offset(data: &'a [u8], base: usize) -> WireReader<'a> {
        WireReader { data, index: 0, base }
    }

    /// Retrieves the underlying byte slice.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Retrieves the cursor position relative to the start of `data()`.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Retrieves the cursor position relative to the outermost input. Readers
    /// created by [read_message](#method.read_message) report offsets in the
    /// coordinates of the reader they were sliced from.
    pub fn offset(&self) -> usize {
        self.base + self.index
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.index
    }

    pub fn has_remaining(&self) -> bool {
        self.index < self.data.len()
    }

    /// Decodes a varint starting at `start` without moving the cursor.
    /// Returns the value and the number of bytes it occupies.
    fn scan_varint(&self, start: usize) -> Result<(u64, usize), WireError> {
        let mut result: u64 = 0;

        for i in 0..MAX_VARINT_LEN {
            let byte = match self.data.get(start + i) {
                Some(&byte) => byte,
                None => return Err(WireError::Truncated { offset: self.base + start }),
            };

            // Bits past the 64th in the tenth byte are dropped.
            result |= ((byte & 0x7F) as u64).wrapping_shl(7 * i as u32);

            if byte & 0x80 == 0 {
                return Ok((result, i + 1));
            }
        }

        Err(WireError::MalformedVarint { offset: self.base + start })
    }

    /// Try to read a base-128 varint starting at the current index.
    pub fn read_var_uint64(&mut self) -> Result<u64, WireError> {
        let (value, len) = self.scan_varint(self.index)?;
        self.index += len;
        Ok(value)
    }

    /// Try to read a zig-zag encoded varint starting at the current index.
    pub fn read_var_sint64(&mut self) -> Result<i64, WireError> {
        Ok(zigzag_decode(self.read_var_uint64()?))
    }

    /// Try to read `len` raw bytes starting at the current index.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if len > self.remaining() {
            Err(WireError::Truncated { offset: self.offset() })
        } else {
            let value = &self.data[self.index..self.index + len];
            self.index += len;
            Ok(value)
        }
    }

    /// Try to read a little-endian 32-bit value starting at the current index.
    pub fn read_fixed32(&mut self) -> Result<u32, WireError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Try to read a little-endian 64-bit value starting at the current index.
    pub fn read_fixed64(&mut self) -> Result<u64, WireError> {
        let bytes = self.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Try to read a varint length prefix followed by that many bytes. The
    /// returned slice aliases the underlying memory.
    pub fn read_length_delimited(&mut self) -> Result<&'a [u8], WireError> {
        let start = self.index;
        let (len, prefix) = self.scan_varint(start)?;
        let begin = start + prefix;
        let available = (self.data.len() - begin) as u64;

        if len > available {
            return Err(WireError::Truncated { offset: self.base + start });
        }

        let end = begin + len as usize;
        self.index = end;
        Ok(&self.data[begin..end])
    }

    /// Like [read_length_delimited](#method.read_length_delimited) but
    /// returns a reader over the payload that keeps reporting absolute
    /// offsets.
    pub fn read_message(&mut self) -> Result<WireReader<'a>, WireError> {
        let start = self.index;
        let payload = self.read_length_delimited()?;
        let prefix = self.index - start - payload.len();

        Ok(WireReader {
            data:  payload,
            index: 0,
            base:  self.base + start + prefix,
        })
    }

    fn split_tag(&self, tag: u64, offset: usize) -> Result<(u32, WireType), WireError> {
        let number = tag >> 3;
        if number == 0 || number > MAX_FIELD_NUMBER as u64 {
            return Err(WireError::InvalidFieldNumber { offset, number });
        }

        let wire_type = (tag & 0x7) as u8;
        match WireType::from_id(wire_type) {
            Some(wire_type) => Ok((number as u32, wire_type)),
            None => Err(WireError::InvalidWireType { offset, wire_type }),
        }
    }

    /// Try to read a field tag, splitting it into field number and wire type.
    pub fn read_tag(&mut self) -> Result<(u32, WireType), WireError> {
        let offset = self.offset();
        let (tag, len) = self.scan_varint(self.index)?;
        let split = self.split_tag(tag, offset)?;
        self.index += len;
        Ok(split)
    }

    /// Decodes the next tag without moving the cursor.
    pub fn peek_tag(&self) -> Result<(u32, WireType), WireError> {
        let (tag, _) = self.scan_varint(self.index)?;
        self.split_tag(tag, self.offset())
    }

    /// Skips over the value of a field whose tag has already been read.
    /// On failure the cursor is restored to where it was before the call.
    pub fn skip_field(&mut self, number: u32, wire_type: WireType) -> Result<(), WireError> {
        let start = self.index;
        let result = self.skip_value(number, wire_type);
        if result.is_err() {
            self.index = start;
        }
        result
    }

    fn skip_value(&mut self, number: u32, wire_type: WireType) -> Result<(), WireError> {
        match wire_type {
            WireType::Varint => self.read_var_uint64().map(|_| ()),
            WireType::Fixed64 => self.read_bytes(8).map(|_| ()),
            WireType::Fixed32 => self.read_bytes(4).map(|_| ()),
            WireType::LengthDelimited => self.read_length_delimited().map(|_| ()),
            WireType::StartGroup => self.skip_group(number),
            WireType::EndGroup => Err(WireError::UnexpectedEndGroup {
                offset: self.offset(),
                field:  number,
            }),
        }
    }

    /// Skips to the end-group tag matching `number`. Nested groups are tracked
    /// on an explicit stack, so nesting depth is bounded only by the input.
    fn skip_group(&mut self, number: u32) -> Result<(), WireError> {
        let mut open = vec![number];

        while let Some(&current) = open.last() {
            let offset = self.offset();
            let (inner, inner_type) = self.read_tag()?;
            match inner_type {
                WireType::StartGroup => open.push(inner),
                WireType::EndGroup if inner == current => {
                    open.pop();
                }
                WireType::EndGroup => return Err(WireError::UnexpectedEndGroup { offset, field: inner }),
                _ => self.skip_value(inner, inner_type)?,
            }
        }

        Ok(())
    }
}

#[test]
fn read_var_uint64() {
    let read = |bytes| WireReader::new(bytes).read_var_uint64();
    assert_eq!(read(&[]), Err(WireError::Truncated { offset: 0 }));
    assert_eq!(read(&[0]), Ok(0));
    assert_eq!(read(&[1]), Ok(1));
    assert_eq!(read(&[127]), Ok(127));
    assert_eq!(read(&[128]), Err(WireError::Truncated { offset: 0 }));
    assert_eq!(read(&[128, 1]), Ok(128));
    assert_eq!(read(&[150, 1]), Ok(150));
    assert_eq!(read(&[129, 2]), Ok(257));
    assert_eq!(read(&[254, 255, 7]), Ok(131070));
    assert_eq!(read(&[255, 255, 255, 255, 15]), Ok(4294967295));
    assert_eq!(
        read(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x7F]),
        Ok(0x7FFF_FFFF_FFFF_FFFF)
    );
    assert_eq!(
        read(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]),
        Ok(u64::MAX)
    );
}

#[test]
fn read_var_uint64_rejects_eleventh_byte() {
    let mut bytes = [0xFF; 11];
    bytes[10] = 0x01;
    let mut reader = WireReader::new(&bytes);
    assert_eq!(
        reader.read_var_uint64(),
        Err(WireError::MalformedVarint { offset: 0 })
    );
    assert_eq!(reader.index(), 0);
}

#[test]
fn failed_reads_do_not_move_the_cursor() {
    let mut reader = WireReader::new(&[0x05, 0x96]);
    assert_eq!(reader.read_var_uint64(), Ok(5));
    assert_eq!(reader.read_var_uint64(), Err(WireError::Truncated { offset: 1 }));
    assert_eq!(reader.index(), 1);
    assert_eq!(reader.read_fixed32(), Err(WireError::Truncated { offset: 1 }));
    assert_eq!(reader.read_length_delimited(), Err(WireError::Truncated { offset: 1 }));
    assert_eq!(reader.index(), 1);
}

#[test]
fn read_fixed() {
    let mut reader = WireReader::new(&[
        0x01, 0x02, 0x03, 0x04, 0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01,
    ]);
    assert_eq!(reader.read_fixed32(), Ok(0x0403_0201));
    assert_eq!(reader.read_fixed64(), Ok(0x0102_0304_0506_0708));
    assert_eq!(reader.read_fixed32(), Err(WireError::Truncated { offset: 12 }));
}

#[test]
fn read_length_delimited() {
    let read = |bytes| WireReader::new(bytes).read_length_delimited();
    assert_eq!(read(&[0]), Ok(&[][..]));
    assert_eq!(read(&[2, 7, 8]), Ok(&[7, 8][..]));
    assert_eq!(read(&[3, 7, 8]), Err(WireError::Truncated { offset: 0 }));
    assert_eq!(read(&[]), Err(WireError::Truncated { offset: 0 }));
}

#[test]
fn nested_readers_report_absolute_offsets() {
    let mut reader = WireReader::new(&[0xAA, 0x03, 0x08, 0x96, 0x01]);
    assert_eq!(reader.read_bytes(1), Ok(&[0xAA][..]));
    let mut nested = reader.read_message().unwrap();
    assert_eq!(nested.offset(), 2);
    assert_eq!(nested.read_tag(), Ok((1, WireType::Varint)));
    assert_eq!(nested.offset(), 3);
    assert_eq!(nested.read_var_uint64(), Ok(150));
    assert!(!nested.has_remaining());
    assert!(!reader.has_remaining());
}

#[test]
fn read_tag() {
    let read = |bytes| WireReader::new(bytes).read_tag();
    assert_eq!(read(&[0x08]), Ok((1, WireType::Varint)));
    assert_eq!(read(&[0x11]), Ok((2, WireType::Fixed64)));
    assert_eq!(read(&[0x1A]), Ok((3, WireType::LengthDelimited)));
    assert_eq!(read(&[0x25]), Ok((4, WireType::Fixed32)));
    assert_eq!(read(&[0x98, 0x06]), Ok((99, WireType::Varint)));
    assert_eq!(read(&[0x00]), Err(WireError::InvalidFieldNumber { offset: 0, number: 0 }));
    assert_eq!(read(&[0x0E]), Err(WireError::InvalidWireType { offset: 0, wire_type: 6 }));
}

#[test]
fn peek_tag_does_not_advance() {
    let reader = WireReader::new(&[0x10, 0x01]);
    assert_eq!(reader.peek_tag(), Ok((2, WireType::Varint)));
    assert_eq!(reader.index(), 0);
}

#[test]
fn skip_field() {
    let mut reader = WireReader::new(&[
        0x96, 0x01, // varint
        1, 2, 3, 4, // fixed32
        1, 2, 3, 4, 5, 6, 7, 8, // fixed64
        2, 9, 9, // length-delimited
        0x08, 0x01, 0x0C, // group 1 { field 1 = 1 }
        0x2A,
    ]);
    reader.skip_field(1, WireType::Varint).unwrap();
    reader.skip_field(1, WireType::Fixed32).unwrap();
    reader.skip_field(1, WireType::Fixed64).unwrap();
    reader.skip_field(1, WireType::LengthDelimited).unwrap();
    reader.skip_field(1, WireType::StartGroup).unwrap();
    assert_eq!(reader.remaining(), 1);
}

#[test]
fn skip_field_restores_cursor_on_failure() {
    // A group that never ends.
    let mut reader = WireReader::new(&[0x08, 0x01, 0x10]);
    assert_eq!(
        reader.skip_field(5, WireType::StartGroup),
        Err(WireError::Truncated { offset: 3 })
    );
    assert_eq!(reader.index(), 0);

    let mut reader = WireReader::new(&[0x14]);
    assert_eq!(
        reader.skip_field(1, WireType::StartGroup),
        Err(WireError::UnexpectedEndGroup { offset: 0, field: 2 })
    );
    assert_eq!(reader.index(), 0);
}

#[test]
fn skip_deeply_nested_groups() {
    // 200k start-group tags for field 15 that are never closed.
    let bytes = vec![0x7B; 200_000];
    let mut reader = WireReader::new(&bytes);
    assert_eq!(reader.read_tag(), Ok((15, WireType::StartGroup)));
    assert_eq!(
        reader.skip_field(15, WireType::StartGroup),
        Err(WireError::Truncated { offset: 200_000 })
    );
    assert_eq!(reader.index(), 1);

    // The same depth closed properly is skipped in full.
    let mut bytes = vec![0x7B; 1000];
    bytes.extend(std::iter::repeat(0x7C).take(1000));
    bytes.extend([0x08, 0x01]);
    let mut reader = WireReader::new(&bytes);
    reader.read_tag().unwrap();
    reader.skip_field(15, WireType::StartGroup).unwrap();
    assert_eq!(reader.index(), 2000);
    assert_eq!(reader.read_tag(), Ok((1, WireType::Varint)));
}

#[test]
fn zigzag() {
    assert_eq!(zigzag_encode(0), 0);
    assert_eq!(zigzag_encode(-1), 1);
    assert_eq!(zigzag_encode(1), 2);
    assert_eq!(zigzag_encode(-2), 3);
    assert_eq!(zigzag_encode(i64::MAX), u64::MAX - 1);
    assert_eq!(zigzag_encode(i64::MIN), u64::MAX);
    assert_eq!(zigzag_decode(3), -2);
    assert_eq!(zigzag_decode(u64::MAX), i64::MIN);
}

/// A protobuf wire buffer meant for writing. protoflat only reads the wire
/// format; the writer exists to build fixtures for tests and examples.
///
/// Example usage:
///
/// ```
/// use protoflat_schema::{WireType, WireWriter};
///
/// let mut writer = WireWriter::new();
/// writer.write_tag(1, WireType::Varint);
/// writer.write_var_uint64(150);
/// assert_eq!(writer.data(), [0x08, 0x96, 0x01]);
/// ```
///
#[derive(Debug, Default)]
pub struct WireWriter {
    data: Vec<u8>,
}

impl WireWriter {
    /// Creates an empty WireWriter ready for writing.
    pub fn new() -> WireWriter {
        WireWriter { data: vec![] }
    }

    /// Consumes this buffer and returns the underlying backing store.
    pub fn data(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn write_bytes(&mut self, value: &[u8]) {
        self.data.extend_from_slice(value);
    }

    pub fn write_var_uint64(&mut self, mut value: u64) {
        while value > 127 {
            self.data.push((value as u8 & 127) | 128);
            value >>= 7;
        }
        self.data.push(value as u8);
    }

    pub fn write_var_sint64(&mut self, value: i64) {
        self.write_var_uint64(zigzag_encode(value));
    }

    pub fn write_tag(&mut self, number: u32, wire_type: WireType) {
        self.write_var_uint64(((number as u64) << 3) | wire_type.id() as u64);
    }

    pub fn write_fixed32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_fixed64(&mut self, value: u64) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a varint length prefix followed by `value`.
    pub fn write_length_delimited(&mut self, value: &[u8]) {
        self.write_var_uint64(value.len() as u64);
        self.data.extend_from_slice(value);
    }
}

#[cfg(test)]
fn write_once(cb: fn(&mut WireWriter)) -> Vec<u8> {
    let mut writer = WireWriter::new();
    cb(&mut writer);
    writer.data()
}

#[test]
fn write_var_uint64() {
    assert_eq!(write_once(|w| w.write_var_uint64(0)), [0]);
    assert_eq!(write_once(|w| w.write_var_uint64(127)), [127]);
    assert_eq!(write_once(|w| w.write_var_uint64(128)), [128, 1]);
    assert_eq!(write_once(|w| w.write_var_uint64(150)), [150, 1]);
    assert_eq!(
        write_once(|w| w.write_var_uint64(u64::MAX)),
        [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]
    );
}

#[test]
fn write_fields() {
    let mut writer = WireWriter::new();
    writer.write_tag(2, WireType::LengthDelimited);
    writer.write_length_delimited(b"abc");
    writer.write_tag(3, WireType::Fixed32);
    writer.write_fixed32(1);
    writer.write_tag(1, WireType::Varint);
    writer.write_var_sint64(-2);
    assert_eq!(
        writer.data(),
        [0x12, 3, b'a', b'b', b'c', 0x1D, 1, 0, 0, 0, 0x08, 3]
    );
}

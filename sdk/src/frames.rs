use std::io::{self, BufRead, Read};

use protoflat_schema::{WireError, WireReader, MAX_VARINT_LEN};

#[derive(Debug)]
pub(crate) enum FrameError {
    Io(io::Error),
    Wire(WireError),
}

impl From<io::Error> for FrameError {
    fn from(err: io::Error) -> Self {
        FrameError::Io(err)
    }
}

/// Pulls varint-length-prefixed messages from a buffered input one at a time.
/// Only the current message is held in memory.
pub(crate) struct DelimitedFrames<R> {
    inner:    R,
    position: usize,
    buf:      Vec<u8>,
}

impl<R: BufRead> DelimitedFrames<R> {
    pub(crate) fn new(inner: R) -> DelimitedFrames<R> {
        DelimitedFrames {
            inner,
            position: 0,
            buf: Vec::new(),
        }
    }

    /// Bytes consumed from the input so far.
    pub(crate) fn position(&self) -> usize {
        self.position
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = self.inner.fill_buf()?.first().copied();
        if byte.is_some() {
            self.inner.consume(1);
            self.position += 1;
        }
        Ok(byte)
    }

    /// `Ok(None)` when the input ends before the first byte of a prefix.
    fn read_length(&mut self) -> Result<Option<u64>, FrameError> {
        let start = self.position;
        let mut result: u64 = 0;

        for i in 0..MAX_VARINT_LEN {
            let byte = match self.read_byte()? {
                Some(byte) => byte,
                None if i == 0 => return Ok(None),
                None => return Err(FrameError::Wire(WireError::Truncated { offset: start })),
            };

            result |= ((byte & 0x7F) as u64).wrapping_shl(7 * i as u32);

            if byte & 0x80 == 0 {
                return Ok(Some(result));
            }
        }

        Err(FrameError::Wire(WireError::MalformedVarint { offset: start }))
    }

    /// Reads the next message and returns a reader over its payload that
    /// reports offsets relative to the start of the input. Returns `Ok(None)`
    /// at end of input.
    pub(crate) fn next_frame(&mut self) -> Result<Option<WireReader<'_>>, FrameError> {
        let start = self.position;
        let len = match self.read_length()? {
            Some(len) => len,
            None => return Ok(None),
        };
        let base = self.position;

        // Grows with the bytes actually present, not the declared length.
        self.buf.clear();
        let read = (&mut self.inner).take(len).read_to_end(&mut self.buf)?;
        self.position += read;

        if (read as u64) < len {
            return Err(FrameError::Wire(WireError::Truncated { offset: start }));
        }

        Ok(Some(WireReader::at_offset(&self.buf, base)))
    }
}

use std::io::{BufRead, Read};

use protoflat_compiler::root_message;
use protoflat_schema::{DecodeError, Framing, RecordDecoder, Schema, Value, WireReader};
use tracing::{debug, info};

use crate::{
    error::PipelineError,
    flatten::Header,
    frames::{DelimitedFrames, FrameError},
    sink::RowSink,
};

/// Library-level settings of a conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub framing: Framing,
    /// Message to decode records as; the first message of the schema when unset.
    pub message: Option<String>,
}

/// Decodes every top-level record of an input and forwards the flattened rows
/// to a [RowSink]. The header is derived from the first record and kept for
/// the rest of the run.
pub struct StreamPipeline<'a> {
    decoder: RecordDecoder<'a>,
    header:  Option<Header>,
    records: usize,
}

impl<'a> StreamPipeline<'a> {
    pub fn new(schema: &'a Schema, options: &PipelineOptions) -> Result<StreamPipeline<'a>, PipelineError> {
        let root = root_message(schema, options.message.as_deref())?;
        let decoder = RecordDecoder::new(schema, root).with_framing(options.framing);
        Ok(StreamPipeline::with_decoder(decoder))
    }

    pub fn with_decoder(decoder: RecordDecoder<'a>) -> StreamPipeline<'a> {
        StreamPipeline {
            decoder,
            header: None,
            records: 0,
        }
    }

    /// The header, once the first record has been decoded.
    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// Number of rows written so far.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Converts every record read from `input` and returns the number of rows
    /// written. Delimited input is pulled one message at a time. Concatenated
    /// input has no framing to split on, so it is read to the end first and
    /// handed to [run_bytes](#method.run_bytes).
    pub fn run<R: BufRead, S: RowSink>(&mut self, mut input: R, sink: &mut S) -> Result<usize, PipelineError> {
        match self.decoder.framing() {
            Framing::Concatenated => {
                let mut bytes = Vec::new();
                input.read_to_end(&mut bytes)?;
                self.run_bytes(&bytes, sink)
            }
            Framing::Delimited => {
                self.log_start(None);
                let result = self.drive_frames(DelimitedFrames::new(input), sink);
                self.finish(result, sink)
            }
        }
    }

    /// Converts every record in `bytes` and returns the number of rows
    /// written. Stops at the first error; rows already written stay written.
    /// The sink is flushed on every exit path.
    pub fn run_bytes<S: RowSink>(&mut self, bytes: &[u8], sink: &mut S) -> Result<usize, PipelineError> {
        self.log_start(Some(bytes.len()));
        let result = self.drive(bytes, sink);
        self.finish(result, sink)
    }

    fn log_start(&self, bytes: Option<usize>) {
        let schema = self.decoder.schema();
        info!(
            root = %schema.message(self.decoder.root()).name,
            framing = ?self.decoder.framing(),
            bytes,
            "converting records"
        );
    }

    fn finish<S: RowSink>(&self, result: Result<(), PipelineError>, sink: &mut S) -> Result<usize, PipelineError> {
        let flushed = sink.flush();
        result?;
        flushed?;

        info!(records = self.records, "conversion finished");
        Ok(self.records)
    }

    fn decode_error(&self, source: DecodeError) -> PipelineError {
        PipelineError::Decode {
            record: self.records,
            source,
        }
    }

    fn drive<S: RowSink>(&mut self, bytes: &[u8], sink: &mut S) -> Result<(), PipelineError> {
        let mut reader = WireReader::new(bytes);

        loop {
            let record = match self.decoder.decode_one(&mut reader) {
                Ok(Some(record)) => record,
                Ok(None) => return Ok(()),
                Err(source) => return Err(self.decode_error(source)),
            };
            debug!(record = self.records, offset = reader.offset(), "decoded {:?}", record);
            self.emit(record, sink)?;
        }
    }

    fn drive_frames<R: BufRead, S: RowSink>(
        &mut self,
        mut frames: DelimitedFrames<R>,
        sink: &mut S,
    ) -> Result<(), PipelineError> {
        let schema = self.decoder.schema();
        let root = self.decoder.root();

        loop {
            let decoded = match frames.next_frame() {
                Ok(Some(mut message)) => Value::decode_from(schema, root, &mut message),
                Ok(None) => return Ok(()),
                Err(FrameError::Io(err)) => return Err(PipelineError::Io(err)),
                Err(FrameError::Wire(err)) => Err(DecodeError::from_wire(err, None)),
            };
            let record = decoded.map_err(|source| self.decode_error(source))?;
            debug!(record = self.records, offset = frames.position(), "decoded {:?}", record);
            self.emit(record, sink)?;
        }
    }

    /// Flattens one record against the header, deriving the header from the
    /// first record, and writes the row.
    fn emit<S: RowSink>(&mut self, record: Value<'a>, sink: &mut S) -> Result<(), PipelineError> {
        let header = match self.header.take() {
            Some(header) => header,
            None => {
                let header = Header::derive(self.decoder.schema(), self.decoder.root(), &record);
                info!(columns = header.len(), "derived header from first record");
                sink.write_header(header.columns())?;
                header
            }
        };
        let row = header.flatten(&record);
        self.header = Some(header);

        let row = row.map_err(|source| self.decode_error(source))?;
        sink.write_row(&row)?;
        self.records += 1;
        Ok(())
    }
}

/// Converts every record of `input` with a fresh [StreamPipeline].
pub fn convert<R: BufRead, S: RowSink>(
    schema: &Schema,
    options: &PipelineOptions,
    input: R,
    sink: &mut S,
) -> Result<usize, PipelineError> {
    StreamPipeline::new(schema, options)?.run(input, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::SinkError, sink::VecSink};
    use protoflat_schema::{FieldDef, FieldType, MessageDef};

    fn schema() -> Schema {
        Schema::new(
            vec![MessageDef::new(
                "Reading",
                vec![
                    FieldDef::new(1, "sensor", FieldType::String, false),
                    FieldDef::new(2, "celsius", FieldType::Float, false),
                ],
            )],
            vec![],
        )
    }

    /// Counts flushes and fails rows after the first `limit`.
    #[derive(Default)]
    struct FlakySink {
        inner:   VecSink,
        limit:   usize,
        flushes: usize,
    }

    impl RowSink for FlakySink {
        fn write_header(&mut self, columns: &[String]) -> Result<(), SinkError> {
            self.inner.write_header(columns)
        }

        fn write_row(&mut self, row: &[String]) -> Result<(), SinkError> {
            if self.inner.rows.len() == self.limit {
                return Err(SinkError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")));
            }
            self.inner.write_row(row)
        }

        fn flush(&mut self) -> Result<(), SinkError> {
            self.flushes += 1;
            Ok(())
        }
    }

    // {sensor: "a", celsius: 1.5} {sensor: "b"}
    const TWO_READINGS: [u8; 11] = [0x0A, 0x01, b'a', 0x15, 0x00, 0x00, 0xC0, 0x3F, 0x0A, 0x01, b'b'];

    #[test]
    fn converts_all_records() {
        let schema = schema();
        let mut pipeline = StreamPipeline::new(&schema, &PipelineOptions::default()).unwrap();
        let mut sink = VecSink::new();

        assert_eq!(pipeline.run_bytes(&TWO_READINGS, &mut sink).unwrap(), 2);
        assert_eq!(sink.header, Some(vec!["sensor".to_owned(), "celsius".to_owned()]));
        assert_eq!(sink.rows, vec![vec!["a", "1.5"], vec!["b", ""]]);
        assert_eq!(pipeline.records(), 2);
        assert_eq!(pipeline.header().map(|h| h.len()), Some(2));
    }

    #[test]
    fn unknown_root_message_is_rejected() {
        let schema = schema();
        let options = PipelineOptions {
            message: Some("Missing".to_owned()),
            ..PipelineOptions::default()
        };
        assert!(matches!(
            StreamPipeline::new(&schema, &options),
            Err(PipelineError::Schema(_))
        ));
    }

    #[test]
    fn sink_errors_stop_the_run_and_still_flush() {
        let schema = schema();
        let mut pipeline = StreamPipeline::new(&schema, &PipelineOptions::default()).unwrap();
        let mut sink = FlakySink {
            limit: 1,
            ..FlakySink::default()
        };

        let err = pipeline.run_bytes(&TWO_READINGS, &mut sink).unwrap_err();
        assert!(matches!(err, PipelineError::Sink(SinkError::Io(_))), "{:?}", err);
        assert_eq!(sink.inner.rows.len(), 1);
        assert_eq!(sink.flushes, 1);
    }

    #[test]
    fn decode_errors_carry_the_record_index() {
        let schema = schema();
        let mut pipeline = StreamPipeline::new(&schema, &PipelineOptions::default()).unwrap();
        let mut sink = FlakySink {
            limit: usize::MAX,
            ..FlakySink::default()
        };

        // A valid record, then a string whose length runs past the input.
        let bytes = [0x0A, 0x01, b'a', 0x0A, 0x09, b'b'];
        let err = pipeline.run_bytes(&bytes, &mut sink).unwrap_err();
        match err {
            PipelineError::Decode { record, source } => {
                assert_eq!(record, 1);
                assert_eq!(source, DecodeError::Truncated { offset: 4, field: Some(1) });
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(sink.inner.rows, vec![vec!["a", ""]]);
        assert_eq!(sink.flushes, 1);
    }

    /// Hands out `data` and then fails, like a stream that drops mid-file.
    struct Interrupted<'a> {
        data: &'a [u8],
    }

    impl Read for Interrupted<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.data.is_empty() {
                return Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer went away"));
            }
            let len = buf.len().min(self.data.len());
            buf[..len].copy_from_slice(&self.data[..len]);
            self.data = &self.data[len..];
            Ok(len)
        }
    }

    fn delimited() -> PipelineOptions {
        PipelineOptions {
            framing: Framing::Delimited,
            ..PipelineOptions::default()
        }
    }

    #[test]
    fn delimited_input_is_streamed() {
        let schema = schema();
        let mut pipeline = StreamPipeline::new(&schema, &delimited()).unwrap();
        let mut sink = FlakySink {
            limit: usize::MAX,
            ..FlakySink::default()
        };

        // Rows decoded before the read error are already written.
        let input = Interrupted {
            data: &[0x03, 0x0A, 0x01, b'a', 0x00],
        };
        let err = pipeline.run(std::io::BufReader::new(input), &mut sink).unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)), "{:?}", err);
        assert_eq!(sink.inner.rows, vec![vec!["a", ""], vec!["", ""]]);
        assert_eq!(sink.flushes, 1);
    }

    #[test]
    fn truncated_frame_reports_its_offset() {
        let schema = schema();
        let mut pipeline = StreamPipeline::new(&schema, &delimited()).unwrap();
        let mut sink = VecSink::new();

        let bytes = [0x03, 0x0A, 0x01, b'a', 0x05, 0x0A, 0x01];
        match pipeline.run(&bytes[..], &mut sink).unwrap_err() {
            PipelineError::Decode { record, source } => {
                assert_eq!(record, 1);
                assert_eq!(source, DecodeError::Truncated { offset: 4, field: None });
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(sink.rows, vec![vec!["a", ""]]);

        // The same bytes decoded from memory fail the same way.
        let mut pipeline = StreamPipeline::new(&schema, &delimited()).unwrap();
        let err = pipeline.run_bytes(&bytes, &mut VecSink::new()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Decode {
                record: 1,
                source: DecodeError::Truncated { offset: 4, field: None },
            }
        ));
    }

    #[test]
    fn reads_from_any_reader() {
        let schema = schema();
        let mut sink = VecSink::new();
        let count = convert(&schema, &PipelineOptions::default(), &TWO_READINGS[..], &mut sink).unwrap();
        assert_eq!(count, 2);
    }
}

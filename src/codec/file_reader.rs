//! Reader for the Arrow IPC file envelope:
//!
//! ```text
//! "ARROW1" <pad to 8> <stream messages...> <EOS> <footer> <footer_len: i32 LE> "ARROW1"
//! ```
//!
//! Each stream message is `0xFFFFFFFF <metadata_len: i32 LE> <metadata> <body>`,
//! and a zero metadata length ends the stream. Record batches borrow their
//! buffers from the input slice, so they cannot outlive it.

use std::sync::{Arc, OnceLock};

use log::{debug, warn};

use crate::batch::RecordBatch;
use crate::codec::materialize::materialize_record_batch;
use crate::codec::metadata::{
    ArrowMetadataDecoder, FooterDescriptor, Message, MessageHeader, MetadataDecoder,
    RecordBatchDescriptor,
};
use crate::codec::schema_builder::build_schema;
use crate::config::ReadOptions;
use crate::error::{EnvelopeError, MarkerPosition, ProtocolError};
use crate::schema::Schema;
use crate::{Error, Result};

pub const MAGIC: &[u8; 6] = b"ARROW1";
/// The stream starts after the leading magic, padded to an 8-byte boundary.
pub const STREAM_START: usize = 8;
pub const CONTINUATION_MARKER: [u8; 4] = [0xFF; 4];

const FOOTER_LEN_SIZE: usize = 4;
const MIN_FILE_LEN: usize = STREAM_START + FOOTER_LEN_SIZE + MAGIC.len();

/// Everything decoded from the stream section of a file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileContents<'a> {
    /// `None` only when the stream ended before any schema message.
    pub schema: Option<Arc<Schema>>,
    pub batches: Vec<RecordBatch<'a>>,
}

/// Result of [`FileReader::read_partial`]: the batches decoded before the
/// first failure, and that failure if there was one.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialRead<'a> {
    pub schema: Option<Arc<Schema>>,
    pub batches: Vec<RecordBatch<'a>>,
    pub error: Option<Error>,
}

#[derive(Debug, Clone)]
enum SchemaState {
    Unset,
    Set(Arc<Schema>),
}

#[derive(Debug)]
struct StreamState<'a> {
    schema: SchemaState,
    batches: Vec<RecordBatch<'a>>,
}

impl<'a> StreamState<'a> {
    fn schema(&self) -> Option<Arc<Schema>> {
        match &self.schema {
            SchemaState::Unset => None,
            SchemaState::Set(schema) => Some(Arc::clone(schema)),
        }
    }
}

/// A decoded message together with its location in the file.
#[derive(Debug)]
struct RawMessage<'a> {
    offset: usize,
    body_offset: usize,
    message: Message,
    body: &'a [u8],
}

impl RawMessage<'_> {
    fn end(&self) -> usize {
        self.body_offset + self.body.len()
    }
}

#[derive(Debug)]
pub struct FileReader<'a, D = ArrowMetadataDecoder> {
    bytes: &'a [u8],
    /// Bytes before the footer; every stream message must lie inside.
    stream: &'a [u8],
    decoder: D,
    options: ReadOptions,
    footer: FooterDescriptor,
    footer_schema: OnceLock<Result<Option<Arc<Schema>>>>,
}

impl<'a> FileReader<'a> {
    pub fn try_new(bytes: &'a [u8]) -> Result<Self> {
        Self::with_options(bytes, ReadOptions::default())
    }

    pub fn with_options(bytes: &'a [u8], options: ReadOptions) -> Result<Self> {
        Self::with_decoder(bytes, ArrowMetadataDecoder, options)
    }
}

impl<'a, D: MetadataDecoder> FileReader<'a, D> {
    /// Validates the envelope and decodes the footer.
    pub fn with_decoder(bytes: &'a [u8], decoder: D, options: ReadOptions) -> Result<Self> {
        let file_len = bytes.len();
        if !bytes.starts_with(MAGIC) {
            return Err(Error::Envelope(EnvelopeError::MissingMarker {
                position: MarkerPosition::Start,
                file_len,
            }));
        }
        if !bytes.ends_with(MAGIC) {
            return Err(Error::Envelope(EnvelopeError::MissingMarker {
                position: MarkerPosition::End,
                file_len,
            }));
        }
        if file_len < MIN_FILE_LEN {
            return Err(Error::Envelope(EnvelopeError::TooShort {
                file_len,
                min_len: MIN_FILE_LEN,
            }));
        }

        let footer_end = file_len - MAGIC.len() - FOOTER_LEN_SIZE;
        let raw = &bytes[footer_end..footer_end + FOOTER_LEN_SIZE];
        let footer_length = i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let footer_start = usize::try_from(footer_length)
            .ok()
            .and_then(|len| footer_end.checked_sub(len))
            .filter(|start| *start >= STREAM_START)
            .ok_or(EnvelopeError::FooterLengthOutOfRange {
                footer_length: footer_length as i64,
                file_len,
            })?;

        let footer = decoder
            .decode_footer(&bytes[footer_start..footer_end])
            .map_err(|source| EnvelopeError::InvalidFooter {
                footer_offset: footer_start,
                source,
            })?;

        debug!(
            "arrow file envelope ok: len={file_len} footer_offset={footer_start} footer_len={footer_length} record_batch_blocks={}",
            footer.record_batches.len()
        );

        Ok(Self {
            bytes,
            stream: &bytes[..footer_start],
            decoder,
            options,
            footer,
            footer_schema: OnceLock::new(),
        })
    }

    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    pub fn footer(&self) -> &FooterDescriptor {
        &self.footer
    }

    pub fn file_len(&self) -> usize {
        self.bytes.len()
    }

    /// Schema recorded in the footer, resolved once and shared.
    pub fn footer_schema(&self) -> Result<Option<Arc<Schema>>> {
        self.footer_schema
            .get_or_init(|| match &self.footer.schema {
                Some(desc) => build_schema(desc).map(|s| Some(Arc::new(s))),
                None => Ok(None),
            })
            .clone()
    }

    pub fn num_record_batches(&self) -> usize {
        self.footer.record_batches.len()
    }

    /// Decodes the stream section front to back. All-or-nothing: the first
    /// failure discards everything decoded before it.
    pub fn read(&self) -> Result<FileContents<'a>> {
        let mut state = StreamState {
            schema: SchemaState::Unset,
            batches: Vec::new(),
        };
        self.drive(&mut state)?;
        self.check_footer_schema(&state)?;
        Ok(FileContents {
            schema: state.schema(),
            batches: state.batches,
        })
    }

    /// Like [`read`](Self::read) but keeps the batches decoded before a failure.
    pub fn read_partial(&self) -> PartialRead<'a> {
        let mut state = StreamState {
            schema: SchemaState::Unset,
            batches: Vec::new(),
        };
        let error = self
            .drive(&mut state)
            .and_then(|()| self.check_footer_schema(&state))
            .err();
        PartialRead {
            schema: state.schema(),
            batches: state.batches,
            error,
        }
    }

    /// Random access to record batch `index` through the footer's block list,
    /// interpreted with the footer schema.
    pub fn record_batch(&self, index: usize) -> Result<RecordBatch<'a>> {
        let block = *self
            .footer
            .record_batches
            .get(index)
            .ok_or(ProtocolError::BlockOutOfRange {
                index,
                count: self.footer.record_batches.len(),
            })?;
        let mismatch = |reason: &'static str| {
            Error::Protocol(ProtocolError::BlockMismatch {
                index,
                offset: block.offset,
                reason,
            })
        };
        let schema = self
            .footer_schema()?
            .ok_or(ProtocolError::MissingFooterSchema)?;

        let offset = usize::try_from(block.offset).map_err(|_| mismatch("negative offset"))?;
        let raw = self
            .read_message_at(offset)?
            .ok_or_else(|| mismatch("block points at the end-of-stream marker"))?;
        if usize::try_from(block.metadata_length).ok() != Some(raw.body_offset - offset) {
            return Err(mismatch("metadata length"));
        }
        if block.body_length != raw.message.body_length {
            return Err(mismatch("body length"));
        }
        match &raw.message.header {
            MessageHeader::RecordBatch(desc) => self.decode_batch(&schema, desc, offset, raw.body),
            _ => Err(mismatch("block does not hold a record batch")),
        }
    }

    pub fn record_batches(&self) -> impl Iterator<Item = Result<RecordBatch<'a>>> + '_ {
        (0..self.num_record_batches()).map(move |i| self.record_batch(i))
    }

    fn drive(&self, state: &mut StreamState<'a>) -> Result<()> {
        let mut cursor = STREAM_START;
        while let Some(raw) = self.read_message_at(cursor)? {
            cursor = raw.end();
            self.dispatch(state, raw)?;
        }
        debug!(
            "end of stream at offset {cursor}: {} record batches",
            state.batches.len()
        );
        Ok(())
    }

    fn dispatch(&self, state: &mut StreamState<'a>, raw: RawMessage<'a>) -> Result<()> {
        if raw.message.version.is_legacy() {
            warn!(
                "message at offset {} uses legacy metadata version {:?}",
                raw.offset, raw.message.version
            );
        }
        match &raw.message.header {
            MessageHeader::Schema(desc) => {
                if let SchemaState::Set(_) = state.schema {
                    return Err(Error::Protocol(ProtocolError::DuplicateSchema {
                        offset: raw.offset,
                    }));
                }
                let schema = build_schema(desc)?;
                debug!("schema at offset {}: {} fields", raw.offset, schema.len());
                state.schema = SchemaState::Set(Arc::new(schema));
            }
            MessageHeader::RecordBatch(desc) => {
                let SchemaState::Set(schema) = &state.schema else {
                    return Err(Error::Protocol(ProtocolError::RecordBatchBeforeSchema {
                        offset: raw.offset,
                    }));
                };
                let batch = self.decode_batch(schema, desc, raw.offset, raw.body)?;
                state.batches.push(batch);
            }
            MessageHeader::Other(kind) => {
                return Err(Error::Protocol(ProtocolError::UnsupportedMessage {
                    offset: raw.offset,
                    kind: *kind,
                }));
            }
        }
        Ok(())
    }

    fn decode_batch(
        &self,
        schema: &Arc<Schema>,
        desc: &RecordBatchDescriptor,
        offset: usize,
        body: &'a [u8],
    ) -> Result<RecordBatch<'a>> {
        if desc.compressed {
            return Err(Error::Protocol(ProtocolError::CompressedBody { offset }));
        }
        let row_count = usize::try_from(desc.row_count).map_err(|_| {
            ProtocolError::InvalidRowCount {
                offset,
                row_count: desc.row_count,
            }
        })?;
        materialize_record_batch(schema, row_count, &desc.nodes, &desc.buffers, body)
    }

    fn check_footer_schema(&self, state: &StreamState<'a>) -> Result<()> {
        if !self.options.check_footer_schema {
            return Ok(());
        }
        let SchemaState::Set(stream_schema) = &state.schema else {
            return Ok(());
        };
        match self.footer_schema()? {
            Some(footer_schema) if footer_schema != *stream_schema => {
                Err(Error::Protocol(ProtocolError::FooterSchemaMismatch))
            }
            _ => Ok(()),
        }
    }

    fn take(&self, offset: usize, n: usize) -> Result<&'a [u8]> {
        let stream = self.stream;
        offset
            .checked_add(n)
            .and_then(|end| stream.get(offset..end))
            .ok_or(Error::Protocol(ProtocolError::Truncated {
                offset,
                needed: n,
                available: stream.len().saturating_sub(offset),
            }))
    }

    /// Reads the message starting at `offset`; `None` for the end-of-stream marker.
    fn read_message_at(&self, offset: usize) -> Result<Option<RawMessage<'a>>> {
        let marker = self.take(offset, 4)?;
        if marker != CONTINUATION_MARKER {
            return Err(Error::Protocol(ProtocolError::InvalidContinuation {
                offset,
                found: [marker[0], marker[1], marker[2], marker[3]],
            }));
        }

        let len_offset = offset + 4;
        let raw = self.take(len_offset, 4)?;
        let metadata_len = i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        if metadata_len == 0 {
            return Ok(None);
        }

        let metadata_offset = len_offset + 4;
        let available = self.stream.len().saturating_sub(metadata_offset);
        let len = usize::try_from(metadata_len)
            .ok()
            .filter(|len| {
                *len <= available && *len <= self.options.max_metadata_len
            })
            .ok_or(ProtocolError::InvalidMetadataLength {
                offset: len_offset,
                length: metadata_len as i64,
                available,
            })?;
        let metadata = self.take(metadata_offset, len)?;
        let message = self
            .decoder
            .decode_message(metadata)
            .map_err(|source| ProtocolError::InvalidMetadata {
                offset: metadata_offset,
                source,
            })?;

        let body_offset = metadata_offset + len;
        let body_available = self.stream.len().saturating_sub(body_offset);
        let body = usize::try_from(message.body_length)
            .ok()
            .and_then(|n| self.take(body_offset, n).ok())
            .ok_or(ProtocolError::BodyExceedsBuffer {
                offset: body_offset,
                body_length: message.body_length,
                available: body_available,
            })?;

        debug!(
            "message at offset {offset}: kind={} metadata_len={len} body_len={}",
            message.header.kind(),
            body.len()
        );
        Ok(Some(RawMessage {
            offset,
            body_offset,
            message,
            body,
        }))
    }
}

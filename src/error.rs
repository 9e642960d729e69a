use core::fmt;

use crate::registry::TypeCode;
use crate::schema::DataType;

pub type Result<T> = core::result::Result<T, Error>;

/// Top-level decode failure. Every variant is fatal for the read that raised it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("type error: {0}")]
    Type(#[from] TypeError),
    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerPosition {
    Start,
    End,
}

impl fmt::Display for MarkerPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerPosition::Start => f.write_str("start"),
            MarkerPosition::End => f.write_str("end"),
        }
    }
}

/// Failure reported by a [`MetadataDecoder`](crate::codec::metadata::MetadataDecoder).
///
/// `offset` is relative to the metadata slice handed to the decoder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed metadata at byte {offset}: {reason}")]
pub struct MetadataError {
    pub offset: usize,
    pub reason: String,
}

impl MetadataError {
    pub fn new(offset: usize, reason: impl Into<String>) -> Self {
        Self {
            offset,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("missing ARROW1 envelope marker at {position} of {file_len}-byte buffer")]
    MissingMarker {
        position: MarkerPosition,
        file_len: usize,
    },
    #[error("{file_len}-byte buffer is shorter than the {min_len}-byte minimum envelope")]
    TooShort { file_len: usize, min_len: usize },
    #[error("footer length {footer_length} out of range for {file_len}-byte buffer")]
    FooterLengthOutOfRange { footer_length: i64, file_len: usize },
    #[error("invalid footer at offset {footer_offset}: {source}")]
    InvalidFooter {
        footer_offset: usize,
        #[source]
        source: MetadataError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("truncated stream at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("invalid continuation marker at offset {offset}: found {found:02x?}")]
    InvalidContinuation { offset: usize, found: [u8; 4] },
    #[error("invalid metadata length {length} at offset {offset} ({available} bytes available)")]
    InvalidMetadataLength {
        offset: usize,
        length: i64,
        available: usize,
    },
    #[error("invalid metadata block at offset {offset}: {source}")]
    InvalidMetadata {
        offset: usize,
        #[source]
        source: MetadataError,
    },
    #[error("body of {body_length} bytes at offset {offset} exceeds buffer ({available} bytes available)")]
    BodyExceedsBuffer {
        offset: usize,
        body_length: i64,
        available: usize,
    },
    #[error("invalid row count {row_count} in record batch at offset {offset}")]
    InvalidRowCount { offset: usize, row_count: i64 },
    #[error("record batch at offset {offset} appears before any schema")]
    RecordBatchBeforeSchema { offset: usize },
    #[error("duplicate schema message at offset {offset}")]
    DuplicateSchema { offset: usize },
    #[error("unsupported {kind} message at offset {offset}")]
    UnsupportedMessage { offset: usize, kind: MessageKind },
    #[error("compressed record batch body at offset {offset} is not supported")]
    CompressedBody { offset: usize },
    #[error("record batch block {index} out of range ({count} blocks)")]
    BlockOutOfRange { index: usize, count: usize },
    #[error("block {index} at offset {offset} disagrees with its message: {reason}")]
    BlockMismatch {
        index: usize,
        offset: i64,
        reason: &'static str,
    },
    #[error("stream schema differs from footer schema")]
    FooterSchemaMismatch,
    #[error("file footer carries no schema")]
    MissingFooterSchema,
}

/// Message header kinds carried by the Arrow `MessageHeader` union.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Schema,
    DictionaryBatch,
    RecordBatch,
    Tensor,
    SparseTensor,
    Unknown(u8),
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Schema => f.write_str("Schema"),
            MessageKind::DictionaryBatch => f.write_str("DictionaryBatch"),
            MessageKind::RecordBatch => f.write_str("RecordBatch"),
            MessageKind::Tensor => f.write_str("Tensor"),
            MessageKind::SparseTensor => f.write_str("SparseTensor"),
            MessageKind::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    #[error(
        "field {field_index} ({name:?}): unsupported type {type_code:?} (bit_width={bit_width}, signed={signed})"
    )]
    Unsupported {
        field_index: usize,
        name: String,
        type_code: TypeCode,
        bit_width: i32,
        signed: bool,
    },
    #[error("no registered type for {type_code:?} (bit_width={bit_width}, signed={signed})")]
    Unresolved {
        type_code: TypeCode,
        bit_width: i32,
        signed: bool,
    },
    #[error("field {field_index} ({name:?}): dictionary-encoded fields are not supported")]
    DictionaryEncoded { field_index: usize, name: String },
    #[error("field {field_index} ({name:?}): nested fields are not supported")]
    Nested { field_index: usize, name: String },
    #[error("big-endian schemas are not supported")]
    BigEndian,
    #[error("column {column_index}: expected {expected}, found {actual}")]
    ColumnTypeMismatch {
        column_index: usize,
        expected: DataType,
        actual: DataType,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("requested buffer #{requested} but only {supplied} descriptors were supplied")]
    Exhausted { requested: usize, supplied: usize },
    #[error(
        "buffer #{index} (offset={offset}, length={length}) falls outside the {body_len}-byte body"
    )]
    OutOfBodyBounds {
        index: usize,
        offset: i64,
        length: i64,
        body_len: usize,
    },
    #[error("only {consumed} of {supplied} buffer descriptors were consumed")]
    UnconsumedBuffers { consumed: usize, supplied: usize },
    #[error("column {column_index}: values region needs {required} bytes, found {actual}")]
    RowCountMismatch {
        column_index: usize,
        required: usize,
        actual: usize,
    },
    #[error("column {column_index}: validity bitmap needs {required} bytes, found {actual}")]
    ValidityTooShort {
        column_index: usize,
        required: usize,
        actual: usize,
    },
    #[error("column {column_index}: field node length {node_length} differs from row count {row_count}")]
    NodeLengthMismatch {
        column_index: usize,
        node_length: i64,
        row_count: usize,
    },
    #[error("{nodes} field nodes for {fields} fields")]
    NodeCountMismatch { nodes: usize, fields: usize },
    #[error("{columns} columns for {fields} schema fields")]
    ColumnCountMismatch { columns: usize, fields: usize },
    #[error("column {column_index}: length {actual} differs from row count {row_count}")]
    ColumnLengthMismatch {
        column_index: usize,
        actual: usize,
        row_count: usize,
    },
    #[error("size overflow computing {what}")]
    SizeOverflow { what: &'static str },
}

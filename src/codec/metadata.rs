//! Decoding of Arrow IPC metadata (`Message` and `Footer` flatbuffers) into
//! plain descriptor structs consumed by the reader.

use crate::codec::flatbuf::{Table, Vector, read_i32_le, read_i64_le};
use crate::error::{MessageKind, MetadataError};
use crate::registry::TypeCode;

type Result<T> = core::result::Result<T, MetadataError>;

const BUFFER_STRUCT_SIZE: usize = 16;
const FIELD_NODE_STRUCT_SIZE: usize = 16;
const BLOCK_STRUCT_SIZE: usize = 24;

/// Arrow `MetadataVersion`; the discriminant is the on-wire value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MetadataVersion {
    V1,
    V2,
    V3,
    V4,
    V5,
    Unknown(i16),
}

impl MetadataVersion {
    pub fn from_i16(v: i16) -> Self {
        match v {
            0 => MetadataVersion::V1,
            1 => MetadataVersion::V2,
            2 => MetadataVersion::V3,
            3 => MetadataVersion::V4,
            4 => MetadataVersion::V5,
            other => MetadataVersion::Unknown(other),
        }
    }

    /// Versions before V4 used a different stream framing and union layout.
    pub fn is_legacy(&self) -> bool {
        matches!(
            self,
            MetadataVersion::V1 | MetadataVersion::V2 | MetadataVersion::V3
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub nullable: bool,
    pub type_code: TypeCode,
    /// Int bit width, float precision in bits, 1 for Bool, 0 otherwise.
    pub bit_width: i32,
    pub signed: bool,
    pub dictionary_encoded: bool,
    pub child_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    pub endianness: Endianness,
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub offset: i64,
    pub length: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldNode {
    pub length: i64,
    pub null_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBatchDescriptor {
    pub row_count: i64,
    pub nodes: Vec<FieldNode>,
    pub buffers: Vec<BufferDescriptor>,
    pub compressed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageHeader {
    Schema(SchemaDescriptor),
    RecordBatch(RecordBatchDescriptor),
    /// Any header kind this reader does not interpret.
    Other(MessageKind),
}

impl MessageHeader {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageHeader::Schema(_) => MessageKind::Schema,
            MessageHeader::RecordBatch(_) => MessageKind::RecordBatch,
            MessageHeader::Other(kind) => *kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub version: MetadataVersion,
    pub header: MessageHeader,
    pub body_length: i64,
}

/// Location of one message inside the file, as listed by the footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub offset: i64,
    /// Includes the 8-byte continuation/length prefix and padding.
    pub metadata_length: i32,
    pub body_length: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FooterDescriptor {
    pub version: MetadataVersion,
    pub schema: Option<SchemaDescriptor>,
    pub dictionaries: Vec<Block>,
    pub record_batches: Vec<Block>,
}

/// Turns raw metadata bytes into descriptors. The reader only ever sees the
/// decoded form, so alternative metadata encodings can be plugged in here.
pub trait MetadataDecoder {
    fn decode_message(&self, metadata: &[u8]) -> Result<Message>;

    fn decode_footer(&self, footer: &[u8]) -> Result<FooterDescriptor>;
}

/// Decoder for the FlatBuffers metadata written by Arrow implementations.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArrowMetadataDecoder;

impl MetadataDecoder for ArrowMetadataDecoder {
    fn decode_message(&self, metadata: &[u8]) -> Result<Message> {
        let msg = Table::root(metadata)?;
        let version = MetadataVersion::from_i16(msg.get_i16(0, 0)?);
        let header_type = msg.get_u8(1, 0)?;
        let body_length = msg.get_i64(3, 0)?;

        let header = match header_type {
            1 => MessageHeader::Schema(decode_schema(&required_table(&msg, 2, "schema header")?)?),
            3 => MessageHeader::RecordBatch(decode_record_batch(&required_table(
                &msg,
                2,
                "record batch header",
            )?)?),
            0 => return Err(MetadataError::new(0, "message has no header")),
            2 => MessageHeader::Other(MessageKind::DictionaryBatch),
            4 => MessageHeader::Other(MessageKind::Tensor),
            5 => MessageHeader::Other(MessageKind::SparseTensor),
            other => MessageHeader::Other(MessageKind::Unknown(other)),
        };

        Ok(Message {
            version,
            header,
            body_length,
        })
    }

    fn decode_footer(&self, footer: &[u8]) -> Result<FooterDescriptor> {
        let table = Table::root(footer)?;
        let version = MetadataVersion::from_i16(table.get_i16(0, 0)?);
        let schema = match table.get_table(1)? {
            Some(t) => Some(decode_schema(&t)?),
            None => None,
        };
        let dictionaries = decode_blocks(table.get_vector(2)?)?;
        let record_batches = decode_blocks(table.get_vector(3)?)?;
        Ok(FooterDescriptor {
            version,
            schema,
            dictionaries,
            record_batches,
        })
    }
}

fn required_table<'a>(table: &Table<'a>, id: u16, what: &str) -> Result<Table<'a>> {
    table
        .get_table(id)?
        .ok_or_else(|| MetadataError::new(0, format!("missing {what}")))
}

fn decode_schema(schema: &Table<'_>) -> Result<SchemaDescriptor> {
    let endianness = match schema.get_i16(0, 0)? {
        0 => Endianness::Little,
        1 => Endianness::Big,
        other => {
            return Err(MetadataError::new(0, format!("invalid endianness {other}")));
        }
    };

    let mut fields = Vec::new();
    if let Some(vec) = schema.get_vector(1)? {
        vec.check_structs(4)?;
        fields.reserve(vec.len());
        for i in 0..vec.len() {
            fields.push(decode_field(&vec.table(i)?)?);
        }
    }
    Ok(SchemaDescriptor { endianness, fields })
}

fn decode_field(field: &Table<'_>) -> Result<FieldDescriptor> {
    let name = field.get_str(0)?.unwrap_or_default().to_string();
    let nullable = field.get_bool(1, false)?;
    let type_code = TypeCode::from_u8(field.get_u8(2, 0)?);
    let type_table = field.get_table(3)?;

    let (bit_width, signed) = match (type_code, type_table) {
        (TypeCode::Int, Some(t)) => (t.get_i32(0, 0)?, t.get_bool(1, false)?),
        (TypeCode::Int, None) => {
            return Err(MetadataError::new(
                0,
                format!("field {name:?}: Int type without parameters"),
            ));
        }
        (TypeCode::FloatingPoint, Some(t)) => {
            let bits = match t.get_i16(0, 0)? {
                0 => 16,
                1 => 32,
                2 => 64,
                other => {
                    return Err(MetadataError::new(
                        0,
                        format!("field {name:?}: invalid float precision {other}"),
                    ));
                }
            };
            (bits, true)
        }
        (TypeCode::FloatingPoint, None) => (16, true),
        (TypeCode::Bool, _) => (1, false),
        _ => (0, false),
    };

    let child_count = field.get_vector(5)?.map_or(0, |v| v.len());

    Ok(FieldDescriptor {
        name,
        nullable,
        type_code,
        bit_width,
        signed,
        dictionary_encoded: field.has_field(4)?,
        child_count,
    })
}

fn decode_record_batch(batch: &Table<'_>) -> Result<RecordBatchDescriptor> {
    let row_count = batch.get_i64(0, 0)?;

    let mut nodes = Vec::new();
    if let Some(vec) = batch.get_vector(1)? {
        vec.check_structs(FIELD_NODE_STRUCT_SIZE)?;
        nodes.reserve(vec.len());
        for i in 0..vec.len() {
            let raw = vec.struct_bytes(i, FIELD_NODE_STRUCT_SIZE)?;
            nodes.push(FieldNode {
                length: read_i64_le(raw, 0)?,
                null_count: read_i64_le(raw, 8)?,
            });
        }
    }

    let mut buffers = Vec::new();
    if let Some(vec) = batch.get_vector(2)? {
        vec.check_structs(BUFFER_STRUCT_SIZE)?;
        buffers.reserve(vec.len());
        for i in 0..vec.len() {
            let raw = vec.struct_bytes(i, BUFFER_STRUCT_SIZE)?;
            buffers.push(BufferDescriptor {
                offset: read_i64_le(raw, 0)?,
                length: read_i64_le(raw, 8)?,
            });
        }
    }

    Ok(RecordBatchDescriptor {
        row_count,
        nodes,
        buffers,
        compressed: batch.has_field(3)?,
    })
}

fn decode_blocks(vec: Option<Vector<'_>>) -> Result<Vec<Block>> {
    let Some(vec) = vec else {
        return Ok(Vec::new());
    };
    vec.check_structs(BLOCK_STRUCT_SIZE)?;
    let mut blocks = Vec::with_capacity(vec.len());
    for i in 0..vec.len() {
        let raw = vec.struct_bytes(i, BLOCK_STRUCT_SIZE)?;
        blocks.push(Block {
            offset: read_i64_le(raw, 0)?,
            metadata_length: read_i32_le(raw, 8)?,
            body_length: read_i64_le(raw, 16)?,
        });
    }
    Ok(blocks)
}

//! Writer for small, well-formed Arrow IPC files, used by the test suite and
//! the benchmarks. Only emits what the reader understands, plus a few knobs for
//! producing deliberately malformed input.

use crate::codec::file_reader::{CONTINUATION_MARKER, MAGIC, STREAM_START};
use crate::schema::DataType;

/// A FlatBuffers value as laid out by [`finish_table`].
#[derive(Debug, Clone, PartialEq)]
pub enum FbValue {
    U8(u8),
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    Str(String),
    Table(FbTable),
    Tables(Vec<FbTable>),
    /// Vector of inline structs: element count and their packed bytes.
    Structs(usize, Vec<u8>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FbTable {
    fields: Vec<(u16, FbValue)>,
}

impl FbTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: u16, value: FbValue) -> Self {
        self.fields.push((id, value));
        self
    }
}

fn patch_u16(out: &mut [u8], pos: usize, v: u16) {
    out[pos..pos + 2].copy_from_slice(&v.to_le_bytes());
}

fn patch_u32(out: &mut [u8], pos: usize, v: u32) {
    out[pos..pos + 4].copy_from_slice(&v.to_le_bytes());
}

/// Serializes `root` as a finished FlatBuffers buffer. Children are written
/// after their parents so every `uoffset` points forward; each vtable sits
/// directly in front of its table.
pub fn finish_table(root: &FbTable) -> Vec<u8> {
    let mut out = vec![0u8; 4];
    let root_pos = write_table(&mut out, root);
    patch_u32(&mut out, 0, root_pos as u32);
    out
}

fn write_table(out: &mut Vec<u8>, table: &FbTable) -> usize {
    let slots = table
        .fields
        .iter()
        .map(|(id, _)| *id as usize + 1)
        .max()
        .unwrap_or(0);
    let vtable_pos = out.len();
    let vtable_len = 4 + 2 * slots;
    out.resize(vtable_pos + vtable_len, 0);

    let table_pos = out.len();
    out.extend_from_slice(&((table_pos - vtable_pos) as i32).to_le_bytes());

    let mut entries = vec![0u16; slots];
    let mut deferred = Vec::new();
    for (id, value) in &table.fields {
        entries[*id as usize] = (out.len() - table_pos) as u16;
        match value {
            FbValue::U8(v) => out.push(*v),
            FbValue::Bool(v) => out.push(*v as u8),
            FbValue::I16(v) => out.extend_from_slice(&v.to_le_bytes()),
            FbValue::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
            FbValue::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
            other => {
                deferred.push((out.len(), other));
                out.extend_from_slice(&[0u8; 4]);
            }
        }
    }

    let table_len = out.len() - table_pos;
    patch_u16(out, vtable_pos, vtable_len as u16);
    patch_u16(out, vtable_pos + 2, table_len as u16);
    for (i, entry) in entries.iter().enumerate() {
        patch_u16(out, vtable_pos + 4 + 2 * i, *entry);
    }

    for (slot, value) in deferred {
        let target = write_referenced(out, value);
        patch_u32(out, slot, (target - slot) as u32);
    }
    table_pos
}

fn write_referenced(out: &mut Vec<u8>, value: &FbValue) -> usize {
    match value {
        FbValue::Str(s) => {
            let pos = out.len();
            out.extend_from_slice(&(s.len() as u32).to_le_bytes());
            out.extend_from_slice(s.as_bytes());
            out.push(0);
            pos
        }
        FbValue::Table(t) => write_table(out, t),
        FbValue::Tables(tables) => {
            let pos = out.len();
            out.extend_from_slice(&(tables.len() as u32).to_le_bytes());
            let first_slot = out.len();
            out.resize(first_slot + 4 * tables.len(), 0);
            for (i, t) in tables.iter().enumerate() {
                let slot = first_slot + 4 * i;
                let target = write_table(out, t);
                patch_u32(out, slot, (target - slot) as u32);
            }
            pos
        }
        FbValue::Structs(count, bytes) => {
            let pos = out.len();
            out.extend_from_slice(&(*count as u32).to_le_bytes());
            out.extend_from_slice(bytes);
            pos
        }
        FbValue::U8(_) | FbValue::Bool(_) | FbValue::I16(_) | FbValue::I32(_) | FbValue::I64(_) => {
            unreachable!("scalars are stored inline")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureType {
    Int { bit_width: i32, signed: bool },
    /// Arrow precision: 0 = half, 1 = single, 2 = double.
    FloatingPoint { precision: i16 },
    Bool,
    /// Any other `Type` union member, written with an empty parameter table.
    Other(u8),
}

impl From<DataType> for FixtureType {
    fn from(data_type: DataType) -> Self {
        match data_type {
            DataType::Float32 => FixtureType::FloatingPoint { precision: 1 },
            DataType::Float64 => FixtureType::FloatingPoint { precision: 2 },
            DataType::Boolean => FixtureType::Bool,
            int => FixtureType::Int {
                bit_width: int.bit_width() as i32,
                signed: int.is_signed(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureField {
    pub name: String,
    pub ty: FixtureType,
    pub nullable: bool,
    pub dictionary_encoded: bool,
    pub children: Vec<FixtureField>,
}

impl FixtureField {
    pub fn new(name: &str, ty: impl Into<FixtureType>) -> Self {
        Self {
            name: name.to_string(),
            ty: ty.into(),
            nullable: true,
            dictionary_encoded: false,
            children: Vec::new(),
        }
    }

    pub fn dictionary_encoded(mut self) -> Self {
        self.dictionary_encoded = true;
        self
    }

    pub fn with_child(mut self, child: FixtureField) -> Self {
        self.children.push(child);
        self
    }

    fn to_table(&self) -> FbTable {
        let (type_code, type_table) = match &self.ty {
            FixtureType::Int { bit_width, signed } => (
                2u8,
                FbTable::new()
                    .with(0, FbValue::I32(*bit_width))
                    .with(1, FbValue::Bool(*signed)),
            ),
            FixtureType::FloatingPoint { precision } => {
                (3u8, FbTable::new().with(0, FbValue::I16(*precision)))
            }
            FixtureType::Bool => (6u8, FbTable::new()),
            FixtureType::Other(code) => (*code, FbTable::new()),
        };
        let mut table = FbTable::new()
            .with(0, FbValue::Str(self.name.clone()))
            .with(1, FbValue::Bool(self.nullable))
            .with(2, FbValue::U8(type_code))
            .with(3, FbValue::Table(type_table));
        if self.dictionary_encoded {
            // DictionaryEncoding { id: long, indexType: Int }
            table = table.with(4, FbValue::Table(FbTable::new().with(0, FbValue::I64(0))));
        }
        table.with(
            5,
            FbValue::Tables(self.children.iter().map(FixtureField::to_table).collect()),
        )
    }
}

fn schema_table(fields: &[FixtureField]) -> FbTable {
    FbTable::new().with(
        1,
        FbValue::Tables(fields.iter().map(FixtureField::to_table).collect()),
    )
}

fn pairs_as_structs(pairs: &[(i64, i64)]) -> FbValue {
    let mut bytes = Vec::with_capacity(pairs.len() * 16);
    for (a, b) in pairs {
        bytes.extend_from_slice(&a.to_le_bytes());
        bytes.extend_from_slice(&b.to_le_bytes());
    }
    FbValue::Structs(pairs.len(), bytes)
}

/// `Message` flatbuffer with an arbitrary header union member.
pub fn message_metadata(header_type: u8, header: FbTable, body_length: i64) -> Vec<u8> {
    finish_table(
        &FbTable::new()
            .with(0, FbValue::I16(4))
            .with(1, FbValue::U8(header_type))
            .with(2, FbValue::Table(header))
            .with(3, FbValue::I64(body_length)),
    )
}

pub fn schema_metadata(fields: &[FixtureField]) -> Vec<u8> {
    message_metadata(1, schema_table(fields), 0)
}

pub fn record_batch_metadata(
    row_count: i64,
    nodes: &[(i64, i64)],
    buffers: &[(i64, i64)],
    body_length: i64,
    compressed: bool,
) -> Vec<u8> {
    let mut header = FbTable::new()
        .with(0, FbValue::I64(row_count))
        .with(1, pairs_as_structs(nodes))
        .with(2, pairs_as_structs(buffers));
    if compressed {
        // BodyCompression { codec: LZ4_FRAME }
        header = header.with(3, FbValue::Table(FbTable::new().with(0, FbValue::U8(0))));
    }
    message_metadata(3, header, body_length)
}

fn pad8(n: usize) -> usize {
    (n + 7) & !7
}

/// Little-endian encoding of fixed-width values.
pub trait LeBytes: Copy {
    fn extend_le(self, out: &mut Vec<u8>);
}

macro_rules! le_bytes {
    ($($t:ty),*) => {
        $(impl LeBytes for $t {
            fn extend_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        })*
    };
}

le_bytes!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

pub fn values_le<T: LeBytes>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::new();
    for v in values {
        v.extend_le(&mut out);
    }
    out
}

/// LSB-first bitmap of `bits`.
pub fn bitmap(bits: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; bits.len().div_ceil(8)];
    for (i, bit) in bits.iter().enumerate() {
        if *bit {
            out[i / 8] |= 1 << (i % 8);
        }
    }
    out
}

/// Validity and values buffers of one column; `None` validity is written as
/// a zero-length buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureColumn {
    pub validity: Option<Vec<u8>>,
    pub values: Vec<u8>,
}

impl FixtureColumn {
    pub fn new(validity: Option<Vec<u8>>, values: Vec<u8>) -> Self {
        Self { validity, values }
    }

    pub fn all_valid<T: LeBytes>(values: &[T]) -> Self {
        Self::new(None, values_le(values))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixtureBlock {
    pub offset: i64,
    pub metadata_length: i32,
    pub body_length: i64,
}

/// Assembles an Arrow file message by message.
#[derive(Debug, Clone)]
pub struct FixtureWriter {
    out: Vec<u8>,
    schema: Option<Vec<FixtureField>>,
    footer_schema: Option<Vec<FixtureField>>,
    record_batches: Vec<FixtureBlock>,
    eos_written: bool,
}

impl Default for FixtureWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureWriter {
    pub fn new() -> Self {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.resize(STREAM_START, 0);
        Self {
            out,
            schema: None,
            footer_schema: None,
            record_batches: Vec::new(),
            eos_written: false,
        }
    }

    /// Writes one framed message; `body` is copied verbatim.
    pub fn message(&mut self, metadata: &[u8], body: &[u8]) -> FixtureBlock {
        let offset = self.out.len();
        let padded = pad8(metadata.len());
        self.out.extend_from_slice(&CONTINUATION_MARKER);
        self.out.extend_from_slice(&(padded as i32).to_le_bytes());
        self.out.extend_from_slice(metadata);
        self.out.resize(offset + 8 + padded, 0);
        self.out.extend_from_slice(body);
        FixtureBlock {
            offset: offset as i64,
            metadata_length: (8 + padded) as i32,
            body_length: body.len() as i64,
        }
    }

    pub fn schema(&mut self, fields: Vec<FixtureField>) -> &mut Self {
        let metadata = schema_metadata(&fields);
        self.message(&metadata, &[]);
        if self.schema.is_none() {
            self.schema = Some(fields);
        }
        self
    }

    /// Overrides the schema recorded in the footer.
    pub fn footer_schema(&mut self, fields: Vec<FixtureField>) -> &mut Self {
        self.footer_schema = Some(fields);
        self
    }

    /// Record batch with one field node per column and buffers laid out in
    /// column order, each padded to 8 bytes.
    pub fn record_batch(&mut self, row_count: i64, columns: &[FixtureColumn]) -> &mut Self {
        let mut buffers: Vec<&[u8]> = Vec::with_capacity(columns.len() * 2);
        for col in columns {
            buffers.push(col.validity.as_deref().unwrap_or(&[]));
            buffers.push(&col.values);
        }
        let nodes: Vec<(i64, i64)> = columns.iter().map(|_| (row_count, 0)).collect();
        self.record_batch_buffers(row_count, &nodes, &buffers)
    }

    pub fn record_batch_buffers(
        &mut self,
        row_count: i64,
        nodes: &[(i64, i64)],
        buffers: &[&[u8]],
    ) -> &mut Self {
        let mut body = Vec::new();
        let mut descriptors = Vec::with_capacity(buffers.len());
        for buf in buffers {
            descriptors.push((body.len() as i64, buf.len() as i64));
            body.extend_from_slice(buf);
            body.resize(pad8(body.len()), 0);
        }
        self.record_batch_raw(row_count, nodes, &descriptors, &body, false)
    }

    /// Record batch with caller-supplied descriptors and body.
    pub fn record_batch_raw(
        &mut self,
        row_count: i64,
        nodes: &[(i64, i64)],
        descriptors: &[(i64, i64)],
        body: &[u8],
        compressed: bool,
    ) -> &mut Self {
        let metadata =
            record_batch_metadata(row_count, nodes, descriptors, body.len() as i64, compressed);
        let block = self.message(&metadata, body);
        self.record_batches.push(block);
        self
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.out.extend_from_slice(bytes);
        self
    }

    pub fn end_of_stream(&mut self) -> &mut Self {
        self.out.extend_from_slice(&CONTINUATION_MARKER);
        self.out.extend_from_slice(&0i32.to_le_bytes());
        self.eos_written = true;
        self
    }

    pub fn record_batch_blocks(&self) -> &[FixtureBlock] {
        &self.record_batches
    }

    /// Footer entries as they will be written by [`finish`](Self::finish).
    pub fn record_batch_blocks_mut(&mut self) -> &mut [FixtureBlock] {
        &mut self.record_batches
    }

    pub fn footer_bytes(&self) -> Vec<u8> {
        let mut footer = FbTable::new().with(0, FbValue::I16(4));
        if let Some(fields) = self.footer_schema.as_ref().or(self.schema.as_ref()) {
            footer = footer.with(1, FbValue::Table(schema_table(fields)));
        }
        let mut blocks = Vec::with_capacity(self.record_batches.len() * 24);
        for b in &self.record_batches {
            blocks.extend_from_slice(&b.offset.to_le_bytes());
            blocks.extend_from_slice(&b.metadata_length.to_le_bytes());
            blocks.extend_from_slice(&[0u8; 4]);
            blocks.extend_from_slice(&b.body_length.to_le_bytes());
        }
        let footer = footer
            .with(2, FbValue::Structs(0, Vec::new()))
            .with(3, FbValue::Structs(self.record_batches.len(), blocks));
        finish_table(&footer)
    }

    /// Appends the end-of-stream marker (unless already written), the footer
    /// and the trailing magic.
    pub fn finish(&self) -> Vec<u8> {
        let mut this = self.clone();
        if !this.eos_written {
            this.end_of_stream();
        }
        this.finish_without_eos()
    }

    pub fn finish_without_eos(&self) -> Vec<u8> {
        let footer = self.footer_bytes();
        let mut out = self.out.clone();
        out.extend_from_slice(&footer);
        out.extend_from_slice(&(footer.len() as i32).to_le_bytes());
        out.extend_from_slice(MAGIC);
        out
    }
}

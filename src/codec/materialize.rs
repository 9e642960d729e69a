use std::sync::Arc;

use log::debug;

use crate::batch::{Array, RecordBatch, ValidityBitmap};
use crate::codec::metadata::{BufferDescriptor, FieldNode};
use crate::codec::slicer::BufferSlicer;
use crate::error::BufferError;
use crate::schema::{DataType, Schema};
use crate::{Error, Result};

/// Bytes the values buffer of `row_count` rows of `data_type` must hold.
fn required_values_len(data_type: DataType, row_count: usize) -> Result<usize> {
    let len = match data_type.byte_width() {
        Some(width) => row_count.checked_mul(width),
        None => row_count.checked_add(7).map(|v| v / 8),
    };
    len.ok_or(Error::Buffer(BufferError::SizeOverflow {
        what: "values length",
    }))
}

fn materialize_column<'a>(
    column_index: usize,
    data_type: DataType,
    row_count: usize,
    slicer: &mut BufferSlicer<'_, 'a>,
) -> Result<Array<'a>> {
    // Validity always comes first; the rest are the type's data buffers.
    let validity_bytes = slicer.next_slice()?;
    let mut data = Vec::with_capacity(data_type.buffer_count().saturating_sub(1));
    for _ in 1..data_type.buffer_count() {
        data.push(slicer.next_slice()?);
    }
    let values = data.first().copied().unwrap_or_default();

    let validity = if validity_bytes.is_empty() {
        None
    } else {
        let required = ValidityBitmap::len_for_row_count(row_count)?;
        if validity_bytes.len() < required {
            return Err(Error::Buffer(BufferError::ValidityTooShort {
                column_index,
                required,
                actual: validity_bytes.len(),
            }));
        }
        Some(ValidityBitmap::new(validity_bytes))
    };

    let required = required_values_len(data_type, row_count)?;
    if values.len() < required {
        return Err(Error::Buffer(BufferError::RowCountMismatch {
            column_index,
            required,
            actual: values.len(),
        }));
    }

    Ok(Array::from_parts(data_type, row_count, validity, values))
}

/// Builds one record batch by walking `schema` against the flat buffer list.
///
/// Buffers are consumed in field order and every descriptor must be used
/// exactly once. `nodes` may be empty; when present there must be one per
/// field, each matching `row_count`.
pub fn materialize_record_batch<'a>(
    schema: &Arc<Schema>,
    row_count: usize,
    nodes: &[FieldNode],
    buffers: &[BufferDescriptor],
    body: &'a [u8],
) -> Result<RecordBatch<'a>> {
    if !nodes.is_empty() && nodes.len() != schema.len() {
        return Err(Error::Buffer(BufferError::NodeCountMismatch {
            nodes: nodes.len(),
            fields: schema.len(),
        }));
    }
    for (column_index, node) in nodes.iter().enumerate() {
        if usize::try_from(node.length).ok() != Some(row_count) {
            return Err(Error::Buffer(BufferError::NodeLengthMismatch {
                column_index,
                node_length: node.length,
                row_count,
            }));
        }
    }

    let mut slicer = BufferSlicer::new(buffers, body);
    let mut columns = Vec::with_capacity(schema.len());
    for (column_index, field) in schema.fields().iter().enumerate() {
        columns.push(materialize_column(
            column_index,
            field.data_type,
            row_count,
            &mut slicer,
        )?);
    }
    slicer.finish()?;

    debug!(
        "materialized record batch: rows={row_count} columns={} buffers={}",
        columns.len(),
        buffers.len()
    );
    RecordBatch::try_new(Arc::clone(schema), row_count, columns)
}

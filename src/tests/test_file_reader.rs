use crate::batch::{NativeType, RecordBatch, Value};
use crate::codec::file_reader::{CONTINUATION_MARKER, FileReader, STREAM_START};
use crate::config::ReadOptions;
use crate::error::{
    BufferError, EnvelopeError, MarkerPosition, MessageKind, ProtocolError, TypeError,
};
use crate::fixture::{
    FixtureBlock, FixtureColumn, FixtureField, FixtureType, FixtureWriter, bitmap,
    record_batch_metadata, values_le,
};
use crate::schema::{DataType, Field};
use crate::{Error, read_file, read_file_partial, read_file_with_options};

fn uint8_schema() -> Vec<FixtureField> {
    vec![FixtureField::new("x", DataType::UInt8)]
}

/// Raw slot values of primitive column `name`, including slots under nulls.
fn native<T: NativeType>(batch: &RecordBatch<'_>, name: &str) -> Vec<T> {
    let col = batch.column_by_name(name).unwrap();
    col.as_primitive::<T>().unwrap().values().collect()
}

fn uint8_file(validity: &[u8], values: &[u8]) -> Vec<u8> {
    let buffers: [&[u8]; 2] = [validity, values];
    let mut w = FixtureWriter::new();
    w.schema(uint8_schema())
        .record_batch_buffers(4, &[(4, 0)], &buffers);
    w.finish()
}

#[test]
fn uint8_column_without_nulls() {
    let bytes = uint8_file(&[], &[1, 2, 3, 4]);
    let contents = read_file(&bytes).unwrap();

    let schema = contents.schema.unwrap();
    assert_eq!(schema.fields(), &[Field::new("x", DataType::UInt8, true)]);
    assert_eq!(contents.batches.len(), 1);

    let batch = &contents.batches[0];
    assert_eq!(batch.num_rows(), 4);
    assert_eq!(batch.num_columns(), 1);
    let col = batch.column(0).unwrap().as_primitive::<u8>().unwrap();
    assert!(col.validity().is_none());
    assert_eq!(col.null_count(), 0);
    assert_eq!(
        col.iter().collect::<Vec<_>>(),
        vec![Some(1), Some(2), Some(3), Some(4)]
    );
}

#[test]
fn uint8_column_with_validity_bitmap() {
    let bytes = uint8_file(&[0b0000_1011], &[1, 2, 3, 4]);
    let contents = read_file(&bytes).unwrap();
    let col = contents.batches[0].column(0).unwrap();

    assert_eq!(col.data_type(), DataType::UInt8);
    assert!(col.is_valid(0));
    assert!(col.is_valid(1));
    assert!(col.is_null(2));
    assert!(col.is_valid(3));
    assert_eq!(col.null_count(), 1);
    assert_eq!(
        col.iter().collect::<Vec<_>>(),
        vec![
            Some(Value::UInt8(1)),
            Some(Value::UInt8(2)),
            None,
            Some(Value::UInt8(4)),
        ]
    );
    // The slot under a null keeps its raw value.
    assert_eq!(col.as_primitive::<u8>().unwrap().value(2), Some(3));
}

#[test]
fn zero_length_validity_ignores_body_bytes() {
    // Validity descriptor points at zero bytes right before values that would
    // read as "all null" if taken as a bitmap.
    let mut w = FixtureWriter::new();
    w.schema(uint8_schema()).record_batch_raw(
        4,
        &[(4, 0)],
        &[(0, 0), (0, 4)],
        &[0, 0, 0, 0, 0, 0, 0, 0],
        false,
    );
    let bytes = w.finish();
    let contents = read_file(&bytes).unwrap();
    let col = contents.batches[0].column(0).unwrap();
    assert_eq!(col.null_count(), 0);
    assert!((0..4).all(|i| col.is_valid(i)));
}

#[test]
fn end_of_stream_at_loop_entry_yields_no_batches() {
    let mut w = FixtureWriter::new();
    w.end_of_stream();
    let bytes = w.finish();
    let contents = read_file(&bytes).unwrap();
    assert!(contents.schema.is_none());
    assert!(contents.batches.is_empty());
}

#[test]
fn schema_only_stream() {
    let mut w = FixtureWriter::new();
    w.schema(uint8_schema());
    let bytes = w.finish();
    let contents = read_file(&bytes).unwrap();
    assert_eq!(contents.schema.unwrap().len(), 1);
    assert!(contents.batches.is_empty());
}

#[test]
fn every_supported_type_decodes() {
    let fields = vec![
        FixtureField::new("i8", DataType::Int8),
        FixtureField::new("u8", DataType::UInt8),
        FixtureField::new("i16", DataType::Int16),
        FixtureField::new("u16", DataType::UInt16),
        FixtureField::new("i32", DataType::Int32),
        FixtureField::new("u32", DataType::UInt32),
        FixtureField::new("i64", DataType::Int64),
        FixtureField::new("u64", DataType::UInt64),
        FixtureField::new("f32", DataType::Float32),
        FixtureField::new("f64", DataType::Float64),
        FixtureField::new("flag", DataType::Boolean),
    ];
    let columns = vec![
        FixtureColumn::all_valid(&[-128i8, 0, 127]),
        FixtureColumn::all_valid(&[0u8, 128, 255]),
        FixtureColumn::all_valid(&[i16::MIN, -1, i16::MAX]),
        FixtureColumn::all_valid(&[0u16, 1, u16::MAX]),
        FixtureColumn::all_valid(&[i32::MIN, 42, i32::MAX]),
        FixtureColumn::all_valid(&[0u32, 7, u32::MAX]),
        FixtureColumn::new(
            Some(bitmap(&[true, false, true])),
            values_le(&[i64::MIN, 0, i64::MAX]),
        ),
        FixtureColumn::all_valid(&[0u64, 1 << 40, u64::MAX]),
        FixtureColumn::all_valid(&[1.5f32, -0.25, f32::MAX]),
        FixtureColumn::all_valid(&[core::f64::consts::PI, 0.0, -1e300]),
        FixtureColumn::new(None, bitmap(&[true, false, true])),
    ];
    let mut w = FixtureWriter::new();
    w.schema(fields).record_batch(3, &columns);
    let bytes = w.finish();

    let contents = read_file(&bytes).unwrap();
    let schema = contents.schema.unwrap();
    let types: Vec<DataType> = schema.fields().iter().map(|f| f.data_type).collect();
    assert_eq!(
        types,
        vec![
            DataType::Int8,
            DataType::UInt8,
            DataType::Int16,
            DataType::UInt16,
            DataType::Int32,
            DataType::UInt32,
            DataType::Int64,
            DataType::UInt64,
            DataType::Float32,
            DataType::Float64,
            DataType::Boolean,
        ]
    );

    let batch = &contents.batches[0];
    assert_eq!(native::<i8>(batch, "i8"), vec![-128, 0, 127]);
    assert_eq!(native::<u8>(batch, "u8"), vec![0, 128, 255]);
    assert_eq!(native::<i16>(batch, "i16"), vec![i16::MIN, -1, i16::MAX]);
    assert_eq!(native::<u16>(batch, "u16"), vec![0, 1, u16::MAX]);
    assert_eq!(native::<i32>(batch, "i32"), vec![i32::MIN, 42, i32::MAX]);
    assert_eq!(native::<u32>(batch, "u32"), vec![0, 7, u32::MAX]);
    assert_eq!(native::<u64>(batch, "u64"), vec![0, 1 << 40, u64::MAX]);
    assert_eq!(native::<f32>(batch, "f32"), vec![1.5, -0.25, f32::MAX]);
    assert_eq!(
        native::<f64>(batch, "f64"),
        vec![core::f64::consts::PI, 0.0, -1e300]
    );

    let i64_col = batch.column_by_name("i64").unwrap();
    let i64_values: Vec<_> = i64_col.as_primitive::<i64>().unwrap().iter().collect();
    assert_eq!(i64_values, vec![Some(i64::MIN), None, Some(i64::MAX)]);
    let flags = batch.column_by_name("flag").unwrap().as_boolean().unwrap();
    assert_eq!(
        flags.iter().collect::<Vec<_>>(),
        vec![Some(true), Some(false), Some(true)]
    );
}

#[test]
fn multiple_batches_share_one_schema() {
    let mut w = FixtureWriter::new();
    w.schema(vec![
        FixtureField::new("a", DataType::Int32),
        FixtureField::new("a", DataType::Int8),
    ])
    .record_batch(
        2,
        &[
            FixtureColumn::all_valid(&[10i32, 20]),
            FixtureColumn::all_valid(&[1i8, 2]),
        ],
    )
    .record_batch(
        1,
        &[
            FixtureColumn::all_valid(&[30i32]),
            FixtureColumn::new(Some(vec![0]), values_le(&[3i8])),
        ],
    );
    let bytes = w.finish();

    let contents = read_file(&bytes).unwrap();
    let schema = contents.schema.unwrap();
    assert_eq!(contents.batches.len(), 2);
    for batch in &contents.batches {
        assert!(std::sync::Arc::ptr_eq(batch.schema(), &schema));
        assert_eq!(batch.num_columns(), schema.len());
        for col in batch.columns() {
            assert_eq!(col.len(), batch.num_rows());
        }
    }
    // Names may repeat; lookup by name finds the first.
    assert_eq!(
        contents.batches[1].column_by_name("a").unwrap().value(0),
        Some(Value::Int32(30))
    );
    assert_eq!(contents.batches[1].column(1).unwrap().value(0), None);
}

#[test]
fn empty_batch_decodes() {
    let mut w = FixtureWriter::new();
    w.schema(uint8_schema())
        .record_batch(0, &[FixtureColumn::new(None, Vec::new())]);
    let bytes = w.finish();
    let contents = read_file(&bytes).unwrap();
    assert_eq!(contents.batches[0].num_rows(), 0);
    assert!(contents.batches[0].column(0).unwrap().is_empty());
}

#[test]
fn unsupported_field_type_is_a_type_error() {
    let mut w = FixtureWriter::new();
    w.schema(vec![
        FixtureField::new("x", DataType::UInt8),
        FixtureField::new("s", FixtureType::Other(5)),
    ]);
    let bytes = w.finish();

    let err = read_file(&bytes).unwrap_err();
    assert!(matches!(
        err,
        Error::Type(TypeError::Unsupported {
            field_index: 1,
            bit_width: 0,
            signed: false,
            ..
        })
    ));
}

#[test]
fn unregistered_int_width_is_a_type_error() {
    let mut w = FixtureWriter::new();
    w.schema(vec![FixtureField::new(
        "wide",
        FixtureType::Int {
            bit_width: 128,
            signed: true,
        },
    )]);
    let err = read_file(&w.finish()).unwrap_err();
    assert!(matches!(
        err,
        Error::Type(TypeError::Unsupported {
            field_index: 0,
            bit_width: 128,
            signed: true,
            ..
        })
    ));
}

#[test]
fn record_batch_before_schema_is_rejected() {
    let mut w = FixtureWriter::new();
    w.record_batch(1, &[FixtureColumn::all_valid(&[1u8])]);
    let err = read_file(&w.finish()).unwrap_err();
    assert_eq!(
        err,
        Error::Protocol(ProtocolError::RecordBatchBeforeSchema {
            offset: STREAM_START,
        })
    );
}

#[test]
fn duplicate_schema_is_rejected() {
    let mut w = FixtureWriter::new();
    w.schema(uint8_schema()).schema(uint8_schema());
    let err = read_file(&w.finish()).unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::DuplicateSchema { offset }) if offset > STREAM_START
    ));
}

#[test]
fn dictionary_batch_message_is_rejected() {
    let mut w = FixtureWriter::new();
    w.schema(uint8_schema());
    let metadata = crate::fixture::message_metadata(2, crate::fixture::FbTable::new(), 0);
    w.message(&metadata, &[]);
    let err = read_file(&w.finish()).unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::UnsupportedMessage {
            kind: MessageKind::DictionaryBatch,
            ..
        })
    ));
}

#[test]
fn compressed_body_is_rejected() {
    let mut w = FixtureWriter::new();
    w.schema(uint8_schema()).record_batch_raw(
        1,
        &[(1, 0)],
        &[(0, 0), (0, 1)],
        &[7, 0, 0, 0, 0, 0, 0, 0],
        true,
    );
    let err = read_file(&w.finish()).unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::CompressedBody { .. })
    ));
}

#[test]
fn negative_row_count_is_rejected() {
    let mut w = FixtureWriter::new();
    w.schema(uint8_schema())
        .record_batch_raw(-1, &[], &[(0, 0), (0, 0)], &[], false);
    let err = read_file(&w.finish()).unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::InvalidRowCount { row_count: -1, .. })
    ));
}

#[test]
fn footer_schema_mismatch_is_detected_unless_disabled() {
    let mut w = FixtureWriter::new();
    w.schema(uint8_schema())
        .footer_schema(vec![FixtureField::new("x", DataType::Int8)])
        .record_batch(1, &[FixtureColumn::all_valid(&[9u8])]);
    let bytes = w.finish();

    let err = read_file(&bytes).unwrap_err();
    assert_eq!(err, Error::Protocol(ProtocolError::FooterSchemaMismatch));

    let mut options = ReadOptions::default();
    options.set_check_footer_schema(false);
    let contents = read_file_with_options(&bytes, options).unwrap();
    assert_eq!(contents.batches.len(), 1);
}

#[test]
fn partial_read_keeps_batches_before_failure() {
    let mut w = FixtureWriter::new();
    w.schema(uint8_schema())
        .record_batch(2, &[FixtureColumn::all_valid(&[1u8, 2])])
        // second batch declares only one buffer for a two-buffer field
        .record_batch_raw(2, &[(2, 0)], &[(0, 0)], &[], false);
    let bytes = w.finish();

    assert!(read_file(&bytes).is_err());

    let partial = read_file_partial(&bytes, ReadOptions::default()).unwrap();
    assert_eq!(partial.schema.unwrap().len(), 1);
    assert_eq!(partial.batches.len(), 1);
    assert_eq!(
        partial.error,
        Some(Error::Buffer(BufferError::Exhausted {
            requested: 2,
            supplied: 1,
        }))
    );
}

#[test]
fn partial_read_without_failure_has_no_error() {
    let bytes = uint8_file(&[], &[1, 2, 3, 4]);
    let partial = read_file_partial(&bytes, ReadOptions::default()).unwrap();
    assert!(partial.error.is_none());
    assert_eq!(partial.batches.len(), 1);
}

#[test]
fn random_access_matches_stream() {
    let mut w = FixtureWriter::new();
    w.schema(vec![FixtureField::new("v", DataType::Int64)])
        .record_batch(2, &[FixtureColumn::all_valid(&[1i64, 2])])
        .record_batch(3, &[FixtureColumn::all_valid(&[3i64, 4, 5])]);
    let bytes = w.finish();

    let reader = FileReader::try_new(&bytes).unwrap();
    assert_eq!(reader.num_record_batches(), 2);
    let streamed = reader.read().unwrap().batches;
    let random: Vec<_> = reader
        .record_batches()
        .collect::<crate::Result<_>>()
        .unwrap();
    assert_eq!(streamed, random);
    assert_eq!(
        reader.record_batch(1).unwrap().column(0).unwrap().value(2),
        Some(Value::Int64(5))
    );

    let err = reader.record_batch(2).unwrap_err();
    assert_eq!(
        err,
        Error::Protocol(ProtocolError::BlockOutOfRange { index: 2, count: 2 })
    );
}

#[test]
fn random_access_without_footer_schema_fails() {
    let mut w = FixtureWriter::new();
    w.record_batch(1, &[FixtureColumn::all_valid(&[1u8])]);
    let bytes = w.finish();
    let reader = FileReader::try_new(&bytes).unwrap();
    assert_eq!(
        reader.record_batch(0).unwrap_err(),
        Error::Protocol(ProtocolError::MissingFooterSchema)
    );
}

/// Edits footer block 0 of a one-batch file and returns why random access
/// rejected it.
fn block_mismatch_reason(edit: impl FnOnce(&mut FixtureBlock)) -> &'static str {
    let mut w = FixtureWriter::new();
    w.schema(vec![FixtureField::new("v", DataType::Int64)])
        .record_batch(1, &[FixtureColumn::all_valid(&[1i64])]);
    edit(&mut w.record_batch_blocks_mut()[0]);
    let bytes = w.finish();

    let reader = FileReader::try_new(&bytes).unwrap();
    assert_eq!(reader.read().unwrap().batches.len(), 1);
    match reader.record_batch(0).unwrap_err() {
        Error::Protocol(ProtocolError::BlockMismatch {
            index: 0,
            reason,
            ..
        }) => reason,
        other => panic!("expected a block mismatch, got {other:?}"),
    }
}

#[test]
fn block_with_negative_offset_is_rejected() {
    let reason = block_mismatch_reason(|b| b.offset = -1);
    assert_eq!(reason, "negative offset");
}

#[test]
fn block_metadata_length_must_match_message() {
    let reason = block_mismatch_reason(|b| b.metadata_length += 8);
    assert_eq!(reason, "metadata length");
}

#[test]
fn block_body_length_must_match_message() {
    let reason = block_mismatch_reason(|b| b.body_length += 8);
    assert_eq!(reason, "body length");
}

#[test]
fn block_pointing_at_schema_message_is_rejected() {
    let reason = block_mismatch_reason(|b| {
        b.metadata_length = (b.offset - STREAM_START as i64) as i32;
        b.offset = STREAM_START as i64;
        b.body_length = 0;
    });
    assert_eq!(reason, "block does not hold a record batch");
}

#[test]
fn block_pointing_at_end_of_stream_is_rejected() {
    let reason = block_mismatch_reason(|b| b.offset += b.metadata_length as i64 + b.body_length);
    assert_eq!(reason, "block points at the end-of-stream marker");
}

#[test]
fn batches_borrow_from_input() {
    let bytes = uint8_file(&[], &[1, 2, 3, 4]);
    let contents = read_file(&bytes).unwrap();
    let col = contents.batches[0].column(0).unwrap();
    let values = col.as_primitive::<u8>().unwrap().values_bytes();
    let range = bytes.as_ptr_range();
    assert!(range.contains(&values.as_ptr()));
}

#[test]
fn missing_start_magic_is_an_envelope_error() {
    let mut bytes = uint8_file(&[], &[1, 2, 3, 4]);
    bytes[0] = b'X';
    assert_eq!(
        read_file(&bytes).unwrap_err(),
        Error::Envelope(EnvelopeError::MissingMarker {
            position: MarkerPosition::Start,
            file_len: bytes.len(),
        })
    );
}

#[test]
fn missing_end_magic_is_an_envelope_error() {
    let mut bytes = uint8_file(&[], &[1, 2, 3, 4]);
    let last = bytes.len() - 1;
    bytes[last] = b'2';
    assert_eq!(
        read_file(&bytes).unwrap_err(),
        Error::Envelope(EnvelopeError::MissingMarker {
            position: MarkerPosition::End,
            file_len: bytes.len(),
        })
    );
}

#[test]
fn buffer_shorter_than_envelope_is_rejected() {
    for bytes in [&b"ARROW1"[..], &b"ARROW1ARROW1"[..]] {
        assert_eq!(
            read_file(bytes).unwrap_err(),
            Error::Envelope(EnvelopeError::TooShort {
                file_len: bytes.len(),
                min_len: 18,
            })
        );
    }
}

#[test]
fn footer_length_out_of_range_is_rejected() {
    let bytes = uint8_file(&[], &[1, 2, 3, 4]);
    let len_pos = bytes.len() - 10;
    for footer_length in [i32::MAX, -1, (bytes.len() - 10 - STREAM_START + 1) as i32] {
        let mut tampered = bytes.clone();
        tampered[len_pos..len_pos + 4].copy_from_slice(&footer_length.to_le_bytes());
        assert_eq!(
            read_file(&tampered).unwrap_err(),
            Error::Envelope(EnvelopeError::FooterLengthOutOfRange {
                footer_length: footer_length as i64,
                file_len: bytes.len(),
            })
        );
    }
}

#[test]
fn undecodable_footer_is_rejected() {
    let mut bytes = uint8_file(&[], &[1, 2, 3, 4]);
    let len_pos = bytes.len() - 10;
    bytes[len_pos..len_pos + 4].copy_from_slice(&0i32.to_le_bytes());
    assert!(matches!(
        read_file(&bytes).unwrap_err(),
        Error::Envelope(EnvelopeError::InvalidFooter { footer_offset, .. }) if footer_offset == len_pos
    ));
}

#[test]
fn zeroed_continuation_marker_is_a_protocol_error() {
    let mut bytes = uint8_file(&[], &[1, 2, 3, 4]);
    bytes[STREAM_START..STREAM_START + 4].copy_from_slice(&[0; 4]);
    assert_eq!(
        read_file(&bytes).unwrap_err(),
        Error::Protocol(ProtocolError::InvalidContinuation {
            offset: STREAM_START,
            found: [0; 4],
        })
    );
}

#[test]
fn negative_metadata_length_is_rejected() {
    let mut w = FixtureWriter::new();
    w.raw(&CONTINUATION_MARKER).raw(&(-5i32).to_le_bytes());
    let err = read_file(&w.finish_without_eos()).unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::InvalidMetadataLength {
            offset: 12,
            length: -5,
            ..
        })
    ));
}

#[test]
fn metadata_longer_than_limit_is_rejected() {
    let mut w = FixtureWriter::new();
    w.schema(uint8_schema());
    let bytes = w.finish();

    let mut options = ReadOptions::default();
    options.set_max_metadata_len(16);
    let err = read_file_with_options(&bytes, options).unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::InvalidMetadataLength { offset: 12, .. })
    ));
}

#[test]
fn body_longer_than_buffer_is_rejected() {
    let mut w = FixtureWriter::new();
    w.schema(uint8_schema());
    let metadata = record_batch_metadata(4, &[(4, 0)], &[(0, 0), (0, 4)], 1000, false);
    w.message(&metadata, &[]);
    let err = read_file(&w.finish()).unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::BodyExceedsBuffer {
            body_length: 1000,
            ..
        })
    ));
}

#[test]
fn stream_without_end_marker_is_truncated() {
    let mut w = FixtureWriter::new();
    w.schema(uint8_schema());
    let err = read_file(&w.finish_without_eos()).unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::Truncated {
            needed: 4,
            available: 0,
            ..
        })
    ));
}

#[test]
fn garbage_metadata_is_a_protocol_error() {
    let mut w = FixtureWriter::new();
    w.raw(&CONTINUATION_MARKER)
        .raw(&8i32.to_le_bytes())
        .raw(&[0xFF; 8]);
    let err = read_file(&w.finish()).unwrap_err();
    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::InvalidMetadata { offset: 16, .. })
    ));
}

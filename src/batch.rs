use core::fmt;
use core::marker::PhantomData;
use std::sync::Arc;

use crate::error::{BufferError, TypeError};
use crate::schema::{DataType, Schema};
use crate::{Error, Result};

fn ceil_div_8(n: usize) -> core::result::Result<usize, BufferError> {
    n.checked_add(7)
        .ok_or(BufferError::SizeOverflow {
            what: "bitmap length",
        })
        .map(|v| v / 8)
}

#[inline]
fn bit_is_set(bytes: &[u8], idx: usize) -> Option<bool> {
    bytes.get(idx / 8).map(|b| (b & (1u8 << (idx % 8))) != 0)
}

/// Borrowed LSB-first validity bitmap; a set bit marks a valid row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityBitmap<'a> {
    bytes: &'a [u8],
}

impl<'a> ValidityBitmap<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn len_for_row_count(row_count: usize) -> core::result::Result<usize, BufferError> {
        ceil_div_8(row_count)
    }

    /// `None` when `row_idx` lies beyond the bitmap.
    pub fn is_valid(&self, row_idx: usize) -> Option<bool> {
        bit_is_set(self.bytes, row_idx)
    }

    /// Unset bits among the first `len` rows.
    pub fn null_count(&self, len: usize) -> usize {
        let full = len / 8;
        let rem = len % 8;
        let mut valid: usize = self
            .bytes
            .iter()
            .take(full)
            .map(|b| b.count_ones() as usize)
            .sum();
        if rem != 0 {
            if let Some(last) = self.bytes.get(full) {
                let mask = (1u8 << rem) - 1;
                valid += (last & mask).count_ones() as usize;
            }
        }
        len.saturating_sub(valid)
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

mod private {
    pub trait Sealed {}
}

/// Fixed-width little-endian element types a [`PrimitiveArray`] can view.
pub trait NativeType: private::Sealed + Copy + Default + PartialEq + fmt::Debug + 'static {
    const DATA_TYPE: DataType;
    const BYTE_WIDTH: usize;

    /// Decodes one element from the first `BYTE_WIDTH` bytes of `bytes`.
    fn from_le_slice(bytes: &[u8]) -> Self;

    fn into_value(self) -> Value;

    fn downcast<'b, 'a>(array: &'b Array<'a>) -> Option<&'b PrimitiveArray<'a, Self>>;
}

macro_rules! native_type {
    ($t:ty, $variant:ident) => {
        impl private::Sealed for $t {}

        impl NativeType for $t {
            const DATA_TYPE: DataType = DataType::$variant;
            const BYTE_WIDTH: usize = core::mem::size_of::<$t>();

            #[inline]
            fn from_le_slice(bytes: &[u8]) -> Self {
                let mut raw = [0u8; core::mem::size_of::<$t>()];
                raw.copy_from_slice(&bytes[..core::mem::size_of::<$t>()]);
                <$t>::from_le_bytes(raw)
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn downcast<'b, 'a>(array: &'b Array<'a>) -> Option<&'b PrimitiveArray<'a, Self>> {
                match array {
                    Array::$variant(a) => Some(a),
                    _ => None,
                }
            }
        }
    };
}

native_type!(i8, Int8);
native_type!(u8, UInt8);
native_type!(i16, Int16);
native_type!(u16, UInt16);
native_type!(i32, Int32);
native_type!(u32, UInt32);
native_type!(i64, Int64);
native_type!(u64, UInt64);
native_type!(f32, Float32);
native_type!(f64, Float64);

/// Fixed-width column viewing its values region in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimitiveArray<'a, T: NativeType> {
    len: usize,
    validity: Option<ValidityBitmap<'a>>,
    values: &'a [u8],
    _marker: PhantomData<T>,
}

impl<'a, T: NativeType> PrimitiveArray<'a, T> {
    /// Caller guarantees `values.len() >= len * T::BYTE_WIDTH` and a bitmap of
    /// at least `ceil(len / 8)` bytes.
    pub(crate) fn from_parts(
        len: usize,
        validity: Option<ValidityBitmap<'a>>,
        values: &'a [u8],
    ) -> Self {
        Self {
            len,
            validity,
            values,
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn validity(&self) -> Option<ValidityBitmap<'a>> {
        self.validity
    }

    pub fn values_bytes(&self) -> &'a [u8] {
        self.values
    }

    pub fn is_valid(&self, i: usize) -> bool {
        if i >= self.len {
            return false;
        }
        match self.validity {
            None => true,
            Some(bitmap) => bitmap.is_valid(i).unwrap_or(false),
        }
    }

    pub fn is_null(&self, i: usize) -> bool {
        i < self.len && !self.is_valid(i)
    }

    pub fn null_count(&self) -> usize {
        self.validity.map_or(0, |b| b.null_count(self.len))
    }

    /// Raw slot value regardless of validity.
    pub fn value(&self, i: usize) -> Option<T> {
        if i >= self.len {
            return None;
        }
        let start = i * T::BYTE_WIDTH;
        self.values
            .get(start..start + T::BYTE_WIDTH)
            .map(T::from_le_slice)
    }

    /// Slot value, or `None` when the row is null or out of range.
    pub fn get(&self, i: usize) -> Option<T> {
        if self.is_valid(i) {
            self.value(i)
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<T>> + use<'a, T> {
        let this = *self;
        (0..self.len).map(move |i| this.get(i))
    }

    /// Raw slot values regardless of validity.
    pub fn values(&self) -> impl Iterator<Item = T> + use<'a, T> {
        self.values
            .chunks_exact(T::BYTE_WIDTH)
            .take(self.len)
            .map(T::from_le_slice)
    }
}

/// Bit-packed boolean column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BooleanArray<'a> {
    len: usize,
    validity: Option<ValidityBitmap<'a>>,
    values: &'a [u8],
}

impl<'a> BooleanArray<'a> {
    pub(crate) fn from_parts(
        len: usize,
        validity: Option<ValidityBitmap<'a>>,
        values: &'a [u8],
    ) -> Self {
        Self {
            len,
            validity,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn validity(&self) -> Option<ValidityBitmap<'a>> {
        self.validity
    }

    pub fn values_bytes(&self) -> &'a [u8] {
        self.values
    }

    pub fn is_valid(&self, i: usize) -> bool {
        if i >= self.len {
            return false;
        }
        match self.validity {
            None => true,
            Some(bitmap) => bitmap.is_valid(i).unwrap_or(false),
        }
    }

    pub fn is_null(&self, i: usize) -> bool {
        i < self.len && !self.is_valid(i)
    }

    pub fn null_count(&self) -> usize {
        self.validity.map_or(0, |b| b.null_count(self.len))
    }

    pub fn value(&self, i: usize) -> Option<bool> {
        if i >= self.len {
            return None;
        }
        bit_is_set(self.values, i)
    }

    pub fn get(&self, i: usize) -> Option<bool> {
        if self.is_valid(i) {
            self.value(i)
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<bool>> + use<'a> {
        let this = *self;
        (0..self.len).map(move |i| this.get(i))
    }
}

/// Dynamically typed scalar read out of an [`Array`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "tools-json", derive(serde::Serialize), serde(untagged))]
pub enum Value {
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Boolean(bool),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int8(_) => DataType::Int8,
            Value::UInt8(_) => DataType::UInt8,
            Value::Int16(_) => DataType::Int16,
            Value::UInt16(_) => DataType::UInt16,
            Value::Int32(_) => DataType::Int32,
            Value::UInt32(_) => DataType::UInt32,
            Value::Int64(_) => DataType::Int64,
            Value::UInt64(_) => DataType::UInt64,
            Value::Float32(_) => DataType::Float32,
            Value::Float64(_) => DataType::Float64,
            Value::Boolean(_) => DataType::Boolean,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int8(v) => write!(f, "{v}"),
            Value::UInt8(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::UInt16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::UInt32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::UInt64(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
        }
    }
}

/// A materialized column, borrowing its buffers from the file bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Array<'a> {
    Int8(PrimitiveArray<'a, i8>),
    UInt8(PrimitiveArray<'a, u8>),
    Int16(PrimitiveArray<'a, i16>),
    UInt16(PrimitiveArray<'a, u16>),
    Int32(PrimitiveArray<'a, i32>),
    UInt32(PrimitiveArray<'a, u32>),
    Int64(PrimitiveArray<'a, i64>),
    UInt64(PrimitiveArray<'a, u64>),
    Float32(PrimitiveArray<'a, f32>),
    Float64(PrimitiveArray<'a, f64>),
    Boolean(BooleanArray<'a>),
}

macro_rules! dispatch {
    ($array:expr, $a:ident => $body:expr) => {
        match $array {
            Array::Int8($a) => $body,
            Array::UInt8($a) => $body,
            Array::Int16($a) => $body,
            Array::UInt16($a) => $body,
            Array::Int32($a) => $body,
            Array::UInt32($a) => $body,
            Array::Int64($a) => $body,
            Array::UInt64($a) => $body,
            Array::Float32($a) => $body,
            Array::Float64($a) => $body,
            Array::Boolean($a) => $body,
        }
    };
}

impl<'a> Array<'a> {
    /// Wraps already-validated buffers in the variant matching `data_type`.
    pub(crate) fn from_parts(
        data_type: DataType,
        len: usize,
        validity: Option<ValidityBitmap<'a>>,
        values: &'a [u8],
    ) -> Self {
        match data_type {
            DataType::Int8 => Array::Int8(PrimitiveArray::from_parts(len, validity, values)),
            DataType::UInt8 => Array::UInt8(PrimitiveArray::from_parts(len, validity, values)),
            DataType::Int16 => Array::Int16(PrimitiveArray::from_parts(len, validity, values)),
            DataType::UInt16 => Array::UInt16(PrimitiveArray::from_parts(len, validity, values)),
            DataType::Int32 => Array::Int32(PrimitiveArray::from_parts(len, validity, values)),
            DataType::UInt32 => Array::UInt32(PrimitiveArray::from_parts(len, validity, values)),
            DataType::Int64 => Array::Int64(PrimitiveArray::from_parts(len, validity, values)),
            DataType::UInt64 => Array::UInt64(PrimitiveArray::from_parts(len, validity, values)),
            DataType::Float32 => Array::Float32(PrimitiveArray::from_parts(len, validity, values)),
            DataType::Float64 => Array::Float64(PrimitiveArray::from_parts(len, validity, values)),
            DataType::Boolean => Array::Boolean(BooleanArray::from_parts(len, validity, values)),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Array::Int8(_) => DataType::Int8,
            Array::UInt8(_) => DataType::UInt8,
            Array::Int16(_) => DataType::Int16,
            Array::UInt16(_) => DataType::UInt16,
            Array::Int32(_) => DataType::Int32,
            Array::UInt32(_) => DataType::UInt32,
            Array::Int64(_) => DataType::Int64,
            Array::UInt64(_) => DataType::UInt64,
            Array::Float32(_) => DataType::Float32,
            Array::Float64(_) => DataType::Float64,
            Array::Boolean(_) => DataType::Boolean,
        }
    }

    pub fn len(&self) -> usize {
        dispatch!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validity(&self) -> Option<ValidityBitmap<'a>> {
        dispatch!(self, a => a.validity())
    }

    pub fn is_null(&self, i: usize) -> bool {
        dispatch!(self, a => a.is_null(i))
    }

    pub fn is_valid(&self, i: usize) -> bool {
        dispatch!(self, a => a.is_valid(i))
    }

    pub fn null_count(&self) -> usize {
        dispatch!(self, a => a.null_count())
    }

    /// Row `i` as a [`Value`], `None` when null or out of range.
    pub fn value(&self, i: usize) -> Option<Value> {
        match self {
            Array::Boolean(a) => a.get(i).map(Value::Boolean),
            Array::Int8(a) => a.get(i).map(NativeType::into_value),
            Array::UInt8(a) => a.get(i).map(NativeType::into_value),
            Array::Int16(a) => a.get(i).map(NativeType::into_value),
            Array::UInt16(a) => a.get(i).map(NativeType::into_value),
            Array::Int32(a) => a.get(i).map(NativeType::into_value),
            Array::UInt32(a) => a.get(i).map(NativeType::into_value),
            Array::Int64(a) => a.get(i).map(NativeType::into_value),
            Array::UInt64(a) => a.get(i).map(NativeType::into_value),
            Array::Float32(a) => a.get(i).map(NativeType::into_value),
            Array::Float64(a) => a.get(i).map(NativeType::into_value),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<Value>> + use<'a> {
        let this = *self;
        (0..self.len()).map(move |i| this.value(i))
    }

    pub fn as_primitive<T: NativeType>(&self) -> Option<&PrimitiveArray<'a, T>> {
        T::downcast(self)
    }

    pub fn as_boolean(&self) -> Option<&BooleanArray<'a>> {
        match self {
            Array::Boolean(a) => Some(a),
            _ => None,
        }
    }
}

/// One decoded record batch. Columns borrow from the buffer the batch was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch<'a> {
    schema: Arc<Schema>,
    row_count: usize,
    columns: Vec<Array<'a>>,
}

impl<'a> RecordBatch<'a> {
    pub fn try_new(schema: Arc<Schema>, row_count: usize, columns: Vec<Array<'a>>) -> Result<Self> {
        let batch = Self {
            schema,
            row_count,
            columns,
        };
        batch.validate()?;
        Ok(batch)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema.len() != self.columns.len() {
            return Err(Error::Buffer(BufferError::ColumnCountMismatch {
                columns: self.columns.len(),
                fields: self.schema.len(),
            }));
        }
        let fields = self.schema.fields();
        for (column_index, (field, col)) in fields.iter().zip(&self.columns).enumerate() {
            if col.data_type() != field.data_type {
                return Err(Error::Type(TypeError::ColumnTypeMismatch {
                    column_index,
                    expected: field.data_type,
                    actual: col.data_type(),
                }));
            }
            if col.len() != self.row_count {
                return Err(Error::Buffer(BufferError::ColumnLengthMismatch {
                    column_index,
                    actual: col.len(),
                    row_count: self.row_count,
                }));
            }
        }
        Ok(())
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn num_rows(&self) -> usize {
        self.row_count
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Array<'a>] {
        &self.columns
    }

    pub fn column(&self, i: usize) -> Option<&Array<'a>> {
        self.columns.get(i)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Array<'a>> {
        self.schema.index_of(name).and_then(|i| self.columns.get(i))
    }
}

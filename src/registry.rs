//! Closed lookup table from metadata type descriptors to [`DataType`].

use crate::error::TypeError;
use crate::schema::DataType;

/// Discriminant of the Arrow `Type` union as it appears in field metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    Null,
    Int,
    FloatingPoint,
    Binary,
    Utf8,
    Bool,
    Decimal,
    Date,
    Time,
    Timestamp,
    Interval,
    List,
    Struct,
    Union,
    FixedSizeBinary,
    FixedSizeList,
    Map,
    Duration,
    LargeBinary,
    LargeUtf8,
    LargeList,
    RunEndEncoded,
    BinaryView,
    Utf8View,
    ListView,
    LargeListView,
    Unknown(u8),
}

impl TypeCode {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => TypeCode::Null,
            2 => TypeCode::Int,
            3 => TypeCode::FloatingPoint,
            4 => TypeCode::Binary,
            5 => TypeCode::Utf8,
            6 => TypeCode::Bool,
            7 => TypeCode::Decimal,
            8 => TypeCode::Date,
            9 => TypeCode::Time,
            10 => TypeCode::Timestamp,
            11 => TypeCode::Interval,
            12 => TypeCode::List,
            13 => TypeCode::Struct,
            14 => TypeCode::Union,
            15 => TypeCode::FixedSizeBinary,
            16 => TypeCode::FixedSizeList,
            17 => TypeCode::Map,
            18 => TypeCode::Duration,
            19 => TypeCode::LargeBinary,
            20 => TypeCode::LargeUtf8,
            21 => TypeCode::LargeList,
            22 => TypeCode::RunEndEncoded,
            23 => TypeCode::BinaryView,
            24 => TypeCode::Utf8View,
            25 => TypeCode::ListView,
            26 => TypeCode::LargeListView,
            other => TypeCode::Unknown(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            TypeCode::Null => 1,
            TypeCode::Int => 2,
            TypeCode::FloatingPoint => 3,
            TypeCode::Binary => 4,
            TypeCode::Utf8 => 5,
            TypeCode::Bool => 6,
            TypeCode::Decimal => 7,
            TypeCode::Date => 8,
            TypeCode::Time => 9,
            TypeCode::Timestamp => 10,
            TypeCode::Interval => 11,
            TypeCode::List => 12,
            TypeCode::Struct => 13,
            TypeCode::Union => 14,
            TypeCode::FixedSizeBinary => 15,
            TypeCode::FixedSizeList => 16,
            TypeCode::Map => 17,
            TypeCode::Duration => 18,
            TypeCode::LargeBinary => 19,
            TypeCode::LargeUtf8 => 20,
            TypeCode::LargeList => 21,
            TypeCode::RunEndEncoded => 22,
            TypeCode::BinaryView => 23,
            TypeCode::Utf8View => 24,
            TypeCode::ListView => 25,
            TypeCode::LargeListView => 26,
            TypeCode::Unknown(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeEntry {
    pub type_code: TypeCode,
    pub bit_width: i32,
    pub signed: bool,
    pub data_type: DataType,
}

const fn entry(
    type_code: TypeCode,
    bit_width: i32,
    signed: bool,
    data_type: DataType,
) -> TypeEntry {
    TypeEntry {
        type_code,
        bit_width,
        signed,
        data_type,
    }
}

pub const REGISTRY: &[TypeEntry] = &[
    entry(TypeCode::Int, 8, true, DataType::Int8),
    entry(TypeCode::Int, 8, false, DataType::UInt8),
    entry(TypeCode::Int, 16, true, DataType::Int16),
    entry(TypeCode::Int, 16, false, DataType::UInt16),
    entry(TypeCode::Int, 32, true, DataType::Int32),
    entry(TypeCode::Int, 32, false, DataType::UInt32),
    entry(TypeCode::Int, 64, true, DataType::Int64),
    entry(TypeCode::Int, 64, false, DataType::UInt64),
    entry(TypeCode::FloatingPoint, 32, true, DataType::Float32),
    entry(TypeCode::FloatingPoint, 64, true, DataType::Float64),
    entry(TypeCode::Bool, 1, false, DataType::Boolean),
];

pub fn resolve(type_code: TypeCode, bit_width: i32, signed: bool) -> Result<DataType, TypeError> {
    REGISTRY
        .iter()
        .find(|e| {
            e.type_code == type_code && e.bit_width == bit_width && e.signed == signed
        })
        .map(|e| e.data_type)
        .ok_or(TypeError::Unresolved {
            type_code,
            bit_width,
            signed,
        })
}

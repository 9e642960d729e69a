use core::fmt;

/// Semantic scalar type of a column.
///
/// Width and signedness are derived from the variant; adding a type means
/// adding a variant here and a row in [`crate::registry::REGISTRY`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "tools-json", derive(serde::Serialize))]
pub enum DataType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    Boolean,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Int8 => "Int8",
            DataType::UInt8 => "UInt8",
            DataType::Int16 => "Int16",
            DataType::UInt16 => "UInt16",
            DataType::Int32 => "Int32",
            DataType::UInt32 => "UInt32",
            DataType::Int64 => "Int64",
            DataType::UInt64 => "UInt64",
            DataType::Float32 => "Float32",
            DataType::Float64 => "Float64",
            DataType::Boolean => "Boolean",
        }
    }

    pub fn bit_width(&self) -> u32 {
        match self {
            DataType::Int8 | DataType::UInt8 => 8,
            DataType::Int16 | DataType::UInt16 => 16,
            DataType::Int32 | DataType::UInt32 | DataType::Float32 => 32,
            DataType::Int64 | DataType::UInt64 | DataType::Float64 => 64,
            DataType::Boolean => 1,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::Float32
                | DataType::Float64
        )
    }

    /// Bytes per element in the values buffer, `None` for bit-packed types.
    pub fn byte_width(&self) -> Option<usize> {
        match self {
            DataType::Boolean => None,
            other => Some((other.bit_width() / 8) as usize),
        }
    }

    /// Number of physical buffers one column of this type consumes: validity, values.
    pub fn buffer_count(&self) -> usize {
        2
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "tools-json", derive(serde::Serialize))]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

/// Ordered field list. Position, not name, identifies a column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "tools-json", derive(serde::Serialize))]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, i: usize) -> Option<&Field> {
        self.fields.get(i)
    }

    /// Position of the first field called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

use crate::codec::metadata::{Endianness, SchemaDescriptor};
use crate::error::TypeError;
use crate::registry;
use crate::schema::{Field, Schema};
use crate::{Error, Result};

/// Resolves every field descriptor, preserving order.
pub fn build_schema(desc: &SchemaDescriptor) -> Result<Schema> {
    if desc.endianness == Endianness::Big {
        return Err(Error::Type(TypeError::BigEndian));
    }

    let mut fields = Vec::with_capacity(desc.fields.len());
    for (field_index, fd) in desc.fields.iter().enumerate() {
        if fd.dictionary_encoded {
            return Err(Error::Type(TypeError::DictionaryEncoded {
                field_index,
                name: fd.name.clone(),
            }));
        }
        if fd.child_count > 0 {
            return Err(Error::Type(TypeError::Nested {
                field_index,
                name: fd.name.clone(),
            }));
        }
        let data_type = registry::resolve(fd.type_code, fd.bit_width, fd.signed).map_err(|_| {
            TypeError::Unsupported {
                field_index,
                name: fd.name.clone(),
                type_code: fd.type_code,
                bit_width: fd.bit_width,
                signed: fd.signed,
            }
        })?;
        fields.push(Field::new(fd.name.clone(), data_type, fd.nullable));
    }
    Ok(Schema::new(fields))
}

//! Bounds-checked access to FlatBuffers tables.
//!
//! Only the subset the Arrow metadata uses: scalar fields, offsets to tables,
//! strings, vectors of tables and vectors of fixed-size structs. Every read is
//! checked against the slice, so malformed metadata yields a [`MetadataError`]
//! instead of a panic.

use crate::error::MetadataError;

type Result<T> = core::result::Result<T, MetadataError>;

fn take(bytes: &[u8], pos: usize, n: usize) -> Result<&[u8]> {
    let end = pos
        .checked_add(n)
        .ok_or_else(|| MetadataError::new(pos, "offset overflow"))?;
    bytes
        .get(pos..end)
        .ok_or_else(|| {
            MetadataError::new(pos, format!("read of {n} bytes out of bounds"))
        })
}

pub(crate) fn read_u8(bytes: &[u8], pos: usize) -> Result<u8> {
    Ok(take(bytes, pos, 1)?[0])
}

pub(crate) fn read_u16_le(bytes: &[u8], pos: usize) -> Result<u16> {
    let b = take(bytes, pos, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

pub(crate) fn read_i16_le(bytes: &[u8], pos: usize) -> Result<i16> {
    let b = take(bytes, pos, 2)?;
    Ok(i16::from_le_bytes([b[0], b[1]]))
}

pub(crate) fn read_u32_le(bytes: &[u8], pos: usize) -> Result<u32> {
    let b = take(bytes, pos, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub(crate) fn read_i32_le(bytes: &[u8], pos: usize) -> Result<i32> {
    let b = take(bytes, pos, 4)?;
    Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub(crate) fn read_i64_le(bytes: &[u8], pos: usize) -> Result<i64> {
    let b = take(bytes, pos, 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(b);
    Ok(i64::from_le_bytes(raw))
}

/// Follows the `uoffset_t` stored at `pos`.
fn follow(bytes: &[u8], pos: usize) -> Result<usize> {
    let rel = read_u32_le(bytes, pos)? as usize;
    let target = pos
        .checked_add(rel)
        .ok_or_else(|| MetadataError::new(pos, "offset overflow"))?;
    if target >= bytes.len() {
        return Err(MetadataError::new(pos, "offset points past end of buffer"));
    }
    Ok(target)
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Table<'a> {
    bytes: &'a [u8],
    pos: usize,
    vtable: usize,
    vtable_len: usize,
}

impl<'a> Table<'a> {
    /// The root table referenced by the leading offset of a finished buffer.
    pub(crate) fn root(bytes: &'a [u8]) -> Result<Self> {
        let pos = follow(bytes, 0)?;
        Self::at(bytes, pos)
    }

    fn at(bytes: &'a [u8], pos: usize) -> Result<Self> {
        let soffset = read_i32_le(bytes, pos)? as i64;
        let vtable = (pos as i64)
            .checked_sub(soffset)
            .filter(|v| *v >= 0)
            .ok_or_else(|| MetadataError::new(pos, "vtable offset out of range"))?
            as usize;
        let vtable_len = read_u16_le(bytes, vtable)? as usize;
        if vtable_len < 4 || vtable_len % 2 != 0 {
            return Err(MetadataError::new(vtable, "malformed vtable length"));
        }
        take(bytes, vtable, vtable_len)?;
        let table_len = read_u16_le(bytes, vtable + 2)? as usize;
        take(bytes, pos, table_len.max(4))?;
        Ok(Self {
            bytes,
            pos,
            vtable,
            vtable_len,
        })
    }

    /// Absolute position of field `id`, `None` when the field is absent.
    fn field_pos(&self, id: u16) -> Result<Option<usize>> {
        let entry = 4 + 2 * id as usize;
        if entry + 2 > self.vtable_len {
            return Ok(None);
        }
        let off = read_u16_le(self.bytes, self.vtable + entry)? as usize;
        if off == 0 {
            return Ok(None);
        }
        Ok(Some(self.pos + off))
    }

    pub(crate) fn get_u8(&self, id: u16, default: u8) -> Result<u8> {
        match self.field_pos(id)? {
            Some(p) => read_u8(self.bytes, p),
            None => Ok(default),
        }
    }

    pub(crate) fn get_bool(&self, id: u16, default: bool) -> Result<bool> {
        Ok(self.get_u8(id, default as u8)? != 0)
    }

    pub(crate) fn get_i16(&self, id: u16, default: i16) -> Result<i16> {
        match self.field_pos(id)? {
            Some(p) => read_i16_le(self.bytes, p),
            None => Ok(default),
        }
    }

    pub(crate) fn get_i32(&self, id: u16, default: i32) -> Result<i32> {
        match self.field_pos(id)? {
            Some(p) => read_i32_le(self.bytes, p),
            None => Ok(default),
        }
    }

    pub(crate) fn get_i64(&self, id: u16, default: i64) -> Result<i64> {
        match self.field_pos(id)? {
            Some(p) => read_i64_le(self.bytes, p),
            None => Ok(default),
        }
    }

    pub(crate) fn has_field(&self, id: u16) -> Result<bool> {
        Ok(self.field_pos(id)?.is_some())
    }

    pub(crate) fn get_table(&self, id: u16) -> Result<Option<Table<'a>>> {
        match self.field_pos(id)? {
            Some(p) => Ok(Some(Table::at(self.bytes, follow(self.bytes, p)?)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn get_str(&self, id: u16) -> Result<Option<&'a str>> {
        let Some(p) = self.field_pos(id)? else {
            return Ok(None);
        };
        let start = follow(self.bytes, p)?;
        let len = read_u32_le(self.bytes, start)? as usize;
        let raw = take(self.bytes, start + 4, len)?;
        let s = core::str::from_utf8(raw)
            .map_err(|_| MetadataError::new(start, "string is not valid UTF-8"))?;
        Ok(Some(s))
    }

    pub(crate) fn get_vector(&self, id: u16) -> Result<Option<Vector<'a>>> {
        let Some(p) = self.field_pos(id)? else {
            return Ok(None);
        };
        let start = follow(self.bytes, p)?;
        let len = read_u32_le(self.bytes, start)? as usize;
        Ok(Some(Vector {
            bytes: self.bytes,
            start: start + 4,
            len,
        }))
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Vector<'a> {
    bytes: &'a [u8],
    start: usize,
    len: usize,
}

impl<'a> Vector<'a> {
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Element `i` of a vector of tables.
    pub(crate) fn table(&self, i: usize) -> Result<Table<'a>> {
        if i >= self.len {
            return Err(MetadataError::new(self.start, "vector index out of range"));
        }
        let slot = self.start + 4 * i;
        Table::at(self.bytes, follow(self.bytes, slot)?)
    }

    /// Element `i` of a vector of inline structs of `size` bytes.
    pub(crate) fn struct_bytes(&self, i: usize, size: usize) -> Result<&'a [u8]> {
        if i >= self.len {
            return Err(MetadataError::new(self.start, "vector index out of range"));
        }
        let pos = i
            .checked_mul(size)
            .and_then(|o| o.checked_add(self.start))
            .ok_or_else(|| MetadataError::new(self.start, "struct vector overflow"))?;
        take(self.bytes, pos, size)
    }

    /// Checks that the whole struct vector fits the buffer before iterating it.
    pub(crate) fn check_structs(&self, size: usize) -> Result<()> {
        let total = self
            .len
            .checked_mul(size)
            .ok_or_else(|| MetadataError::new(self.start, "struct vector overflow"))?;
        take(self.bytes, self.start, total).map(|_| ())
    }
}

use log::trace;

use crate::codec::metadata::BufferDescriptor;
use crate::error::BufferError;

/// Hands out body slices for a flat descriptor list, strictly in order.
///
/// Returned slices are views into `body`; nothing is copied.
#[derive(Debug)]
pub struct BufferSlicer<'d, 'a> {
    descriptors: &'d [BufferDescriptor],
    body: &'a [u8],
    next: usize,
}

impl<'d, 'a> BufferSlicer<'d, 'a> {
    pub fn new(descriptors: &'d [BufferDescriptor], body: &'a [u8]) -> Self {
        Self {
            descriptors,
            body,
            next: 0,
        }
    }

    pub fn next_slice(&mut self) -> Result<&'a [u8], BufferError> {
        let index = self.next;
        let desc = self
            .descriptors
            .get(index)
            .ok_or(BufferError::Exhausted {
                requested: index + 1,
                supplied: self.descriptors.len(),
            })?;

        let out_of_bounds = || BufferError::OutOfBodyBounds {
            index,
            offset: desc.offset,
            length: desc.length,
            body_len: self.body.len(),
        };
        let start = usize::try_from(desc.offset).map_err(|_| out_of_bounds())?;
        let len = usize::try_from(desc.length).map_err(|_| out_of_bounds())?;
        let end = start.checked_add(len).ok_or_else(out_of_bounds)?;
        let slice = self.body.get(start..end).ok_or_else(out_of_bounds)?;

        trace!("buffer #{index}: offset={start} length={len}");
        self.next += 1;
        Ok(slice)
    }

    pub fn consumed(&self) -> usize {
        self.next
    }

    pub fn remaining(&self) -> usize {
        self.descriptors.len() - self.next
    }

    /// Fails unless every descriptor has been handed out.
    pub fn finish(self) -> Result<(), BufferError> {
        if self.next != self.descriptors.len() {
            return Err(BufferError::UnconsumedBuffers {
                consumed: self.next,
                supplied: self.descriptors.len(),
            });
        }
        Ok(())
    }
}

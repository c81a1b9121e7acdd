// Copyright 2021 Adam Greig
// Licensed under the MIT license.

use log::debug;

use super::JamError;

/// Bytes charged against the workspace for each array record, before its data.
pub const RECORD_HEADER_BYTES: usize = 24;

/// Reference to an array stored on the [`Heap`].
///
/// Handles are only valid for the heap generation that issued them; using a
/// handle after the heap has been reset is an `InternalError`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ArrayHandle {
    index: usize,
    generation: u32,
}

#[derive(Clone, Debug)]
struct Record {
    boolean: bool,
    dimension: u32,
    offset: usize,
    words: usize,
}

/// Storage for array data, carved from the workspace left over after the
/// symbol table and stack.
///
/// Integer arrays take one 32-bit word per element; Boolean arrays are packed
/// 32 elements per word, element 0 in the least significant bit of word 0.
/// Records are only ever added, until the next [`Heap::reset`].
#[derive(Clone, Debug)]
pub struct Heap {
    capacity: usize,
    used: usize,
    generation: u32,
    records: Vec<Record>,
    words: Vec<u32>,
}

impl Heap {
    /// Create an empty heap which may use up to `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Heap { capacity, used: 0, generation: 0, records: Vec::new(), words: Vec::new() }
    }

    /// Discard every record, invalidating all previously issued handles.
    pub fn reset(&mut self) {
        self.used = 0;
        self.generation = self.generation.wrapping_add(1);
        self.records.clear();
        self.words.clear();
    }

    /// Number of bytes of workspace taken by records so far.
    pub fn used_bytes(&self) -> usize {
        self.used
    }

    /// Number of bytes of workspace still free after the last record.
    pub fn scratch_bytes(&self) -> usize {
        self.capacity - self.used
    }

    /// Allocate zeroed storage for an array of `dimension` elements.
    pub fn allocate(&mut self, boolean: bool, dimension: u32)
        -> Result<ArrayHandle, JamError>
    {
        let words = if boolean {
            (dimension as usize + 31) / 32
        } else {
            dimension as usize
        };
        let bytes = RECORD_HEADER_BYTES + words * 4;
        if bytes > self.scratch_bytes() {
            return Err(JamError::OutOfMemory);
        }

        let offset = self.words.len();
        self.words.resize(offset + words, 0);
        self.used += bytes;
        self.records.push(Record { boolean, dimension, offset, words });
        debug!("Allocated {} bytes for array of {} elements, {} bytes free",
               bytes, dimension, self.scratch_bytes());
        Ok(ArrayHandle { index: self.records.len() - 1, generation: self.generation })
    }

    fn record(&self, handle: ArrayHandle) -> Result<&Record, JamError> {
        if handle.generation != self.generation {
            return Err(JamError::InternalError);
        }
        self.records.get(handle.index).ok_or(JamError::InternalError)
    }

    /// Number of elements in the array.
    pub fn dimension(&self, handle: ArrayHandle) -> Result<u32, JamError> {
        Ok(self.record(handle)?.dimension)
    }

    /// Check if the array holds Boolean elements.
    pub fn is_boolean(&self, handle: ArrayHandle) -> Result<bool, JamError> {
        Ok(self.record(handle)?.boolean)
    }

    /// Raw data words of the array.
    pub fn data(&self, handle: ArrayHandle) -> Result<&[u32], JamError> {
        let r = self.record(handle)?;
        Ok(&self.words[r.offset..r.offset + r.words])
    }

    /// Mutable raw data words of the array.
    pub fn data_mut(&mut self, handle: ArrayHandle) -> Result<&mut [u32], JamError> {
        let r = self.record(handle)?;
        let range = r.offset..r.offset + r.words;
        Ok(&mut self.words[range])
    }

    /// Read one element; Boolean elements read as 0 or 1.
    pub fn element(&self, handle: ArrayHandle, index: i32) -> Result<i32, JamError> {
        let r = self.record(handle)?;
        if index < 0 || index as u32 >= r.dimension {
            return Err(JamError::BoundsError);
        }
        let data = &self.words[r.offset..r.offset + r.words];
        if r.boolean {
            Ok(bit(data, index as usize) as i32)
        } else {
            Ok(data[index as usize] as i32)
        }
    }

    /// Write one element; any non-zero value sets a Boolean element.
    pub fn set_element(&mut self, handle: ArrayHandle, index: i32, value: i32)
        -> Result<(), JamError>
    {
        let r = self.record(handle)?;
        if index < 0 || index as u32 >= r.dimension {
            return Err(JamError::BoundsError);
        }
        let boolean = r.boolean;
        let data = self.data_mut(handle)?;
        if boolean {
            set_bit(data, index as usize, value != 0);
        } else {
            data[index as usize] = value as u32;
        }
        Ok(())
    }

    /// Zeroed buffer for `bits` bits of temporary data, taken from the
    /// free space after the last record.
    ///
    /// Fails with `OutOfMemory` if the free space is too small.
    pub fn scratch(&self, bits: u32) -> Result<Vec<u32>, JamError> {
        if self.scratch_bytes() < (bits as usize >> 3) + 4 {
            return Err(JamError::OutOfMemory);
        }
        Ok(vec![0; (bits as usize + 31) / 32])
    }
}

/// Read bit `index` of a packed bit array.
pub fn bit(words: &[u32], index: usize) -> bool {
    words[index >> 5] & (1 << (index & 31)) != 0
}

/// Write bit `index` of a packed bit array.
pub fn set_bit(words: &mut [u32], index: usize, value: bool) {
    if value {
        words[index >> 5] |= 1 << (index & 31);
    } else {
        words[index >> 5] &= !(1 << (index & 31));
    }
}

/// Copy `count` bits from `src` starting at `src_start` into `dst` starting at `dst_start`.
pub fn copy_bits(src: &[u32], src_start: usize, dst: &mut [u32], dst_start: usize,
                 count: usize)
{
    for i in 0..count {
        set_bit(dst, dst_start + i, bit(src, src_start + i));
    }
}

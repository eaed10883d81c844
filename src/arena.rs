//! Contiguous value storage shared by every layer of a graph.
//!
//! Layers never own their propagation buffers. At initialization a layer
//! allocates its input and backward-error buffers here and keeps the returned
//! [`Region`]s. A producer then records sub-regions of its consumer's buffers
//! as its own output and forward-error buffers, so writing the producer's
//! output is writing the consumer's input. Regions are offsets rather than
//! pointers, which keeps them valid when the arena grows.

use crate::error::{Error, Result};

/// A window `[offset, offset + len)` into an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    offset: usize,
    len: usize,
}

impl Region {
    pub fn new(offset: usize, len: usize) -> Self {
        Region { offset, len }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    /// The part of this region starting `offset` values in, `len` long.
    ///
    /// Returns `None` when the window does not fit inside `self`.
    pub fn sub(&self, offset: usize, len: usize) -> Option<Region> {
        if offset.checked_add(len)? > self.len {
            return None;
        }
        Some(Region::new(self.offset + offset, len))
    }

    /// Empty regions never overlap anything.
    pub fn overlaps(&self, other: &Region) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.offset < other.end()
            && other.offset < self.end()
    }
}

/// Bump-allocated `f32` storage.
#[derive(Debug, Default, Clone)]
pub struct Arena {
    values: Vec<f32>,
}

impl Arena {
    pub fn new() -> Self {
        Arena::default()
    }

    /// Appends `len` zeroed values and returns their region.
    pub fn allocate(&mut self, len: usize) -> Region {
        let region = Region::new(self.values.len(), len);
        self.values.resize(self.values.len() + len, 0.0);
        region
    }

    /// Total number of values allocated so far.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn slice(&self, region: Region) -> Result<&[f32]> {
        self.check(region)?;
        Ok(&self.values[region.offset..region.end()])
    }

    pub fn slice_mut(&mut self, region: Region) -> Result<&mut [f32]> {
        self.check(region)?;
        Ok(&mut self.values[region.offset..region.end()])
    }

    /// Borrows `N` read-only regions and one writable region at once.
    ///
    /// Fails with [`Error::AliasedRegions`] if any read region overlaps the
    /// written one. Read regions may overlap each other.
    ///
    /// # Examples
    ///
    /// ```
    /// use ffnn::arena::Arena;
    ///
    /// let mut arena = Arena::new();
    /// let a = arena.allocate(2);
    /// let b = arena.allocate(2);
    /// arena.slice_mut(a).unwrap().copy_from_slice(&[1.0, 2.0]);
    ///
    /// let ([src], dst) = arena.split([a], b).unwrap();
    /// dst.copy_from_slice(src);
    /// assert_eq!(arena.slice(b).unwrap(), &[1.0, 2.0]);
    /// ```
    pub fn split<const N: usize>(
        &mut self,
        reads: [Region; N],
        write: Region,
    ) -> Result<([&[f32]; N], &mut [f32])> {
        self.check(write)?;
        for read in &reads {
            self.check(*read)?;
            if read.overlaps(&write) {
                return Err(Error::AliasedRegions(*read, write));
            }
        }

        let (head, rest) = self.values.split_at_mut(write.offset);
        let (target, tail) = rest.split_at_mut(write.len);
        let head: &[f32] = head;
        let tail: &[f32] = tail;
        let views = reads.map(move |read| {
            if read.is_empty() {
                &[][..]
            } else if read.end() <= write.offset {
                &head[read.offset..read.end()]
            } else {
                &tail[read.offset - write.end()..read.end() - write.end()]
            }
        });
        Ok((views, target))
    }

    /// Copies the values of `from` into `to`.
    pub fn copy(&mut self, from: Region, to: Region) -> Result<()> {
        if from.len != to.len {
            return Err(Error::SizeMismatch {
                expected: to.len,
                actual: from.len,
            });
        }
        let ([source], target) = self.split([from], to)?;
        target.copy_from_slice(source);
        Ok(())
    }

    fn check(&self, region: Region) -> Result<()> {
        if region.end() > self.values.len() {
            return Err(Error::RegionOutOfBounds {
                region,
                len: self.values.len(),
            });
        }
        Ok(())
    }
}

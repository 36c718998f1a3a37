use derive_more::Display;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    device::{Residency, TransferError},
    num::Float,
    shape::{Shape, ShapeError},
    tensor::{Tensor, TensorError},
};

#[derive(Debug, Error)]
pub enum SliceError {
    #[error("slice error: axis {axis} out of range for rank {rank}")]
    Axis { axis: usize, rank: usize },
    #[error("slice error: {0} selects no elements")]
    Empty(Slice),
    #[error("slice error: {slice} exceeds extent {extent}")]
    Range { slice: Slice, extent: usize },
}

/// A contiguous range `start..start + len` along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("{axis}:{start}..{}", start.saturating_add(*len))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Slice {
    pub axis: usize,
    pub start: usize,
    pub len: usize,
}

impl Slice {
    #[inline]
    pub const fn new(axis: usize, start: usize, len: usize) -> Self {
        Self { axis, start, len }
    }
}

impl From<(usize, std::ops::Range<usize>)> for Slice {
    #[inline]
    fn from((axis, range): (usize, std::ops::Range<usize>)) -> Self {
        let len = range.end.saturating_sub(range.start);
        Self::new(axis, range.start, len)
    }
}

/// One contiguous run of a slice, in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Offset into the source.
    pub src: usize,
    /// Offset into the destination.
    pub dst: usize,
    pub len: usize,
}

impl Shape {
    /// The shape of `slice` taken from this shape: the same extents except `extents[axis] = len`.
    pub fn sliced(&self, slice: Slice) -> Result<Shape, SliceError> {
        let Slice { axis, start, len } = slice;
        let rank = self.rank();
        let extent = self.extent(axis).ok_or(SliceError::Axis { axis, rank })?;
        if len == 0 {
            return Err(SliceError::Empty(slice));
        }
        match start.checked_add(len) {
            Some(end) if end <= extent => Ok(self.with_extent(axis, len)),
            _ => Err(SliceError::Range { slice, extent }),
        }
    }

    /// The block copies that move `slice` out of a row-major buffer of this shape.
    ///
    /// With `(outer, mid, inner)` from [`Shape::split_at`], there is one block per outer index
    /// `o`, reading `len × inner` elements at `(o × mid + start) × inner` and writing them at
    /// `o × len × inner`. Slicing axis 0 is a single block; slicing the innermost axis yields
    /// `outer` blocks of `len` elements each.
    pub fn slice_blocks(&self, slice: Slice) -> Result<impl Iterator<Item = Block>, SliceError> {
        self.sliced(slice)?;
        let Slice { axis, start, len } = slice;
        let (outer, mid, inner) = self
            .split_at(axis)
            .ok_or(SliceError::Axis { axis, rank: self.rank() })?;
        Ok((0..outer).map(move |o| Block {
            src: (o * mid + start) * inner,
            dst: o * len * inner,
            len: len * inner,
        }))
    }
}

impl<T: Float> Tensor<T> {
    /// Allocates a tensor shaped like `slice` of this one on `residency`, without copying.
    ///
    /// Keep the target around to refill it with [`Tensor::fill_slice`] in a loop.
    pub fn slice_target(&self, slice: Slice, residency: Residency) -> Result<Self, TensorError> {
        let shape = self.shape().sliced(slice)?;
        Self::zeros(self.allocator(), shape, residency)
    }

    /// Copies `slice` of this tensor into `dst`.
    ///
    /// `dst` must already have the sliced shape. The copy is issued as one block per outer index
    /// through [`Allocator::transfer`](super::device::Allocator::transfer), in the direction given
    /// by the two residencies. Slicing the innermost axis issues the most blocks, and each
    /// cross-residency block has a fixed cost, so it is the slowest case.
    ///
    /// # Errors
    /// If a block copy fails, the blocks before it have already been written to `dst` and are
    /// left there.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all, fields(slice = %slice)))]
    pub fn fill_slice<'a>(
        &self,
        dst: &'a mut Self,
        slice: Slice,
    ) -> Result<&'a mut Self, TensorError> {
        let shape = self.shape().sliced(slice)?;
        if !dst.shape().eq(&shape) {
            return Err(ShapeError::Mismatch(shape, dst.shape().clone()).into());
        }

        let allocator = self.allocator();
        if !allocator.ptr_eq(dst.allocator()) {
            return Err(TransferError::Foreign(dst.id()).into());
        }

        let size = size_of::<T>();
        log::debug!(
            "slice {slice} of {} {} → {} {}",
            self.shape(),
            self.residency(),
            dst.shape(),
            dst.residency()
        );
        for block in self.shape().slice_blocks(slice)? {
            allocator.transfer(
                self.buffer(),
                block.src * size,
                dst.buffer(),
                block.dst * size,
                block.len * size,
            )?;
        }
        Ok(dst)
    }

    /// Slices into a fresh tensor on the same residency.
    pub fn slice(&self, slice: impl Into<Slice>) -> Result<Self, TensorError> {
        let slice = slice.into();
        let mut dst = self.slice_target(slice, self.residency())?;
        self.fill_slice(&mut dst, slice)?;
        Ok(dst)
    }
}

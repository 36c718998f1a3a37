use std::marker::PhantomData;

use thiserror::Error;

use super::{
    device::{AllocError, Allocator, Buffer, BufferId, Residency, TransferError},
    num::{DataType, Float},
    shape::{IntoShape, Shape, ShapeError},
    slice::SliceError,
};

#[derive(Debug, Error)]
pub enum TensorError {
    #[error(transparent)]
    Shape(#[from] ShapeError),
    #[error(transparent)]
    Slice(#[from] SliceError),
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

/// A row-major tensor descriptor over a shared [`Buffer`].
///
/// The residency of a tensor is the residency of its buffer. Descriptors are not `Clone`;
/// use [`Tensor::alias`] to share the buffer or [`Tensor::clone_with`] to duplicate it.
#[derive(Debug)]
pub struct Tensor<T = f32> {
    shape: Shape,
    buffer: Buffer,
    phantom: PhantomData<T>,
}

impl<T: Float> Tensor<T> {
    /// Wraps an existing buffer without allocating. The buffer must hold exactly
    /// `shape.size()` elements of `T`.
    pub fn from_buffer(buffer: Buffer, shape: impl IntoShape) -> Result<Self, TensorError> {
        let shape = shape.into_shape()?;
        let size = shape.byte_size::<T>()?;
        if buffer.size() != size {
            return Err(ShapeError::Size(shape, size, buffer.size()).into());
        }
        let phantom = PhantomData;
        Ok(Self {
            shape,
            buffer,
            phantom,
        })
    }

    /// Create a zero-filled tensor on `residency`.
    pub fn zeros(
        allocator: &Allocator,
        shape: impl IntoShape,
        residency: Residency,
    ) -> Result<Self, TensorError> {
        let shape = shape.into_shape()?;
        let buffer = allocator.alloc(shape.byte_size::<T>()?, residency)?;
        Self::from_buffer(buffer, shape)
    }

    /// Create a host tensor holding a copy of `data`.
    pub fn from_data(
        allocator: &Allocator,
        shape: impl IntoShape,
        data: &[T],
    ) -> Result<Self, TensorError> {
        let shape = shape.into_shape()?;
        if data.len() != shape.size() {
            let size = shape.size();
            return Err(ShapeError::Count(shape, size, data.len()).into());
        }
        let tensor = Self::zeros(allocator, shape, Residency::Host)?;
        allocator.write_host(&tensor.buffer, 0, bytemuck::cast_slice(data))?;
        Ok(tensor)
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    /// Number of elements.
    #[inline]
    pub fn size(&self) -> usize {
        self.shape.size()
    }

    /// Number of bytes. Construction guarantees this fits in `usize`.
    #[inline]
    pub fn data_size(&self) -> usize {
        self.shape.size() * size_of::<T>()
    }

    #[inline]
    pub fn data_type(&self) -> DataType {
        T::DATA_TYPE
    }

    #[inline]
    pub fn residency(&self) -> Residency {
        self.buffer.residency()
    }

    #[inline]
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    #[inline]
    pub fn allocator(&self) -> &Allocator {
        self.buffer.allocator()
    }

    #[inline]
    pub fn id(&self) -> BufferId {
        self.buffer.id()
    }

    /// Checks the descriptor against its buffer: the shape is valid, the buffer holds exactly the
    /// tensor's bytes, and the allocator still tracks the buffer on the recorded residency.
    pub fn validate(&self) -> bool {
        Shape::validate(self.shape.extents())
            && self.shape.byte_size::<T>().ok() == Some(self.buffer.size())
            && self.allocator().residency_of(&self.buffer) == Some(self.residency())
    }

    /// Returns `true` if both tensors have the same rank and extents.
    #[inline]
    pub fn shape_eq(&self, other: &Self) -> bool {
        self.shape == other.shape
    }

    /// Another descriptor over the same buffer.
    #[inline]
    pub fn alias(&self) -> Self {
        Self {
            shape: self.shape.clone(),
            buffer: self.buffer.clone(),
            phantom: PhantomData,
        }
    }

    /// Releases the descriptor but keeps the buffer.
    #[inline]
    pub fn into_buffer(self) -> Buffer {
        self.buffer
    }

    /// Reshape the tensor, leaving the underlying data untouched.
    pub fn reshape(mut self, shape: impl IntoShape) -> Result<Self, TensorError> {
        let shape = shape.into_shape()?;
        if shape.size() != self.shape.size() {
            return Err(ShapeError::Mismatch(self.shape, shape).into());
        }
        self.shape = shape;
        Ok(self)
    }

    /// Reads the elements of a host tensor.
    pub fn to_vec(&self) -> Result<Vec<T>, TensorError> {
        Ok(self.allocator().read_host(&self.buffer)?)
    }

    /// Overwrites the elements of a host tensor.
    pub fn write(&mut self, data: &[T]) -> Result<(), TensorError> {
        if data.len() != self.size() {
            let shape = self.shape.clone();
            return Err(ShapeError::Count(shape, self.size(), data.len()).into());
        }
        let contents = bytemuck::cast_slice(data);
        Ok(self.allocator().write_host(&self.buffer, 0, contents)?)
    }
}

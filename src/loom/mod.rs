//! The `loom` module provides n-dimensional float tensors whose buffers live in one of two
//! address spaces, host or device, and the copies that move data between them.
//!
//! ## Key Components
//! 1. **Descriptors**:
//!    - [`Shape`](shape::Shape) holds validated per-axis extents in row-major order.
//!    - [`Tensor`](tensor::Tensor) pairs a shape with a shared, residency-tagged buffer.
//!
//! 2. **Memory**:
//!    - [`Allocator`](device::Allocator) owns one pool per [`Residency`](device::Residency),
//!      with optional capacity limits, and classifies buffers by residency.
//!    - Buffers are reference counted and return to their pool when the last handle drops.
//!
//! 3. **Transfers**:
//!    - Every copy is one block through [`Allocator::transfer`](device::Allocator::transfer),
//!      dispatched on a [`TransferKind`](device::TransferKind).
//!    - Whole-buffer clones and tiling live in [`transfer`]; axis slicing lives in [`slice`].
//!
//! All operations are synchronous: a call returns once every block has been copied.

pub mod device;
pub mod num;
pub mod platform;
pub mod render;
pub mod shape;
pub mod slice;
pub mod tensor;
pub mod transfer;

pub mod loom;

pub use loom::{
    device::{
        AllocError, Allocator, AllocatorBuilder, Buffer, BufferId, PoolStats, Residency,
        TransferError, TransferKind, TransferStats,
    },
    num::{DataType, Float},
    platform::Stopwatch,
    render::{NumberFormat, RenderError},
    shape::{IntoShape, Shape, ShapeError},
    slice::{Block, Slice, SliceError},
    tensor::{Tensor, TensorError},
};

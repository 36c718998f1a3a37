use bytemuck::Pod;
use derive_more::Display;
use half::{bf16, f16};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DataType {
    F16,
    BF16,
    F32,
    F64,
}

impl DataType {
    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            DataType::F16 => 2,
            DataType::BF16 => 2,
            DataType::F32 => 4,
            DataType::F64 => 8,
        }
    }
}

/// Floating-point element types a tensor can hold.
pub trait Float: Pod + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    const DATA_TYPE: DataType;

    /// Widens the value for rendering.
    fn to_f64(self) -> f64;
}

impl Float for f16 {
    const DATA_TYPE: DataType = DataType::F16;

    #[inline]
    fn to_f64(self) -> f64 {
        f16::to_f64(self)
    }
}

impl Float for bf16 {
    const DATA_TYPE: DataType = DataType::BF16;

    #[inline]
    fn to_f64(self) -> f64 {
        bf16::to_f64(self)
    }
}

impl Float for f32 {
    const DATA_TYPE: DataType = DataType::F32;

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Float for f64 {
    const DATA_TYPE: DataType = DataType::F64;

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }
}

use derive_more::Display;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use allocator::{AllocError, Allocator, AllocatorBuilder, Buffer, PoolStats, TransferStats};

pub mod allocator;

/// The address space a buffer lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Residency {
    #[display("host")]
    Host,
    #[display("device")]
    Device,
}

impl Residency {
    pub const ALL: [Self; 2] = [Self::Host, Self::Device];
}

/// Direction of a copy between residencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TransferKind {
    #[display("host→host")]
    HostToHost,
    #[display("host→device")]
    HostToDevice,
    #[display("device→device")]
    DeviceToDevice,
    #[display("device→host")]
    DeviceToHost,
}

impl TransferKind {
    pub const ALL: [Self; 4] = [
        Self::HostToHost,
        Self::HostToDevice,
        Self::DeviceToDevice,
        Self::DeviceToHost,
    ];

    #[inline]
    pub const fn new(src: Residency, dst: Residency) -> Self {
        match (src, dst) {
            (Residency::Host, Residency::Host) => Self::HostToHost,
            (Residency::Host, Residency::Device) => Self::HostToDevice,
            (Residency::Device, Residency::Device) => Self::DeviceToDevice,
            (Residency::Device, Residency::Host) => Self::DeviceToHost,
        }
    }

    #[inline]
    pub const fn src(self) -> Residency {
        match self {
            Self::HostToHost | Self::HostToDevice => Residency::Host,
            Self::DeviceToDevice | Self::DeviceToHost => Residency::Device,
        }
    }

    #[inline]
    pub const fn dst(self) -> Residency {
        match self {
            Self::HostToHost | Self::DeviceToHost => Residency::Host,
            Self::HostToDevice | Self::DeviceToDevice => Residency::Device,
        }
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        match self {
            Self::HostToHost => 0,
            Self::HostToDevice => 1,
            Self::DeviceToDevice => 2,
            Self::DeviceToHost => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(uid::Id<BufferId>);

impl BufferId {
    #[inline]
    pub(crate) fn new() -> Self {
        Self(uid::Id::new())
    }

    #[inline]
    pub fn get(&self) -> usize {
        self.0.get()
    }
}

impl std::fmt::Display for BufferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.get())
    }
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("transfer error: expected a {expected} buffer, found a {found} one")]
    Residency { expected: Residency, found: Residency },
    #[error("transfer error: buffer {0} belongs to another allocator")]
    Foreign(BufferId),
    #[error("transfer error: {len} bytes at offset {offset} exceed a buffer of {size} bytes")]
    Bounds {
        offset: usize,
        len: usize,
        size: usize,
    },
    #[error("transfer error: repeat count must be at least 1")]
    Repeat,
    #[error("transfer error: buffer {0} has been released")]
    Dangling(BufferId),
    #[error(transparent)]
    Alloc(#[from] AllocError),
}

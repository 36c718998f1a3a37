use super::{
    device::{AllocError, Allocator, Buffer, Residency, TransferError, TransferKind},
    num::Float,
    tensor::{Tensor, TensorError},
};

#[inline]
fn check_kind(buffer: &Buffer, kind: TransferKind) -> Result<(), TransferError> {
    match buffer.residency() == kind.src() {
        true => Ok(()),
        false => Err(TransferError::Residency {
            expected: kind.src(),
            found: buffer.residency(),
        }),
    }
}

impl Allocator {
    /// Duplicates `src` into a fresh buffer on `kind.dst()`.
    ///
    /// `kind.src()` must be the residency of `src`.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all, fields(kind = %kind)))]
    pub fn copy(&self, src: &Buffer, kind: TransferKind) -> Result<Buffer, TransferError> {
        check_kind(src, kind)?;
        let dst = self.alloc(src.size(), kind.dst())?;
        self.transfer(src, 0, &dst, 0, src.size())?;
        Ok(dst)
    }

    /// Tiles the first `size` bytes of `src` `times` times into a fresh buffer on `kind.dst()`.
    #[cfg_attr(feature = "trace", tracing::instrument(skip_all, fields(kind = %kind, times = times)))]
    pub fn repeat(
        &self,
        src: &Buffer,
        size: usize,
        times: usize,
        kind: TransferKind,
    ) -> Result<Buffer, TransferError> {
        if times == 0 {
            return Err(TransferError::Repeat);
        }
        if size == 0 || size > src.size() {
            return Err(TransferError::Bounds {
                offset: 0,
                len: size,
                size: src.size(),
            });
        }
        check_kind(src, kind)?;

        let total = size
            .checked_mul(times)
            .ok_or(AllocError::Overflow { size, times })?;
        let dst = self.alloc(total, kind.dst())?;
        for index in 0..times {
            self.transfer(src, 0, &dst, index * size, size)?;
        }
        Ok(dst)
    }
}

impl<T: Float> Tensor<T> {
    /// Duplicates the tensor into an independent buffer on `kind.dst()`.
    ///
    /// Returns [`TransferError::Residency`] if `kind.src()` is not the tensor's residency.
    pub fn clone_with(&self, kind: TransferKind) -> Result<Self, TensorError> {
        let buffer = self.allocator().copy(self.buffer(), kind)?;
        Self::from_buffer(buffer, self.shape())
    }

    /// Duplicates the tensor onto `residency`.
    #[inline]
    pub fn clone_to(&self, residency: Residency) -> Result<Self, TensorError> {
        self.clone_with(TransferKind::new(self.residency(), residency))
    }

    /// Tiles the whole tensor `times` times along a new leading axis.
    pub fn repeat(&self, times: usize, kind: TransferKind) -> Result<Self, TensorError> {
        let buffer = self.buffer();
        let buffer = self
            .allocator()
            .repeat(buffer, buffer.size(), times, kind)?;
        Self::from_buffer(buffer, self.shape().stacked(times)?)
    }

    /// Reads the elements, staging device tensors through a temporary host copy.
    pub fn download(&self) -> Result<Vec<T>, TensorError> {
        match self.residency() {
            Residency::Host => self.to_vec(),
            Residency::Device => self.clone_with(TransferKind::DeviceToHost)?.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use half::f16;
    use itertools::Itertools;

    use crate::loom::{
        device::{AllocError, Allocator, AllocatorBuilder, Residency, TransferError, TransferKind},
        shape::Shape,
        tensor::{Tensor, TensorError},
    };

    fn random_tensor(allocator: &Allocator) -> Result<Tensor, TensorError> {
        let extents = (0..fastrand::usize(1..5))
            .map(|_| fastrand::usize(1..6))
            .collect_vec();
        let shape = Shape::new(&extents)?;
        let data = (0..shape.size()).map(|_| fastrand::f32() * 2.0 - 1.0).collect_vec();
        Tensor::from_data(allocator, shape, &data)
    }

    #[test]
    fn test_round_trip() -> Result<(), Box<dyn Error>> {
        let allocator = Allocator::new();
        for _ in 0..16 {
            let host = random_tensor(&allocator)?;
            let device = host.clone_with(TransferKind::HostToDevice)?;
            assert_eq!(device.residency(), Residency::Device);
            assert!(device.shape_eq(&host));
            assert_ne!(device.id(), host.id());

            let back = device.clone_with(TransferKind::DeviceToHost)?;
            let x = host.to_vec()?.into_iter().map(f32::to_bits).collect_vec();
            let y = back.to_vec()?.into_iter().map(f32::to_bits).collect_vec();
            assert_eq!(x, y);
        }
        Ok(())
    }

    #[test]
    fn test_independence() -> Result<(), Box<dyn Error>> {
        let allocator = Allocator::new();
        let data = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let zeros = Tensor::<f32>::zeros(&allocator, [2, 3], Residency::Host)?;
        for kind in TransferKind::ALL {
            let src = Tensor::from_data(&allocator, [2, 3], &data)?.clone_to(kind.src())?;
            let dst = src.clone_with(kind)?;
            assert_eq!(dst.residency(), kind.dst());
            assert_ne!(dst.id(), src.id());

            // overwrite the copy, then the source
            allocator.transfer(zeros.buffer(), 0, dst.buffer(), 0, dst.data_size())?;
            assert_eq!(src.download()?, data);
            assert_eq!(dst.download()?, vec![0.0; 6]);

            let dst = src.clone_with(kind)?;
            allocator.transfer(zeros.buffer(), 0, src.buffer(), 0, src.data_size())?;
            assert_eq!(dst.download()?, data);
            assert_eq!(src.download()?, vec![0.0; 6]);
        }
        Ok(())
    }

    #[test]
    fn test_residency_contract() -> Result<(), Box<dyn Error>> {
        let allocator = Allocator::new();
        let host = Tensor::from_data(&allocator, [2], &[1.0f32, 2.0])?;
        assert!(matches!(
            host.clone_with(TransferKind::DeviceToHost),
            Err(TensorError::Transfer(TransferError::Residency {
                expected: Residency::Device,
                found: Residency::Host,
            }))
        ));
        assert_eq!(allocator.stats(Residency::Host).buffers, 1);
        Ok(())
    }

    #[test]
    fn test_clone_out_of_memory() -> Result<(), Box<dyn Error>> {
        let allocator = AllocatorBuilder::new().device_capacity(16).build();
        let host = Tensor::from_data(&allocator, [8], &[0.5f32; 8])?;
        assert!(matches!(
            host.clone_to(Residency::Device),
            Err(TensorError::Transfer(TransferError::Alloc(
                AllocError::OutOfMemory { .. }
            )))
        ));
        Ok(())
    }

    #[test]
    fn test_repeat_buffer() -> Result<(), Box<dyn Error>> {
        let allocator = Allocator::new();
        let data = [1.0f32, 2.0, 3.0];
        let src = Tensor::from_data(&allocator, [3], &data)?.clone_to(Residency::Device)?;

        for times in 1..5 {
            let kind = TransferKind::DeviceToHost;
            let buffer = allocator.repeat(src.buffer(), src.data_size(), times, kind)?;
            assert_eq!(buffer.residency(), Residency::Host);
            assert_eq!(buffer.size(), src.data_size() * times);

            let output = Tensor::<f32>::from_buffer(buffer, [times, 3])?.to_vec()?;
            for segment in output.chunks(3) {
                assert_eq!(segment, data);
            }
        }

        // only a prefix of the source
        let buffer = allocator.repeat(src.buffer(), 4, 3, TransferKind::DeviceToDevice)?;
        let output = Tensor::<f32>::from_buffer(buffer, [3])?.download()?;
        assert_eq!(output, vec![1.0; 3]);
        Ok(())
    }

    #[test]
    fn test_repeat_errors() -> Result<(), Box<dyn Error>> {
        let allocator = Allocator::new();
        let src = allocator.alloc(8, Residency::Host)?;
        assert!(matches!(
            allocator.repeat(&src, 8, 0, TransferKind::HostToHost),
            Err(TransferError::Repeat)
        ));
        assert!(matches!(
            allocator.repeat(&src, 16, 2, TransferKind::HostToHost),
            Err(TransferError::Bounds { .. })
        ));
        assert!(matches!(
            allocator.repeat(&src, 8, 2, TransferKind::DeviceToHost),
            Err(TransferError::Residency { .. })
        ));
        assert!(matches!(
            allocator.repeat(&src, 8, usize::MAX, TransferKind::HostToDevice),
            Err(TransferError::Alloc(AllocError::Overflow {
                size: 8,
                times: usize::MAX,
            }))
        ));
        assert_eq!(allocator.stats(Residency::Device).buffers, 0);
        assert_eq!(allocator.transfers().total_copies(), 0);
        Ok(())
    }

    #[test]
    fn test_repeat_tensor() -> Result<(), Box<dyn Error>> {
        let allocator = Allocator::new();
        let data = [f16::from_f32(0.5), f16::from_f32(-1.0)];
        let src = Tensor::from_data(&allocator, [1, 2], &data)?;
        let output = src.repeat(3, TransferKind::HostToDevice)?;
        assert_eq!(output.shape().extents(), &[3, 1, 2]);
        assert_eq!(output.residency(), Residency::Device);
        assert_eq!(output.download()?, [data, data, data].concat());

        assert!(matches!(
            src.repeat(0, TransferKind::HostToHost),
            Err(TensorError::Transfer(TransferError::Repeat))
        ));
        Ok(())
    }
}

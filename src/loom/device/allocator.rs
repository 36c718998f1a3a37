use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rustc_hash::FxHashMap as HashMap;
use thiserror::Error;

use super::{BufferId, Residency, TransferError, TransferKind};

#[derive(Debug, Error)]
pub enum AllocError {
    #[error("allocation error: {requested} bytes requested on {residency} but only {available} available")]
    OutOfMemory {
        residency: Residency,
        requested: usize,
        available: usize,
    },
    #[error("allocation error: zero-sized buffer requested on {0}")]
    Empty(Residency),
    #[error("allocation error: {times} copies of {size} bytes overflow")]
    Overflow { size: usize, times: usize },
}

/// Snapshot of one residency's accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Upper bound on live bytes, `None` if unbounded.
    pub capacity: Option<usize>,
    /// Bytes held by live buffers.
    pub used: usize,
    /// Highest `used` seen so far.
    pub peak: usize,
    /// Number of live buffers.
    pub buffers: usize,
}

/// Block copies issued through the allocator, counted per [`TransferKind`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransferStats {
    copies: [usize; 4],
    bytes: [usize; 4],
}

impl TransferStats {
    #[inline]
    pub fn copies(&self, kind: TransferKind) -> usize {
        self.copies[kind.index()]
    }

    #[inline]
    pub fn bytes(&self, kind: TransferKind) -> usize {
        self.bytes[kind.index()]
    }

    #[inline]
    pub fn total_copies(&self) -> usize {
        self.copies.iter().sum()
    }

    #[inline]
    fn record(&mut self, kind: TransferKind, len: usize) {
        self.copies[kind.index()] += 1;
        self.bytes[kind.index()] += len;
    }
}

#[derive(Debug, Default)]
struct Pool {
    capacity: Option<usize>,
    used: usize,
    peak: usize,
    blocks: HashMap<BufferId, Box<[u8]>>,
}

impl Pool {
    #[inline]
    fn available(&self) -> usize {
        self.capacity
            .map_or(usize::MAX, |capacity| capacity.saturating_sub(self.used))
    }

    #[inline]
    fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity,
            used: self.used,
            peak: self.peak,
            buffers: self.blocks.len(),
        }
    }

    #[inline]
    fn block(&self, id: BufferId) -> Result<&[u8], TransferError> {
        self.blocks
            .get(&id)
            .map(|block| &block[..])
            .ok_or(TransferError::Dangling(id))
    }

    #[inline]
    fn block_mut(&mut self, id: BufferId) -> Result<&mut [u8], TransferError> {
        self.blocks
            .get_mut(&id)
            .map(|block| &mut block[..])
            .ok_or(TransferError::Dangling(id))
    }

    /// Copies between two blocks of the same pool.
    fn copy_within(&mut self, src: Span, dst: Span) -> Result<(), TransferError> {
        if src.id == dst.id {
            let block = self.block_mut(src.id)?;
            block.copy_within(src.range(), dst.offset);
            return Ok(());
        }

        // take the source out so that both blocks can be borrowed
        let block = self
            .blocks
            .remove(&src.id)
            .ok_or(TransferError::Dangling(src.id))?;
        let result = self
            .block_mut(dst.id)
            .map(|target| target[dst.range()].copy_from_slice(&block[src.range()]));
        self.blocks.insert(src.id, block);
        result
    }
}

/// Copies between a block of `from` and a block of `to`.
fn copy_across(from: &Pool, to: &mut Pool, src: Span, dst: Span) -> Result<(), TransferError> {
    let block = from.block(src.id)?;
    let target = to.block_mut(dst.id)?;
    target[dst.range()].copy_from_slice(&block[src.range()]);
    Ok(())
}

/// A bounds-checked byte range inside one buffer.
#[derive(Debug, Clone, Copy)]
struct Span {
    id: BufferId,
    offset: usize,
    len: usize,
}

impl Span {
    fn new(buffer: &Buffer, offset: usize, len: usize) -> Result<Self, TransferError> {
        let size = buffer.size();
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(Self {
                id: buffer.id(),
                offset,
                len,
            }),
            _ => Err(TransferError::Bounds { offset, len, size }),
        }
    }

    #[inline]
    fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

#[derive(Debug, Default)]
struct Arena {
    host: Pool,
    device: Pool,
    transfers: TransferStats,
}

impl Arena {
    #[inline]
    fn pool(&self, residency: Residency) -> &Pool {
        match residency {
            Residency::Host => &self.host,
            Residency::Device => &self.device,
        }
    }

    #[inline]
    fn pool_mut(&mut self, residency: Residency) -> &mut Pool {
        match residency {
            Residency::Host => &mut self.host,
            Residency::Device => &mut self.device,
        }
    }

    fn copy(&mut self, kind: TransferKind, src: Span, dst: Span) -> Result<(), TransferError> {
        match kind {
            TransferKind::HostToHost => self.host.copy_within(src, dst),
            TransferKind::HostToDevice => copy_across(&self.host, &mut self.device, src, dst),
            TransferKind::DeviceToDevice => self.device.copy_within(src, dst),
            TransferKind::DeviceToHost => copy_across(&self.device, &mut self.host, src, dst),
        }?;
        self.transfers.record(kind, src.len);
        Ok(())
    }
}

/// Allocates and tracks buffers in both residencies.
///
/// Host and device blocks live in separate pools. Device blocks are only reachable through
/// block copies; host blocks can additionally be read and written in place.
/// Cloning an `Allocator` yields another handle to the same pools.
#[derive(Clone, Default)]
pub struct Allocator(Arc<RwLock<Arena>>);

impl std::fmt::Debug for Allocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Allocator")
            .field("host", &self.stats(Residency::Host))
            .field("device", &self.stats(Residency::Device))
            .finish()
    }
}

#[derive(Debug, Default, Clone)]
pub struct AllocatorBuilder {
    /// Byte limit of the host pool. Unbounded if `None`.
    pub host_capacity: Option<usize>,
    /// Byte limit of the device pool. Unbounded if `None`.
    pub device_capacity: Option<usize>,
}

impl AllocatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host_capacity(mut self, bytes: usize) -> Self {
        self.host_capacity = Some(bytes);
        self
    }

    pub fn device_capacity(mut self, bytes: usize) -> Self {
        self.device_capacity = Some(bytes);
        self
    }

    pub fn build(self) -> Allocator {
        let mut arena = Arena::default();
        arena.host.capacity = self.host_capacity;
        arena.device.capacity = self.device_capacity;
        Allocator(Arc::new(RwLock::new(arena)))
    }
}

impl Allocator {
    /// An allocator with unbounded pools.
    #[inline]
    pub fn new() -> Self {
        AllocatorBuilder::new().build()
    }

    #[inline]
    fn arena(&self) -> RwLockReadGuard<'_, Arena> {
        self.0.read().expect("failed to lock")
    }

    #[inline]
    fn arena_mut(&self) -> RwLockWriteGuard<'_, Arena> {
        self.0.write().expect("failed to lock")
    }

    /// Returns `true` if both handles refer to the same pools.
    #[inline]
    pub fn ptr_eq(&self, other: &Allocator) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Allocates a zero-initialized buffer of `size` bytes on `residency`.
    pub fn alloc(&self, size: usize, residency: Residency) -> Result<Buffer, AllocError> {
        if size == 0 {
            return Err(AllocError::Empty(residency));
        }

        let id = BufferId::new();
        {
            let mut arena = self.arena_mut();
            let pool = arena.pool_mut(residency);
            let available = pool.available();
            if size > available {
                log::warn!("{residency} pool exhausted: {size} bytes requested, {available} available");
                return Err(AllocError::OutOfMemory {
                    residency,
                    requested: size,
                    available,
                });
            }
            pool.used += size;
            pool.peak = pool.peak.max(pool.used);
            pool.blocks.insert(id, vec![0u8; size].into_boxed_slice());
        }
        log::debug!("alloc {id} on {residency}: {size} bytes");

        let allocator = self.clone();
        Ok(Buffer(Arc::new(BufferInner {
            id,
            residency,
            size,
            allocator,
        })))
    }

    /// Returns the block of a dropped buffer to its pool.
    fn release(&self, id: BufferId, residency: Residency) {
        let mut arena = match self.0.write() {
            Ok(arena) => arena,
            Err(poisoned) => poisoned.into_inner(),
        };
        let pool = arena.pool_mut(residency);
        if let Some(block) = pool.blocks.remove(&id) {
            pool.used -= block.len();
            log::debug!("release {id} on {residency}: {} bytes", block.len());
        }
    }

    /// Classifies a buffer by looking it up in this allocator's pools.
    ///
    /// The answer is exact for every live buffer allocated here. A buffer that belongs to another
    /// allocator is never found, so the result is `None` for it; in particular this does not tell
    /// where a foreign buffer actually resides.
    pub fn residency_of(&self, buffer: &Buffer) -> Option<Residency> {
        let arena = self.arena();
        Residency::ALL
            .into_iter()
            .find(|&residency| arena.pool(residency).blocks.contains_key(&buffer.id()))
    }

    #[inline]
    pub fn stats(&self, residency: Residency) -> PoolStats {
        self.arena().pool(residency).stats()
    }

    #[inline]
    pub fn transfers(&self) -> TransferStats {
        self.arena().transfers
    }

    #[inline]
    pub fn reset_transfers(&self) {
        self.arena_mut().transfers = Default::default();
    }

    #[inline]
    fn check_owned(&self, buffer: &Buffer) -> Result<(), TransferError> {
        match self.ptr_eq(buffer.allocator()) {
            true => Ok(()),
            false => Err(TransferError::Foreign(buffer.id())),
        }
    }

    /// Copies `len` bytes from `src` at `src_offset` to `dst` at `dst_offset` as one block.
    ///
    /// The direction is taken from the residencies of the two buffers. Every copy in the crate
    /// goes through here and is counted in [`Allocator::transfers`].
    pub fn transfer(
        &self,
        src: &Buffer,
        src_offset: usize,
        dst: &Buffer,
        dst_offset: usize,
        len: usize,
    ) -> Result<(), TransferError> {
        self.check_owned(src)?;
        self.check_owned(dst)?;
        let kind = TransferKind::new(src.residency(), dst.residency());
        let src = Span::new(src, src_offset, len)?;
        let dst = Span::new(dst, dst_offset, len)?;

        log::trace!(
            "{kind}: {len} bytes {}+{} → {}+{}",
            src.id,
            src.offset,
            dst.id,
            dst.offset
        );
        self.arena_mut().copy(kind, src, dst)
    }

    /// Reads a whole host buffer as elements of `T`.
    pub(crate) fn read_host<T: bytemuck::Pod>(&self, buffer: &Buffer) -> Result<Vec<T>, TransferError> {
        self.check_owned(buffer)?;
        check_host(buffer)?;
        let arena = self.arena();
        let block = arena.host.block(buffer.id())?;
        Ok(bytemuck::pod_collect_to_vec(block))
    }

    /// Overwrites a host buffer starting at `offset`.
    pub(crate) fn write_host(
        &self,
        buffer: &Buffer,
        offset: usize,
        contents: &[u8],
    ) -> Result<(), TransferError> {
        self.check_owned(buffer)?;
        check_host(buffer)?;
        let span = Span::new(buffer, offset, contents.len())?;
        let mut arena = self.arena_mut();
        let block = arena.host.block_mut(span.id)?;
        block[span.range()].copy_from_slice(contents);
        Ok(())
    }
}

#[inline]
fn check_host(buffer: &Buffer) -> Result<(), TransferError> {
    match buffer.residency() {
        Residency::Host => Ok(()),
        found => Err(TransferError::Residency {
            expected: Residency::Host,
            found,
        }),
    }
}

#[derive(Debug)]
struct BufferInner {
    id: BufferId,
    residency: Residency,
    size: usize,
    allocator: Allocator,
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        self.allocator.release(self.id, self.residency);
    }
}

/// A shared handle to one allocation.
///
/// Cloning the handle aliases the same bytes. The allocation is released when the last handle
/// is dropped.
#[derive(Debug, Clone)]
pub struct Buffer(Arc<BufferInner>);

impl Buffer {
    #[inline]
    pub fn id(&self) -> BufferId {
        self.0.id
    }

    /// Residency recorded at allocation.
    #[inline]
    pub fn residency(&self) -> Residency {
        self.0.residency
    }

    /// Size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.0.size
    }

    #[inline]
    pub fn allocator(&self) -> &Allocator {
        &self.0.allocator
    }

    /// Number of live handles to this allocation.
    #[inline]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

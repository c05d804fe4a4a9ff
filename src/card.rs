//! GPU-resident "card" buffer management: fixed-slot metadata pools, a
//! variable-size storage free-list allocator, a linear bump allocator for decoded
//! image bytes, and dirty-range tracking so only touched bytes are re-uploaded.

use wgpu::util::DeviceExt;

use crate::config::CardBufferConfig;
use crate::error::{Error, Result};
use crate::gpu::atlas::{AtlasRegion, ImageAtlas};

/// Handle into the metadata buffer. `size == 0` means invalid/unallocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataHandle {
    pub offset: u32,
    pub size: u32,
}

impl MetadataHandle {
    pub const INVALID: MetadataHandle = MetadataHandle { offset: 0, size: 0 };

    pub fn is_valid(self) -> bool {
        self.size > 0
    }
}

/// Handle into the storage buffer. `size == 0` means invalid/unallocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageHandle {
    pub offset: u32,
    pub size: u32,
}

impl StorageHandle {
    pub const INVALID: StorageHandle = StorageHandle { offset: 0, size: 0 };

    pub fn is_valid(self) -> bool {
        self.size > 0
    }
}

/// A fixed-slot pool: every allocation is exactly `slot_size` bytes, served from a
/// LIFO free list of slot offsets.
pub struct MetadataPool {
    slot_size: u32,
    base_offset: u32,
    slot_count: u32,
    free_slots: Vec<u32>,
}

impl MetadataPool {
    pub fn new(slot_size: u32, base_offset: u32, slot_count: u32) -> Self {
        let free_slots = (0..slot_count).rev().map(|i| base_offset + i * slot_size).collect();
        Self { slot_size, base_offset, slot_count, free_slots }
    }

    pub fn allocate(&mut self) -> Result<u32> {
        self.free_slots
            .pop()
            .ok_or_else(|| Error::resource_exhausted(format!("metadata pool (slot {}) exhausted", self.slot_size)))
    }

    pub fn deallocate(&mut self, offset: u32) -> Result<()> {
        if offset < self.base_offset
            || (offset - self.base_offset) % self.slot_size != 0
            || offset >= self.base_offset + self.slot_count * self.slot_size
        {
            return Err(Error::invalid_argument(format!("offset {offset} does not belong to this pool")));
        }
        if self.free_slots.contains(&offset) {
            return Err(Error::failed_precondition(format!("double free of metadata slot at {offset}")));
        }
        self.free_slots.push(offset);
        Ok(())
    }

    pub fn slot_size(&self) -> u32 {
        self.slot_size
    }

    pub fn capacity(&self) -> u32 {
        self.slot_count
    }

    pub fn used(&self) -> u32 {
        self.slot_count - self.free_slots.len() as u32
    }
}

pub const SLOT_32: u32 = 32;
pub const SLOT_64: u32 = 64;
pub const SLOT_128: u32 = 128;
pub const SLOT_256: u32 = 256;

/// Four fixed-size pools (32/64/128/256 bytes) routed by requested size — the
/// smallest slot that still fits is used.
pub struct MetadataAllocator {
    pool32: MetadataPool,
    pool64: MetadataPool,
    pool128: MetadataPool,
    pool256: MetadataPool,
    total_size: u32,
}

impl MetadataAllocator {
    pub fn new(pool32_count: u32, pool64_count: u32, pool128_count: u32, pool256_count: u32) -> Self {
        let mut offset = 0;
        let pool32 = MetadataPool::new(SLOT_32, offset, pool32_count);
        offset += SLOT_32 * pool32_count;
        let pool64 = MetadataPool::new(SLOT_64, offset, pool64_count);
        offset += SLOT_64 * pool64_count;
        let pool128 = MetadataPool::new(SLOT_128, offset, pool128_count);
        offset += SLOT_128 * pool128_count;
        let pool256 = MetadataPool::new(SLOT_256, offset, pool256_count);
        offset += SLOT_256 * pool256_count;
        Self { pool32, pool64, pool128, pool256, total_size: offset }
    }

    pub fn allocate(&mut self, size: u32) -> Result<MetadataHandle> {
        let pool = self.find_pool(size)?;
        let offset = pool.allocate()?;
        Ok(MetadataHandle { offset, size: pool.slot_size() })
    }

    pub fn deallocate(&mut self, handle: MetadataHandle) -> Result<()> {
        let pool = self.find_pool_by_slot_size(handle.size)?;
        pool.deallocate(handle.offset)
    }

    pub fn total_size(&self) -> u32 {
        self.total_size
    }

    fn find_pool(&mut self, size: u32) -> Result<&mut MetadataPool> {
        if size <= SLOT_32 {
            Ok(&mut self.pool32)
        } else if size <= SLOT_64 {
            Ok(&mut self.pool64)
        } else if size <= SLOT_128 {
            Ok(&mut self.pool128)
        } else if size <= SLOT_256 {
            Ok(&mut self.pool256)
        } else {
            Err(Error::invalid_argument(format!("metadata size {size} exceeds largest pool slot ({SLOT_256})")))
        }
    }

    fn find_pool_by_slot_size(&mut self, slot_size: u32) -> Result<&mut MetadataPool> {
        match slot_size {
            SLOT_32 => Ok(&mut self.pool32),
            SLOT_64 => Ok(&mut self.pool64),
            SLOT_128 => Ok(&mut self.pool128),
            SLOT_256 => Ok(&mut self.pool256),
            _ => Err(Error::invalid_argument(format!("{slot_size} is not a valid pool slot size"))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FreeBlock {
    offset: u32,
    size: u32,
}

/// Offset-sorted free-list allocator: first-fit search, splits the remainder back
/// into the free list, and coalesces adjacent blocks on every deallocation.
pub struct StorageAllocator {
    capacity: u32,
    used: u32,
    free_blocks: Vec<FreeBlock>,
}

impl StorageAllocator {
    pub fn new(capacity: u32) -> Self {
        Self { capacity, used: 0, free_blocks: vec![FreeBlock { offset: 0, size: capacity }] }
    }

    pub fn allocate(&mut self, size: u32) -> Result<StorageHandle> {
        if size == 0 {
            return Err(Error::invalid_argument("storage allocation size must be non-zero"));
        }
        let index = self
            .free_blocks
            .iter()
            .position(|b| b.size >= size)
            .ok_or_else(|| Error::resource_exhausted(format!("storage allocator: no block fits {size} bytes")))?;
        let block = self.free_blocks[index];
        let handle = StorageHandle { offset: block.offset, size };
        if block.size == size {
            self.free_blocks.remove(index);
        } else {
            self.free_blocks[index] = FreeBlock { offset: block.offset + size, size: block.size - size };
        }
        self.used += size;
        Ok(handle)
    }

    pub fn deallocate(&mut self, handle: StorageHandle) -> Result<()> {
        if handle.offset + handle.size > self.capacity {
            return Err(Error::invalid_argument("handle out of range for this allocator"));
        }
        let overlaps = self
            .free_blocks
            .iter()
            .any(|b| handle.offset < b.offset + b.size && b.offset < handle.offset + handle.size);
        if overlaps {
            return Err(Error::failed_precondition(format!("double free of storage block at {}", handle.offset)));
        }
        self.free_blocks.push(FreeBlock { offset: handle.offset, size: handle.size });
        self.free_blocks.sort_by_key(|b| b.offset);
        self.merge_free_blocks();
        self.used -= handle.size;
        Ok(())
    }

    fn merge_free_blocks(&mut self) {
        let mut merged: Vec<FreeBlock> = Vec::with_capacity(self.free_blocks.len());
        for block in self.free_blocks.drain(..) {
            match merged.last_mut() {
                Some(last) if last.offset + last.size == block.offset => {
                    last.size += block.size;
                }
                _ => merged.push(block),
            }
        }
        self.free_blocks = merged;
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn fragment_count(&self) -> u32 {
        self.free_blocks.len() as u32
    }
}

/// Linear bump allocator for decoded image bytes. No deallocation — images live for
/// the lifetime of the widget that decoded them; the allocator is reset wholesale
/// when the owning card buffer manager is torn down.
pub struct ImageDataAllocator {
    capacity: u32,
    cursor: u32,
}

impl ImageDataAllocator {
    pub fn new(capacity: u32) -> Self {
        Self { capacity, cursor: 0 }
    }

    pub fn allocate(&mut self, size: u32) -> Result<StorageHandle> {
        if size == 0 {
            return Err(Error::invalid_argument("image allocation size must be non-zero"));
        }
        if self.cursor + size > self.capacity {
            return Err(Error::resource_exhausted("image data allocator exhausted"));
        }
        let offset = self.cursor;
        self.cursor += size;
        Ok(StorageHandle { offset, size })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn used(&self) -> u32 {
        self.cursor
    }
}

/// Coalesces marked byte ranges into a minimal set of `[offset, offset+size)`
/// ranges to re-upload, merging ranges whose gap is `<= max_gap` bytes.
#[derive(Default)]
pub struct DirtyTracker {
    ranges: Vec<(u32, u32)>,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_dirty(&mut self, offset: u32, size: u32) {
        if size == 0 {
            return;
        }
        self.ranges.push((offset, offset + size));
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    pub fn has_dirty(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Returns the coalesced `(offset, size)` ranges, sorted by offset, merging
    /// overlapping or near-adjacent (within `max_gap`) ranges.
    pub fn coalesced_ranges(&self, max_gap: u32) -> Vec<(u32, u32)> {
        if self.ranges.is_empty() {
            return Vec::new();
        }
        let mut sorted = self.ranges.clone();
        sorted.sort_by_key(|r| r.0);
        let mut out: Vec<(u32, u32)> = Vec::new();
        for (start, end) in sorted {
            match out.last_mut() {
                Some((_, last_end)) if start <= *last_end + max_gap => {
                    *last_end = (*last_end).max(end);
                }
                _ => out.push((start, end)),
            }
        }
        out.into_iter().map(|(start, end)| (start, end - start)).collect()
    }
}

/// Runtime statistics snapshot, mirroring the original's `Stats` struct.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
    pub metadata_used: u32,
    pub metadata_capacity: u32,
    pub storage_used: u32,
    pub storage_capacity: u32,
    pub pending_metadata_uploads: u32,
    pub pending_storage_uploads: u32,
}

/// Owns the CPU-side mirror buffers, the allocators, the dirty trackers, and the
/// GPU-resident buffers they upload into.
pub struct CardBufferManager {
    metadata_cpu: Vec<u8>,
    storage_cpu: Vec<u8>,
    metadata_gpu: wgpu::Buffer,
    storage_gpu: wgpu::Buffer,
    metadata_allocator: MetadataAllocator,
    storage_allocator: StorageAllocator,
    image_allocator: ImageDataAllocator,
    metadata_dirty: DirtyTracker,
    storage_dirty: DirtyTracker,
    image_atlas: ImageAtlas,
}

impl CardBufferManager {
    pub fn create(device: &wgpu::Device, config: &CardBufferConfig) -> Result<Self> {
        let metadata_allocator = MetadataAllocator::new(
            config.pool_32_slots,
            config.pool_64_slots,
            config.pool_128_slots,
            config.pool_256_slots,
        );
        let storage_capacity: u32 = config
            .storage_capacity_bytes
            .try_into()
            .map_err(|_| Error::invalid_argument("storage_capacity_bytes too large for u32"))?;
        let image_capacity: u32 = config
            .image_capacity_bytes
            .try_into()
            .map_err(|_| Error::invalid_argument("image_capacity_bytes too large for u32"))?;
        let storage_allocator = StorageAllocator::new(storage_capacity);
        let image_allocator = ImageDataAllocator::new(image_capacity);

        let metadata_size = metadata_allocator.total_size() as u64;
        let storage_size = storage_capacity as u64;

        let metadata_cpu = vec![0u8; metadata_size as usize];
        let storage_cpu = vec![0u8; storage_size as usize];

        let metadata_gpu = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("card-metadata-buffer"),
            contents: &metadata_cpu,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });
        let storage_gpu = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("card-storage-buffer"),
            contents: &storage_cpu,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });

        let image_atlas = ImageAtlas::create(device, config.image_atlas_size);

        Ok(Self {
            metadata_cpu,
            storage_cpu,
            metadata_gpu,
            storage_gpu,
            metadata_allocator,
            storage_allocator,
            image_allocator,
            metadata_dirty: DirtyTracker::new(),
            storage_dirty: DirtyTracker::new(),
            image_atlas,
        })
    }

    pub fn allocate_metadata(&mut self, size: u32) -> Result<MetadataHandle> {
        self.metadata_allocator.allocate(size)
    }

    pub fn deallocate_metadata(&mut self, handle: MetadataHandle) -> Result<()> {
        self.metadata_allocator.deallocate(handle)
    }

    pub fn write_metadata(&mut self, handle: MetadataHandle, data: &[u8]) -> Result<()> {
        self.write_metadata_at(handle, 0, data)
    }

    pub fn write_metadata_at(&mut self, handle: MetadataHandle, offset: u32, data: &[u8]) -> Result<()> {
        if offset + data.len() as u32 > handle.size {
            return Err(Error::invalid_argument("write exceeds metadata handle bounds"));
        }
        let start = (handle.offset + offset) as usize;
        self.metadata_cpu[start..start + data.len()].copy_from_slice(data);
        self.metadata_dirty.mark_dirty(handle.offset + offset, data.len() as u32);
        Ok(())
    }

    pub fn allocate_storage(&mut self, size: u32) -> Result<StorageHandle> {
        self.storage_allocator.allocate(size)
    }

    pub fn deallocate_storage(&mut self, handle: StorageHandle) -> Result<()> {
        self.storage_allocator.deallocate(handle)
    }

    pub fn write_storage(&mut self, handle: StorageHandle, data: &[u8]) -> Result<()> {
        self.write_storage_at(handle, 0, data)
    }

    pub fn write_storage_at(&mut self, handle: StorageHandle, offset: u32, data: &[u8]) -> Result<()> {
        if offset + data.len() as u32 > handle.size {
            return Err(Error::invalid_argument("write exceeds storage handle bounds"));
        }
        let start = (handle.offset + offset) as usize;
        self.storage_cpu[start..start + data.len()].copy_from_slice(data);
        self.storage_dirty.mark_dirty(handle.offset + offset, data.len() as u32);
        Ok(())
    }

    /// Allocates a storage block and writes its offset into a `u32` field inside an
    /// already-allocated metadata handle, linking the two.
    pub fn allocate_storage_and_link(
        &mut self,
        meta_handle: MetadataHandle,
        meta_field_offset: u32,
        storage_size: u32,
    ) -> Result<StorageHandle> {
        let storage_handle = self.storage_allocator.allocate(storage_size)?;
        if let Err(e) = self.write_metadata_at(meta_handle, meta_field_offset, &storage_handle.offset.to_le_bytes()) {
            let _ = self.storage_allocator.deallocate(storage_handle);
            return Err(e);
        }
        Ok(storage_handle)
    }

    pub fn allocate_image(&mut self, size: u32) -> Result<StorageHandle> {
        self.image_allocator.allocate(size)
    }

    /// Packs a decoded RGBA8 image into the shared image atlas and uploads its pixels.
    /// Never evicts; a full atlas page surfaces `Error::ResourceExhausted`.
    pub fn allocate_image_data(&mut self, queue: &wgpu::Queue, width: u32, height: u32, rgba: &[u8]) -> Result<AtlasRegion> {
        self.image_atlas.upload(queue, width, height, rgba)
    }

    pub fn image_atlas_view(&self) -> &wgpu::TextureView {
        self.image_atlas.view()
    }

    pub fn image_atlas_sampler(&self) -> &wgpu::Sampler {
        self.image_atlas.sampler()
    }

    pub fn image_atlas_size(&self) -> u32 {
        self.image_atlas.size()
    }

    /// Uploads all pending dirty ranges (per `max_gap`) to the GPU buffers, then
    /// clears both dirty trackers. A no-op if nothing is dirty.
    pub fn flush(&mut self, queue: &wgpu::Queue, max_gap: u32) {
        for (offset, size) in self.metadata_dirty.coalesced_ranges(max_gap) {
            let start = offset as usize;
            let end = start + size as usize;
            queue.write_buffer(&self.metadata_gpu, offset as u64, &self.metadata_cpu[start..end]);
        }
        self.metadata_dirty.clear();

        for (offset, size) in self.storage_dirty.coalesced_ranges(max_gap) {
            let start = offset as usize;
            let end = start + size as usize;
            queue.write_buffer(&self.storage_gpu, offset as u64, &self.storage_cpu[start..end]);
        }
        self.storage_dirty.clear();
    }

    pub fn metadata_buffer(&self) -> &wgpu::Buffer {
        &self.metadata_gpu
    }

    pub fn storage_buffer(&self) -> &wgpu::Buffer {
        &self.storage_gpu
    }

    pub fn stats(&self) -> Stats {
        Stats {
            metadata_used: self.metadata_allocator.total_size()
                - (self.metadata_allocator.pool32.free_slots.len() as u32 * SLOT_32
                    + self.metadata_allocator.pool64.free_slots.len() as u32 * SLOT_64
                    + self.metadata_allocator.pool128.free_slots.len() as u32 * SLOT_128
                    + self.metadata_allocator.pool256.free_slots.len() as u32 * SLOT_256),
            metadata_capacity: self.metadata_allocator.total_size(),
            storage_used: self.storage_allocator.used(),
            storage_capacity: self.storage_allocator.capacity(),
            pending_metadata_uploads: self.metadata_dirty.ranges.len() as u32,
            pending_storage_uploads: self.storage_dirty.ranges.len() as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_pool_exhaustion_is_resource_exhausted() {
        let mut pool = MetadataPool::new(32, 0, 2);
        pool.allocate().unwrap();
        pool.allocate().unwrap();
        let err = pool.allocate().unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted { .. }));
    }

    #[test]
    fn metadata_pool_roundtrip() {
        let mut pool = MetadataPool::new(32, 0, 4);
        let a = pool.allocate().unwrap();
        pool.deallocate(a).unwrap();
        let b = pool.allocate().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn metadata_pool_double_free_detected() {
        let mut pool = MetadataPool::new(32, 0, 4);
        let a = pool.allocate().unwrap();
        pool.deallocate(a).unwrap();
        let err = pool.deallocate(a).unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition { .. }));
    }

    #[test]
    fn metadata_allocator_routes_by_size() {
        let mut allocator = MetadataAllocator::new(4, 4, 4, 4);
        let h = allocator.allocate(10).unwrap();
        assert_eq!(h.size, SLOT_32);
        let h = allocator.allocate(40).unwrap();
        assert_eq!(h.size, SLOT_64);
        let h = allocator.allocate(100).unwrap();
        assert_eq!(h.size, SLOT_128);
        let h = allocator.allocate(200).unwrap();
        assert_eq!(h.size, SLOT_256);
    }

    #[test]
    fn metadata_allocator_rejects_oversize() {
        let mut allocator = MetadataAllocator::new(1, 1, 1, 1);
        let err = allocator.allocate(512).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn storage_allocator_coalesces_on_free() {
        let mut allocator = StorageAllocator::new(1024);
        let a = allocator.allocate(100).unwrap();
        let b = allocator.allocate(100).unwrap();
        let c = allocator.allocate(100).unwrap();
        assert_eq!(allocator.fragment_count(), 1);
        allocator.deallocate(b).unwrap();
        assert_eq!(allocator.fragment_count(), 2);
        allocator.deallocate(a).unwrap();
        allocator.deallocate(c).unwrap();
        assert_eq!(allocator.fragment_count(), 1);
        assert_eq!(allocator.used(), 0);
        let whole = allocator.allocate(1024).unwrap();
        assert_eq!(whole.size, 1024);
    }

    #[test]
    fn storage_allocator_first_fit_splits_remainder() {
        let mut allocator = StorageAllocator::new(100);
        let a = allocator.allocate(30).unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(allocator.used(), 30);
        let b = allocator.allocate(20).unwrap();
        assert_eq!(b.offset, 30);
    }

    #[test]
    fn storage_allocator_double_free_detected() {
        let mut allocator = StorageAllocator::new(100);
        let a = allocator.allocate(10).unwrap();
        allocator.deallocate(a).unwrap();
        let err = allocator.deallocate(a).unwrap_err();
        assert!(matches!(err, Error::FailedPrecondition { .. }));
    }

    #[test]
    fn image_allocator_is_linear_and_never_frees() {
        let mut allocator = ImageDataAllocator::new(100);
        let a = allocator.allocate(40).unwrap();
        let b = allocator.allocate(40).unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 40);
        let err = allocator.allocate(40).unwrap_err();
        assert!(matches!(err, Error::ResourceExhausted { .. }));
    }

    #[test]
    fn dirty_tracker_coalesces_within_max_gap() {
        let mut tracker = DirtyTracker::new();
        tracker.mark_dirty(0, 10);
        tracker.mark_dirty(20, 10);
        tracker.mark_dirty(100, 10);
        let ranges = tracker.coalesced_ranges(64);
        assert_eq!(ranges, vec![(0, 30), (100, 10)]);
    }

    #[test]
    fn dirty_tracker_does_not_merge_beyond_max_gap() {
        let mut tracker = DirtyTracker::new();
        tracker.mark_dirty(0, 10);
        tracker.mark_dirty(200, 10);
        let ranges = tracker.coalesced_ranges(64);
        assert_eq!(ranges, vec![(0, 10), (200, 10)]);
    }

    #[test]
    fn dirty_tracker_flush_clears_pending() {
        let mut tracker = DirtyTracker::new();
        assert!(!tracker.has_dirty());
        tracker.mark_dirty(0, 4);
        assert!(tracker.has_dirty());
        tracker.clear();
        assert!(!tracker.has_dirty());
    }
}

//! Cross-module integration test for the card buffer manager's CPU-side
//! allocator stack: `MetadataAllocator`, `StorageAllocator`, and `DirtyTracker`
//! as `CardBufferManager` composes them (`src/card.rs`), exercised without a
//! `wgpu::Device` since none of these three types touch the GPU — only
//! `CardBufferManager::create` itself does, to size the backing buffers.

use yetty::card::{DirtyTracker, MetadataAllocator, StorageAllocator};

#[test]
fn full_flush_cycle_allocates_writes_coalesces_and_frees() {
    let mut metadata = MetadataAllocator::new(4, 4, 4, 4);
    let mut storage = StorageAllocator::new(4096);
    let mut metadata_dirty = DirtyTracker::new();
    let mut storage_dirty = DirtyTracker::new();

    // Three cards worth of metadata (one per pool a 48-byte and a 300-byte
    // request don't fit in) plus a shared storage allocation each should link to.
    let card_a_meta = metadata.allocate(48).unwrap();
    let card_b_meta = metadata.allocate(48).unwrap();
    let card_c_meta = metadata.allocate(200).unwrap();
    assert_eq!(card_a_meta.size, 64);
    assert_eq!(card_c_meta.size, 256);

    let card_a_storage = storage.allocate(512).unwrap();
    let card_b_storage = storage.allocate(512).unwrap();
    let card_c_storage = storage.allocate(1024).unwrap();
    assert_eq!(storage.used(), 512 + 512 + 1024);

    // Writing each card marks both its metadata and storage ranges dirty.
    metadata_dirty.mark_dirty(card_a_meta.offset, card_a_meta.size);
    metadata_dirty.mark_dirty(card_b_meta.offset, card_b_meta.size);
    metadata_dirty.mark_dirty(card_c_meta.offset, card_c_meta.size);
    storage_dirty.mark_dirty(card_a_storage.offset, card_a_storage.size);
    storage_dirty.mark_dirty(card_b_storage.offset, card_b_storage.size);
    storage_dirty.mark_dirty(card_c_storage.offset, card_c_storage.size);

    assert!(metadata_dirty.has_dirty());
    assert!(storage_dirty.has_dirty());

    // Card A and B's metadata slots are adjacent 64-byte pool slots — a flush
    // with a generous max_gap coalesces them into one re-upload range, while
    // card C's 256-byte pool slot lives in a disjoint pool and stays separate.
    let coalesced_meta = metadata_dirty.coalesced_ranges(64);
    assert_eq!(coalesced_meta.len(), 2);

    // Flushing clears the dirty state, matching "flush is idempotent": a
    // second flush with nothing newly written sees no dirty ranges at all.
    metadata_dirty.clear();
    storage_dirty.clear();
    assert!(!metadata_dirty.has_dirty());
    assert!(!storage_dirty.has_dirty());
    assert!(metadata_dirty.coalesced_ranges(64).is_empty());

    // Freeing card B's storage block, then reallocating a block that exactly
    // fits the coalesced gap left by A and B, proves the free-list merges
    // adjacent blocks rather than fragmenting permanently.
    storage.deallocate(card_b_storage).unwrap();
    storage.deallocate(card_a_storage).unwrap();
    let reused = storage.allocate(1024).unwrap();
    assert_eq!(reused.offset, 0);
    assert_eq!(storage.used(), 1024 + 1024);

    metadata.deallocate(card_a_meta).unwrap();
    metadata.deallocate(card_b_meta).unwrap();
    metadata.deallocate(card_c_meta).unwrap();

    storage.deallocate(card_c_storage).unwrap();
    storage.deallocate(reused).unwrap();
    assert_eq!(storage.used(), 0);
    assert_eq!(storage.fragment_count(), 1);
}

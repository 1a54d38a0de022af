//! Integration tests for the buffer pool manager.
//!
//! These tests verify cross-component behavior that unit tests don't cover.

use extentdb::buffer::{BufferPoolManager, ReplacerKind};
use extentdb::common::PageId;
use extentdb::storage::DiskManager;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

fn create_bpm(pool_size: usize, kind: ReplacerKind) -> (BufferPoolManager, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let dm = DiskManager::create(&path).unwrap();
    (BufferPoolManager::with_replacer(pool_size, dm, kind), dir)
}

/// Test data persistence across multiple eviction cycles.
#[test]
fn test_data_persistence_across_evictions() {
    for kind in [ReplacerKind::Lru, ReplacerKind::Clock] {
        let (bpm, _dir) = create_bpm(2, kind);

        // Create 5 pages with unique data (forces evictions)
        let mut page_ids = vec![];
        for i in 0u8..5 {
            let mut guard = bpm.new_page_write().unwrap();
            guard.as_mut_slice()[0] = i;
            guard.as_mut_slice()[1] = i.wrapping_mul(3);
            page_ids.push(guard.page_id());
        }

        // Read all back - verifies evicted pages were flushed
        for (i, &pid) in page_ids.iter().enumerate() {
            let guard = bpm.fetch_page_read(pid).unwrap();
            assert_eq!(guard.as_slice()[0], i as u8);
            assert_eq!(guard.as_slice()[1], (i as u8).wrapping_mul(3));
        }
        assert!(bpm.stats().snapshot().evictions >= 3);
    }
}

/// Test flush and reload across BPM instances.
#[test]
fn test_flush_and_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let data = b"persistent!";

    let pid;

    // First session: create and write
    {
        let dm = DiskManager::create(&path).unwrap();
        let bpm = BufferPoolManager::new(10, dm);

        let mut guard = bpm.new_page_write().unwrap();
        pid = guard.page_id();
        guard.as_mut_slice()[..data.len()].copy_from_slice(data);
        drop(guard);

        bpm.flush_all_pages().unwrap();
    }

    // Second session: verify data and allocator state
    {
        let dm = DiskManager::open(&path).unwrap();
        assert_eq!(dm.num_allocated_pages(), 1);
        let bpm = BufferPoolManager::new(10, dm);

        assert!(!bpm.is_page_free(pid).unwrap());
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(&guard.as_slice()[..data.len()], data);
    }
}

/// A deleted page id is handed out again, and comes back zeroed.
#[test]
fn test_deleted_page_is_reused_clean() {
    let (bpm, _dir) = create_bpm(4, ReplacerKind::Lru);

    let pid = {
        let mut guard = bpm.new_page_write().unwrap();
        guard.as_mut_slice()[42] = 0xFF;
        guard.page_id()
    };
    bpm.flush_page(pid).unwrap();
    bpm.delete_page(pid).unwrap();
    assert!(bpm.is_page_free(pid).unwrap());
    assert!(!bpm.contains_page(pid));

    let guard = bpm.new_page_write().unwrap();
    assert_eq!(guard.page_id(), pid);
    assert_eq!(guard.as_slice()[42], 0);
}

/// Test concurrent writers to different pages.
#[test]
fn test_concurrent_writers() {
    let (bpm, _dir) = create_bpm(10, ReplacerKind::Lru);
    let bpm = Arc::new(bpm);

    let page_ids: Vec<PageId> = (0..5)
        .map(|_| bpm.new_page().unwrap().page_id())
        .collect();

    let mut handles = vec![];

    for (i, pid) in page_ids.iter().enumerate() {
        let bpm_clone = Arc::clone(&bpm);
        let pid = *pid;

        handles.push(thread::spawn(move || {
            for j in 0..50 {
                let mut guard = bpm_clone.fetch_page_write(pid).unwrap();
                guard.as_mut_slice()[0] = ((i * 50 + j) % 256) as u8;
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    // Verify each page has last written value
    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_page_read(pid).unwrap();
        assert_eq!(guard.as_slice()[0], ((i * 50 + 49) % 256) as u8);
    }
    assert!(bpm.check_all_unpinned());
}

/// Concurrent readers and writers over more pages than frames.
#[test]
fn test_concurrent_churn_small_pool() {
    let (bpm, _dir) = create_bpm(4, ReplacerKind::Clock);
    let bpm = Arc::new(bpm);

    let page_ids: Vec<PageId> = (0..16u8)
        .map(|i| {
            let mut guard = bpm.new_page_write().unwrap();
            guard.as_mut_slice()[0] = i;
            guard.page_id()
        })
        .collect();
    let page_ids = Arc::new(page_ids);

    let workers: Vec<_> = (0..3)
        .map(|t| {
            let bpm = Arc::clone(&bpm);
            let page_ids = Arc::clone(&page_ids);
            thread::spawn(move || {
                for round in 0..100 {
                    let idx = (round * 7 + t * 5) % page_ids.len();
                    // Three workers never pin more than the four frames.
                    let guard = bpm.fetch_page_read(page_ids[idx]).unwrap();
                    assert_eq!(guard.as_slice()[0], idx as u8);
                }
            })
        })
        .collect();

    for w in workers {
        w.join().unwrap();
    }
    assert!(bpm.check_all_unpinned());
}

/// Test stats accuracy under load.
#[test]
fn test_stats_accuracy() {
    let (bpm, _dir) = create_bpm(2, ReplacerKind::Lru);

    let pid = bpm.new_page().unwrap().page_id();

    // Multiple fetches = cache hits
    for _ in 0..5 {
        let _ = bpm.fetch_page_read(pid).unwrap();
    }

    let stats = bpm.stats().snapshot();
    assert_eq!(stats.cache_hits, 5);
    assert_eq!(stats.allocations, 1);

    // Force eviction
    let _ = bpm.new_page().unwrap();
    let _ = bpm.new_page().unwrap();

    let stats = bpm.stats().snapshot();
    assert!(stats.evictions >= 1);
    assert!(stats.pages_written >= 1);
}

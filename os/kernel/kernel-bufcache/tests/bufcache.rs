mod common;

use common::{Cache, MemDisk, TestPages, install_yield};
use kernel_bufcache::{BufCacheError, DiskError, EntryState};
use kernel_info::errno::{EIO, ENOMEM};
use kernel_info::fs::BLOCK_SIZE;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

#[test]
fn miss_reads_once_and_hit_reuses_the_slot() {
    let disk = MemDisk::patterned(16);
    let pages = TestPages::new(16);
    let cache = Cache::<4>::new(&disk, &pages);

    let a = cache.get_disk_entry(5, None).unwrap();
    assert_eq!(a.block_number(), 5);
    assert!(a.with_data(|d| d.iter().all(|&b| b == 5)));
    let b = cache.get_disk_entry(5, None).unwrap();
    assert_eq!(a.index(), b.index());
    assert_eq!(a.entry().ref_count(), 2);
    assert_eq!(disk.reads(), [5]);

    drop(a);
    drop(b);
    let slot = cache.lookup(5).unwrap();
    assert_eq!(slot.ref_count(), 0);
    assert_eq!(slot.state(), EntryState::Clean);
}

#[test]
fn full_cache_evicts_exactly_the_lru_entry() {
    let disk = MemDisk::patterned(16);
    let pages = TestPages::new(16);
    let cache = Cache::<4>::new(&disk, &pages);

    for bn in 1..=4 {
        cache.get_disk_entry(bn, None).unwrap().put();
    }
    assert_eq!(cache.occupied(), 4);

    let fifth = cache.get_disk_entry(5, None).unwrap();
    assert!(fifth.with_data(|d| d[0] == 5));
    assert_eq!(cache.occupied(), 4);
    assert!(cache.lookup(1).is_none());
    for bn in 2..=5 {
        assert!(cache.lookup(bn).is_some(), "block {bn}");
    }
    assert_eq!(disk.reads(), [1, 2, 3, 4, 5]);
}

#[test]
fn lookup_hit_promotes_to_most_recently_used() {
    let disk = MemDisk::patterned(16);
    let pages = TestPages::new(16);
    let cache = Cache::<3>::new(&disk, &pages);

    for bn in 1..=3 {
        cache.get_disk_entry(bn, None).unwrap().put();
    }
    cache.get_disk_entry(1, None).unwrap().put();
    cache.get_disk_entry(4, None).unwrap().put();

    assert!(cache.lookup(1).is_some());
    assert!(cache.lookup(2).is_none());
}

#[test]
fn referenced_entries_are_never_evicted() {
    let disk = MemDisk::patterned(16);
    let pages = TestPages::new(16);
    let cache = Cache::<2>::new(&disk, &pages);

    let pinned = cache.get_disk_entry(1, None).unwrap();
    cache.get_disk_entry(2, None).unwrap().put();
    cache.get_disk_entry(3, None).unwrap().put();

    assert_eq!(cache.lookup(1).map(|e| e.index()), Some(pinned.index()));
    assert!(cache.lookup(2).is_none());
    assert!(pinned.with_data(|d| d.iter().all(|&b| b == 1)));
}

#[test]
fn sync_writes_back_and_reclaims_idle_entries() {
    let disk = MemDisk::patterned(16);
    let pages = TestPages::new(16);
    let cache = Cache::<4>::new(&disk, &pages);
    let free_before = pages.free_bytes();

    let block = cache.get_disk_entry(3, None).unwrap();
    let slot = block.index();
    {
        let mut w = block.get_write();
        w[..4].copy_from_slice(b"ok!!");
        w.mark_dirty();
    }
    assert_eq!(cache.entry(slot).state(), EntryState::Dirty);
    drop(block);

    cache.sync(0).unwrap();
    assert_eq!(disk.writes(), [3]);
    assert_eq!(&disk.block(3)[..4], b"ok!!");
    assert_eq!(cache.entry(slot).state(), EntryState::Clean);

    cache.sync(1).unwrap();
    assert_eq!(disk.writes(), [3]);
    assert_eq!(cache.entry(slot).state(), EntryState::Empty);
    assert!(cache.lookup(3).is_none());
    assert_eq!(pages.free_bytes(), free_before);
}

#[test]
fn dirty_entry_is_reclaimed_by_a_single_sync() {
    let disk = MemDisk::patterned(16);
    let pages = TestPages::new(16);
    let cache = Cache::<4>::new(&disk, &pages);

    let block = cache.get_disk_entry(9, None).unwrap();
    let slot = block.index();
    block.get_write().put_write(true);
    drop(block);

    cache.sync(1).unwrap();
    assert_eq!(disk.writes(), [9]);
    assert_eq!(cache.entry(slot).state(), EntryState::Empty);
    assert_eq!(cache.dirty_count(), 0);
}

#[test]
fn releasing_the_write_token_without_marking_keeps_the_entry_clean() {
    let disk = MemDisk::patterned(16);
    let pages = TestPages::new(16);
    let cache = Cache::<4>::new(&disk, &pages);

    let block = cache.get_disk_entry(2, None).unwrap();
    block.get_write().put_write(false);
    assert_eq!(block.entry().state(), EntryState::Clean);
    assert_eq!(cache.dirty_count(), 0);
}

#[test]
fn dirty_unreferenced_entries_are_written_back_to_make_room() {
    let disk = MemDisk::patterned(16);
    let pages = TestPages::new(16);
    let cache = Cache::<2>::new(&disk, &pages);

    for bn in [1, 2] {
        let block = cache.get_disk_entry(bn, None).unwrap();
        let mut w = block.get_write();
        w[0] = 0xa0 + bn as u8;
        w.mark_dirty();
    }
    assert_eq!(cache.dirty_count(), 2);

    let third = cache.get_disk_entry(3, None).unwrap();
    assert_eq!(third.block_number(), 3);

    // Only the least recently used dirty block is written to make room.
    assert_eq!(disk.writes(), [1]);
    assert_eq!(disk.block(1)[0], 0xa1);
    assert!(cache.lookup(1).is_none());
    assert_eq!(cache.dirty_count(), 1);
    assert_eq!(cache.lookup(2).unwrap().state(), EntryState::Dirty);
}

#[test]
fn held_write_token_does_not_stall_eviction() {
    let disk = MemDisk::patterned(16);
    let pages = TestPages::new(16);
    let cache = Cache::<2>::new(&disk, &pages);

    cache.get_disk_entry(2, None).unwrap().get_write().put_write(true);
    let one = cache.get_disk_entry(1, None).unwrap();
    let mut w = one.get_write();
    w[0] = 0xb1;
    w.mark_dirty();

    // Runs on the thread that holds block 1's write token.
    let third = cache.get_disk_entry(3, None).unwrap();
    assert_eq!(third.block_number(), 3);
    assert_eq!(disk.writes(), [2]);
    assert_eq!(cache.lookup(1).unwrap().state(), EntryState::Dirty);

    drop(w);
    drop((one, third));
    cache.sync(0).unwrap();
    assert_eq!(disk.writes(), [2, 1]);
    assert_eq!(disk.block(1)[0], 0xb1);
}

#[test]
fn eviction_waits_for_a_running_sync_instead_of_writing_twice() {
    install_yield();
    let disk = MemDisk::patterned(16).with_write_delay(Duration::from_millis(60));
    let pages = TestPages::new(16);
    let cache = Cache::<1>::new(&disk, &pages);

    cache.get_disk_entry(1, None).unwrap().get_write().put_write(true);
    thread::scope(|s| {
        s.spawn(|| cache.sync(0).unwrap());

        thread::sleep(Duration::from_millis(20));
        let block = cache.get_disk_entry(2, None).unwrap();
        assert_eq!(block.block_number(), 2);
    });

    assert_eq!(disk.writes(), [1]);
    assert_eq!(cache.dirty_count(), 0);
}

#[test]
fn eviction_fails_cleanly_when_write_back_is_impossible() {
    let disk = MemDisk::patterned(16);
    let pages = TestPages::new(16);
    let cache = Cache::<2>::new(&disk, &pages);

    for bn in [1, 2] {
        cache.get_disk_entry(bn, None).unwrap().get_write().put_write(true);
    }
    disk.fail_writes.store(true, Ordering::SeqCst);

    let err = cache.get_disk_entry(3, None).unwrap_err();
    assert_eq!(err, BufCacheError::Exhausted);
    assert_eq!(err.as_errno(), EIO);
    assert_eq!(cache.dirty_count(), 2);
    assert!(cache.lookup(1).is_some());
    assert!(cache.lookup(2).is_some());

    disk.fail_writes.store(false, Ordering::SeqCst);
    assert!(cache.get_disk_entry(3, None).is_ok());
}

#[test]
fn failed_sync_keeps_unwritten_entries_dirty() {
    let disk = MemDisk::patterned(16);
    let pages = TestPages::new(16);
    let cache = Cache::<4>::new(&disk, &pages);

    for bn in [4, 5, 6] {
        cache.get_disk_entry(bn, None).unwrap().get_write().put_write(true);
    }
    disk.fail_writes.store(true, Ordering::SeqCst);
    assert_eq!(
        cache.sync(1),
        Err(BufCacheError::Io(DiskError::NoDevice))
    );
    assert_eq!(cache.dirty_count(), 3);
    assert_eq!(cache.occupied(), 3);

    disk.fail_writes.store(false, Ordering::SeqCst);
    cache.sync(1).unwrap();
    assert_eq!(disk.writes().len(), 3);
    assert_eq!(cache.occupied(), 0);
}

#[test]
fn read_error_is_reported_and_rolls_back_the_reference() {
    let disk = MemDisk::patterned(16);
    let pages = TestPages::new(16);
    let cache = Cache::<4>::new(&disk, &pages);

    disk.fail_reads.store(true, Ordering::SeqCst);
    let err = cache.get_disk_entry(7, None).unwrap_err();
    assert!(matches!(err, BufCacheError::Io(DiskError::Device(_))));
    assert_eq!(err.as_errno(), EIO);

    let slot = cache.lookup(7).unwrap();
    assert_eq!(slot.ref_count(), 0);
    assert_eq!(slot.state(), EntryState::Allocated);

    disk.fail_reads.store(false, Ordering::SeqCst);
    let block = cache.get_disk_entry(7, None).unwrap();
    assert!(block.with_data(|d| d[0] == 7));
    assert_eq!(disk.reads(), [7]);
}

#[test]
fn out_of_memory_is_reported_and_rolls_back_the_reference() {
    let disk = MemDisk::patterned(16);
    let pages = TestPages::new(1);
    let cache = Cache::<4>::new(&disk, &pages);

    let first = cache.get_disk_entry(1, None).unwrap();
    let err = cache.get_disk_entry(2, None).unwrap_err();
    assert!(matches!(err, BufCacheError::OutOfMemory(_)));
    assert_eq!(err.as_errno(), ENOMEM);
    assert_eq!(cache.lookup(2).unwrap().ref_count(), 0);
    assert!(disk.reads().iter().all(|&bn| bn == 1));

    drop(first);
    cache.sync(1).unwrap();
    assert!(cache.get_disk_entry(2, None).is_ok());
}

#[test]
fn superblock_lives_in_its_own_slot() {
    let disk = MemDisk::patterned(16);
    let pages = TestPages::new(16);
    let cache = Cache::<2>::new(&disk, &pages);

    let sb = cache.get_disk_entry(0, None).unwrap();
    assert_eq!(sb.index(), cache.capacity());
    assert_eq!(cache.occupied(), 0);
    drop(sb);

    for bn in 1..=5 {
        cache.get_disk_entry(bn, None).unwrap().put();
    }
    cache.sync(2).unwrap();
    assert!(cache.lookup(0).is_some());
    assert_eq!(disk.reads().iter().filter(|&&bn| bn == 0).count(), 1);
}

#[test]
fn superblock_can_be_dirtied_and_synced() {
    let disk = MemDisk::patterned(16);
    let pages = TestPages::new(16);
    let cache = Cache::<2>::new(&disk, &pages);

    let sb = cache.get_disk_entry(0, None).unwrap();
    {
        let mut w = sb.get_write();
        w[600] = 0x77;
        w.mark_dirty();
    }
    drop(sb);
    cache.sync(1).unwrap();
    assert_eq!(disk.writes(), [0]);
    assert_eq!(disk.block(0)[600], 0x77);
}

#[test]
#[should_panic(expected = "still referenced")]
fn strict_sync_rejects_referenced_blocks() {
    let disk = MemDisk::patterned(16);
    let pages = TestPages::new(16);
    let cache = Cache::<2>::new(&disk, &pages);
    let _held = cache.get_disk_entry(2, None).unwrap();
    let _ = cache.sync(2);
}

#[test]
fn strict_sync_tolerates_a_referenced_block_one() {
    let disk = MemDisk::patterned(16);
    let pages = TestPages::new(16);
    let cache = Cache::<2>::new(&disk, &pages);
    let held = cache.get_disk_entry(1, None).unwrap();
    cache.get_disk_entry(3, None).unwrap().get_write().put_write(true);

    cache.sync(2).unwrap();
    assert_eq!(disk.writes(), [3]);
    assert_eq!(cache.occupied(), 1);
    assert_eq!(cache.lookup(1).unwrap().ref_count(), 1);
    drop(held);
}

#[test]
fn cleaner_runs_once_per_disk_read() {
    static CLEANED: AtomicUsize = AtomicUsize::new(0);
    fn stamp(index: usize, buf: &mut [u8]) {
        CLEANED.fetch_add(1, Ordering::SeqCst);
        buf[0] = index as u8 + 100;
    }

    let disk = MemDisk::patterned(16);
    let pages = TestPages::new(16);
    let cache = Cache::<4>::new(&disk, &pages);

    let a = cache.get_disk_entry(6, Some(stamp)).unwrap();
    let b = cache.get_disk_entry(6, Some(stamp)).unwrap();
    assert_eq!(CLEANED.load(Ordering::SeqCst), 1);
    assert!(a.with_data(|d| d[0] == a.index() as u8 + 100 && d[1] == 6));
    drop((a, b));
}

#[test]
fn contains_only_covers_the_loaded_buffer() {
    let disk = MemDisk::patterned(16);
    let pages = TestPages::new(16);
    let cache = Cache::<2>::new(&disk, &pages);

    let block = cache.get_disk_entry(1, None).unwrap();
    let entry = block.entry();
    assert!(entry.contains(block.as_ptr()));
    assert!(entry.contains(block.as_ptr().wrapping_add(BLOCK_SIZE - 1)));
    assert!(!entry.contains(block.as_ptr().wrapping_add(BLOCK_SIZE)));
    assert!(!cache.entry(1).contains(block.as_ptr()));
}

#[test]
fn write_token_is_exclusive() {
    let disk = MemDisk::patterned(16);
    let pages = TestPages::new(16);
    let cache = Cache::<2>::new(&disk, &pages);

    let block = cache.get_disk_entry(1, None).unwrap();
    let w = block.get_write();
    assert!(block.entry().is_write_held());
    assert!(block.try_get_write().is_none());
    drop(w);
    assert!(block.try_get_write().is_some());
}

#[test]
fn concurrent_misses_share_one_disk_read() {
    install_yield();
    let disk = MemDisk::patterned(16).with_read_delay(Duration::from_millis(30));
    let pages = TestPages::new(16);
    let cache = Cache::<4>::new(&disk, &pages);
    let threads = 8;
    let start = Barrier::new(threads);

    let contents: Vec<Vec<u8>> = thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                s.spawn(|| {
                    start.wait();
                    let block = cache.get_disk_entry(9, None).unwrap();
                    block.with_data(<[u8]>::to_vec)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(disk.reads(), [9]);
    assert!(contents.iter().all(|c| c == &contents[0]));
    assert!(contents[0].iter().all(|&b| b == 9));
    assert_eq!(cache.lookup(9).unwrap().ref_count(), 0);
}

#[test]
fn full_cache_of_referenced_entries_waits_for_a_put() {
    install_yield();
    let disk = MemDisk::patterned(16);
    let pages = TestPages::new(16);
    let cache = Cache::<1>::new(&disk, &pages);
    let done = AtomicBool::new(false);

    let held = cache.get_disk_entry(1, None).unwrap();
    thread::scope(|s| {
        s.spawn(|| {
            let block = cache.get_disk_entry(2, None).unwrap();
            assert!(block.with_data(|d| d[0] == 2));
            done.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(30));
        assert!(!done.load(Ordering::SeqCst));
        drop(held);
    });

    assert!(done.load(Ordering::SeqCst));
    assert!(cache.lookup(1).is_none());
}

#[test]
fn writers_of_one_block_never_interleave() {
    install_yield();
    let disk = MemDisk::patterned(16);
    let pages = TestPages::new(16);
    let cache = Cache::<2>::new(&disk, &pages);

    thread::scope(|s| {
        for t in 1..=2u8 {
            let cache = &cache;
            s.spawn(move || {
                let block = cache.get_disk_entry(4, None).unwrap();
                for _ in 0..50 {
                    let mut w = block.get_write();
                    for chunk in w.chunks_mut(512) {
                        chunk.fill(t);
                        thread::yield_now();
                    }
                    assert!(w.iter().all(|&b| b == t), "interleaved write");
                    w.mark_dirty();
                }
            });
        }
    });

    let block = cache.get_disk_entry(4, None).unwrap();
    let first = block.with_data(|d| d[0]);
    assert!(block.with_data(|d| d.iter().all(|&b| b == first)));
    assert_eq!(cache.dirty_count(), 1);
}

#[test]
fn contended_cache_makes_progress() {
    install_yield();
    let disk = MemDisk::patterned(32);
    let pages = TestPages::new(64);
    let cache = Cache::<3>::new(&disk, &pages);

    thread::scope(|s| {
        for t in 0..6u32 {
            let cache = &cache;
            s.spawn(move || {
                for i in 0..40u32 {
                    let bn = 1 + (t * 7 + i) % 20;
                    let block = cache.get_disk_entry(bn, None).unwrap();
                    if i % 5 == 0 {
                        let mut w = block.get_write();
                        w[1] = bn as u8;
                        w.mark_dirty();
                    }
                    assert!(block.with_data(|d| d[0] == bn as u8));
                }
            });
        }
    });

    cache.sync(2).unwrap();
    assert_eq!(cache.occupied(), 0);
    assert_eq!(cache.dirty_count(), 0);
}

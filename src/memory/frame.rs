//! Physical Frame Allocator (Bitmap)
//!
//! Tracks all usable physical pages (4 KB frames) via a bitmap.
//! Each bit represents one physical frame: 0 = free, 1 = allocated.
//! Initialized from the device-tree memory-region stream after the heap
//! is ready; this is the allocator the `mm::page_alloc` façade sits on.

use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;
use alloc::vec;
use alloc::vec::Vec;

const FRAME_SIZE: u64 = 4096;

static FRAME_ALLOC: Mutex<Option<FrameAllocator>> = Mutex::new(None);

static TOTAL_FRAMES: AtomicU64 = AtomicU64::new(0);
static USED_FRAMES: AtomicU64 = AtomicU64::new(0);

struct FrameAllocator {
    /// Bitmap: each bit = one 4 KB frame. bit set = allocated.
    bitmap: Vec<u64>,
    base_phys: u64,
    total_frames: usize,
    next_hint: usize,
}

impl FrameAllocator {
    fn alloc(&mut self) -> Option<u64> {
        let words = self.bitmap.len();

        for offset in 0..words {
            let idx = (self.next_hint + offset) % words;
            let word = self.bitmap[idx];

            if word == u64::MAX {
                continue;
            }

            let bit = (!word).trailing_zeros() as usize;
            let frame_index = idx * 64 + bit;

            if frame_index >= self.total_frames {
                continue;
            }

            self.bitmap[idx] |= 1u64 << bit;
            self.next_hint = idx;

            USED_FRAMES.fetch_add(1, Ordering::Relaxed);

            return Some(self.base_phys + frame_index as u64 * FRAME_SIZE);
        }

        None
    }

    /// Allocate `n` contiguous frames. Scans for a run of `n` clear bits;
    /// the table sizes this core ever requests (at most 16 frames, for a
    /// 64K-granule level-2 table) keep this linear scan cheap in practice.
    fn alloc_contiguous(&mut self, n: usize) -> Option<u64> {
        if n == 0 {
            return None;
        }
        let mut run_start = 0usize;
        let mut run_len = 0usize;
        for frame in 0..self.total_frames {
            let word = frame / 64;
            let bit = frame % 64;
            let taken = self.bitmap[word] & (1u64 << bit) != 0;
            if taken {
                run_len = 0;
                run_start = frame + 1;
            } else {
                run_len += 1;
                if run_len == n {
                    for f in run_start..run_start + n {
                        let w = f / 64;
                        let b = f % 64;
                        self.bitmap[w] |= 1u64 << b;
                    }
                    USED_FRAMES.fetch_add(n as u64, Ordering::Relaxed);
                    return Some(self.base_phys + run_start as u64 * FRAME_SIZE);
                }
            }
        }
        None
    }

    fn free(&mut self, phys: u64) {
        if phys < self.base_phys {
            return;
        }
        let frame_index = ((phys - self.base_phys) / FRAME_SIZE) as usize;
        if frame_index >= self.total_frames {
            return;
        }
        let word_idx = frame_index / 64;
        let bit_idx = frame_index % 64;

        if self.bitmap[word_idx] & (1u64 << bit_idx) != 0 {
            self.bitmap[word_idx] &= !(1u64 << bit_idx);
            USED_FRAMES.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

/// Usable physical region reported by the device-tree memory-region source.
pub struct PhysRegion {
    pub base: u64,
    pub length: u64,
}

/// Initialize the frame allocator over `usable_regions`, marking the span
/// already consumed by the kernel heap as used.
pub fn init(usable_regions: &[PhysRegion], heap_phys: u64, heap_size: u64) {
    if usable_regions.is_empty() {
        crate::log_warn!("no usable regions reported — frame allocator disabled");
        return;
    }

    let min_phys = usable_regions.iter().map(|r| r.base).min().unwrap();
    let max_phys = usable_regions.iter().map(|r| r.base + r.length).max().unwrap();

    let base_phys = min_phys & !(FRAME_SIZE - 1);
    let top_phys = (max_phys + FRAME_SIZE - 1) & !(FRAME_SIZE - 1);
    let total_frames = ((top_phys - base_phys) / FRAME_SIZE) as usize;

    let bitmap_words = total_frames.div_ceil(64);
    let mut bitmap = vec![u64::MAX; bitmap_words];

    for region in usable_regions {
        let region_start = (region.base.max(base_phys) - base_phys) / FRAME_SIZE;
        let region_end = ((region.base + region.length).min(top_phys) - base_phys) / FRAME_SIZE;

        for frame in region_start..region_end {
            let word = frame as usize / 64;
            let bit = frame as usize % 64;
            bitmap[word] &= !(1u64 << bit);
        }
    }

    let heap_end = heap_phys + heap_size;
    if heap_phys >= base_phys && heap_phys < top_phys {
        let start_frame = ((heap_phys - base_phys) / FRAME_SIZE) as usize;
        let end_frame = ((heap_end.min(top_phys)) - base_phys) as usize / FRAME_SIZE as usize;
        for frame in start_frame..end_frame {
            let word = frame / 64;
            let bit = frame % 64;
            bitmap[word] |= 1u64 << bit;
        }
    }

    let mut free_count: u64 = 0;
    for i in 0..total_frames {
        let word = i / 64;
        let bit = i % 64;
        if bitmap[word] & (1u64 << bit) == 0 {
            free_count += 1;
        }
    }
    let used_count = total_frames as u64 - free_count;

    TOTAL_FRAMES.store(total_frames as u64, Ordering::SeqCst);
    USED_FRAMES.store(used_count, Ordering::SeqCst);

    crate::log!(
        "frame allocator ready: {} total frames, {} free ({} MB), {} used",
        total_frames,
        free_count,
        free_count * 4 / 1024,
        used_count
    );

    *FRAME_ALLOC.lock() = Some(FrameAllocator {
        bitmap,
        base_phys,
        total_frames,
        next_hint: 0,
    });
}

/// Allocate a single physical 4 KB frame, zeroed.
pub fn alloc_frame_zeroed() -> Option<u64> {
    let phys = FRAME_ALLOC.lock().as_mut()?.alloc()?;
    zero_frame(phys, 1);
    Some(phys)
}

/// Allocate `n` contiguous 4 KB frames, zeroed.
pub fn alloc_contiguous_zeroed(n: usize) -> Option<u64> {
    let phys = FRAME_ALLOC.lock().as_mut()?.alloc_contiguous(n)?;
    zero_frame(phys, n);
    Some(phys)
}

#[cfg(target_arch = "aarch64")]
fn zero_frame(phys: u64, n: usize) {
    let virt = crate::memory::phys_to_virt(phys);
    unsafe {
        core::ptr::write_bytes(virt as *mut u8, 0, FRAME_SIZE as usize * n);
    }
}

/// Host test builds track frames by bookkeeping address only — there is no
/// real backing memory at the fake physical addresses used in tests.
#[cfg(not(target_arch = "aarch64"))]
fn zero_frame(_phys: u64, _n: usize) {}

pub fn free_frame(phys: u64) {
    if let Some(alloc) = FRAME_ALLOC.lock().as_mut() {
        alloc.free(phys);
    }
}

pub fn stats() -> (u64, u64) {
    (TOTAL_FRAMES.load(Ordering::Relaxed), USED_FRAMES.load(Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    // The frame allocator is one process-wide global; serialize tests that
    // re-initialize it so they don't race each other's bitmaps.
    static TEST_LOCK: StdMutex<()> = StdMutex::new(());

    fn reset_with_region(len_frames: u64) {
        let region = PhysRegion { base: 0x4000_0000, length: len_frames * FRAME_SIZE };
        init(&[region], 0, 0);
    }

    #[test]
    fn alloc_is_page_aligned_and_zeroed() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_with_region(64);
        let phys = alloc_frame_zeroed().expect("alloc");
        assert_eq!(phys & 0xFFF, 0);
        free_frame(phys);
    }

    #[test]
    fn free_then_realloc_succeeds() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_with_region(64);
        let f1 = alloc_frame_zeroed().unwrap();
        free_frame(f1);
        assert!(alloc_frame_zeroed().is_some());
    }

    #[test]
    fn contiguous_alloc_returns_adjacent_run() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_with_region(64);
        let base = alloc_contiguous_zeroed(4).expect("contiguous alloc");
        assert_eq!(base & 0xFFF, 0);
        free_frame(base);
        free_frame(base + FRAME_SIZE);
        free_frame(base + 2 * FRAME_SIZE);
        free_frame(base + 3 * FRAME_SIZE);
    }

    #[test]
    fn sixteen_consecutive_allocs_are_unique() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_with_region(64);
        let mut frames = Vec::new();
        for _ in 0..16 {
            let f = alloc_frame_zeroed().expect("alloc");
            assert!(!frames.contains(&f));
            frames.push(f);
        }
        for f in frames {
            free_frame(f);
        }
    }
}

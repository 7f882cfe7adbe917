//! Physical memory bring-up: kernel heap and the physical frame allocator
//! that backs the page allocator façade (`mm::page_alloc`).
//!
//! This hypervisor core runs with EL2 identity-mapped onto physical memory
//! (no stage-1 HHDM indirection to track) — `phys_to_virt`/`virt_to_phys`
//! are the identity function and exist only so call sites read the same
//! way they would under a real higher-half mapping, matching the rest of
//! the tree's convention of naming the conversion explicitly rather than
//! performing raw casts inline.

pub mod frame;
pub mod heap;

use core::sync::atomic::{AtomicU64, Ordering};

static TOTAL_PHYS_MEMORY: AtomicU64 = AtomicU64::new(0);

pub fn set_total_physical_memory(bytes: u64) {
    TOTAL_PHYS_MEMORY.store(bytes, Ordering::SeqCst);
}

pub fn total_physical_memory() -> u64 {
    TOTAL_PHYS_MEMORY.load(Ordering::Relaxed)
}

pub const HEAP_SIZE_MIN: usize = 16 * 1024 * 1024;
pub const HEAP_SIZE_MAX: usize = 256 * 1024 * 1024;

pub fn compute_heap_size(total_ram: u64) -> usize {
    let quarter = (total_ram / 4) as usize;
    quarter.clamp(HEAP_SIZE_MIN, HEAP_SIZE_MAX)
}

/// Bring up the kernel heap at a physical (== virtual) base chosen by the
/// boot collaborator, then the frame allocator over the remaining usable
/// regions reported by the device-tree memory-region source.
pub fn init(heap_base: u64, heap_size: usize, usable: &[frame::PhysRegion]) {
    heap::init_at(heap_base as usize, heap_size);
    crate::log!("heap ready: {} MB at {:#x}", heap_size / (1024 * 1024), heap_base);
    frame::init(usable, heap_base, heap_size as u64);
}

#[inline]
pub fn phys_to_virt(phys: u64) -> u64 {
    phys
}

#[inline]
pub fn virt_to_phys(virt: u64) -> Option<u64> {
    Some(virt)
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryStats {
    pub heap_used: usize,
    pub heap_free: usize,
    pub frames_used: usize,
    pub frames_free: usize,
}

pub fn stats() -> MemoryStats {
    let (frames_total, frames_used) = frame::stats();
    MemoryStats {
        heap_used: heap::used(),
        heap_free: heap::free(),
        frames_used: frames_used as usize,
        frames_free: (frames_total - frames_used) as usize,
    }
}

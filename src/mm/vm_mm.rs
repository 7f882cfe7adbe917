//! Per-VM memory-management struct.
//!
//! Owns the VM's stage-2 table and the fixed-size blocks backing its
//! normal RAM. Created when the VM is created, destroyed only when the
//! VM is released (and must already be stopped).

use alloc::vec::Vec;
use spin::Mutex;

use crate::error::{HvError, Result};
use crate::mm::page_alloc;
use crate::mm::region::MemRegion;
use crate::mm::stage2::Stage2Table;

struct Block {
    base: u64,
    pages: usize,
}

struct Inner {
    table: Stage2Table,
    mem_base: u64,
    mem_size: u64,
    mem_free: u64,
    block_list: Vec<Block>,
}

/// Per-VM memory-management state. The lock serializes every mutation of
/// the page tables and the block list.
pub struct VmMm {
    inner: Mutex<Inner>,
}

impl VmMm {
    /// Create the MM struct for a VM: allocate its stage-2 table and map
    /// every region it owns (plus shared regions, already folded into
    /// `regions` by the caller).
    pub fn create(regions: &[MemRegion]) -> Result<Self> {
        let table = crate::mm::stage2::alloc_and_map_vm(regions)?;
        let mem_size: u64 = regions.iter().map(|r| r.size).sum();
        let mem_base = regions.iter().map(|r| r.phy_base).min().unwrap_or(0);
        Ok(VmMm {
            inner: Mutex::new(Inner {
                table,
                mem_base,
                mem_size,
                mem_free: mem_size,
                block_list: Vec::new(),
            }),
        })
    }

    /// Allocate `pages` page-sized blocks of guest RAM, tracked for
    /// release when the VM is torn down.
    pub fn alloc_block(&self, pages: usize) -> Result<u64> {
        let mut inner = self.inner.lock();
        let base = page_alloc::alloc_pages(pages).ok_or(HvError::Enomem)?;
        let bytes = pages as u64 * crate::config::PAGE_SIZE;
        if inner.mem_free < bytes {
            page_alloc::free_pages(base, pages);
            return Err(HvError::Enomem);
        }
        inner.mem_free -= bytes;
        inner.block_list.push(Block { base, pages });
        Ok(base)
    }

    pub fn mem_free(&self) -> u64 {
        self.inner.lock().mem_free
    }

    pub fn vttbr(&self, vmid: u16) -> u64 {
        self.inner.lock().table.vttbr(vmid)
    }
}

/// Walk the block list and the stage-2 table's page-table pages, freeing
/// both. The VM must already be stopped; this does not itself check that.
pub fn release_vm_memory(mm: VmMm) {
    let inner = mm.inner.into_inner();
    for block in &inner.block_list {
        page_alloc::free_pages(block.base, block.pages);
    }
    for &(base, pages) in inner.table.table_pages() {
        page_alloc::free_pages(base, pages);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::frame;
    use crate::mm::region::RegionType;

    static TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn reset_frames() {
        let region = frame::PhysRegion { base: 0x4000_0000, length: 4096 * 4096 };
        frame::init(&[region], 0, 0);
    }

    #[test]
    fn create_tracks_total_region_size_as_mem_free() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_frames();
        let regions = [MemRegion {
            phy_base: 0x8000_0000,
            vir_base: 0x8000_0000,
            size: 0x0020_0000,
            kind: RegionType::Normal,
            vmid: 1,
        }];
        let mm = VmMm::create(&regions).unwrap();
        assert_eq!(mm.mem_free(), 0x0020_0000);
    }

    #[test]
    fn alloc_block_reduces_mem_free_and_is_freed_on_release() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_frames();
        let regions = [MemRegion {
            phy_base: 0x8000_0000,
            vir_base: 0x8000_0000,
            size: 0x0020_0000,
            kind: RegionType::Normal,
            vmid: 1,
        }];
        let mm = VmMm::create(&regions).unwrap();
        let before = mm.mem_free();
        mm.alloc_block(2).unwrap();
        assert!(mm.mem_free() < before);
        release_vm_memory(mm);
    }

    #[test]
    fn release_frees_page_table_pages_as_well_as_blocks() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_frames();
        let (_, used_before) = frame::stats();
        let regions = [MemRegion {
            phy_base: 0x8000_0000,
            vir_base: 0x8000_0000,
            size: 0x0020_0000,
            kind: RegionType::Normal,
            vmid: 1,
        }];
        let mm = VmMm::create(&regions).unwrap();
        mm.alloc_block(2).unwrap();
        let (_, used_during) = frame::stats();
        assert!(used_during > used_before);
        release_vm_memory(mm);
        let (_, used_after) = frame::stats();
        assert_eq!(used_after, used_before);
    }
}

//! Stage-2 (guest-physical -> machine-physical) translation tables.
//!
//! Two levels: a level-1 table of TABLE descriptors spanning `l1_span`
//! bytes each, and per-slot level-2 tables of BLOCK descriptors spanning
//! `l2_block_size` bytes each. Both sizes come from the active
//! `GranuleConfig` — nothing here hard-codes 4K/16K/64K.
//!
//! Mapping is identity (IPA == PA): this core's regions are already
//! machine-physical by the time they reach `map_region`, so there is no
//! separate physical base to translate through.

use alloc::vec::Vec;

use crate::config::{active_granule_config, GranuleConfig};
use crate::error::{HvError, Result};
use crate::mm::page_alloc;
use crate::mm::region::{MemRegion, RegionType};

mod desc {
    pub const VALID: u64 = 1 << 0;
    pub const TABLE: u64 = 1 << 1;
    pub const BLOCK: u64 = VALID;

    pub const AF: u64 = 1 << 10;

    pub const S2AP_RW: u64 = 0b11 << 6;

    pub const XN_NONE: u64 = 0b00 << 53;
    pub const XN_ALL: u64 = 0b10 << 53;

    pub const MEMATTR_DEVICE: u64 = 0b0000 << 2;
    pub const MEMATTR_NORMAL_WB: u64 = 0b1111 << 2;

    pub const SH_INNER: u64 = 0b11 << 8;
    pub const SH_NONE: u64 = 0b00 << 8;

    pub const ADDR_MASK: u64 = 0x0000_FFFF_FFFF_F000;
}

/// Backing storage for table pages.
///
/// On real hardware a table "address" from `page_alloc` is a genuine
/// physical (== virtual, per the identity-mapping convention) pointer and
/// reads/writes go straight through it. Host test builds get fake
/// addresses from the bitmap frame allocator that aren't backed by real
/// memory, so table content there lives in an address-keyed map instead.
#[cfg(target_arch = "aarch64")]
mod table_mem {
    pub fn install(_addr: u64, _words: usize) {}

    pub fn read(addr: u64, idx: usize) -> u64 {
        unsafe { (addr as *const u64).add(idx).read_volatile() }
    }

    pub fn write(addr: u64, idx: usize, val: u64) {
        unsafe { (addr as *mut u64).add(idx).write_volatile(val) }
    }
}

#[cfg(not(target_arch = "aarch64"))]
mod table_mem {
    use alloc::collections::BTreeMap;
    use alloc::vec::Vec;
    use spin::Mutex;

    static STORE: Mutex<BTreeMap<u64, Vec<u64>>> = Mutex::new(BTreeMap::new());

    pub fn install(addr: u64, words: usize) {
        STORE.lock().insert(addr, alloc::vec![0u64; words]);
    }

    pub fn read(addr: u64, idx: usize) -> u64 {
        STORE.lock().get(&addr).map(|v| v[idx]).unwrap_or(0)
    }

    pub fn write(addr: u64, idx: usize, val: u64) {
        if let Some(v) = STORE.lock().get_mut(&addr) {
            v[idx] = val;
        }
    }
}

fn build_descriptor_attrs(kind: RegionType) -> u64 {
    let mem = match kind {
        RegionType::Io => desc::MEMATTR_DEVICE | desc::SH_NONE,
        RegionType::Normal | RegionType::Shared => desc::MEMATTR_NORMAL_WB | desc::SH_INNER,
    };
    let xn = match kind {
        RegionType::Io => desc::XN_ALL,
        RegionType::Normal | RegionType::Shared => desc::XN_NONE,
    };
    desc::AF | desc::S2AP_RW | xn | mem
}

/// One VM's (or the host's) two-level stage-2 table set.
pub struct Stage2Table {
    l1_addr: u64,
    l1_entries: usize,
    granule: GranuleConfig,
    l2_tables_allocated: usize,
    /// `(base, pages)` for the L1 table and every L2 table allocated so
    /// far — what `release_vm_memory` walks to free the page-table pages
    /// themselves, separately from the mapped guest RAM blocks.
    table_pages: Vec<(u64, usize)>,
}

unsafe impl Send for Stage2Table {}
unsafe impl Sync for Stage2Table {}

impl Stage2Table {
    /// Allocate and zero a top-level table sized to cover
    /// `CONFIG_MAX_PHYSICAL_SIZE`.
    pub fn new() -> Result<Self> {
        let granule = active_granule_config();
        let l1_pages = granule.l1_table_pages() as usize;
        let l1_addr = page_alloc::alloc_pages(l1_pages).ok_or(HvError::Enomem)?;
        let l1_entries = (l1_pages * crate::config::PAGE_SIZE as usize) / 8;
        table_mem::install(l1_addr, l1_entries);
        Ok(Stage2Table {
            l1_addr,
            l1_entries,
            granule,
            l2_tables_allocated: 0,
            table_pages: alloc::vec![(l1_addr, l1_pages)],
        })
    }

    pub fn vttbr(&self, vmid: u16) -> u64 {
        ((vmid as u64) << 48) | (self.l1_addr & desc::ADDR_MASK)
    }

    fn l1_index(&self, ipa: u64) -> usize {
        (ipa / self.granule.l1_span) as usize
    }

    fn l2_index(&self, ipa: u64) -> usize {
        ((ipa % self.granule.l1_span) / self.granule.l2_block_size) as usize
    }

    fn l2_words(&self) -> usize {
        (self.granule.l2_table_pages * crate::config::PAGE_SIZE / 8) as usize
    }

    /// Fetch (allocating if absent) the level-2 table address for `l1_idx`.
    fn get_or_create_l2(&mut self, l1_idx: usize) -> Result<u64> {
        if l1_idx >= self.l1_entries {
            return Err(HvError::Einval);
        }
        let entry = table_mem::read(self.l1_addr, l1_idx);
        if entry & desc::VALID != 0 && entry & desc::TABLE != 0 {
            return Ok(entry & desc::ADDR_MASK);
        }
        let l2_pages = self.granule.l2_table_pages as usize;
        let l2_addr = page_alloc::alloc_pages(l2_pages).ok_or(HvError::Enomem)?;
        table_mem::install(l2_addr, self.l2_words());
        self.l2_tables_allocated += 1;
        self.table_pages.push((l2_addr, l2_pages));
        let table_entry = (l2_addr & desc::ADDR_MASK) | desc::VALID | desc::TABLE;
        table_mem::write(self.l1_addr, l1_idx, table_entry);
        Ok(l2_addr)
    }

    /// Install BLOCK descriptors for `[base, base+size)`, rounded out to
    /// the L2 block size, reusing any already-populated L1 slot.
    pub fn map_region(&mut self, base: u64, size: u64, kind: RegionType) -> Result<()> {
        if size == 0 {
            return Err(HvError::Einval);
        }
        let attrs = build_descriptor_attrs(kind);
        let start = self.granule.align_down(base);
        let end = self.granule.align_up(base + size);

        let mut ipa = start;
        while ipa < end {
            let l1_idx = self.l1_index(ipa);
            let slot_end = ((l1_idx as u64) + 1) * self.granule.l1_span;
            let chunk_end = slot_end.min(end);

            let l2_addr = self.get_or_create_l2(l1_idx)?;

            let mut block = ipa;
            while block < chunk_end {
                let l2_idx = self.l2_index(block);
                let descriptor = (block & desc::ADDR_MASK) | attrs | desc::BLOCK;
                table_mem::write(l2_addr, l2_idx, descriptor);
                block += self.granule.l2_block_size;

                #[cfg(feature = "mmu-trace")]
                crate::log!("stage2: map ipa={:#x} l1={} l2={}", block, l1_idx, l2_idx);
            }

            ipa = chunk_end;
        }
        Ok(())
    }

    /// Apply `map_region` for every region in `regions`.
    pub fn map_vm_regions(&mut self, regions: &[MemRegion]) -> Result<()> {
        if regions.is_empty() {
            return Err(HvError::Einval);
        }
        for region in regions {
            self.map_region(region.phy_base, region.size, region.kind)?;
        }
        Ok(())
    }

    /// Look up the raw L2 descriptor covering `ipa` (0 if the L1 slot
    /// isn't populated).
    pub fn l2_entry_for_ipa(&self, ipa: u64) -> u64 {
        let l1_idx = self.l1_index(ipa);
        if l1_idx >= self.l1_entries {
            return 0;
        }
        let entry = table_mem::read(self.l1_addr, l1_idx);
        if entry & desc::VALID == 0 || entry & desc::TABLE == 0 {
            return 0;
        }
        let l2_addr = entry & desc::ADDR_MASK;
        table_mem::read(l2_addr, self.l2_index(ipa))
    }

    pub fn l2_tables_allocated(&self) -> usize {
        self.l2_tables_allocated
    }

    /// `(base, pages)` for the L1 table and every L2 table backing it —
    /// what `release_vm_memory` frees once the VM is torn down.
    pub fn table_pages(&self) -> &[(u64, usize)] {
        &self.table_pages
    }

    pub fn flush_tlb(&self) {
        #[cfg(target_arch = "aarch64")]
        unsafe {
            core::arch::asm!("dsb ishst", "tlbi vmalls12e1is", "dsb ish", "isb", options(nomem, nostack));
        }
    }
}

/// Allocate a top-level table and map every region in `regions`.
pub fn alloc_and_map_vm(regions: &[MemRegion]) -> Result<Stage2Table> {
    let mut table = Stage2Table::new()?;
    table.map_vm_regions(regions)?;
    Ok(table)
}

/// Build the hypervisor's own table mapping every NORMAL region across
/// every VM, used for host-side access to guest memory.
pub fn build_host_table(all_vm_regions: &[Vec<MemRegion>]) -> Result<Stage2Table> {
    let mut table = Stage2Table::new()?;
    for regions in all_vm_regions {
        for region in regions {
            if region.kind == RegionType::Normal {
                table.map_region(region.phy_base, region.size, RegionType::Normal)?;
            }
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::frame;

    // Stage-2 tables are backed by the process-wide frame allocator;
    // serialize tests that re-initialize it.
    static TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn reset_frames() {
        let region = frame::PhysRegion { base: 0x4000_0000, length: 4096 * 4096 };
        frame::init(&[region], 0, 0);
    }

    #[test]
    fn identity_mapped_block_has_expected_attrs() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_frames();
        let mut table = Stage2Table::new().unwrap();
        table.map_region(0x8000_0000, 0x0010_0000, RegionType::Normal).unwrap();
        let entry = table.l2_entry_for_ipa(0x8000_0000);
        assert_ne!(entry, 0);
        assert_eq!(entry & desc::ADDR_MASK, 0x8000_0000);
        assert_eq!(entry & desc::S2AP_RW, desc::S2AP_RW);
        assert_eq!(entry & (0b1111 << 2), desc::MEMATTR_NORMAL_WB);
    }

    #[test]
    fn io_region_gets_device_memattr() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_frames();
        let mut table = Stage2Table::new().unwrap();
        table.map_region(0x0900_0000, 0x1000, RegionType::Io).unwrap();
        let entry = table.l2_entry_for_ipa(0x0900_0000);
        assert_ne!(entry, 0);
        assert_eq!(entry & (0b1111 << 2), desc::MEMATTR_DEVICE);
    }

    #[test]
    fn repeated_map_into_same_l1_slot_allocates_l2_once() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_frames();
        let mut table = Stage2Table::new().unwrap();
        table.map_region(0x8000_0000, 0x0010_0000, RegionType::Normal).unwrap();
        let after_first = table.l2_tables_allocated();
        table.map_region(0x8010_0000, 0x0010_0000, RegionType::Normal).unwrap();
        assert_eq!(table.l2_tables_allocated(), after_first);
    }

    #[test]
    fn map_vm_regions_rejects_empty_list() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_frames();
        let mut table = Stage2Table::new().unwrap();
        assert_eq!(table.map_vm_regions(&[]), Err(HvError::Einval));
    }

    #[test]
    fn scenario_two_region_layout() {
        let _guard = TEST_LOCK.lock().unwrap();
        reset_frames();
        let regions = [
            MemRegion { phy_base: 0x8000_0000, vir_base: 0x8000_0000, size: 0x0800_0000, kind: RegionType::Normal, vmid: 1 },
            MemRegion { phy_base: 0x0900_0000, vir_base: 0x0900_0000, size: 0x1000, kind: RegionType::Io, vmid: 1 },
        ];
        let table = alloc_and_map_vm(&regions).unwrap();
        let ram_entry = table.l2_entry_for_ipa(0x8000_0000);
        assert_eq!(ram_entry & desc::ADDR_MASK, 0x8000_0000);
        assert_eq!(ram_entry & (0b1111 << 2), desc::MEMATTR_NORMAL_WB);
        let io_entry = table.l2_entry_for_ipa(0x0900_0000);
        assert_eq!(io_entry & (0b1111 << 2), desc::MEMATTR_DEVICE);
    }
}

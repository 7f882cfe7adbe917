//! Platform and granule configuration.
//!
//! Per the design notes, granule-dependent constants live in one immutable
//! value computed at init from the compile-time feature selection, rather
//! than scattered `cfg!` checks through the MMU. The feature flags
//! (`granule_4k`/`granule_16k`/`granule_64k`) are the only compile-time
//! knob; everything derived from the chosen granule is a runtime value.

/// Architectural constants fixed by the platform.
pub const CONFIG_NR_CPUS: usize = 8;
pub const CONFIG_MAX_PHYSICAL_SIZE: u64 = 64 * 1024 * 1024 * 1024; // 64 GiB
pub const CONFIG_VCPU_MAX_ACTIVE_IRQS: usize = 16;
pub const VCPU_MAX_LOCAL_IRQS: usize = 32;
pub const VIRQ_BASE: u32 = 1024;
pub const MAX_VIRQ_NR: usize = 512;

/// Page size used uniformly for page-table pages and the page allocator
/// facade; independent of the stage-2 block granule.
pub const PAGE_SIZE: u64 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granule {
    K4,
    K16,
    K64,
}

/// Immutable, granule-derived sizing for the two-level stage-2 scheme.
///
/// `l2_block_size` is the span of one level-2 BLOCK descriptor; `l1_span`
/// is the IPA range covered by one level-1 slot (and hence by one level-2
/// table); `l2_table_pages` is the number of `PAGE_SIZE` pages needed to
/// back one level-2 table's worth of entries at this granule.
#[derive(Debug, Clone, Copy)]
pub struct GranuleConfig {
    pub granule: Granule,
    pub l2_block_size: u64,
    pub l1_span: u64,
    pub l2_table_pages: u64,
    pub l1_index_bits: u32,
    pub l2_index_bits: u32,
}

impl GranuleConfig {
    pub const fn for_granule(granule: Granule) -> Self {
        match granule {
            Granule::K4 => GranuleConfig {
                granule,
                l2_block_size: 2 * 1024 * 1024,
                l1_span: 1024 * 1024 * 1024,
                l2_table_pages: 1,
                l1_index_bits: 9,
                l2_index_bits: 9,
            },
            Granule::K16 => GranuleConfig {
                granule,
                l2_block_size: 16 * 1024,
                l1_span: 32 * 1024 * 1024,
                l2_table_pages: 4,
                l1_index_bits: 11,
                l2_index_bits: 11,
            },
            Granule::K64 => GranuleConfig {
                granule,
                l2_block_size: 64 * 1024,
                l1_span: 512 * 1024 * 1024,
                l2_table_pages: 16,
                l1_index_bits: 13,
                l2_index_bits: 13,
            },
        }
    }

    /// Number of level-1 table pages needed to cover `CONFIG_MAX_PHYSICAL_SIZE`.
    pub fn l1_table_pages(&self) -> u64 {
        let span = CONFIG_MAX_PHYSICAL_SIZE.div_ceil(self.l1_span);
        let word_size = 8u64;
        (span * word_size).div_ceil(PAGE_SIZE)
    }

    #[inline]
    pub fn align_down(&self, addr: u64) -> u64 {
        addr & !(self.l2_block_size - 1)
    }

    #[inline]
    pub fn align_up(&self, addr: u64) -> u64 {
        (addr + self.l2_block_size - 1) & !(self.l2_block_size - 1)
    }
}

#[cfg(all(feature = "granule_4k", not(any(feature = "granule_16k", feature = "granule_64k"))))]
pub const ACTIVE_GRANULE: Granule = Granule::K4;
#[cfg(all(feature = "granule_16k", not(any(feature = "granule_4k", feature = "granule_64k"))))]
pub const ACTIVE_GRANULE: Granule = Granule::K16;
#[cfg(all(feature = "granule_64k", not(any(feature = "granule_4k", feature = "granule_16k"))))]
pub const ACTIVE_GRANULE: Granule = Granule::K64;

/// The kernel's single granule configuration, fixed for the binary's lifetime.
pub fn active_granule_config() -> GranuleConfig {
    GranuleConfig::for_granule(ACTIVE_GRANULE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l1_table_pages_nonzero_for_all_granules() {
        for g in [Granule::K4, Granule::K16, Granule::K64] {
            let cfg = GranuleConfig::for_granule(g);
            assert!(cfg.l1_table_pages() > 0);
        }
    }

    #[test]
    fn align_down_up_bracket_the_address() {
        let cfg = GranuleConfig::for_granule(Granule::K4);
        let addr = 0x8000_1234u64;
        assert!(cfg.align_down(addr) <= addr);
        assert!(cfg.align_up(addr) >= addr);
        assert_eq!(cfg.align_down(addr) % cfg.l2_block_size, 0);
        assert_eq!(cfg.align_up(addr) % cfg.l2_block_size, 0);
    }
}

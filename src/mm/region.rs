//! Memory-region registry.
//!
//! Tracks the physical regions declared by the external device-tree
//! collaborator (`crate::dtree`) and which VM, if any, owns each one.
//! Regions are created once at bring-up and never destroyed — there is no
//! `unregister`, matching the invariant in the data model.

use alloc::vec::Vec;
use spin::Mutex;

use crate::error::{HvError, Result};

pub const VMID_HOST: u32 = 0;
pub const VMID_ANY: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionType {
    Normal,
    Io,
    Shared,
}

#[derive(Debug, Clone, Copy)]
pub struct MemRegion {
    pub phy_base: u64,
    pub vir_base: u64,
    pub size: u64,
    pub kind: RegionType,
    pub vmid: u32,
}

impl MemRegion {
    pub fn validate(&self, block_size: u64) -> Result<()> {
        if self.size == 0 {
            return Err(HvError::Einval);
        }
        if self.phy_base % block_size != 0 || self.vir_base % block_size != 0 {
            return Err(HvError::Einval);
        }
        Ok(())
    }
}

/// Global, process-wide region registry. Initialized once during early
/// bring-up per the design notes — wrapped with explicit `init`, not a
/// bare file-scope static consumed directly.
pub struct RegionRegistry {
    shared: Vec<MemRegion>,
    by_vm: Vec<(u32, Vec<MemRegion>)>,
}

impl RegionRegistry {
    const fn new() -> Self {
        RegionRegistry { shared: Vec::new(), by_vm: Vec::new() }
    }

    pub fn register(&mut self, region: MemRegion) -> Result<()> {
        region.validate(crate::config::active_granule_config().l2_block_size)?;
        if region.kind == RegionType::Shared || region.vmid == VMID_ANY {
            self.shared.push(region);
            return Ok(());
        }
        if let Some((_, list)) = self.by_vm.iter_mut().find(|(id, _)| *id == region.vmid) {
            list.push(region);
        } else {
            self.by_vm.push((region.vmid, alloc::vec![region]));
        }
        Ok(())
    }

    /// All regions a VM should have mapped: its own regions plus every
    /// shared region.
    pub fn regions_for_vm(&self, vmid: u32) -> Vec<MemRegion> {
        let mut out = self.shared.clone();
        if let Some((_, list)) = self.by_vm.iter().find(|(id, _)| *id == vmid) {
            out.extend_from_slice(list);
        }
        out
    }
}

static REGISTRY: Mutex<RegionRegistry> = Mutex::new(RegionRegistry::new());

pub fn init() {
    *REGISTRY.lock() = RegionRegistry::new();
}

pub fn register(region: MemRegion) -> Result<()> {
    REGISTRY.lock().register(region)
}

pub fn regions_for_vm(vmid: u32) -> Vec<MemRegion> {
    REGISTRY.lock().regions_for_vm(vmid)
}

/// Consume every enabled, non-host tag from the device-tree collaborator
/// and register it. Tags with `vmid == VMID_HOST` are not registered as
/// guest regions, matching the external-interfaces contract.
pub fn bring_up(source: &dyn crate::dtree::MemoryRegionSource) -> usize {
    let mut registered = 0;
    for tag in source.tags() {
        if !tag.enable || tag.vmid == VMID_HOST {
            continue;
        }
        let region = MemRegion {
            phy_base: tag.mem_base,
            vir_base: tag.mem_base,
            size: tag.mem_end - tag.mem_base,
            kind: tag.kind,
            vmid: tag.vmid,
        };
        if register(region).is_ok() {
            registered += 1;
        }
    }
    registered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_region_is_visible_to_every_vm() {
        init();
        register(MemRegion {
            phy_base: 0x4000_0000,
            vir_base: 0x4000_0000,
            size: 0x2_0000,
            kind: RegionType::Shared,
            vmid: VMID_ANY,
        })
        .unwrap();
        assert_eq!(regions_for_vm(1).len(), 1);
        assert_eq!(regions_for_vm(2).len(), 1);
    }

    #[test]
    fn host_tagged_region_is_never_registered() {
        init();
        struct Fake;
        impl crate::dtree::MemoryRegionSource for Fake {
            fn tags(&self) -> Vec<crate::dtree::RegionTag> {
                alloc::vec![crate::dtree::RegionTag {
                    name: "host-ram",
                    mem_base: 0x4000_0000,
                    mem_end: 0x4010_0000,
                    kind: RegionType::Normal,
                    vmid: VMID_HOST,
                    enable: true,
                }]
            }
        }
        let n = bring_up(&Fake);
        assert_eq!(n, 0);
    }

    #[test]
    fn disabled_tag_is_skipped() {
        init();
        struct Fake;
        impl crate::dtree::MemoryRegionSource for Fake {
            fn tags(&self) -> Vec<crate::dtree::RegionTag> {
                alloc::vec![crate::dtree::RegionTag {
                    name: "disabled",
                    mem_base: 0x8000_0000,
                    mem_end: 0x8010_0000,
                    kind: RegionType::Normal,
                    vmid: 1,
                    enable: false,
                }]
            }
        }
        let n = bring_up(&Fake);
        assert_eq!(n, 0);
        assert_eq!(regions_for_vm(1).len(), 0);
    }
}

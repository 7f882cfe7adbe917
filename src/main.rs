//! Boot entry point for the ARMv8-A type-1 hypervisor core.
//!
//! Brings up, in order: the serial console, the physical memory and
//! heap, the device-tree memory-region registry, one stage-2 table per
//! VM (plus the host's own), the virtual GIC, and the cooperative
//! scheduler — then drops into the idle loop. `#[cfg(test)]` lifts the
//! `no_std`/`no_main` attributes so every module's unit tests build and
//! run as ordinary host binaries.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]

extern crate alloc;

pub mod arch;
pub mod config;
pub mod cpumask;
pub mod dtree;
pub mod error;
pub mod gic;
pub mod logger;
pub mod memory;
pub mod mm;
pub mod regs;
pub mod scheduler;
pub mod serial;
pub mod sync;
pub mod time;

use dtree::{RegionTag, StaticSource};
use gic::chip::IrqChip;
use gic::driver::GicV3Driver;
use gic::vgic::VirtualGic;
use mm::region::{RegionType, VMID_HOST};
use mm::vm_mm::VmMm;

/// PL011 UART base on QEMU's `virt` machine.
const UART_BASE: u64 = 0x0900_0000;
/// GICv3 distributor base on QEMU's `virt` machine.
const GICD_BASE: u64 = 0x0800_0000;

/// Bring-up fixture until a real flattened-device-tree parser lands:
/// one guest VM with a RAM carve-out and a shared MMIO window.
static BOOT_TAGS: [RegionTag; 2] = [
    RegionTag {
        name: "vm1-ram",
        mem_base: 0x4000_0000,
        mem_end: 0x4400_0000,
        kind: RegionType::Normal,
        vmid: 1,
        enable: true,
    },
    RegionTag {
        name: "shared-mmio",
        mem_base: 0x0a00_0000,
        mem_end: 0x0a00_1000,
        kind: RegionType::Io,
        vmid: mm::region::VMID_ANY,
        enable: true,
    },
];

/// Everything the idle loop needs to keep running after bring-up.
struct Core {
    chip: GicV3Driver,
    vgic: VirtualGic,
    vm1: VmMm,
}

fn boot() -> Core {
    serial::set_base(UART_BASE);
    serial::init();

    log!("armhv_kernel boot ({})", option_env!("ARMHV_BUILD_TIME").unwrap_or("unknown"));
    log!("granule: {:?}", config::ACTIVE_GRANULE);

    time::init();

    // Physical memory: a fixed RAM top until the real device-tree parser
    // reports it; a 128 MiB reservation up front covers the kernel image,
    // stacks and heap before the frame allocator's usable span begins.
    let total_ram = 512u64 * 1024 * 1024;
    memory::set_total_physical_memory(total_ram);
    let heap_size = memory::compute_heap_size(total_ram);
    let heap_base = 0x4800_0000u64;
    let usable = [memory::frame::PhysRegion { base: heap_base + heap_size as u64, length: total_ram / 2 }];
    memory::init(heap_base, heap_size, &usable);

    mm::region::init();
    let source = StaticSource(&BOOT_TAGS);
    let registered = mm::region::bring_up(&source);
    log!("region registry: {registered} tag(s) registered");

    let host_regions = mm::region::regions_for_vm(VMID_HOST);
    let vm1_regions = mm::region::regions_for_vm(1);

    let host_table = mm::stage2::build_host_table(&[host_regions, vm1_regions.clone()])
        .expect("host stage-2 table build failed");
    log!("host stage-2 table: {} L2 table(s)", host_table.l2_tables_allocated());

    let vm1 = VmMm::create(&vm1_regions).expect("vm1 stage-2 mapping failed");
    log!("vm1 mm ready: {} bytes free, vttbr={:#x}", vm1.mem_free(), vm1.vttbr(1));

    let chip = GicV3Driver::new(GICD_BASE);
    chip.init();
    chip.secondary_init();

    let vgic = VirtualGic::new();
    vgic.init();
    log!("vgic ready: {} list register(s)", vgic.num_list_registers());

    scheduler::init();

    Core { chip, vgic, vm1 }
}

fn idle(core: &Core) -> ! {
    loop {
        scheduler::yield_now();
        let _ = &core.chip;
        let _ = &core.vgic;
        let _ = &core.vm1;
        arch::halt();
    }
}

#[cfg(all(not(test), target_arch = "aarch64"))]
#[no_mangle]
pub extern "C" fn _start() -> ! {
    arch::aarch64::boot::early_init();
    let core = boot();
    idle(&core)
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    log_error!("panic: {info}");
    arch::halt_loop()
}

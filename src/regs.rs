//! Low-level register accessors: the external boundary for architectural
//! system registers and MMIO. The MMU and VGIC cores call only through
//! here; this module owns every raw `asm!` in those subsystems' critical
//! path so the rest of the tree stays architecture-neutral at the type
//! level even though it runs only on aarch64.

#[cfg(target_arch = "aarch64")]
pub use aarch64_impl::*;

#[cfg(target_arch = "aarch64")]
mod aarch64_impl {
    /// Read a 32-bit value from an MMIO address.
    #[inline(always)]
    pub unsafe fn ioread32(addr: u64) -> u32 {
        crate::arch::aarch64::cpu::mmio_read32(addr)
    }

    /// Write a 32-bit value to an MMIO address.
    #[inline(always)]
    pub unsafe fn iowrite32(addr: u64, val: u32) {
        crate::arch::aarch64::cpu::mmio_write32(addr, val)
    }

    /// Write an 8-bit value to an MMIO address.
    #[inline(always)]
    pub unsafe fn iowrite8(addr: u64, val: u8) {
        crate::arch::aarch64::cpu::mmio_write8(addr, val)
    }

    /// Write a 64-bit value to an MMIO address.
    #[inline(always)]
    pub unsafe fn iowrite64(addr: u64, val: u64) {
        core::arch::asm!(
            "str {val}, [{addr}]",
            addr = in(reg) addr,
            val = in(reg) val,
            options(nostack, preserves_flags)
        );
    }

    /// Read `ICH_VTR_EL2`: bits [4:0] give (N-1) list registers, bits
    /// [28:26] give (M-1) priority bits used to derive the AP register count.
    #[inline(always)]
    pub fn read_ich_vtr_el2() -> u64 {
        let val: u64;
        unsafe {
            core::arch::asm!("mrs {v}, ich_vtr_el2", v = out(reg) val, options(nomem, nostack));
        }
        val
    }

    #[inline(always)]
    pub fn read_ich_lr(idx: usize) -> u64 {
        let val: u64;
        unsafe {
            match idx {
                0 => core::arch::asm!("mrs {v}, ich_lr0_el2", v = out(reg) val, options(nomem, nostack)),
                1 => core::arch::asm!("mrs {v}, ich_lr1_el2", v = out(reg) val, options(nomem, nostack)),
                2 => core::arch::asm!("mrs {v}, ich_lr2_el2", v = out(reg) val, options(nomem, nostack)),
                3 => core::arch::asm!("mrs {v}, ich_lr3_el2", v = out(reg) val, options(nomem, nostack)),
                4 => core::arch::asm!("mrs {v}, ich_lr4_el2", v = out(reg) val, options(nomem, nostack)),
                5 => core::arch::asm!("mrs {v}, ich_lr5_el2", v = out(reg) val, options(nomem, nostack)),
                6 => core::arch::asm!("mrs {v}, ich_lr6_el2", v = out(reg) val, options(nomem, nostack)),
                7 => core::arch::asm!("mrs {v}, ich_lr7_el2", v = out(reg) val, options(nomem, nostack)),
                8 => core::arch::asm!("mrs {v}, ich_lr8_el2", v = out(reg) val, options(nomem, nostack)),
                9 => core::arch::asm!("mrs {v}, ich_lr9_el2", v = out(reg) val, options(nomem, nostack)),
                10 => core::arch::asm!("mrs {v}, ich_lr10_el2", v = out(reg) val, options(nomem, nostack)),
                11 => core::arch::asm!("mrs {v}, ich_lr11_el2", v = out(reg) val, options(nomem, nostack)),
                12 => core::arch::asm!("mrs {v}, ich_lr12_el2", v = out(reg) val, options(nomem, nostack)),
                13 => core::arch::asm!("mrs {v}, ich_lr13_el2", v = out(reg) val, options(nomem, nostack)),
                14 => core::arch::asm!("mrs {v}, ich_lr14_el2", v = out(reg) val, options(nomem, nostack)),
                15 => core::arch::asm!("mrs {v}, ich_lr15_el2", v = out(reg) val, options(nomem, nostack)),
                _ => panic!("list register index {idx} out of range"),
            }
        }
        val
    }

    #[inline(always)]
    pub fn write_ich_lr(idx: usize, val: u64) {
        unsafe {
            match idx {
                0 => core::arch::asm!("msr ich_lr0_el2, {v}", v = in(reg) val, options(nomem, nostack)),
                1 => core::arch::asm!("msr ich_lr1_el2, {v}", v = in(reg) val, options(nomem, nostack)),
                2 => core::arch::asm!("msr ich_lr2_el2, {v}", v = in(reg) val, options(nomem, nostack)),
                3 => core::arch::asm!("msr ich_lr3_el2, {v}", v = in(reg) val, options(nomem, nostack)),
                4 => core::arch::asm!("msr ich_lr4_el2, {v}", v = in(reg) val, options(nomem, nostack)),
                5 => core::arch::asm!("msr ich_lr5_el2, {v}", v = in(reg) val, options(nomem, nostack)),
                6 => core::arch::asm!("msr ich_lr6_el2, {v}", v = in(reg) val, options(nomem, nostack)),
                7 => core::arch::asm!("msr ich_lr7_el2, {v}", v = in(reg) val, options(nomem, nostack)),
                8 => core::arch::asm!("msr ich_lr8_el2, {v}", v = in(reg) val, options(nomem, nostack)),
                9 => core::arch::asm!("msr ich_lr9_el2, {v}", v = in(reg) val, options(nomem, nostack)),
                10 => core::arch::asm!("msr ich_lr10_el2, {v}", v = in(reg) val, options(nomem, nostack)),
                11 => core::arch::asm!("msr ich_lr11_el2, {v}", v = in(reg) val, options(nomem, nostack)),
                12 => core::arch::asm!("msr ich_lr12_el2, {v}", v = in(reg) val, options(nomem, nostack)),
                13 => core::arch::asm!("msr ich_lr13_el2, {v}", v = in(reg) val, options(nomem, nostack)),
                14 => core::arch::asm!("msr ich_lr14_el2, {v}", v = in(reg) val, options(nomem, nostack)),
                15 => core::arch::asm!("msr ich_lr15_el2, {v}", v = in(reg) val, options(nomem, nostack)),
                _ => panic!("list register index {idx} out of range"),
            }
        }
    }

    #[inline(always)]
    pub fn read_ich_hcr_el2() -> u64 {
        let val: u64;
        unsafe { core::arch::asm!("mrs {v}, ich_hcr_el2", v = out(reg) val, options(nomem, nostack)) };
        val
    }

    #[inline(always)]
    pub fn write_ich_hcr_el2(val: u64) {
        unsafe {
            core::arch::asm!("msr ich_hcr_el2, {v}", "isb", v = in(reg) val, options(nomem, nostack));
        }
    }

    #[inline(always)]
    pub fn read_ich_vmcr_el2() -> u64 {
        let val: u64;
        unsafe { core::arch::asm!("mrs {v}, ich_vmcr_el2", v = out(reg) val, options(nomem, nostack)) };
        val
    }

    #[inline(always)]
    pub fn write_ich_vmcr_el2(val: u64) {
        unsafe {
            core::arch::asm!("msr ich_vmcr_el2, {v}", "isb", v = in(reg) val, options(nomem, nostack));
        }
    }

    #[inline(always)]
    pub fn read_ich_ap0r(idx: usize) -> u32 {
        let val: u64;
        unsafe {
            match idx {
                0 => core::arch::asm!("mrs {v}, ich_ap0r0_el2", v = out(reg) val, options(nomem, nostack)),
                1 => core::arch::asm!("mrs {v}, ich_ap0r1_el2", v = out(reg) val, options(nomem, nostack)),
                2 => core::arch::asm!("mrs {v}, ich_ap0r2_el2", v = out(reg) val, options(nomem, nostack)),
                3 => core::arch::asm!("mrs {v}, ich_ap0r3_el2", v = out(reg) val, options(nomem, nostack)),
                _ => panic!("AP0R index {idx} out of range"),
            }
        }
        val as u32
    }

    #[inline(always)]
    pub fn write_ich_ap0r(idx: usize, val: u32) {
        let val = val as u64;
        unsafe {
            match idx {
                0 => core::arch::asm!("msr ich_ap0r0_el2, {v}", v = in(reg) val, options(nomem, nostack)),
                1 => core::arch::asm!("msr ich_ap0r1_el2, {v}", v = in(reg) val, options(nomem, nostack)),
                2 => core::arch::asm!("msr ich_ap0r2_el2, {v}", v = in(reg) val, options(nomem, nostack)),
                3 => core::arch::asm!("msr ich_ap0r3_el2, {v}", v = in(reg) val, options(nomem, nostack)),
                _ => panic!("AP0R index {idx} out of range"),
            }
        }
    }

    #[inline(always)]
    pub fn read_icc_sre_el2() -> u64 {
        let val: u64;
        unsafe { core::arch::asm!("mrs {v}, icc_sre_el2", v = out(reg) val, options(nomem, nostack)) };
        val
    }

    #[inline(always)]
    pub fn write_icc_sre_el2(val: u64) {
        unsafe {
            core::arch::asm!("msr icc_sre_el2, {v}", "isb", v = in(reg) val, options(nomem, nostack));
        }
    }

    #[inline(always)]
    pub fn read_icc_iar1_el1() -> u32 {
        let val: u64;
        unsafe { core::arch::asm!("mrs {v}, icc_iar1_el1", v = out(reg) val, options(nomem, nostack)) };
        val as u32
    }

    #[inline(always)]
    pub fn write_icc_eoir1_el1(irq: u32) {
        unsafe {
            core::arch::asm!("msr icc_eoir1_el1, {v}", "isb", v = in(reg) irq as u64, options(nomem, nostack));
        }
    }

    #[inline(always)]
    pub fn write_icc_dir_el1(irq: u32) {
        unsafe {
            core::arch::asm!("msr icc_dir_el1, {v}", "isb", v = in(reg) irq as u64, options(nomem, nostack));
        }
    }

    #[inline(always)]
    pub fn write_icc_sgi1r_el1(val: u64) {
        unsafe {
            core::arch::asm!("msr icc_sgi1r_el1, {v}", "isb", v = in(reg) val, options(nomem, nostack));
        }
    }

    #[inline(always)]
    pub fn read_hcr_el2() -> u64 {
        let val: u64;
        unsafe { core::arch::asm!("mrs {v}, hcr_el2", v = out(reg) val, options(nomem, nostack)) };
        val
    }

    #[inline(always)]
    pub fn write_hcr_el2(val: u64) {
        unsafe {
            core::arch::asm!("msr hcr_el2, {v}", "isb", v = in(reg) val, options(nomem, nostack));
        }
    }

    #[inline(always)]
    pub fn read_id_aa64mmfr0_el1() -> u64 {
        let val: u64;
        unsafe { core::arch::asm!("mrs {v}, id_aa64mmfr0_el1", v = out(reg) val, options(nomem, nostack)) };
        val
    }
}

#[cfg(not(target_arch = "aarch64"))]
pub use host_impl::*;

/// Host-target (test-only) fakes: a plain register file backing the same
/// signatures, so the MMU/VGIC core can be exercised with `cargo test` on
/// the development machine without touching real hardware.
#[cfg(not(target_arch = "aarch64"))]
pub mod host_impl {
    use core::sync::atomic::{AtomicU64, Ordering};

    pub unsafe fn ioread32(addr: u64) -> u32 {
        unsafe { (addr as *const u32).read_volatile() }
    }

    pub unsafe fn iowrite32(addr: u64, val: u32) {
        unsafe { (addr as *mut u32).write_volatile(val) }
    }

    pub unsafe fn iowrite8(addr: u64, val: u8) {
        unsafe { (addr as *mut u8).write_volatile(val) }
    }

    pub unsafe fn iowrite64(addr: u64, val: u64) {
        unsafe { (addr as *mut u64).write_volatile(val) }
    }

    const MAX_LR: usize = 16;
    static LR_FILE: [AtomicU64; MAX_LR] = [const { AtomicU64::new(0) }; MAX_LR];
    static VTR: AtomicU64 = AtomicU64::new(0x0000_0000_0000_030F); // N=16, M=7 fake
    static HCR: AtomicU64 = AtomicU64::new(0);
    static VMCR: AtomicU64 = AtomicU64::new(0);
    static AP0R: [AtomicU64; 4] = [const { AtomicU64::new(0) }; 4];
    static SRE: AtomicU64 = AtomicU64::new(0);

    pub fn read_ich_vtr_el2() -> u64 {
        VTR.load(Ordering::Relaxed)
    }

    /// Test hook: configure the fake LR/AP-register count.
    pub fn set_ich_vtr_el2(nr_lr_minus_1: u64, nr_pr_minus_1: u64) {
        VTR.store((nr_lr_minus_1 & 0x1F) | ((nr_pr_minus_1 & 0x7) << 26), Ordering::Relaxed);
    }

    /// Test hook: clear every fake GIC register back to its power-on
    /// value. The fake register file is process-wide, so tests that poke
    /// it must reset it under their own serialization lock first.
    #[cfg(test)]
    pub fn reset_fake_gic_regs() {
        for lr in LR_FILE.iter() {
            lr.store(0, Ordering::Relaxed);
        }
        VTR.store(0x0000_0000_0000_030F, Ordering::Relaxed);
        HCR.store(0, Ordering::Relaxed);
        VMCR.store(0, Ordering::Relaxed);
        for ap in AP0R.iter() {
            ap.store(0, Ordering::Relaxed);
        }
        SRE.store(0, Ordering::Relaxed);
    }

    pub fn read_ich_lr(idx: usize) -> u64 {
        LR_FILE[idx].load(Ordering::Relaxed)
    }

    pub fn write_ich_lr(idx: usize, val: u64) {
        LR_FILE[idx].store(val, Ordering::Relaxed);
    }

    pub fn read_ich_hcr_el2() -> u64 {
        HCR.load(Ordering::Relaxed)
    }

    pub fn write_ich_hcr_el2(val: u64) {
        HCR.store(val, Ordering::Relaxed);
    }

    pub fn read_ich_vmcr_el2() -> u64 {
        VMCR.load(Ordering::Relaxed)
    }

    pub fn write_ich_vmcr_el2(val: u64) {
        VMCR.store(val, Ordering::Relaxed);
    }

    pub fn read_ich_ap0r(idx: usize) -> u32 {
        AP0R[idx].load(Ordering::Relaxed) as u32
    }

    pub fn write_ich_ap0r(idx: usize, val: u32) {
        AP0R[idx].store(val as u64, Ordering::Relaxed);
    }

    pub fn read_icc_sre_el2() -> u64 {
        SRE.load(Ordering::Relaxed)
    }

    pub fn write_icc_sre_el2(val: u64) {
        SRE.store(val, Ordering::Relaxed);
    }

    static IAR1: AtomicU64 = AtomicU64::new(1023);

    pub fn read_icc_iar1_el1() -> u32 {
        IAR1.load(Ordering::Relaxed) as u32
    }

    /// Test hook.
    pub fn set_icc_iar1_el1(val: u32) {
        IAR1.store(val as u64, Ordering::Relaxed);
    }

    pub fn write_icc_eoir1_el1(_irq: u32) {}
    pub fn write_icc_dir_el1(_irq: u32) {}
    pub fn write_icc_sgi1r_el1(_val: u64) {}

    static HCR_EL2: AtomicU64 = AtomicU64::new(0);

    pub fn read_hcr_el2() -> u64 {
        HCR_EL2.load(Ordering::Relaxed)
    }

    pub fn write_hcr_el2(val: u64) {
        HCR_EL2.store(val, Ordering::Relaxed);
    }

    pub fn read_id_aa64mmfr0_el1() -> u64 {
        0
    }
}

//! Host stand-in for the aarch64 platform layer.
//!
//! Lets the rest of the kernel — and its unit tests — build on the
//! developer's own machine. None of this runs on real hardware; it only
//! needs to satisfy the same shapes `arch::aarch64` exposes.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

pub fn halt() {
    core::hint::spin_loop();
}

pub mod cpu {
    pub fn read_stack_pointer() -> u64 {
        0
    }

    pub fn io_wait() {
        core::hint::spin_loop();
    }

    pub fn breakpoint() {}
}

pub mod interrupts {
    use super::AtomicBool;

    static ENABLED: AtomicBool = AtomicBool::new(true);

    pub fn enable() {
        ENABLED.store(true, super::Ordering::SeqCst);
    }

    pub fn disable() {
        ENABLED.store(false, super::Ordering::SeqCst);
    }

    pub fn are_enabled() -> bool {
        ENABLED.load(super::Ordering::SeqCst)
    }

    pub fn without_interrupts<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let prev = are_enabled();
        disable();
        let result = f();
        if prev {
            enable();
        }
        result
    }
}

pub mod memory {
    pub fn flush_tlb(_addr: u64) {}
    pub fn flush_tlb_all() {}
    pub fn read_page_table_root() -> u64 {
        0
    }
    pub fn write_page_table_root(_val: u64) {}
}

pub mod context {
    /// Mirrors `arch::aarch64::context::CpuContext`'s shape closely enough
    /// for host-side scheduler tests that don't care about real registers.
    #[derive(Debug, Clone, Copy)]
    pub struct CpuContext {
        pub sp: u64,
        pub pc: u64,
    }

    impl CpuContext {
        pub const fn new() -> Self {
            CpuContext { sp: 0, pc: 0 }
        }
    }
}

pub mod timer {
    use super::AtomicU64;

    static FAKE_CLOCK: AtomicU64 = AtomicU64::new(0);

    pub fn timestamp() -> u64 {
        FAKE_CLOCK.fetch_add(1, super::Ordering::Relaxed)
    }

    pub fn frequency() -> u64 {
        1_000_000
    }
}

pub mod boot {
    pub fn early_init() {}
}

pub mod syscall_arch {
    pub fn init_syscall(_handler_addr: u64) {}
}

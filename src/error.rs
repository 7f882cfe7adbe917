//! Kernel-wide error kind and result alias.
//!
//! Every fallible entry point in the MMU, VGIC and event layers returns
//! `Result<T>` built on this enum rather than inventing a local error type.
//! Fatal invariant violations (unsupported LR count, missing granule support)
//! still panic per the propagation policy — they are not represented here.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HvError {
    /// Malformed arguments (null/empty region list, zero-size region, ...)
    Einval,
    /// Allocator exhaustion (no page frames left for a table or block)
    Enomem,
    /// Operation attempted from IRQ context, or with dependents still present
    Eperm,
    /// Mailbox full, queue full
    Enospc,
    /// `pend` woke because its deadline elapsed
    Timeout,
    /// `pend` woke because the object was deleted or aborted under it
    Abort,
}

impl HvError {
    pub fn as_str(&self) -> &'static str {
        match self {
            HvError::Einval => "EINVAL",
            HvError::Enomem => "ENOMEM",
            HvError::Eperm => "EPERM",
            HvError::Enospc => "ENOSPC",
            HvError::Timeout => "ETIMEOUT",
            HvError::Abort => "EABORT",
        }
    }
}

impl core::fmt::Display for HvError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Result<T> = core::result::Result<T, HvError>;

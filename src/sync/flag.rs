//! Flag group: a 32-bit event-flag set with four wait predicates
//! (`SET_ALL`, `SET_ANY`, `CLR_ALL`, `CLR_ANY`), optionally combined
//! with `CONSUME` to clear/set the matched bits atomically with the
//! wake.
//!
//! Unlike mailbox/queue/semaphore, waking here is predicate-based
//! rather than "pick the highest priority waiter" — every `post` must
//! walk the full waiter list and test each one's mask against the new
//! flag value, so this primitive keeps its own waiter list rather than
//! reusing `Event`'s bitmap (which only ever answers "is anyone of
//! priority P waiting", not "does this mask match").

use alloc::vec::Vec;

use crate::error::{HvError, Result};
use crate::scheduler::{PendStatus, TaskHandle, TaskId};
use crate::sync::event::{self, PendOutcome};
use crate::sync::TicketLock;

pub const SET_ALL: u8 = 0;
pub const SET_ANY: u8 = 1;
pub const CLR_ALL: u8 = 2;
pub const CLR_ANY: u8 = 3;
pub const CONSUME: u8 = 1 << 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagOp {
    Set,
    Clr,
}

struct WaitNode {
    task: TaskHandle,
    mask: u32,
    wait_type: u8,
}

struct Inner {
    flags: u32,
    waiters: Vec<WaitNode>,
}

pub struct FlagGroup {
    inner: TicketLock<Inner>,
}

fn satisfied(flags: u32, mask: u32, wait_type: u8) -> bool {
    match wait_type & !CONSUME {
        SET_ALL => flags & mask == mask,
        SET_ANY => flags & mask != 0,
        CLR_ALL => flags & mask == 0,
        CLR_ANY => flags & mask != mask,
        _ => false,
    }
}

fn consume(flags: &mut u32, mask: u32, wait_type: u8) {
    if wait_type & CONSUME == 0 {
        return;
    }
    match wait_type & !CONSUME {
        SET_ALL | SET_ANY => *flags &= !mask,
        CLR_ALL | CLR_ANY => *flags |= mask,
        _ => {}
    }
}

impl FlagGroup {
    pub fn new(initial: u32) -> Self {
        FlagGroup { inner: TicketLock::new(Inner { flags: initial, waiters: Vec::new() }) }
    }

    pub fn flags(&self) -> u32 {
        self.inner.lock().flags
    }

    fn try_satisfy(&self, mask: u32, wait_type: u8) -> Option<u32> {
        let mut inner = self.inner.lock();
        if satisfied(inner.flags, mask, wait_type) {
            let before = inner.flags;
            consume(&mut inner.flags, mask, wait_type);
            Some(before)
        } else {
            None
        }
    }

    pub fn pend(&self, task: TaskHandle, mask: u32, wait_type: u8, timeout: u32) -> PendOutcome {
        if let Some(flags) = self.try_satisfy(mask, wait_type) {
            return PendOutcome::Ok(Some(flags as usize));
        }
        {
            let mut inner = self.inner.lock();
            inner.waiters.push(WaitNode { task: task.clone(), mask, wait_type });
        }
        event::block(&task, timeout);
        event::spin_for_wake(task.clone(), timeout, |id| self.remove_waiter(id))
    }

    fn remove_waiter(&self, id: TaskId) -> bool {
        let mut inner = self.inner.lock();
        if let Some(pos) = inner.waiters.iter().position(|n| n.task.lock().id == id) {
            inner.waiters.remove(pos);
            true
        } else {
            false
        }
    }

    /// Set or clear `bits`, then wake every waiter whose predicate the
    /// new value satisfies.
    pub fn post(&self, bits: u32, op: FlagOp) {
        let mut inner = self.inner.lock();
        match op {
            FlagOp::Set => inner.flags |= bits,
            FlagOp::Clr => inner.flags &= !bits,
        }
        let mut i = 0;
        while i < inner.waiters.len() {
            if satisfied(inner.flags, inner.waiters[i].mask, inner.waiters[i].wait_type) {
                let node = inner.waiters.remove(i);
                let delivered = inner.flags;
                consume(&mut inner.flags, node.mask, node.wait_type);
                event::ready(&node.task, Some(delivered as usize), PendStatus::Ok);
            } else {
                i += 1;
            }
        }
    }

    pub fn has_waiters(&self) -> bool {
        !self.inner.lock().waiters.is_empty()
    }

    pub fn del(&self, no_pend_allowed: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.waiters.is_empty() {
            if !no_pend_allowed {
                return Err(HvError::Eperm);
            }
            for node in inner.waiters.drain(..) {
                event::ready(&node.task, None, PendStatus::Abort);
            }
            drop(inner);
            crate::scheduler::yield_now();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::spawn_handle;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn set_any_returns_immediately_when_already_satisfied() {
        let grp = FlagGroup::new(0b0011);
        let task = spawn_handle("t", 5);
        assert_eq!(grp.pend(task, 0b0001, SET_ANY, 0), PendOutcome::Ok(Some(0b0011)));
    }

    #[test]
    fn consume_clears_matched_bits_on_set_any() {
        let grp = FlagGroup::new(0b0011);
        let task = spawn_handle("t", 5);
        grp.pend(task, 0b0001, SET_ANY | CONSUME, 0);
        assert_eq!(grp.flags(), 0b0010);
    }

    #[test]
    fn post_wakes_matching_waiter_with_flags_at_satisfy_time() {
        let grp = Arc::new(FlagGroup::new(0));
        let task = spawn_handle("t", 5);
        let handle = {
            let grp = grp.clone();
            let task = task.clone();
            thread::spawn(move || grp.pend(task, 0b0011, SET_ALL, 0))
        };
        thread::sleep(Duration::from_millis(10));
        grp.post(0b0001, FlagOp::Set);
        grp.post(0b0010, FlagOp::Set);
        assert_eq!(handle.join().unwrap(), PendOutcome::Ok(Some(0b0011)));
    }

    #[test]
    fn clr_all_waits_for_every_bit_to_clear() {
        let grp = Arc::new(FlagGroup::new(0b0011));
        let task = spawn_handle("t", 5);
        let handle = {
            let grp = grp.clone();
            let task = task.clone();
            thread::spawn(move || grp.pend(task, 0b0011, CLR_ALL, 0))
        };
        thread::sleep(Duration::from_millis(10));
        grp.post(0b0001, FlagOp::Clr);
        assert!(!handle.is_finished());
        grp.post(0b0010, FlagOp::Clr);
        assert_eq!(handle.join().unwrap(), PendOutcome::Ok(Some(0)));
    }

    #[test]
    fn del_wakes_waiter_with_abort() {
        let grp = Arc::new(FlagGroup::new(0));
        let task = spawn_handle("t", 5);
        let handle = {
            let grp = grp.clone();
            let task = task.clone();
            thread::spawn(move || grp.pend(task, 0b1, SET_ANY, 0))
        };
        while !grp.has_waiters() {
            thread::sleep(Duration::from_millis(1));
        }
        grp.del(true).unwrap();
        assert_eq!(handle.join().unwrap(), PendOutcome::Abort);
    }
}

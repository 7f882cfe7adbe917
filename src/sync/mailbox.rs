//! Mailbox: single-slot message exchange.
//!
//! `post` always prefers a waiting task over the slot; `pend` always
//! checks the slot before blocking. At most one message can sit
//! unconsumed at a time — a second `post` with no waiter and a full
//! slot fails with `Enospc`.

use crate::error::{HvError, Result};
use crate::scheduler::TaskHandle;
use crate::sync::event::{self, DelOpt, Event, PendOutcome};
use crate::sync::SpinLock;

pub struct Mailbox {
    event: Event,
    data: SpinLock<Option<usize>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Mailbox { event: Event::new(), data: SpinLock::new(None) }
    }

    /// Non-blocking post. Wakes the highest-priority waiter if one
    /// exists; otherwise stores `msg` in the slot.
    pub fn post(&self, msg: usize) -> Result<()> {
        if self.event.wake_highest(Some(msg)).is_some() {
            return Ok(());
        }
        let mut slot = self.data.lock();
        if slot.is_some() {
            return Err(HvError::Enospc);
        }
        *slot = Some(msg);
        Ok(())
    }

    /// Blocking receive. `timeout` of 0 waits indefinitely.
    pub fn pend(&self, task: TaskHandle, timeout: u32) -> PendOutcome {
        if let Some(msg) = self.data.lock().take() {
            return PendOutcome::Ok(Some(msg));
        }
        event::pend_block(&self.event, task, timeout)
    }

    pub fn has_waiters(&self) -> bool {
        self.event.has_waiters()
    }

    pub fn del(&self, opt: DelOpt) -> Result<()> {
        event::del_generic(&self.event, opt)
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::spawn_handle;
    use crate::scheduler::PendStatus;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn post_then_pend_returns_stored_message() {
        let mbox = Mailbox::new();
        mbox.post(42).unwrap();
        let consumer = spawn_handle("c", 10);
        assert_eq!(mbox.pend(consumer, 0), PendOutcome::Ok(Some(42)));
    }

    #[test]
    fn second_post_without_waiter_fails_enospc() {
        let mbox = Mailbox::new();
        mbox.post(1).unwrap();
        assert_eq!(mbox.post(2), Err(HvError::Enospc));
    }

    #[test]
    fn post_never_fills_slot_when_a_waiter_exists() {
        let mbox = std::sync::Arc::new(Mailbox::new());
        let task = spawn_handle("waiter", 5);
        let handle = {
            let mbox = mbox.clone();
            let task = task.clone();
            thread::spawn(move || mbox.pend(task, 0))
        };

        // Give the pending thread time to register as a waiter.
        while !mbox.has_waiters() {
            thread::sleep(Duration::from_millis(1));
        }
        mbox.post(99).unwrap();
        assert_eq!(handle.join().unwrap(), PendOutcome::Ok(Some(99)));
        assert!(mbox.post(1).is_ok(), "slot must have stayed empty");
    }

    #[test]
    fn del_always_aborts_blocked_waiter() {
        let mbox = std::sync::Arc::new(Mailbox::new());
        let task = spawn_handle("waiter", 5);
        let handle = {
            let mbox = mbox.clone();
            let task = task.clone();
            thread::spawn(move || mbox.pend(task, 0))
        };
        while !mbox.has_waiters() {
            thread::sleep(Duration::from_millis(1));
        }
        mbox.del(DelOpt::Always).unwrap();
        assert_eq!(handle.join().unwrap(), PendOutcome::Abort);
    }

    #[test]
    fn del_no_pend_refuses_when_waiters_present() {
        let mbox = std::sync::Arc::new(Mailbox::new());
        let task = spawn_handle("waiter", 5);
        let handle = {
            let mbox = mbox.clone();
            let task = task.clone();
            thread::spawn(move || mbox.pend(task, 0))
        };
        while !mbox.has_waiters() {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(mbox.del(DelOpt::NoPend), Err(HvError::Eperm));
        mbox.post(7).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn pend_times_out_when_nobody_posts() {
        let mbox = Mailbox::new();
        let task = spawn_handle("waiter", 5);
        assert_eq!(mbox.pend(task, 3), PendOutcome::Timeout);
    }
}

//! Counting semaphore, built on the same event engine as the other
//! blocking primitives. `accept` is the non-blocking try-take used by
//! ISR-context callers that can never block; `pend` blocks through the
//! normal wait/wake path when the count is exhausted.

use crate::error::Result;
use crate::scheduler::TaskHandle;
use crate::sync::event::{self, DelOpt, Event, PendOutcome};
use crate::sync::SpinLock;

pub struct Semaphore {
    event: Event,
    count: SpinLock<i64>,
}

impl Semaphore {
    pub fn new(initial: i64) -> Self {
        Semaphore { event: Event::new(), count: SpinLock::new(initial) }
    }

    /// Non-blocking try-take. Never touches the wait engine — safe to
    /// call from IRQ context.
    pub fn accept(&self) -> bool {
        let mut count = self.count.lock();
        if *count > 0 {
            *count -= 1;
            true
        } else {
            false
        }
    }

    /// Release one unit. Wakes the highest-priority waiter directly
    /// rather than incrementing the counter when one is present.
    pub fn post(&self) {
        if self.event.wake_highest(None).is_some() {
            return;
        }
        let mut count = self.count.lock();
        *count = count.saturating_add(1);
    }

    pub fn pend(&self, task: TaskHandle, timeout: u32) -> PendOutcome {
        if self.accept() {
            return PendOutcome::Ok(None);
        }
        event::pend_block(&self.event, task, timeout)
    }

    pub fn count(&self) -> i64 {
        *self.count.lock()
    }

    pub fn has_waiters(&self) -> bool {
        self.event.has_waiters()
    }

    pub fn del(&self, opt: DelOpt) -> Result<()> {
        event::del_generic(&self.event, opt)
    }
}

/// A semaphore with at most one unit available — a binary lock with
/// the same blocking `pend`/`post` contract as the counting form.
pub type BinarySemaphore = Semaphore;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HvError;
    use crate::scheduler::spawn_handle;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn accept_drains_the_counter() {
        let sem = Semaphore::new(2);
        assert!(sem.accept());
        assert!(sem.accept());
        assert!(!sem.accept());
    }

    #[test]
    fn post_never_increments_counter_when_a_waiter_exists() {
        let sem = Arc::new(Semaphore::new(0));
        let task = spawn_handle("t", 5);
        let handle = {
            let sem = sem.clone();
            let task = task.clone();
            thread::spawn(move || sem.pend(task, 0))
        };
        while !sem.has_waiters() {
            thread::sleep(Duration::from_millis(1));
        }
        sem.post();
        assert_eq!(handle.join().unwrap(), PendOutcome::Ok(None));
        assert_eq!(sem.count(), 0);
    }

    #[test]
    fn del_no_pend_fails_while_a_waiter_blocks() {
        let sem = Arc::new(Semaphore::new(0));
        let task = spawn_handle("t", 5);
        let handle = {
            let sem = sem.clone();
            let task = task.clone();
            thread::spawn(move || sem.pend(task, 0))
        };
        while !sem.has_waiters() {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(sem.del(DelOpt::NoPend), Err(HvError::Eperm));
        sem.post();
        handle.join().unwrap();
    }
}

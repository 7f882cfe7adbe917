//! Event base: the wait/wake engine shared by every blocking primitive
//! in this module (mailbox, queue, flag group, semaphore).
//!
//! Each event owns a ticket-lock around its own fields, a FIFO for
//! waiters outside the realtime priority range, and the `wait_grp`/
//! `wait_tbl` bitmap for O(1) highest-priority wake within it. Posting
//! always prefers a waiter over storing data, so a pending consumer is
//! served before anything touches the primitive's own buffer.

use alloc::collections::VecDeque;

use crate::scheduler::{self, bitmap_coords, is_realtime_priority, PendStatus, TaskHandle, TaskId, TaskState};
use crate::sync::TicketLock;

const PRIORITY_SLOTS: usize = 64;

/// What `del()` does when waiters remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelOpt {
    /// Fail with `Eperm` instead of disturbing any waiter.
    NoPend,
    /// Abort every waiter, then proceed.
    Always,
}

/// Result of a blocking `pend`: delivered data, an explicit abort (the
/// object was deleted out from under the caller), or a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendOutcome {
    Ok(Option<usize>),
    Abort,
    Timeout,
}

struct Inner {
    wait_list: VecDeque<TaskHandle>,
    wait_grp: u8,
    wait_tbl: [u8; 8],
    realtime: [Option<TaskHandle>; PRIORITY_SLOTS],
}

impl Inner {
    fn new() -> Self {
        Inner {
            wait_list: VecDeque::new(),
            wait_grp: 0,
            wait_tbl: [0; 8],
            realtime: core::array::from_fn(|_| None),
        }
    }
}

pub struct Event {
    inner: TicketLock<Inner>,
}

impl Event {
    pub fn new() -> Self {
        Event { inner: TicketLock::new(Inner::new()) }
    }

    /// Add `task` to the wait set. Caller has already set its state to
    /// `Suspended` and its `delay` to the requested timeout.
    pub fn enqueue(&self, task: TaskHandle) {
        let prio = task.lock().priority;
        let mut inner = self.inner.lock();
        if is_realtime_priority(prio) {
            let (bity, by, bitx) = bitmap_coords(prio);
            inner.wait_grp |= bity;
            inner.wait_tbl[by as usize] |= bitx;
            inner.realtime[prio as usize] = Some(task);
        } else {
            inner.wait_list.push_back(task);
        }
    }

    /// Wake the single highest-priority waiter (realtime bitmap first,
    /// then FIFO overflow list), delivering `msg`. Returns the woken
    /// task, or `None` if nobody was waiting.
    pub fn wake_highest(&self, msg: Option<usize>) -> Option<TaskHandle> {
        let mut inner = self.inner.lock();
        let task = if inner.wait_grp != 0 {
            let by = inner.wait_grp.trailing_zeros() as usize;
            let bitx = inner.wait_tbl[by];
            let bit = bitx.trailing_zeros() as usize;
            let prio = (by * 8 + bit) as u8;
            inner.wait_tbl[by] &= !(1 << bit);
            if inner.wait_tbl[by] == 0 {
                inner.wait_grp &= !(1 << by);
            }
            inner.realtime[prio as usize].take()
        } else {
            inner.wait_list.pop_front()
        };
        drop(inner);
        if let Some(t) = &task {
            ready(t, msg, PendStatus::Ok);
        }
        task
    }

    /// Wake every waiter with the same status and message, e.g. for a
    /// broadcasting post or a forced delete. Returns how many woke.
    pub fn wake_all(&self, status: PendStatus, msg: Option<usize>) -> usize {
        let mut inner = self.inner.lock();
        let mut woken = 0usize;
        while let Some(t) = inner.wait_list.pop_front() {
            ready(&t, msg, status);
            woken += 1;
        }
        for slot in inner.realtime.iter_mut() {
            if let Some(t) = slot.take() {
                ready(&t, msg, status);
                woken += 1;
            }
        }
        inner.wait_grp = 0;
        inner.wait_tbl = [0; 8];
        woken
    }

    pub fn has_waiters(&self) -> bool {
        let inner = self.inner.lock();
        inner.wait_grp != 0 || !inner.wait_list.is_empty()
    }

    /// Remove `task_id` from the wait set if it is still there. Used to
    /// resolve the race between a timeout and a concurrent post: whoever
    /// removes the task first wins.
    pub fn remove_if_present(&self, task_id: TaskId) -> bool {
        let mut inner = self.inner.lock();
        if let Some(pos) = inner.wait_list.iter().position(|t| t.lock().id == task_id) {
            inner.wait_list.remove(pos);
            return true;
        }
        for (prio, slot) in inner.realtime.iter_mut().enumerate() {
            let matches = slot.as_ref().map(|t| t.lock().id == task_id).unwrap_or(false);
            if matches {
                *slot = None;
                let (bity, by, bitx) = bitmap_coords(prio as u8);
                inner.wait_tbl[by as usize] &= !bitx;
                if inner.wait_tbl[by as usize] == 0 {
                    inner.wait_grp &= !bity;
                }
                return true;
            }
        }
        false
    }
}

/// Deliver `msg`/`status` to `task` and put it back on the ready queue.
pub(crate) fn ready(task: &TaskHandle, msg: Option<usize>, status: PendStatus) {
    {
        let mut t = task.lock();
        t.msg = msg;
        t.pend_status = status;
        t.state = TaskState::Ready;
    }
    scheduler::enqueue(task.clone());
}

/// Transition `task` to `Suspended` with the given timeout (0 = none).
pub(crate) fn block(task: &TaskHandle, timeout: u32) {
    let mut t = task.lock();
    t.delay = timeout;
    t.state = TaskState::Suspended;
}

/// Common tail of every blocking `pend`: yield until something (a post,
/// an abort, or our own timeout) moves `task` out of `Suspended`.
///
/// `try_remove` is called once, after `timeout` reschedule points have
/// passed with no wakeup, to attempt to pull the task out of whatever
/// wait structure it is parked in. If that succeeds, this call owns the
/// timeout and marks the task `Timeout`; if it fails, a racing poster
/// already removed the task and its status stands.
pub(crate) fn spin_for_wake<F>(task: TaskHandle, timeout: u32, try_remove: F) -> PendOutcome
where
    F: Fn(TaskId) -> bool,
{
    let mut budget = timeout;
    loop {
        scheduler::sched();
        {
            let t = task.lock();
            if t.state != TaskState::Suspended {
                let status = t.pend_status;
                let msg = t.msg;
                drop(t);
                return match status {
                    PendStatus::Ok => PendOutcome::Ok(msg),
                    PendStatus::Abort => PendOutcome::Abort,
                    PendStatus::Timeout => PendOutcome::Timeout,
                };
            }
        }
        if budget > 0 {
            budget -= 1;
            if budget == 0 {
                let id = task.lock().id;
                if try_remove(id) {
                    ready(&task, None, PendStatus::Timeout);
                }
                continue;
            }
        }
        core::hint::spin_loop();
    }
}

/// Block `task` on `event`, returning once woken, aborted, or timed out.
pub fn pend_block(event: &Event, task: TaskHandle, timeout: u32) -> PendOutcome {
    event.enqueue(task.clone());
    block(&task, timeout);
    spin_for_wake(task.clone(), timeout, |id| event.remove_if_present(id))
}

/// Shared `del()` body for mailbox/queue/semaphore: they differ only in
/// what they store, not in delete semantics.
pub fn del_generic(event: &Event, opt: DelOpt) -> crate::error::Result<()> {
    if event.has_waiters() {
        if opt == DelOpt::NoPend {
            return Err(crate::error::HvError::Eperm);
        }
        event.wake_all(PendStatus::Abort, None);
        scheduler::yield_now();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::spawn_handle;

    #[test]
    fn enqueue_sets_bitmap_for_realtime_priority() {
        let event = Event::new();
        let t = spawn_handle("w", 10);
        event.enqueue(t);
        let inner = event.inner.lock();
        assert_ne!(inner.wait_grp, 0);
        assert_ne!(inner.wait_tbl[1], 0);
    }

    #[test]
    fn wake_highest_prefers_lower_numeric_priority() {
        let event = Event::new();
        let low = spawn_handle("low", 40);
        let high = spawn_handle("high", 5);
        event.enqueue(low.clone());
        event.enqueue(high.clone());

        let woken = event.wake_highest(Some(7)).unwrap();
        assert_eq!(woken.lock().id, high.lock().id);
        assert_eq!(high.lock().msg, Some(7));
        assert_eq!(high.lock().pend_status, PendStatus::Ok);
    }

    #[test]
    fn remove_if_present_loses_race_after_wake() {
        let event = Event::new();
        let t = spawn_handle("w", 3);
        let id = t.lock().id;
        event.enqueue(t.clone());
        event.wake_highest(None);
        assert!(!event.remove_if_present(id));
    }

    #[test]
    fn remove_if_present_wins_when_still_waiting() {
        let event = Event::new();
        let t = spawn_handle("w", 3);
        let id = t.lock().id;
        event.enqueue(t);
        assert!(event.remove_if_present(id));
        assert!(!event.has_waiters());
    }

    #[test]
    fn wake_all_delivers_abort_to_every_waiter() {
        let event = Event::new();
        let rt = spawn_handle("rt", 2);
        let fifo = spawn_handle("fifo", 200);
        event.enqueue(rt.clone());
        event.enqueue(fifo.clone());
        let woken = event.wake_all(PendStatus::Abort, None);
        assert_eq!(woken, 2);
        assert_eq!(rt.lock().pend_status, PendStatus::Abort);
        assert_eq!(fifo.lock().pend_status, PendStatus::Abort);
        assert!(!event.has_waiters());
    }
}

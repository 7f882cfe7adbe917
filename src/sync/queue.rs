//! Message queue: a fixed-capacity FIFO (or LIFO, via `post_front`) of
//! pointer-sized messages, backed by the same wait engine as the
//! mailbox. `post_opt` exposes the two flags real callers reach for:
//! `BROADCAST` (wake every waiter instead of just the highest-priority
//! one) and `NO_SCHED` (defer the reschedule point to the caller, for
//! batched posts from an ISR).

use alloc::collections::VecDeque;

use crate::error::{HvError, Result};
use crate::scheduler::TaskHandle;
use crate::sync::event::{self, DelOpt, Event, PendOutcome};
use crate::sync::SpinLock;

pub mod opt {
    pub const BROADCAST: u8 = 1 << 0;
    pub const NO_SCHED: u8 = 1 << 1;
}

struct Ring {
    buf: VecDeque<usize>,
    cap: usize,
}

pub struct Queue {
    event: Event,
    ring: SpinLock<Ring>,
}

impl Queue {
    pub fn new(capacity: usize) -> Self {
        Queue {
            event: Event::new(),
            ring: SpinLock::new(Ring { buf: VecDeque::with_capacity(capacity), cap: capacity }),
        }
    }

    pub fn post(&self, msg: usize) -> Result<()> {
        self.post_opt(msg, false, 0)
    }

    pub fn post_front(&self, msg: usize) -> Result<()> {
        self.post_opt(msg, true, 0)
    }

    /// `front`: push to the head instead of the tail (LIFO urgent post).
    /// `opts`: a combination of [`opt::BROADCAST`] and [`opt::NO_SCHED`].
    pub fn post_opt(&self, msg: usize, front: bool, opts: u8) -> Result<()> {
        if opts & opt::BROADCAST != 0 {
            if self.event.wake_all(crate::scheduler::PendStatus::Ok, Some(msg)) > 0 {
                if opts & opt::NO_SCHED == 0 {
                    crate::scheduler::yield_now();
                }
                return Ok(());
            }
        } else if self.event.wake_highest(Some(msg)).is_some() {
            if opts & opt::NO_SCHED == 0 {
                crate::scheduler::yield_now();
            }
            return Ok(());
        }

        let mut ring = self.ring.lock();
        if ring.buf.len() == ring.cap {
            return Err(HvError::Enospc);
        }
        if front {
            ring.buf.push_front(msg);
        } else {
            ring.buf.push_back(msg);
        }
        Ok(())
    }

    pub fn pend(&self, task: TaskHandle, timeout: u32) -> PendOutcome {
        if let Some(msg) = self.ring.lock().buf.pop_front() {
            return PendOutcome::Ok(Some(msg));
        }
        event::pend_block(&self.event, task, timeout)
    }

    pub fn has_waiters(&self) -> bool {
        self.event.has_waiters()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn del(&self, opt: DelOpt) -> Result<()> {
        event::del_generic(&self.event, opt)
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
    fn fifo_order_preserved_when_nobody_is_waiting() {
        let q = Queue::new(4);
        q.post(1).unwrap();
        q.post(2).unwrap();
        let consumer = spawn_handle("c", 10);
        assert_eq!(q.pend(consumer.clone(), 0), PendOutcome::Ok(Some(1)));
        assert_eq!(q.pend(consumer, 0), PendOutcome::Ok(Some(2)));
    }

    #[test]
    fn post_front_jumps_the_line() {
        let q = Queue::new(4);
        q.post(1).unwrap();
        q.post_front(2).unwrap();
        let consumer = spawn_handle("c", 10);
        assert_eq!(q.pend(consumer, 0), PendOutcome::Ok(Some(2)));
    }

    #[test]
    fn full_queue_rejects_post() {
        let q = Queue::new(1);
        q.post(1).unwrap();
        assert_eq!(q.post(2), Err(HvError::Enospc));
    }

    #[test]
    fn broadcast_wakes_every_blocked_consumer() {
        let q = Arc::new(Queue::new(4));
        let a = spawn_handle("a", 5);
        let b = spawn_handle("b", 6);
        let ha = {
            let q = q.clone();
            let a = a.clone();
            thread::spawn(move || q.pend(a, 0))
        };
        let hb = {
            let q = q.clone();
            let b = b.clone();
            thread::spawn(move || q.pend(b, 0))
        };
        // Give both pend calls a moment to register as waiters before
        // broadcasting; they run on real OS threads.
        thread::sleep(Duration::from_millis(20));
        q.post_opt(7, false, opt::BROADCAST).unwrap();
        assert_eq!(ha.join().unwrap(), PendOutcome::Ok(Some(7)));
        assert_eq!(hb.join().unwrap(), PendOutcome::Ok(Some(7)));
    }
}

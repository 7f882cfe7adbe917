//! Task control block.
//!
//! Priority is a single byte in `0..=63` (the realtime range the event
//! engine's `wait_grp`/`wait_tbl` bitmap spans); `bity`/`by`/`bitx` mirror
//! the eight-group/eight-bit split used there, computed once at task
//! creation rather than recomputed on every wait/wake.

use alloc::string::String;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::sync::SpinLock;

/// Lowest (least urgent) realtime priority this core's bitmap spans.
pub const OS_LOWEST_PRIO: u8 = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(pub u64);

impl TaskId {
    pub const IDLE: TaskId = TaskId(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Ready,
    Running,
    /// Blocked on an event; see `pend_status` for why it was last woken.
    Suspended,
    Terminated,
}

/// Why a `pend` call returned, set by whichever path removes the task
/// from its wait set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendStatus {
    Ok,
    Abort,
    Timeout,
}

/// `true` for every priority this core's bitmap wake engine covers.
/// Kept as a named predicate (rather than an inline comparison at call
/// sites) because the original system used exactly this test to decide
/// between the O(1) bitmap and the FIFO fallback list.
pub const fn is_realtime_priority(prio: u8) -> bool {
    prio <= OS_LOWEST_PRIO
}

/// `(bity, by, bitx)`: which `wait_tbl` group a priority falls in, that
/// group's index, and the bit within it.
pub const fn bitmap_coords(prio: u8) -> (u8, u8, u8) {
    let by = prio >> 3;
    let bity = 1u8 << by;
    let bitx = 1u8 << (prio & 0x7);
    (bity, by, bitx)
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_task_id() -> TaskId {
    TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
}

pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub state: TaskState,
    pub priority: u8,
    pub bity: u8,
    pub by: u8,
    pub bitx: u8,
    pub pend_status: PendStatus,
    /// Ticks remaining before a pending wait times out; 0 means "no timeout".
    pub delay: u32,
    /// Message delivered by whichever `post` woke this task.
    pub msg: Option<usize>,
    pub cpu_time: AtomicU64,
}

impl Task {
    pub fn new(name: String, priority: u8) -> Self {
        let (bity, by, bitx) = bitmap_coords(priority);
        Task {
            id: next_task_id(),
            name,
            state: TaskState::Ready,
            priority,
            bity,
            by,
            bitx,
            pend_status: PendStatus::Ok,
            delay: 0,
            msg: None,
            cpu_time: AtomicU64::new(0),
        }
    }

    pub fn new_idle() -> Self {
        let mut t = Task::new(String::from("idle"), OS_LOWEST_PRIO);
        t.id = TaskId::IDLE;
        t.state = TaskState::Running;
        t
    }

    pub fn is_realtime(&self) -> bool {
        is_realtime_priority(self.priority)
    }

    pub fn tick(&self) {
        self.cpu_time.fetch_add(1, Ordering::Relaxed);
    }
}

/// Shared handle to a task, used by the event engine and scheduler alike.
pub type TaskHandle = Arc<SpinLock<Task>>;

pub fn spawn_handle(name: &str, priority: u8) -> TaskHandle {
    Arc::new(SpinLock::new(Task::new(String::from(name), priority)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_coords_match_group_and_bit_split() {
        let (bity, by, bitx) = bitmap_coords(10);
        assert_eq!(by, 1);
        assert_eq!(bity, 0b0000_0010);
        assert_eq!(bitx, 1 << 2);
    }

    #[test]
    fn every_priority_in_range_is_realtime() {
        assert!(is_realtime_priority(0));
        assert!(is_realtime_priority(63));
    }
}

//! Cooperative, priority-ordered scheduler.
//!
//! One kernel thread of control per physical CPU multiplexes tasks
//! through explicit `sched()` calls — no preemption of kernel code by
//! other kernel code. `pend` operations in the event layer call `sched()`
//! directly after suspending the current task; there is no per-waiter
//! channel or future.

mod task;

use alloc::collections::VecDeque;
use spin::Mutex;

use crate::sync::Lazy;

pub use task::{
    bitmap_coords, is_realtime_priority, next_task_id, spawn_handle, PendStatus, Task, TaskHandle,
    TaskId, TaskState, OS_LOWEST_PRIO,
};

const PRIORITY_LEVELS: usize = 64;

struct Ready {
    queues: [VecDeque<TaskHandle>; PRIORITY_LEVELS],
    current: Option<TaskHandle>,
}

impl Ready {
    fn new() -> Self {
        Ready {
            queues: core::array::from_fn(|_| VecDeque::new()),
            current: None,
        }
    }
}

static READY: Lazy<Mutex<Ready>> = Lazy::new(|| Mutex::new(Ready::new()));

pub fn init() {
    let idle = spawn_handle("idle", OS_LOWEST_PRIO);
    READY.lock().current = Some(idle);
    crate::log!("scheduler ready");
}

/// Put a task on its priority's ready queue.
pub fn enqueue(task: TaskHandle) {
    let priority = task.lock().priority as usize;
    READY.lock().queues[priority.min(PRIORITY_LEVELS - 1)].push_back(task);
}

/// Select and switch to the highest-priority ready task. The caller is
/// responsible for having already transitioned the outgoing task's state
/// (e.g. to `Suspended`) before calling this.
pub fn sched() {
    let mut ready = READY.lock();
    for level in 0..PRIORITY_LEVELS {
        if let Some(next) = ready.queues[level].pop_front() {
            if let Some(current) = ready.current.take() {
                if current.lock().state == TaskState::Ready {
                    let prio = current.lock().priority as usize;
                    ready.queues[prio.min(PRIORITY_LEVELS - 1)].push_back(current);
                }
            }
            ready.current = Some(next);
            return;
        }
    }
}

pub fn current_task() -> Option<TaskHandle> {
    READY.lock().current.clone()
}

pub fn yield_now() {
    sched();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sched_picks_lower_numeric_priority_first() {
        let low = spawn_handle("low", 40);
        let high = spawn_handle("high", 5);
        enqueue(low.clone());
        enqueue(high.clone());
        sched();
        assert_eq!(current_task().unwrap().lock().id, high.lock().id);
    }
}

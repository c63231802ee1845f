//! Named thread spawning for the robot's execution contexts.
//!
//! Every long-running loop (PWM timing, command execution, sensor polling)
//! gets its own OS thread. PWM timing threads ask the scheduler for a
//! real-time FIFO priority so unrelated work cannot stretch a pulse; on
//! hosts where that is not permitted (no `CAP_SYS_NICE`) the request is
//! logged and the thread carries on at normal priority.

use std::thread::JoinHandle;

use crate::error::{Error, Result};

/// Scheduling class requested for a spawned thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPriority {
    /// Default time-sharing scheduler.
    Normal,
    /// `SCHED_FIFO` at the given priority (1-99) where the OS allows it.
    Realtime(u8),
}

/// Spawn a named thread with the requested priority.
///
/// Thread creation failure is reported as [`Error::Spawn`] instead of
/// panicking; a refused priority change is not an error.
pub fn spawn_task<T, F>(name: &'static str, priority: TaskPriority, f: F) -> Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    log::info!("Spawning '{}' ({:?})", name, priority);

    std::thread::Builder::new()
        .name(name.into())
        .spawn(move || {
            if let TaskPriority::Realtime(prio) = priority {
                apply_realtime(name, prio);
            }
            f()
        })
        .map_err(|e| {
            log::error!("thread '{}' spawn failed: {}", name, e);
            Error::Spawn(name)
        })
}

#[cfg(target_os = "linux")]
fn apply_realtime(name: &str, prio: u8) {
    let param = libc::sched_param {
        sched_priority: i32::from(prio.clamp(1, 99)),
    };
    // SAFETY: pthread_self() is always a valid handle for the calling
    // thread and `param` outlives the call.
    let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    if rc != 0 {
        log::warn!(
            "'{}': SCHED_FIFO({}) refused (rc={}), running at normal priority",
            name,
            prio,
            rc
        );
    }
}

/// Non-Linux fallback: priority hints are ignored.
#[cfg(not(target_os = "linux"))]
fn apply_realtime(name: &str, prio: u8) {
    log::debug!("'{}': real-time priority {} not supported on this OS", name, prio);
}

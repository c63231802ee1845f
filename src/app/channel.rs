//! Command queues and the shutdown signal.
//!
//! Uses `crossbeam-channel` unbounded channels to bridge any number of
//! producers (transport handlers, CLI, tests) with the single execution
//! loop that owns an actuator.
//!
//! ```text
//! ┌──────────────┐  push   ┌─────────────────┐  take   ┌──────────────┐
//! │  producers   │────────▶│ CommandChannel  │────────▶│ command loop │
//! │  (any thread)│         │ (FIFO, unbounded)│        │ (one thread) │
//! └──────────────┘         └─────────────────┘         └──────────────┘
//!                                    ▲
//!                          ShutdownSignal::raise()
//! ```
//!
//! The consumer half is not `Clone`, so "exactly one consumer per
//! channel" is enforced by the type system; fan-out means one channel per
//! actuator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, select, unbounded};

use crate::error::Cancelled;

// ═══════════════════════════════════════════════════════════════
//  Shutdown signal
// ═══════════════════════════════════════════════════════════════

struct ShutdownInner {
    raised: AtomicBool,
    /// Dropped on `raise()`; disconnecting `wake` releases every waiter.
    trigger: Mutex<Option<Sender<()>>>,
    wake: Receiver<()>,
}

/// Process-wide cancellation, raised once and observed by every loop.
///
/// Cloning is cheap; all clones observe the same signal.
#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<ShutdownInner>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        // Nothing is ever sent; dropping `tx` disconnects every waiter.
        let (tx, rx) = bounded(0);
        Self {
            inner: Arc::new(ShutdownInner {
                raised: AtomicBool::new(false),
                trigger: Mutex::new(Some(tx)),
                wake: rx,
            }),
        }
    }

    /// Raise the signal. Idempotent.
    pub fn raise(&self) {
        self.inner.raised.store(true, Ordering::Release);
        let sender = self
            .inner
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_some() {
            log::info!("Shutdown signal raised");
        }
    }

    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::Acquire)
    }

    /// Sleep for up to `timeout`, returning early with `true` if the
    /// signal is raised meanwhile.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_raised() {
            return true;
        }
        match self.inner.wake.recv_timeout(timeout) {
            Err(RecvTimeoutError::Disconnected) => true,
            Ok(()) | Err(RecvTimeoutError::Timeout) => self.is_raised(),
        }
    }

    fn receiver(&self) -> &Receiver<()> {
        &self.inner.wake
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ShutdownSignal")
            .field("raised", &self.is_raised())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Command channel
// ═══════════════════════════════════════════════════════════════

/// Namespace for creating a command queue.
pub struct CommandChannel;

impl CommandChannel {
    /// Create a FIFO queue, returning its producer and consumer halves.
    #[allow(clippy::new_ret_no_self)]
    pub fn new<T>() -> (CommandSender<T>, CommandReceiver<T>) {
        let (tx, rx) = unbounded();
        (CommandSender { tx }, CommandReceiver { rx })
    }
}

/// Producer half. Clone freely; each clone pushes into the same queue.
pub struct CommandSender<T> {
    tx: Sender<T>,
}

impl<T> Clone for CommandSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> CommandSender<T> {
    /// Enqueue a command. Never blocks: the queue is unbounded.
    ///
    /// Returns `false` only once the consumer has exited (after
    /// shutdown), at which point there is nothing left to execute it.
    pub fn push(&self, cmd: T) -> bool {
        if self.tx.send(cmd).is_err() {
            log::debug!("command dropped: consumer has shut down");
            return false;
        }
        true
    }

    /// Commands queued but not yet taken.
    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

/// Consumer half. Not `Clone`: one consumer per channel.
pub struct CommandReceiver<T> {
    rx: Receiver<T>,
}

impl<T> CommandReceiver<T> {
    /// Block until a command is available or `cancel` is raised.
    ///
    /// Once the signal is raised no further command is handed out, even
    /// if some are still queued.
    pub fn take(&self, cancel: &ShutdownSignal) -> Result<T, Cancelled> {
        if cancel.is_raised() {
            return Err(Cancelled);
        }
        select! {
            recv(self.rx) -> cmd => match cmd {
                Ok(cmd) if !cancel.is_raised() => Ok(cmd),
                _ => Err(Cancelled),
            },
            recv(cancel.receiver()) -> _ => Err(Cancelled),
        }
    }

    /// Non-blocking poll.
    pub fn try_take(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

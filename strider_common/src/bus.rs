//! Application message bus.
//!
//! A FIFO queue gated by a counting semaphore, plus a callback dispatch
//! loop. The bus is an owned instance: construct one per process (or per
//! subsystem), share it behind an `Arc`, and run the loop on a thread of
//! your choosing. Nothing here is global.
//!
//! ## Dispatch model
//!
//! Handlers are registered per message id, or as the default. Either
//! registration **replaces** whatever was registered for that key
//! before; it never appends. Messages whose id has no registration go
//! to the default handler list. An id that was explicitly cleared keeps
//! an empty registration, so its messages are dropped without falling
//! back to the defaults.
//!
//! Dispatch runs on the loop thread while holding the callback table
//! lock: handlers must not register or clear callbacks on the same bus,
//! and must not call [`MsgBus::receive`].
//!
//! ## Stopping
//!
//! [`MsgBus::request_stop`] raises the stop flag and posts a wake-up
//! message. The loop checks the flag after every receive, so the message
//! that delivers the wake-up (whichever it is) is never dispatched.
//!
//! The bus is for relaxed-timing threads only; the cyclic domain talks to
//! the rest of the process through [`crate::bridge`] instead.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

use thiserror::Error;
use tracing::{debug, trace};

use crate::msg::Msg;

/// Message handler. The `i32` return is advisory and ignored by the loop.
pub type Callback = Box<dyn FnMut(&Msg) -> i32 + Send>;

/// Message bus errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    /// A dispatch loop is already running on this bus.
    #[error("message loop is already running")]
    LoopAlreadyRunning,
    /// No dispatch loop is running, so there is nothing to stop.
    #[error("message loop is not running")]
    LoopNotRunning,
}

/// Counting semaphore. `wait` parks until a permit is available.
struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    fn new() -> Self {
        Self {
            permits: Mutex::new(0),
            available: Condvar::new(),
        }
    }

    fn post(&self) {
        let mut permits = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        *permits += 1;
        self.available.notify_one();
    }

    fn wait(&self) {
        let mut permits = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        while *permits == 0 {
            permits = self
                .available
                .wait(permits)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *permits -= 1;
    }
}

#[derive(Default)]
struct CallbackTable {
    by_id: HashMap<i32, Vec<Callback>>,
    defaults: Vec<Callback>,
}

/// The message bus. See the [module docs](self) for the dispatch model.
pub struct MsgBus {
    queue: Mutex<VecDeque<Msg>>,
    pending: Semaphore,
    table: Mutex<CallbackTable>,
    running: AtomicBool,
    stop: AtomicBool,
}

impl Default for MsgBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MsgBus {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            pending: Semaphore::new(),
            table: Mutex::new(CallbackTable::default()),
            running: AtomicBool::new(false),
            stop: AtomicBool::new(false),
        }
    }

    // ── Queue ───────────────────────────────────────────────────────

    /// Enqueue a message and wake one waiting receiver.
    pub fn post(&self, msg: Msg) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(msg);
        self.pending.post();
    }

    /// Block until a message is available and return it.
    ///
    /// A wake-up with an empty queue (spurious, or a queue drained by
    /// [`clear_queue`](Self::clear_queue)) goes back to waiting.
    pub fn receive(&self) -> Msg {
        loop {
            self.pending.wait();
            let popped = self
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            if let Some(msg) = popped {
                return msg;
            }
        }
    }

    /// Drop every pending message without dispatching any.
    ///
    /// Permits already posted for the dropped messages stay behind; the
    /// receive retry loop absorbs the surplus wake-ups.
    pub fn clear_queue(&self) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    // ── Callback table ──────────────────────────────────────────────

    /// Register `callback` for `id`, replacing any previous registration.
    pub fn register_callback(&self, id: i32, callback: Callback) {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .insert(id, vec![callback]);
    }

    /// Clear the registration for `id`, leaving an empty one behind:
    /// messages with this id are dropped, not routed to the defaults.
    pub fn clear_callbacks(&self, id: i32) {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .insert(id, Vec::new());
    }

    /// Register `callback` as the default handler, replacing any previous
    /// default. Defaults receive every message whose id has no
    /// registration at all.
    pub fn register_default_callback(&self, callback: Callback) {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .defaults = vec![callback];
    }

    /// Empty the default handler list.
    pub fn clear_default_callbacks(&self) {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .defaults
            .clear();
    }

    // ── Dispatch loop ───────────────────────────────────────────────

    /// Run the dispatch loop on the calling thread until
    /// [`request_stop`](Self::request_stop).
    ///
    /// Fails with [`BusError::LoopAlreadyRunning`] when a loop is already
    /// active on this bus.
    pub fn run_loop(&self) -> Result<(), BusError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(BusError::LoopAlreadyRunning);
        }
        debug!("message loop started");

        loop {
            let msg = self.receive();
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            self.dispatch(&msg);
        }

        // Reset on the way out so a stop raised while the loop was
        // winding down cannot strand the next loop.
        self.stop.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        debug!("message loop stopped");
        Ok(())
    }

    /// Stop a running dispatch loop.
    ///
    /// Raises the stop flag and posts a wake-up message so the loop
    /// observes the flag even while parked in [`receive`](Self::receive).
    pub fn request_stop(&self) -> Result<(), BusError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(BusError::LoopNotRunning);
        }
        self.stop.store(true, Ordering::SeqCst);
        self.post(Msg::new(0));
        Ok(())
    }

    /// True while a dispatch loop is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn dispatch(&self, msg: &Msg) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        match table.by_id.get_mut(&msg.id()) {
            Some(list) => {
                for callback in list.iter_mut() {
                    callback(msg);
                }
            }
            None => {
                if table.defaults.is_empty() {
                    trace!(id = msg.id(), "message dropped, nothing registered");
                }
                for callback in table.defaults.iter_mut() {
                    callback(msg);
                }
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

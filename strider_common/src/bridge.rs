//! Single-slot hand-off between the cyclic thread and relaxed-timing threads.
//!
//! ## Protocol
//!
//! A [`Handoff`] holds at most one value. Writers overwrite (latest wins),
//! readers take. The cyclic side uses the `offer`/`take` pair, which never
//! blocks: on lock contention the operation gives up immediately, dropping
//! the offered value or returning nothing. The relaxed side uses
//! `put`/`pop`, which may briefly contend on the lock but never wait for
//! data.
//!
//! The critical section on either side is a single `Option` move, so the
//! bound on cyclic-side contention is one bounded copy by the other side.
//!
//! ## Usage
//!
//! One cell per direction. [`MsgBridge`] pairs two cells into the
//! application/cycle message link; the telemetry path uses a bare cell.

use std::sync::{Mutex, PoisonError};

use crate::msg::RtMsg;

/// A latest-wins, single-slot hand-off cell.
#[derive(Debug)]
pub struct Handoff<T> {
    slot: Mutex<Option<T>>,
}

// An empty cell needs no `T: Default`, which the derive would require.
impl<T> Default for Handoff<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Handoff<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Non-blocking write for the cyclic side.
    ///
    /// Overwrites any unconsumed value. Returns `false` when the lock is
    /// contended; the offered value is dropped in that case.
    pub fn offer(&self, value: T) -> bool {
        match self.slot.try_lock() {
            Ok(mut slot) => {
                *slot = Some(value);
                true
            }
            Err(_) => false,
        }
    }

    /// Non-blocking read for the cyclic side.
    ///
    /// Returns `None` when the slot is empty or the lock is contended.
    pub fn take(&self) -> Option<T> {
        match self.slot.try_lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        }
    }

    /// Write from a relaxed-timing thread. Overwrites any unconsumed value.
    pub fn put(&self, value: T) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(value);
    }

    /// Read from a relaxed-timing thread. Does not wait for data.
    pub fn pop(&self) -> Option<T> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// The message link between application threads and the cycle.
///
/// One inbound and one outbound [`Handoff`] slot; each direction carries
/// at most one pending [`RtMsg`].
#[derive(Debug, Default)]
pub struct MsgBridge {
    to_cycle: Handoff<RtMsg>,
    from_cycle: Handoff<RtMsg>,
}

impl MsgBridge {
    pub fn new() -> Self {
        Self {
            to_cycle: Handoff::new(),
            from_cycle: Handoff::new(),
        }
    }

    // ── Application side ────────────────────────────────────────────

    /// Deposit a message for the next cycle. Overwrites an unconsumed one.
    pub fn send_to_cycle(&self, msg: RtMsg) {
        self.to_cycle.put(msg);
    }

    /// Collect the latest message the cycle produced, if any.
    pub fn recv_from_cycle(&self) -> Option<RtMsg> {
        self.from_cycle.pop()
    }

    // ── Cyclic side ─────────────────────────────────────────────────

    /// Poll the inbound slot. Never blocks.
    pub fn cycle_take(&self) -> Option<RtMsg> {
        self.to_cycle.take()
    }

    /// Publish an outbound message. Never blocks; latest wins.
    pub fn cycle_offer(&self, msg: RtMsg) -> bool {
        self.from_cycle.offer(msg)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn offer_overwrites_latest_wins() {
        let cell = Handoff::new();
        assert!(cell.offer(1));
        assert!(cell.offer(2));
        assert_eq!(cell.take(), Some(2));
        assert_eq!(cell.take(), None);
    }

    #[test]
    fn put_and_pop_mirror_the_cycle_side() {
        let cell = Handoff::new();
        cell.put("a");
        cell.put("b");
        assert_eq!(cell.pop(), Some("b"));
        assert_eq!(cell.pop(), None);
    }

    #[test]
    fn default_cells_start_empty_without_a_default_payload() {
        // RtMsg itself has no Default; the cell must not demand one.
        let cell: Handoff<RtMsg> = Handoff::default();
        assert!(cell.pop().is_none());

        let bridge = MsgBridge::default();
        assert!(bridge.cycle_take().is_none());
        assert!(bridge.recv_from_cycle().is_none());
    }

    #[test]
    fn bridge_carries_one_message_each_way() {
        let bridge = MsgBridge::new();

        bridge.send_to_cycle(RtMsg::with_payload(1, b"in").unwrap());
        let inbound = bridge.cycle_take().unwrap();
        assert_eq!(inbound.id(), 1);
        assert!(bridge.cycle_take().is_none());

        assert!(bridge.cycle_offer(RtMsg::with_payload(2, b"out").unwrap()));
        let outbound = bridge.recv_from_cycle().unwrap();
        assert_eq!(outbound.payload(), b"out");
    }

    #[test]
    fn concurrent_producer_consumer_never_deadlocks() {
        let cell = Arc::new(Handoff::new());
        let producer = {
            let cell = Arc::clone(&cell);
            thread::spawn(move || {
                for i in 0..10_000u64 {
                    cell.put(i);
                }
            })
        };

        let mut last_seen = 0u64;
        while !producer.is_finished() {
            if let Some(v) = cell.take() {
                assert!(v >= last_seen, "values must be monotonic, latest wins");
                last_seen = v;
            }
        }
        producer.join().unwrap();
        // Whatever remains is the final value or nothing.
        if let Some(v) = cell.pop() {
            assert_eq!(v, 9_999);
        }
    }
}

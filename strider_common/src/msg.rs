//! Message types.
//!
//! Two flavors of the same id + payload shape:
//!
//! - [`Msg`] lives on the heap and travels through the application
//!   [message bus](crate::bus).
//! - [`RtMsg`] has a fixed capacity and travels through the RT/NRT
//!   [hand-off](crate::bridge); the cyclic domain never allocates.

use thiserror::Error;

/// Payload capacity of an [`RtMsg`], in bytes.
pub const RT_MSG_CAPACITY: usize = 8192;

/// Message errors.
#[derive(Debug, Error)]
pub enum MsgError {
    /// Payload does not fit into an [`RtMsg`].
    #[error("payload of {len} bytes exceeds RT message capacity of {RT_MSG_CAPACITY}")]
    PayloadTooLarge { len: usize },
}

/// Heap-allocated message for the application message bus.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Msg {
    id: i32,
    payload: Vec<u8>,
}

impl Msg {
    /// Create an empty message with the given id.
    pub fn new(id: i32) -> Self {
        Self {
            id,
            payload: Vec::new(),
        }
    }

    /// Create a message carrying a copy of `payload`.
    pub fn with_payload(id: i32, payload: &[u8]) -> Self {
        Self {
            id,
            payload: payload.to_vec(),
        }
    }

    #[inline]
    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn set_id(&mut self, id: i32) {
        self.id = id;
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Fixed-capacity message for the RT/NRT hand-off.
///
/// Moves by value through a [`crate::bridge::Handoff`] slot; both
/// directions carry at most one of these at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtMsg {
    id: i32,
    data: heapless::Vec<u8, RT_MSG_CAPACITY>,
}

impl RtMsg {
    /// Create an empty RT message with the given id.
    pub fn new(id: i32) -> Self {
        Self {
            id,
            data: heapless::Vec::new(),
        }
    }

    /// Create an RT message carrying a copy of `payload`.
    ///
    /// Fails when the payload exceeds [`RT_MSG_CAPACITY`].
    pub fn with_payload(id: i32, payload: &[u8]) -> Result<Self, MsgError> {
        let mut msg = Self::new(id);
        msg.set_payload(payload)?;
        Ok(msg)
    }

    /// Replace the payload. Fails when it exceeds [`RT_MSG_CAPACITY`].
    pub fn set_payload(&mut self, payload: &[u8]) -> Result<(), MsgError> {
        self.data.clear();
        self.data
            .extend_from_slice(payload)
            .map_err(|_| MsgError::PayloadTooLarge { len: payload.len() })
    }

    #[inline]
    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn set_id(&mut self, id: i32) {
        self.id = id;
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Copy into a heap [`Msg`] for the application side.
    pub fn to_msg(&self) -> Msg {
        Msg::with_payload(self.id, &self.data)
    }
}

impl TryFrom<&Msg> for RtMsg {
    type Error = MsgError;

    fn try_from(msg: &Msg) -> Result<Self, Self::Error> {
        Self::with_payload(msg.id(), msg.payload())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

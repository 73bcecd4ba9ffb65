//! Prelude module for common re-exports.
//!
//! Convenient re-exports of the most-used types so that consumers can do
//! `use strider_common::prelude::*;` without listing individual paths.

// ─── Motion Data Model ──────────────────────────────────────────────
pub use crate::motion::{
    CmdStatus, DriveState, ForceReading, OpMode, ServoCmd, ServoFrame, StatusBits,
};

// ─── Messages ───────────────────────────────────────────────────────
pub use crate::msg::{Msg, MsgError, RT_MSG_CAPACITY, RtMsg};

// ─── Bus & Bridge ───────────────────────────────────────────────────
pub use crate::bridge::{Handoff, MsgBridge};
pub use crate::bus::{BusError, Callback, MsgBus};

// ─── Telemetry ──────────────────────────────────────────────────────
pub use crate::telemetry::{
    ForceCompact, ImuCompact, SAMPLE_FORCE_SLOTS, SAMPLE_SERVO_SLOTS, SAMPLE_SIZE, TelemetrySample,
};

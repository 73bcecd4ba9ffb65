//! Strider Common Library
//!
//! Shared substrate for the strider motion controller: the motion data
//! model exchanged between the cyclic domain and everything else, the
//! application message bus, and the single-slot hand-off cells that
//! connect real-time and relaxed-timing threads.
//!
//! # Module Structure
//!
//! - [`motion`] - Servo frames, commands, modes, drive states
//! - [`msg`] - Heap and fixed-capacity messages
//! - [`bus`] - Queued message bus with a callback dispatch loop
//! - [`bridge`] - Latest-wins hand-off between RT and non-RT threads
//! - [`telemetry`] - Fixed-layout telemetry sample emitted each cycle
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use strider_common::prelude::*;
//! ```

pub mod bridge;
pub mod bus;
pub mod motion;
pub mod msg;
pub mod prelude;
pub mod telemetry;

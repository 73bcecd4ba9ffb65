//! Strider Motion Library
//!
//! Cyclic motion-control core: per-actuator servo state machines, force
//! sensor baseline zeroing, the cycle orchestrator, and the telemetry
//! emitter, all over a pluggable cyclic transport.
//!
//! # Module Structure
//!
//! - [`servo`] - Servo drive state machine over the process-data channels
//! - [`force`] - Force sensor scaling and baseline zeroing
//! - [`controller`] - Cycle orchestrator, strategy view, identity maps
//! - [`emitter`] - Telemetry emitter task (UDP + binary log sinks)
//! - [`transport`] - `PdoLink`/`CyclicMaster` transport interfaces
//! - [`sim`] - Software transport emulating drives and sensors
//! - [`config`] - TOML configuration with validation
//! - [`rt`] - RT setup (memory locking, affinity, SCHED_FIFO) and stats
//! - [`error`] - Configuration and lifecycle error types
//!
//! # Architecture
//!
//! ```text
//!  application threads                    cyclic thread (1 kHz)
//!  ┌──────────────────┐  MsgBridge   ┌──────────────────────────┐
//!  │ strategy owner,  │◄────────────►│ MotionController::cycle  │
//!  │ IMU driver, ...  │  ImuShare──► │  read → strategy → exec  │
//!  └──────────────────┘              └─────┬──────────────┬─────┘
//!  ┌──────────────────┐   Handoff         │              │ PdoLink
//!  │ TelemetryTask    │◄──────────────────┘        ┌─────▼─────┐
//!  │  UDP + binary log│   TelemetrySample          │CyclicMaster│
//!  └──────────────────┘                            └───────────┘
//! ```

#![deny(clippy::disallowed_types)]

pub mod config;
pub mod controller;
pub mod emitter;
pub mod error;
pub mod force;
pub mod rt;
pub mod servo;
pub mod sim;
pub mod transport;

pub use crate::config::MotionConfig;
pub use crate::controller::{CycleView, ImuShare, MotionController};
pub use crate::error::{ConfigError, ControlError};
pub use crate::sim::SimMaster;

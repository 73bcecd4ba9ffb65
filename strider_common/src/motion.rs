//! Shared motion data model.
//!
//! Command/mode enums, drive state decoding, and the per-actuator
//! [`ServoFrame`] exchanged between the cyclic domain, strategies, and
//! the telemetry path. `ServoFrame` uses `#[repr(C)]` with a fixed field
//! order because it is embedded verbatim in the telemetry wire format.

use bitflags::bitflags;
use static_assertions::const_assert_eq;

// ─── Control Words and Modes ────────────────────────────────────────

/// Control word requesting the Stopped power stage.
pub const CW_SHUTDOWN: u16 = 0x06;
/// Control word requesting the Enabled power stage.
pub const CW_SWITCH_ON: u16 = 0x07;
/// Control word requesting the Running power stage.
pub const CW_ENABLE_OP: u16 = 0x0F;
/// Control word acknowledging and clearing a drive fault.
pub const CW_FAULT_RESET: u16 = 0x80;
/// Control word asserting the homing procedure while in homing mode.
pub const CW_HOMING_START: u16 = 0x1F;

/// Mode-of-operation value for the drive-internal homing procedure.
/// Never carried in a [`ServoFrame`]; drives pass through it only during
/// the homing sequence.
pub const MODE_HOMING: u8 = 0x06;

/// Requested per-cycle command for one actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServoCmd {
    /// No bus action this cycle.
    Idle = 0,
    /// Walk the drive up to the Running power stage.
    Enable = 1,
    /// Walk the drive down to the Stopped power stage.
    Disable = 2,
    /// Run the drive-internal homing procedure.
    Home = 3,
    /// Track the target for the active operation mode.
    Run = 4,
}

impl ServoCmd {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Idle),
            1 => Some(Self::Enable),
            2 => Some(Self::Disable),
            3 => Some(Self::Home),
            4 => Some(Self::Run),
            _ => None,
        }
    }
}

impl Default for ServoCmd {
    fn default() -> Self {
        Self::Idle
    }
}

/// Drive operation mode. Discriminants are the on-the-wire
/// mode-of-operation values.
///
/// `Position` has no drive-side loop of its own: it runs on the velocity
/// loop with a proportional correction computed host-side, so a drive
/// commanded into `Position` is programmed to `Velocity` on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpMode {
    /// Host-side position loop over the drive velocity loop.
    Position = 0x08,
    /// Drive-internal velocity loop.
    Velocity = 0x09,
    /// Drive-internal current (torque) loop.
    Current = 0x10,
}

impl OpMode {
    /// Convert from raw `u8`. Returns `None` for invalid values.
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x08 => Some(Self::Position),
            0x09 => Some(Self::Velocity),
            0x10 => Some(Self::Current),
            _ => None,
        }
    }

    /// The mode-of-operation value actually programmed on the bus.
    /// `Position` maps to the velocity loop.
    #[inline]
    pub const fn wire_mode(self) -> u8 {
        match self {
            Self::Position | Self::Velocity => Self::Velocity as u8,
            Self::Current => Self::Current as u8,
        }
    }
}

impl Default for OpMode {
    fn default() -> Self {
        Self::Position
    }
}

// ─── Status Word Decoding ───────────────────────────────────────────

/// Mask selecting the power-stage nibble of the status word.
pub const STATE_NIBBLE_MASK: u16 = 0x000F;

bitflags! {
    /// Individual status-word bits consulted outside the state nibble.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusBits: u16 {
        /// Mode-dependent acknowledge: homing attained while in homing mode.
        const TARGET_REACHED = 0x1000;
    }
}

impl Default for StatusBits {
    fn default() -> Self {
        Self::empty()
    }
}

/// Drive power stage decoded from the status-word nibble.
///
/// Any nibble outside the four known stages is a fault indication and
/// decodes to `Fault`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriveState {
    /// Power stage off (nibble `0x0`).
    PoweredOff,
    /// Ready, power stage off (nibble `0x1`).
    Stopped,
    /// Power stage on, operation disabled (nibble `0x3`).
    Enabled,
    /// Operation enabled, targets are tracked (nibble `0x7`).
    Running,
    /// Any other nibble.
    Fault,
}

impl DriveState {
    /// Decode the power stage from a raw status word.
    #[inline]
    pub const fn from_status(status_word: u16) -> Self {
        match status_word & STATE_NIBBLE_MASK {
            0x0 => Self::PoweredOff,
            0x1 => Self::Stopped,
            0x3 => Self::Enabled,
            0x7 => Self::Running,
            _ => Self::Fault,
        }
    }

    /// True exactly when the nibble decodes to `Fault`.
    #[inline]
    pub const fn is_fault(self) -> bool {
        matches!(self, Self::Fault)
    }
}

// ─── Command Results ────────────────────────────────────────────────

/// Result of one command execution step, returned by the drive layer and
/// recorded by the orchestrator in [`ServoFrame::ret`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum CmdStatus {
    /// Preconditions unmet; nothing was written to the bus.
    Rejected = -1,
    /// Converged or accepted.
    Done = 0,
    /// Still progressing; call again next cycle.
    Busy = 1,
}

impl CmdStatus {
    /// The value stored in [`ServoFrame::ret`].
    #[inline]
    pub const fn as_ret(self) -> i16 {
        self as i16
    }

    #[inline]
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Done)
    }
}

// ─── Servo Frame ────────────────────────────────────────────────────

/// Per-actuator command + feedback image for one cycle.
///
/// Field order and types are a wire contract: frames are embedded raw in
/// [`crate::telemetry::TelemetrySample`]. Targets are written by
/// strategies; feedback fields are refreshed by the drive layer; `ret`
/// is written by the orchestrator after command execution.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct ServoFrame {
    /// Commanded position, encoder counts.
    pub target_pos: i32,
    /// Measured position (offset applied), encoder counts.
    pub feedback_pos: i32,
    /// Commanded velocity, counts per cycle reference.
    pub target_vel: i32,
    /// Measured velocity.
    pub feedback_vel: i32,
    /// Commanded current.
    pub target_cur: i16,
    /// Measured current.
    pub feedback_cur: i16,
    /// Requested command for this cycle.
    pub cmd: ServoCmd,
    /// Requested operation mode for this cycle.
    pub mode: OpMode,
    /// Drive status word as read this cycle.
    pub status_word: u16,
    /// Digital-inputs word from the drive.
    pub feedback_dgi: i32,
    /// Result code of the last command execution ([`CmdStatus::as_ret`]).
    pub ret: i16,
}

// Wire contract: 2 bytes of tail padding bring the frame to 32 bytes.
const_assert_eq!(core::mem::size_of::<ServoFrame>(), 32);
const_assert_eq!(core::mem::align_of::<ServoFrame>(), 4);

impl Default for ServoFrame {
    fn default() -> Self {
        Self {
            target_pos: 0,
            feedback_pos: 0,
            target_vel: 0,
            feedback_vel: 0,
            target_cur: 0,
            feedback_cur: 0,
            cmd: ServoCmd::Idle,
            mode: OpMode::Position,
            status_word: 0,
            feedback_dgi: 0,
            ret: 0,
        }
    }
}

impl ServoFrame {
    /// Drive power stage decoded from this frame's status word.
    #[inline]
    pub fn drive_state(&self) -> DriveState {
        DriveState::from_status(self.status_word)
    }
}

// ─── Force Reading ──────────────────────────────────────────────────

/// Per-sensor force/torque reading for one cycle.
///
/// Channels are ratio-scaled and baseline-subtracted by the sensor
/// layer. Strategies may raise `zeroing_requested` to ask for a new
/// baseline; the orchestrator consumes and clears the flag after the
/// strategy returns.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ForceReading {
    /// Fx, Fy, Fz, Mx, My, Mz.
    pub fce: [f64; 6],
    /// Set by a strategy to request baseline re-acquisition.
    pub zeroing_requested: bool,
}

impl ForceReading {
    #[inline]
    pub const fn fx(&self) -> f64 {
        self.fce[0]
    }

    #[inline]
    pub const fn fy(&self) -> f64 {
        self.fce[1]
    }

    #[inline]
    pub const fn fz(&self) -> f64 {
        self.fce[2]
    }

    #[inline]
    pub const fn mx(&self) -> f64 {
        self.fce[3]
    }

    #[inline]
    pub const fn my(&self) -> f64 {
        self.fce[4]
    }

    #[inline]
    pub const fn mz(&self) -> f64 {
        self.fce[5]
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

//! Fixed-layout telemetry sample.
//!
//! One [`TelemetrySample`] is produced per cycle and handed to the
//! telemetry emitter, which forwards it as raw bytes to the network sink
//! and the binary log. The `#[repr(C)]` layout below *is* the wire
//! format; decoders depend on it, so every size is asserted at compile
//! time.
//!
//! ## Layout
//!
//! ```text
//! [0..4]     cycle_count : i32
//! [4..16]    imu         : ImuCompact   (3 × f32)
//! [16..624]  servo       : [ServoFrame; 19]   (19 × 32 bytes)
//! [624..792] force       : [ForceCompact; 7]  (7 × 24 bytes)
//! ```

use static_assertions::const_assert_eq;

use crate::motion::{ForceReading, ServoFrame};

/// Servo slots in the wire format. Controllers with fewer actuators
/// zero-fill the tail; more are truncated.
pub const SAMPLE_SERVO_SLOTS: usize = 19;

/// Force-sensor slots in the wire format.
pub const SAMPLE_FORCE_SLOTS: usize = 7;

/// Total sample size on the wire, in bytes.
pub const SAMPLE_SIZE: usize = 792;

/// Compacted IMU orientation, radians.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct ImuCompact {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

/// Compacted force/torque reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct ForceCompact {
    pub fx: f32,
    pub fy: f32,
    pub fz: f32,
    pub mx: f32,
    pub my: f32,
    pub mz: f32,
}

impl From<&ForceReading> for ForceCompact {
    fn from(reading: &ForceReading) -> Self {
        Self {
            fx: reading.fx() as f32,
            fy: reading.fy() as f32,
            fz: reading.fz() as f32,
            mx: reading.mx() as f32,
            my: reading.my() as f32,
            mz: reading.mz() as f32,
        }
    }
}

/// One cycle's telemetry snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct TelemetrySample {
    /// Cycle counter at snapshot time.
    pub cycle_count: i32,
    /// IMU orientation snapshot.
    pub imu: ImuCompact,
    /// Per-actuator frames, logical order, zero-filled tail.
    pub servo: [ServoFrame; SAMPLE_SERVO_SLOTS],
    /// Per-sensor compact readings, logical order, zero-filled tail.
    pub force: [ForceCompact; SAMPLE_FORCE_SLOTS],
}

const_assert_eq!(core::mem::size_of::<TelemetrySample>(), SAMPLE_SIZE);
const_assert_eq!(core::mem::align_of::<TelemetrySample>(), 4);
const_assert_eq!(core::mem::size_of::<ImuCompact>(), 12);
const_assert_eq!(core::mem::size_of::<ForceCompact>(), 24);

impl Default for TelemetrySample {
    fn default() -> Self {
        Self {
            cycle_count: 0,
            imu: ImuCompact::default(),
            servo: [ServoFrame::default(); SAMPLE_SERVO_SLOTS],
            force: [ForceCompact::default(); SAMPLE_FORCE_SLOTS],
        }
    }
}

impl TelemetrySample {
    /// Copy per-actuator frames in, truncating or zero-filling to the
    /// wire slot count.
    pub fn load_frames(&mut self, frames: &[ServoFrame]) {
        let n = frames.len().min(SAMPLE_SERVO_SLOTS);
        self.servo[..n].copy_from_slice(&frames[..n]);
        for slot in self.servo[n..].iter_mut() {
            *slot = ServoFrame::default();
        }
    }

    /// Compact force readings in, truncating or zero-filling.
    pub fn load_force(&mut self, readings: &[ForceReading]) {
        let n = readings.len().min(SAMPLE_FORCE_SLOTS);
        for (slot, reading) in self.force[..n].iter_mut().zip(readings) {
            *slot = ForceCompact::from(reading);
        }
        for slot in self.force[n..].iter_mut() {
            *slot = ForceCompact::default();
        }
    }

    /// The raw wire bytes of this sample.
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: Self is #[repr(C)] and built only from plain numeric
        // fields and field-less repr(u8) enums; the size is the asserted
        // wire size. Padding bytes (2 per embedded frame) are emitted
        // as-is, as the wire format expects.
        unsafe {
            core::slice::from_raw_parts(
                (self as *const Self).cast::<u8>(),
                core::mem::size_of::<Self>(),
            )
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_sizes_hold() {
        assert_eq!(core::mem::size_of::<TelemetrySample>(), SAMPLE_SIZE);
        assert_eq!(core::mem::size_of::<ServoFrame>(), 32);
        assert_eq!(TelemetrySample::default().as_bytes().len(), SAMPLE_SIZE);
    }

    #[test]
    fn cycle_count_leads_the_wire_image() {
        let sample = TelemetrySample {
            cycle_count: 0x0102_0304,
            ..Default::default()
        };
        let bytes = sample.as_bytes();
        assert_eq!(bytes[..4], 0x0102_0304_i32.to_ne_bytes());
    }

    #[test]
    fn load_frames_truncates_and_zero_fills() {
        let mut sample = TelemetrySample::default();

        let frame = ServoFrame {
            target_pos: 77,
            ..Default::default()
        };
        sample.load_frames(&[frame; SAMPLE_SERVO_SLOTS + 3]);
        assert!(sample.servo.iter().all(|f| f.target_pos == 77));

        sample.load_frames(&[frame; 2]);
        assert_eq!(sample.servo[1].target_pos, 77);
        assert_eq!(sample.servo[2], ServoFrame::default());
    }

    #[test]
    fn load_force_compacts_readings() {
        let mut sample = TelemetrySample::default();
        let reading = ForceReading {
            fce: [1.5, 2.5, 3.5, -1.0, -2.0, -3.0],
            zeroing_requested: true,
        };
        sample.load_force(&[reading]);
        assert_eq!(sample.force[0].fx, 1.5);
        assert_eq!(sample.force[0].mz, -3.0);
        assert_eq!(sample.force[1], ForceCompact::default());
    }
}

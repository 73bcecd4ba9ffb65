//! Six-axis force sensor acquisition and baseline zeroing.
//!
//! One [`ForceSensor`] per force slave. Raw channels are scaled by the
//! device's force/torque divisors and reported relative to a baseline.
//! A strategy can request a fresh baseline; the sensor then averages a
//! fixed window of scaled raw readings before swapping it in. During
//! the window readings keep using the previous baseline, so consumers
//! see no discontinuity until the swap.

use strider_common::motion::ForceReading;
use tracing::info;

use crate::transport::{PdoLink, force_chan};

/// Cycles averaged into a new baseline.
pub const ZEROING_WINDOW: i32 = 500;

/// State machine for one force sensor slave.
#[derive(Debug)]
pub struct ForceSensor {
    slot: usize,
    phy_id: usize,
    abs_id: usize,
    force_ratio: f64,
    torque_ratio: f64,
    base: [f64; 6],
    sum: [f64; 6],
    zeroing_count_left: i32,
}

impl ForceSensor {
    /// `slot` is the physical bus slot, `phy_id` the physical index
    /// within the force-sensor class, `abs_id` the logical ID.
    pub fn new(slot: usize, phy_id: usize, abs_id: usize) -> Self {
        Self {
            slot,
            phy_id,
            abs_id,
            force_ratio: 1.0,
            torque_ratio: 1.0,
            base: [0.0; 6],
            sum: [0.0; 6],
            zeroing_count_left: -1,
        }
    }

    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn phy_id(&self) -> usize {
        self.phy_id
    }

    pub fn abs_id(&self) -> usize {
        self.abs_id
    }

    /// Read the scaling divisors from the device parameters and reset
    /// the baseline state. Devices that do not expose the parameters
    /// keep unit ratios.
    pub fn init(&mut self, link: &dyn PdoLink) {
        if let Some(ratio) = link.read_param(force_chan::PARAM_FORCE_RATIO) {
            self.force_ratio = f64::from(ratio);
        }
        if let Some(ratio) = link.read_param(force_chan::PARAM_TORQUE_RATIO) {
            self.torque_ratio = f64::from(ratio);
        }
        self.base = [0.0; 6];
        self.sum = [0.0; 6];
        self.zeroing_count_left = -1;
    }

    /// Acquire one cycle: read and scale the six raw channels, advance
    /// the zeroing window, and store the baseline-subtracted values
    /// into `reading.fce`. The `zeroing_requested` flag is not
    /// touched; it belongs to the strategy/orchestrator exchange.
    pub fn read_data(&mut self, link: &dyn PdoLink, reading: &mut ForceReading) {
        let mut raw = [0.0f64; 6];
        for (i, ch) in force_chan::CHANNELS.iter().enumerate() {
            let ratio = if i < 3 {
                self.force_ratio
            } else {
                self.torque_ratio
            };
            raw[i] = f64::from(link.read_i32(*ch).unwrap_or(0)) / ratio;
        }

        if self.zeroing_count_left > 0 {
            self.zeroing_count_left -= 1;
            for i in 0..6 {
                self.sum[i] += raw[i];
            }
        } else if self.zeroing_count_left == 0 {
            for i in 0..6 {
                self.base[i] = self.sum[i] / f64::from(ZEROING_WINDOW);
            }
            self.zeroing_count_left -= 1;
            info!(abs_id = self.abs_id, "force baseline zeroing completed");
        }

        for i in 0..6 {
            reading.fce[i] = raw[i] - self.base[i];
        }
    }

    /// Arm a new baseline window. Ignored while one is in flight or
    /// awaiting finalization.
    pub fn require_zeroing(&mut self) {
        if self.zeroing_count_left >= 0 {
            return;
        }

        self.sum = [0.0; 6];
        self.zeroing_count_left = ZEROING_WINDOW;
        info!(abs_id = self.abs_id, "force baseline zeroing started");
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

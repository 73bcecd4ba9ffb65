//! Software bus transport for tests and demos.
//!
//! [`SimMaster`] implements [`CyclicMaster`] over emulated slaves built
//! from the configured topology. Servo slaves model the drive power
//! ladder, mode display, homing, and velocity integration; force slaves
//! produce settable constant channel values. Staged writes take effect
//! on [`CyclicMaster::exchange`], like a real bus latching its output
//! image once per period.

use std::collections::HashMap;
use std::time::Duration;

use strider_common::motion::{
    CW_ENABLE_OP, CW_FAULT_RESET, CW_HOMING_START, CW_SHUTDOWN, CW_SWITCH_ON, MODE_HOMING,
};

use crate::config::{MotionConfig, SlaveConfig};
use crate::transport::{CyclicMaster, Pdo, PdoLink, force_chan, servo_chan};

/// Asserted homing cycles before a simulated drive reports attained.
pub const HOMING_CYCLES: u32 = 20;

/// Force scaling divisor exposed by simulated force sensors.
pub const SIM_FORCE_RATIO: i32 = 1_000_000;

/// Torque scaling divisor exposed by simulated force sensors.
pub const SIM_TORQUE_RATIO: i32 = 1_000;

fn le_u16(buf: &[u8]) -> Option<u16> {
    buf.try_into().ok().map(u16::from_le_bytes)
}

fn le_i16(buf: &[u8]) -> Option<i16> {
    buf.try_into().ok().map(i16::from_le_bytes)
}

fn le_i32(buf: &[u8]) -> Option<i32> {
    buf.try_into().ok().map(i32::from_le_bytes)
}

fn fill(buf: &mut [u8], bytes: &[u8]) -> bool {
    if buf.len() == bytes.len() {
        buf.copy_from_slice(bytes);
        true
    } else {
        false
    }
}

// ─── Servo Slave Model ──────────────────────────────────────────────

/// Emulated servo drive.
#[derive(Debug)]
pub struct SimServo {
    out_control_word: u16,
    out_mode_select: u8,
    out_target_vel: i32,
    out_target_cur: i16,
    out_cur_limit: i16,

    nibble: u16,
    mode_display: u8,
    homing_attained: bool,
    homing_cycles_left: u32,
    position: f64,
    velocity: i32,
    current: i16,
    digital_inputs: u32,
    params: HashMap<u16, i32>,
}

impl SimServo {
    pub fn new() -> Self {
        Self {
            out_control_word: 0,
            out_mode_select: 0,
            out_target_vel: 0,
            out_target_cur: 0,
            out_cur_limit: 1500,
            nibble: 0x0,
            mode_display: 0,
            homing_attained: false,
            homing_cycles_left: HOMING_CYCLES,
            position: 0.0,
            velocity: 0,
            current: 0,
            digital_inputs: 0,
            params: HashMap::new(),
        }
    }

    /// Force the drive into a fault nibble. Cleared by a fault reset.
    pub fn inject_fault(&mut self) {
        self.nibble = 0x8;
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn set_position(&mut self, position: f64) {
        self.position = position;
    }

    pub fn set_digital_inputs(&mut self, dgi: u32) {
        self.digital_inputs = dgi;
    }

    /// Setup-time parameter written by the controller (homing method,
    /// homing offset).
    pub fn param(&self, index: u16) -> Option<i32> {
        self.params.get(&index).copied()
    }

    fn status(&self) -> u16 {
        self.nibble | if self.homing_attained { 0x1000 } else { 0 }
    }

    /// Advance the drive model by one period.
    fn step(&mut self, dt: Duration) {
        // Power ladder reacts to the latched control word each period.
        match self.out_control_word {
            CW_SHUTDOWN => {
                if self.nibble == 0x0 || self.nibble == 0x3 || self.nibble == 0x7 {
                    self.nibble = 0x1;
                }
            }
            CW_SWITCH_ON => {
                if self.nibble == 0x1 {
                    self.nibble = 0x3;
                }
            }
            CW_ENABLE_OP => {
                if self.nibble == 0x3 {
                    self.nibble = 0x7;
                }
            }
            CW_FAULT_RESET => {
                if self.nibble != 0x1 && self.nibble != 0x3 && self.nibble != 0x7 {
                    self.nibble = 0x0;
                }
            }
            _ => {}
        }

        // Mode display follows the latched select; crossing into or out
        // of homing restarts the procedure.
        if self.out_mode_select != self.mode_display {
            if self.mode_display == MODE_HOMING || self.out_mode_select == MODE_HOMING {
                self.homing_attained = false;
                self.homing_cycles_left = HOMING_CYCLES;
            }
            self.mode_display = self.out_mode_select;
        }

        if self.out_control_word == CW_HOMING_START
            && self.mode_display == MODE_HOMING
            && self.nibble == 0x7
            && !self.homing_attained
        {
            self.homing_cycles_left -= 1;
            if self.homing_cycles_left == 0 {
                self.homing_attained = true;
                self.position = 0.0;
            }
        }

        if self.nibble == 0x7 {
            match self.mode_display {
                0x09 => {
                    self.velocity = self.out_target_vel;
                    self.position += f64::from(self.velocity) * dt.as_secs_f64();
                }
                0x10 => {
                    let limit = self.out_cur_limit.checked_abs().unwrap_or(i16::MAX);
                    self.current = self.out_target_cur.max(-limit).min(limit);
                }
                _ => {
                    self.velocity = 0;
                }
            }
        } else {
            self.velocity = 0;
            self.current = 0;
        }
    }
}

impl Default for SimServo {
    fn default() -> Self {
        Self::new()
    }
}

impl PdoLink for SimServo {
    fn read_raw(&self, pdo: Pdo, buf: &mut [u8]) -> bool {
        match pdo {
            servo_chan::POSITION => fill(buf, &(self.position as i32).to_le_bytes()),
            servo_chan::DIGITAL_INPUTS => fill(buf, &self.digital_inputs.to_le_bytes()),
            servo_chan::VELOCITY => fill(buf, &self.velocity.to_le_bytes()),
            servo_chan::STATUS_WORD => fill(buf, &self.status().to_le_bytes()),
            servo_chan::CURRENT => fill(buf, &self.current.to_le_bytes()),
            servo_chan::MODE_DISPLAY => fill(buf, &[self.mode_display]),
            _ => false,
        }
    }

    fn write_raw(&mut self, pdo: Pdo, buf: &[u8]) {
        match pdo {
            servo_chan::TARGET_VEL => {
                if let Some(value) = le_i32(buf) {
                    self.out_target_vel = value;
                }
            }
            servo_chan::TARGET_CUR => {
                if let Some(value) = le_i16(buf) {
                    self.out_target_cur = value;
                }
            }
            servo_chan::CUR_LIMIT => {
                if let Some(value) = le_i16(buf) {
                    self.out_cur_limit = value;
                }
            }
            servo_chan::CONTROL_WORD => {
                if let Some(value) = le_u16(buf) {
                    self.out_control_word = value;
                }
            }
            servo_chan::MODE_SELECT => {
                if let [value] = buf {
                    self.out_mode_select = *value;
                }
            }
            _ => {}
        }
    }

    fn read_param(&self, index: u16) -> Option<i32> {
        self.params.get(&index).copied()
    }

    fn write_param(&mut self, index: u16, value: i32) {
        self.params.insert(index, value);
    }
}

// ─── Force Slave Model ──────────────────────────────────────────────

/// Emulated six-axis force sensor with settable raw channel values and
/// optional per-period baseline drift.
#[derive(Debug)]
pub struct SimForce {
    raw: [i32; 6],
    drift: [i32; 6],
    params: HashMap<u16, i32>,
}

impl SimForce {
    pub fn new() -> Self {
        let mut params = HashMap::new();
        params.insert(force_chan::PARAM_FORCE_RATIO, SIM_FORCE_RATIO);
        params.insert(force_chan::PARAM_TORQUE_RATIO, SIM_TORQUE_RATIO);
        Self {
            raw: [0; 6],
            drift: [0; 6],
            params,
        }
    }

    /// Set one raw channel value (0..=2 force, 3..=5 torque).
    pub fn set_raw(&mut self, channel: usize, value: i32) {
        self.raw[channel] = value;
    }

    /// Add a constant per-period drift to one raw channel.
    pub fn set_drift(&mut self, channel: usize, per_period: i32) {
        self.drift[channel] = per_period;
    }

    fn step(&mut self) {
        for (raw, drift) in self.raw.iter_mut().zip(self.drift) {
            *raw = raw.wrapping_add(drift);
        }
    }
}

impl Default for SimForce {
    fn default() -> Self {
        Self::new()
    }
}

impl PdoLink for SimForce {
    fn read_raw(&self, pdo: Pdo, buf: &mut [u8]) -> bool {
        if pdo.group != 0 || usize::from(pdo.index) >= self.raw.len() {
            return false;
        }
        fill(buf, &self.raw[usize::from(pdo.index)].to_le_bytes())
    }

    fn write_raw(&mut self, _pdo: Pdo, _buf: &[u8]) {}

    fn read_param(&self, index: u16) -> Option<i32> {
        self.params.get(&index).copied()
    }

    fn write_param(&mut self, index: u16, value: i32) {
        self.params.insert(index, value);
    }
}

// ─── Passive Slave ──────────────────────────────────────────────────

/// Coupler/junction stand-in: occupies a slot, maps nothing.
#[derive(Debug, Default)]
pub struct SimPassive;

impl PdoLink for SimPassive {
    fn read_raw(&self, _pdo: Pdo, _buf: &mut [u8]) -> bool {
        false
    }

    fn write_raw(&mut self, _pdo: Pdo, _buf: &[u8]) {}

    fn read_param(&self, _index: u16) -> Option<i32> {
        None
    }

    fn write_param(&mut self, _index: u16, _value: i32) {}
}

// ─── Master ─────────────────────────────────────────────────────────

#[derive(Debug)]
enum SimSlave {
    Servo(SimServo),
    Force(SimForce),
    Passive(SimPassive),
}

impl PdoLink for SimSlave {
    fn read_raw(&self, pdo: Pdo, buf: &mut [u8]) -> bool {
        match self {
            Self::Servo(servo) => servo.read_raw(pdo, buf),
            Self::Force(force) => force.read_raw(pdo, buf),
            Self::Passive(passive) => passive.read_raw(pdo, buf),
        }
    }

    fn write_raw(&mut self, pdo: Pdo, buf: &[u8]) {
        match self {
            Self::Servo(servo) => servo.write_raw(pdo, buf),
            Self::Force(force) => force.write_raw(pdo, buf),
            Self::Passive(passive) => passive.write_raw(pdo, buf),
        }
    }

    fn read_param(&self, index: u16) -> Option<i32> {
        match self {
            Self::Servo(servo) => servo.read_param(index),
            Self::Force(force) => force.read_param(index),
            Self::Passive(passive) => passive.read_param(index),
        }
    }

    fn write_param(&mut self, index: u16, value: i32) {
        match self {
            Self::Servo(servo) => servo.write_param(index, value),
            Self::Force(force) => force.write_param(index, value),
            Self::Passive(passive) => passive.write_param(index, value),
        }
    }
}

/// Software cyclic master over emulated slaves.
#[derive(Debug)]
pub struct SimMaster {
    slaves: Vec<SimSlave>,
    dt: Duration,
}

impl SimMaster {
    /// Build emulated slaves matching the configured topology.
    pub fn from_config(config: &MotionConfig) -> Self {
        let slaves = config
            .slaves
            .iter()
            .map(|slave| match slave {
                SlaveConfig::Servo(_) => SimSlave::Servo(SimServo::new()),
                SlaveConfig::ForceSensor(_) => SimSlave::Force(SimForce::new()),
                SlaveConfig::Coupler | SlaveConfig::Junction => {
                    SimSlave::Passive(SimPassive)
                }
            })
            .collect();
        Self {
            slaves,
            dt: Duration::from_micros(u64::from(config.controller.cycle_period_us)),
        }
    }

    /// The servo model at `slot`, if that slot holds one.
    pub fn servo_mut(&mut self, slot: usize) -> Option<&mut SimServo> {
        match self.slaves.get_mut(slot) {
            Some(SimSlave::Servo(servo)) => Some(servo),
            _ => None,
        }
    }

    /// The force model at `slot`, if that slot holds one.
    pub fn force_mut(&mut self, slot: usize) -> Option<&mut SimForce> {
        match self.slaves.get_mut(slot) {
            Some(SimSlave::Force(force)) => Some(force),
            _ => None,
        }
    }
}

impl CyclicMaster for SimMaster {
    fn slave_count(&self) -> usize {
        self.slaves.len()
    }

    fn link(&mut self, slot: usize) -> &mut dyn PdoLink {
        &mut self.slaves[slot]
    }

    fn exchange(&mut self) {
        for slave in &mut self.slaves {
            match slave {
                SimSlave::Servo(servo) => servo.step(self.dt),
                SimSlave::Force(force) => force.step(),
                SimSlave::Passive(_) => {}
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

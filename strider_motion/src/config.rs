//! Controller configuration types.
//!
//! Loaded from `motion.toml`: the cycle period, the telemetry sinks,
//! and the bus topology as an ordered list of `[[slave]]` tables.
//! Slave declaration order is physical bus order; every declared slave
//! occupies a slot whether or not it has cyclic behavior.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::servo::{DEFAULT_KP, ServoSettings};

/// Default cycle period in microseconds.
pub const DEFAULT_CYCLE_PERIOD_US: u32 = 1000;

/// Default CPU core the cyclic thread pins to under the `rt` feature.
pub const DEFAULT_CPU_CORE: usize = 1;

/// Default SCHED_FIFO priority of the cyclic thread.
pub const DEFAULT_RT_PRIORITY: i32 = 80;

/// Default function for cycle_period_us
fn default_cycle_period_us() -> u32 {
    DEFAULT_CYCLE_PERIOD_US
}

/// Default function for cpu_core
fn default_cpu_core() -> usize {
    DEFAULT_CPU_CORE
}

/// Default function for rt_priority
fn default_rt_priority() -> i32 {
    DEFAULT_RT_PRIORITY
}

/// Default function for telemetry dest_addr
fn default_dest_addr() -> String {
    "127.0.0.1".to_string()
}

/// Default function for telemetry dest_port
fn default_dest_port() -> u16 {
    6666
}

/// Default function for telemetry local_port
fn default_local_port() -> u16 {
    6667
}

/// Default function for telemetry log_path
fn default_log_path() -> PathBuf {
    PathBuf::from("motion_data.bin")
}

/// Default true helper
fn default_true() -> bool {
    true
}

/// Default function for servo kp
fn default_kp() -> f64 {
    DEFAULT_KP
}

/// Main configuration loaded from `motion.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MotionConfig {
    /// Cycle pacing.
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Telemetry sink endpoints.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Bus topology in physical slot order.
    #[serde(default, rename = "slave")]
    pub slaves: Vec<SlaveConfig>,
}

/// `[controller]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Cycle period in microseconds. Defaults to 1000 (1 kHz).
    #[serde(default = "default_cycle_period_us")]
    pub cycle_period_us: u32,

    /// CPU core the cyclic thread pins to. Only used with the `rt`
    /// feature.
    #[serde(default = "default_cpu_core")]
    pub cpu_core: usize,

    /// SCHED_FIFO priority of the cyclic thread (1..=99). Only used
    /// with the `rt` feature.
    #[serde(default = "default_rt_priority")]
    pub rt_priority: i32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cycle_period_us: DEFAULT_CYCLE_PERIOD_US,
            cpu_core: DEFAULT_CPU_CORE,
            rt_priority: DEFAULT_RT_PRIORITY,
        }
    }
}

/// `[telemetry]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Destination address for the UDP sink.
    #[serde(default = "default_dest_addr")]
    pub dest_addr: String,

    /// Destination port for the UDP sink.
    #[serde(default = "default_dest_port")]
    pub dest_port: u16,

    /// Local port the UDP socket binds to.
    #[serde(default = "default_local_port")]
    pub local_port: u16,

    /// Binary log file path, truncated on start.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Whether the binary log sink is active.
    #[serde(default = "default_true")]
    pub log_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            dest_addr: default_dest_addr(),
            dest_port: default_dest_port(),
            local_port: default_local_port(),
            log_path: default_log_path(),
            log_enabled: true,
        }
    }
}

/// One `[[slave]]` table, dispatched on its `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlaveConfig {
    /// Servo actuator.
    Servo(ServoSlaveConfig),
    /// Six-axis force sensor.
    ForceSensor(ForceSlaveConfig),
    /// Bus coupler. Occupies a slot, no cyclic behavior.
    Coupler,
    /// Bus junction. Occupies a slot, no cyclic behavior.
    Junction,
}

/// Servo slave attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServoSlaveConfig {
    /// Scale from configured units to encoder counts. Must be
    /// non-zero; position, velocity, and home values below are
    /// multiplied by it into counts.
    pub input2count: i32,

    /// Position limits in configured units. Carried for strategies;
    /// not enforced by the command paths.
    pub max_pos: f64,
    pub min_pos: f64,

    /// Velocity clamp of the host-side position loop, configured
    /// units.
    pub max_vel: f64,

    /// Home position in configured units.
    pub home_pos: f64,

    /// Application-facing logical ID. Per class, logical IDs must form
    /// a permutation of `0..N-1`.
    pub abs_id: usize,

    /// Proportional gain of the host-side position loop.
    #[serde(default = "default_kp")]
    pub kp: f64,

    /// Drive homing method, programmed at init when present.
    #[serde(default)]
    pub home_mode: Option<i32>,
}

impl ServoSlaveConfig {
    /// Convert the unit-domain attributes into count-domain settings.
    pub fn settings(&self) -> ServoSettings {
        let scale = f64::from(self.input2count);
        ServoSettings {
            input2count: self.input2count,
            max_pos_count: (self.max_pos * scale) as i32,
            min_pos_count: (self.min_pos * scale) as i32,
            max_vel_count: (self.max_vel * scale) as i32,
            home_count: (self.home_pos * scale) as i32,
            abs_id: self.abs_id,
            kp: self.kp,
            home_mode: self.home_mode,
        }
    }
}

/// Force sensor slave attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForceSlaveConfig {
    /// Application-facing logical ID. Per class, logical IDs must form
    /// a permutation of `0..N-1`.
    pub abs_id: usize,
}

impl MotionConfig {
    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Validation Rules
    /// 1. `cycle_period_us` > 0
    /// 2. `rt_priority` in `1..=99`
    /// 3. Per servo: `input2count` != 0, `max_vel` >= 0
    /// 4. Per class, `abs_id`s form a permutation of `0..N-1`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.controller.cycle_period_us == 0 {
            return Err(ConfigError::Invalid(
                "cycle_period_us must be greater than 0".to_string(),
            ));
        }
        if !(1..=99).contains(&self.controller.rt_priority) {
            return Err(ConfigError::Invalid(format!(
                "rt_priority {} out of range [1, 99]",
                self.controller.rt_priority
            )));
        }

        let mut servo_ids = Vec::new();
        let mut force_ids = Vec::new();
        for (slot, slave) in self.slaves.iter().enumerate() {
            match slave {
                SlaveConfig::Servo(servo) => {
                    if servo.input2count == 0 {
                        return Err(ConfigError::Invalid(format!(
                            "slave {slot}: input2count must be non-zero"
                        )));
                    }
                    if servo.max_vel < 0.0 {
                        return Err(ConfigError::Invalid(format!(
                            "slave {slot}: max_vel must be >= 0"
                        )));
                    }
                    servo_ids.push(servo.abs_id);
                }
                SlaveConfig::ForceSensor(force) => force_ids.push(force.abs_id),
                SlaveConfig::Coupler | SlaveConfig::Junction => {}
            }
        }

        check_abs_ids("servo", &servo_ids)?;
        check_abs_ids("force sensor", &force_ids)?;
        Ok(())
    }

    /// Servo slave configurations in physical (declaration) order.
    pub fn servos(&self) -> impl Iterator<Item = &ServoSlaveConfig> {
        self.slaves.iter().filter_map(|slave| match slave {
            SlaveConfig::Servo(servo) => Some(servo),
            _ => None,
        })
    }

    /// Force sensor slave configurations in physical order.
    pub fn force_sensors(&self) -> impl Iterator<Item = &ForceSlaveConfig> {
        self.slaves.iter().filter_map(|slave| match slave {
            SlaveConfig::ForceSensor(force) => Some(force),
            _ => None,
        })
    }
}

/// Logical IDs within a class must be a permutation of `0..N-1`;
/// anything sparse or duplicated would leave a dangling identity
/// mapping.
fn check_abs_ids(class: &str, ids: &[usize]) -> Result<(), ConfigError> {
    let mut seen = vec![false; ids.len()];
    for &id in ids {
        if id >= ids.len() {
            return Err(ConfigError::Invalid(format!(
                "{class} abs_id {id} out of range for {} devices",
                ids.len()
            )));
        }
        if seen[id] {
            return Err(ConfigError::Invalid(format!(
                "duplicate {class} abs_id {id}"
            )));
        }
        seen[id] = true;
    }
    Ok(())
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        [controller]
        cycle_period_us = 500

        [telemetry]
        dest_addr = "10.0.0.2"
        dest_port = 7000
        local_port = 7001
        log_path = "out.bin"
        log_enabled = false

        [[slave]]
        type = "coupler"

        [[slave]]
        type = "servo"
        input2count = 65536
        max_pos = 3.0
        min_pos = -3.0
        max_vel = 2.0
        home_pos = 0.5
        abs_id = 1
        kp = 150.0
        home_mode = 17

        [[slave]]
        type = "servo"
        input2count = 65536
        max_pos = 3.0
        min_pos = -3.0
        max_vel = 2.0
        home_pos = 0.0
        abs_id = 0

        [[slave]]
        type = "junction"

        [[slave]]
        type = "force_sensor"
        abs_id = 0
    "#;

    #[test]
    fn full_config_parses() {
        let config = MotionConfig::from_toml(FULL).unwrap();
        assert_eq!(config.controller.cycle_period_us, 500);
        assert_eq!(config.telemetry.dest_addr, "10.0.0.2");
        assert!(!config.telemetry.log_enabled);
        assert_eq!(config.slaves.len(), 5);
        assert_eq!(config.servos().count(), 2);
        assert_eq!(config.force_sensors().count(), 1);
    }

    #[test]
    fn defaults_apply_when_sections_are_missing() {
        let config = MotionConfig::from_toml("").unwrap();
        assert_eq!(config.controller.cycle_period_us, DEFAULT_CYCLE_PERIOD_US);
        assert_eq!(config.controller.cpu_core, DEFAULT_CPU_CORE);
        assert_eq!(config.controller.rt_priority, DEFAULT_RT_PRIORITY);
        assert_eq!(config.telemetry.dest_port, 6666);
        assert_eq!(config.telemetry.local_port, 6667);
        assert!(config.telemetry.log_enabled);
        assert!(config.slaves.is_empty());
    }

    #[test]
    fn optional_servo_attributes_default() {
        let config = MotionConfig::from_toml(FULL).unwrap();
        let servos: Vec<_> = config.servos().collect();
        assert_eq!(servos[0].kp, 150.0);
        assert_eq!(servos[0].home_mode, Some(17));
        assert_eq!(servos[1].kp, DEFAULT_KP);
        assert_eq!(servos[1].home_mode, None);
    }

    #[test]
    fn settings_convert_units_to_counts() {
        let config = MotionConfig::from_toml(FULL).unwrap();
        let settings = config.servos().next().unwrap().settings();
        assert_eq!(settings.max_pos_count, 196_608);
        assert_eq!(settings.min_pos_count, -196_608);
        assert_eq!(settings.max_vel_count, 131_072);
        assert_eq!(settings.home_count, 32_768);
        assert_eq!(settings.abs_id, 1);
    }

    #[test]
    fn unknown_slave_type_is_rejected() {
        let result = MotionConfig::from_toml(
            r#"
            [[slave]]
            type = "gripper"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_required_servo_attribute_is_rejected() {
        let result = MotionConfig::from_toml(
            r#"
            [[slave]]
            type = "servo"
            input2count = 65536
            abs_id = 0
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn zero_cycle_period_is_rejected() {
        let result = MotionConfig::from_toml("[controller]\ncycle_period_us = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rt_priority_out_of_range_is_rejected() {
        let result = MotionConfig::from_toml("[controller]\nrt_priority = 100\n");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("rt_priority"));
    }

    #[test]
    fn zero_input2count_is_rejected() {
        let result = MotionConfig::from_toml(
            r#"
            [[slave]]
            type = "servo"
            input2count = 0
            max_pos = 1.0
            min_pos = -1.0
            max_vel = 1.0
            home_pos = 0.0
            abs_id = 0
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn duplicate_abs_id_is_rejected() {
        let result = MotionConfig::from_toml(
            r#"
            [[slave]]
            type = "force_sensor"
            abs_id = 0

            [[slave]]
            type = "force_sensor"
            abs_id = 0
            "#,
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn out_of_range_abs_id_is_rejected() {
        let result = MotionConfig::from_toml(
            r#"
            [[slave]]
            type = "servo"
            input2count = 1
            max_pos = 1.0
            min_pos = -1.0
            max_vel = 1.0
            home_pos = 0.0
            abs_id = 1
            "#,
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}

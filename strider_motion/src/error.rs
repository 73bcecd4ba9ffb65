//! Error types for configuration and controller lifecycle.

use thiserror::Error;

/// Configuration errors. All of these are fatal at setup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the configuration file failed.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing failed (includes unknown slave types and missing
    /// required attributes).
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The parsed configuration violates a validation rule.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Controller lifecycle errors.
#[derive(Debug, Error)]
pub enum ControlError {
    /// A cycle strategy is already registered.
    #[error("control strategy is already registered")]
    StrategyAlreadySet,

    /// The telemetry task was started twice.
    #[error("telemetry task is already running")]
    TelemetryAlreadyRunning,

    /// Spawning the telemetry thread failed.
    #[error("failed to spawn telemetry task: {0}")]
    TelemetrySpawn(#[from] std::io::Error),

    /// A real-time setup call failed (mlockall, affinity, scheduler).
    #[error("RT setup failed: {0}")]
    RtSetup(String),
}

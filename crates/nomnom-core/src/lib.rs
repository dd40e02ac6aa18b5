//! Core types for replaying NomNom simulation records.
//!
//! A [`SimulationRecord`] is fetched once, handed to a [`PlaybackDriver`] together with the
//! avatar pools and the scene, and replayed step by step at the cadence of a [`PlaybackClock`].

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod clock;
pub mod driver;
pub mod food;
pub mod handle;
pub mod model;
pub mod session;

pub use clock::{ManualTime, MonotonicTime, PlaybackClock, TimeSource};
pub use driver::{PlaybackDriver, PlaybackState, StepReport, StopReason, TickOutcome};
pub use food::{FoodMarker, FoodMarkerId, FoodMarkers};
pub use handle::{AgentHandle, AgentPools, PlaybackScene};
pub use model::{
    AgentKey, AgentKind, AgentState, FoodState, GridPos, PickedFood, SimulationRecord,
    StepRecord,
};
pub use session::PlaybackSession;

/// Errors raised by configuration validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Step that ends playback.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStep {
    /// Complete after processing the last step of the record.
    #[default]
    LastStep,
    /// Complete after processing the step with this id.
    Id(u64),
}

/// Static configuration for a playback run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Wall-clock time between two steps at normal speed, in milliseconds.
    pub tick_interval_ms: u64,
    /// Rate multiplier applied while acceleration is toggled on.
    pub acceleration_factor: f32,
    /// Speed forwarded to every `move_to` call, in grid cells per tick interval.
    pub move_speed: f32,
    /// Food appears only on steps whose id is a multiple of this; 0 disables spawning.
    pub food_spawn_interval: u64,
    /// Step whose processing completes playback.
    pub terminal_step: TerminalStep,
    /// Queue the placement frame again as the first animated step.
    pub replay_initial_step: bool,
    /// Upper bound on steps a single clock poll may release.
    pub max_ticks_per_poll: u32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 500,
            acceleration_factor: 10.0,
            move_speed: 1.0,
            food_spawn_interval: 5,
            terminal_step: TerminalStep::LastStep,
            replay_initial_step: true,
            max_ticks_per_poll: 240,
        }
    }
}

impl PlaybackConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "tick_interval_ms must be greater than zero",
            ));
        }
        if !self.acceleration_factor.is_finite() || self.acceleration_factor <= 0.0 {
            return Err(ConfigError::InvalidConfig(
                "acceleration_factor must be a positive number",
            ));
        }
        if !self.move_speed.is_finite() || self.move_speed < 0.0 {
            return Err(ConfigError::InvalidConfig(
                "move_speed must be a non-negative number",
            ));
        }
        if self.max_ticks_per_poll == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_ticks_per_poll must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// A step or the avatar pools disagree about which agents exist.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("{kind} pool holds {handles} handles but the first step lists {agents} {kind} agents")]
    PoolSizeMismatch {
        kind: AgentKind,
        agents: usize,
        handles: usize,
    },
    #[error("step {step} lists agent {agent}, which was not present in the first step")]
    UnknownAgent { step: u64, agent: AgentKey },
    #[error("step {step} lists {agents} {kind} agents but the {kind} pool holds {handles} handles")]
    AgentCountMismatch {
        step: u64,
        kind: AgentKind,
        agents: usize,
        handles: usize,
    },
    #[error("handle {identity} in the {pool} pool reports kind {reported}")]
    KindMismatch {
        pool: AgentKind,
        identity: u32,
        reported: AgentKind,
    },
}

/// A step record is missing data or breaks ordering.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedStepError {
    #[error("simulation record contains no steps")]
    NoSteps,
    #[error("step {step} lists no agents")]
    NoAgents { step: u64 },
    #[error("step {step} lists agent {agent} more than once")]
    DuplicateAgent { step: u64, agent: AgentKey },
    #[error("step {step} arrived after step {previous}")]
    OutOfOrder { step: u64, previous: u64 },
}

/// Fatal playback errors. Any of these stops the driver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    MalformedStep(#[from] MalformedStepError),
    #[error("playback has not been initialized")]
    NotInitialized,
    #[error("playback was already initialized")]
    AlreadyInitialized,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = PlaybackConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_interval(), Duration::from_millis(500));
    }

    #[test]
    fn zero_interval_rejected() {
        let config = PlaybackConfig {
            tick_interval_ms: 0,
            ..PlaybackConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn non_positive_acceleration_rejected() {
        let config = PlaybackConfig {
            acceleration_factor: 0.0,
            ..PlaybackConfig::default()
        };
        assert!(config.validate().is_err());
        let config = PlaybackConfig {
            acceleration_factor: f32::NAN,
            ..PlaybackConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_config_uses_defaults() {
        let config: PlaybackConfig =
            serde_json::from_str(r#"{"tick_interval_ms":50,"terminal_step":{"id":475}}"#)
                .expect("config");
        assert_eq!(config.tick_interval_ms, 50);
        assert_eq!(config.terminal_step, TerminalStep::Id(475));
        assert_eq!(config.food_spawn_interval, 5);
        assert!(config.replay_initial_step);

        let config: PlaybackConfig =
            serde_json::from_str(r#"{"terminal_step":"last_step"}"#).expect("config");
        assert_eq!(config.terminal_step, TerminalStep::LastStep);
    }
}

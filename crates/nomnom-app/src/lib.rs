//! Shared application plumbing for NomNom playback front ends.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use nomnom_core::{
    MonotonicTime, PlaybackConfig, PlaybackDriver, PlaybackSession, SimulationRecord,
};
use serde::Serialize;
use tracing::info;

pub mod scene;
pub mod terminal;

use scene::{Avatar, SceneState, build_pools};

/// Playback session as driven by the bundled renderers.
pub type Playback = PlaybackSession<Avatar, SceneState, MonotonicTime>;

/// Wire a record into a fresh, not yet started, playback session.
pub fn build_playback(record: SimulationRecord, config: PlaybackConfig) -> Playback {
    let pools = build_pools(&record);
    let driver = PlaybackDriver::new(record, pools, SceneState::new(), config);
    PlaybackSession::new(driver, MonotonicTime::new())
}

/// Read a JSON playback config. Missing fields fall back to their defaults.
pub fn load_config(path: &Path) -> Result<PlaybackConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: PlaybackConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Where a renderer left playback when it returned.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunSummary {
    pub processed_steps: u64,
    pub last_step: Option<u64>,
    pub collected_food: u64,
    pub completed: bool,
}

impl RunSummary {
    pub fn from_playback(playback: &Playback) -> Self {
        let driver = playback.driver();
        Self {
            processed_steps: driver.processed_steps(),
            last_step: driver.last_step_id(),
            collected_food: driver.collected_food(),
            completed: driver.is_completed(),
        }
    }
}

pub mod renderer {
    use anyhow::Result;

    use crate::{Playback, RunSummary};

    /// Shared context passed to renderer implementations.
    pub struct RendererContext {
        /// Playback session; the renderer starts it.
        pub playback: Playback,
    }

    pub trait Renderer {
        /// Stable identifier describing the renderer implementation (e.g., "terminal", "log").
        fn name(&self) -> &'static str;

        /// Launch the renderer; blocks until the rendering session completes.
        fn run(&self, ctx: RendererContext) -> Result<RunSummary>;
    }
}

/// Plays the record against the wall clock and reports progress through `tracing` only.
#[derive(Debug, Default)]
pub struct LogRenderer;

impl renderer::Renderer for LogRenderer {
    fn name(&self) -> &'static str {
        "log"
    }

    fn run(&self, ctx: renderer::RendererContext) -> Result<RunSummary> {
        let mut playback = ctx.playback;
        playback.start().context("failed to start playback")?;
        let processed = playback
            .run_blocking()
            .context("playback stopped with an error")?;
        let summary = RunSummary::from_playback(&playback);
        info!(
            processed,
            last_step = ?summary.last_step,
            collected_food = summary.collected_food,
            "Log playback finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{Renderer, RendererContext};
    use nomnom_core::{AgentKind, AgentState, GridPos, StepRecord};

    fn record() -> SimulationRecord {
        let step = |id, x| StepRecord {
            id,
            agents: vec![AgentState {
                id: 0,
                kind: AgentKind::Collector,
                x,
                z: 0,
                has_food: false,
            }],
            food: Vec::new(),
            food_picked: None,
        };
        SimulationRecord {
            total_steps: 3,
            storage_location: GridPos::new(0, 0),
            steps: vec![step(0, 0), step(1, 1), step(2, 2)],
        }
    }

    #[test]
    fn log_renderer_plays_to_completion() {
        let config = PlaybackConfig {
            tick_interval_ms: 1,
            ..PlaybackConfig::default()
        };
        let playback = build_playback(record(), config);
        let summary = LogRenderer
            .run(RendererContext { playback })
            .expect("log run");
        assert!(summary.completed);
        assert_eq!(summary.processed_steps, 3);
        assert_eq!(summary.last_step, Some(2));
    }

    #[test]
    fn config_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("playback.json");
        fs::write(&path, r#"{"tick_interval_ms": 250, "terminal_step": {"id": 7}}"#)
            .expect("write config");
        let config = load_config(&path).expect("config");

        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.terminal_step, nomnom_core::TerminalStep::Id(7));
        assert_eq!(config.food_spawn_interval, PlaybackConfig::default().food_spawn_interval);
    }

    #[test]
    fn invalid_config_file_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("playback.json");
        fs::write(&path, r#"{"tick_interval_ms": 0}"#).expect("write config");
        assert!(load_config(&path).is_err());
    }
}

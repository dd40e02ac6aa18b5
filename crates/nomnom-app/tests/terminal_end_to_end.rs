use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use anyhow::Result;
use nomnom_app::{
    build_playback,
    renderer::{Renderer, RendererContext},
    terminal::TerminalRenderer,
};
use nomnom_client::load_from_path;
use nomnom_core::PlaybackConfig;
use serde::Deserialize;
use tempfile::tempdir;

static ENV_GUARD: OnceLock<Mutex<()>> = OnceLock::new();

struct EnvCleanup {
    keys: Vec<String>,
}

impl EnvCleanup {
    fn new() -> Self {
        Self { keys: Vec::new() }
    }

    fn set(&mut self, key: &str, value: &str) {
        unsafe {
            std::env::set_var(key, value);
        }
        self.keys.push(key.to_string());
    }
}

impl Drop for EnvCleanup {
    fn drop(&mut self) {
        for key in &self.keys {
            unsafe {
                std::env::remove_var(key);
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct FrameStatsDto {
    step: Option<u64>,
    food_markers: usize,
    collected_food: u64,
    carrying: usize,
}

#[derive(Debug, Deserialize)]
struct ReportSummaryDto {
    frame_count: usize,
    steps_processed: u64,
    final_step: Option<u64>,
    collected_food: u64,
    peak_food_markers: usize,
    completed: bool,
}

#[derive(Debug, Deserialize)]
struct HeadlessReportDto {
    initial: FrameStatsDto,
    frames: Vec<FrameStatsDto>,
    summary: ReportSummaryDto,
}

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../nomnom-client/tests/fixtures/short_run.json")
}

#[test]
fn terminal_headless_generates_report() -> Result<()> {
    let _env_guard = ENV_GUARD
        .get_or_init(|| Mutex::new(()))
        .lock()
        .expect("env guard");

    let report_dir = tempdir()?;
    let report_path = report_dir.path().join("nested/terminal_report.json");
    let mut env = EnvCleanup::new();
    env.set(
        "NOMNOM_TERMINAL_HEADLESS_REPORT",
        &report_path.to_string_lossy(),
    );

    let record = load_from_path(fixture_path())?;
    let playback = build_playback(record, PlaybackConfig::default());
    let outcome = TerminalRenderer::headless().run(RendererContext { playback })?;
    assert!(outcome.completed);
    assert_eq!(outcome.processed_steps, 11);
    assert_eq!(outcome.last_step, Some(10));
    assert_eq!(outcome.collected_food, 1);

    let report: HeadlessReportDto = serde_json::from_str(&std::fs::read_to_string(&report_path)?)?;
    assert_eq!(report.initial.step, None);
    assert_eq!(report.initial.food_markers, 0);

    let steps: Vec<_> = report.frames.iter().map(|frame| frame.step).collect();
    assert_eq!(steps, (0..=10).map(Some).collect::<Vec<_>>());

    // Step 2 food is skipped, step 3 removes the marker at (5, 5).
    let markers: Vec<_> = report.frames.iter().map(|frame| frame.food_markers).collect();
    assert_eq!(markers, vec![2, 2, 2, 1, 1, 2, 2, 2, 2, 2, 4]);

    assert_eq!(report.frames[3].carrying, 1);
    assert_eq!(report.frames[9].collected_food, 0);
    assert_eq!(report.frames[10].collected_food, 1);
    assert_eq!(report.frames[10].carrying, 0);

    let summary = &report.summary;
    assert_eq!(summary.frame_count, 11);
    assert_eq!(summary.steps_processed, 11);
    assert_eq!(summary.final_step, Some(10));
    assert_eq!(summary.collected_food, 1);
    assert_eq!(summary.peak_food_markers, 4);
    assert!(summary.completed);
    Ok(())
}

#[test]
fn terminal_step_cuts_playback_short() -> Result<()> {
    let _env_guard = ENV_GUARD
        .get_or_init(|| Mutex::new(()))
        .lock()
        .expect("env guard");

    let record = load_from_path(fixture_path())?;
    let config = PlaybackConfig {
        terminal_step: nomnom_core::TerminalStep::Id(4),
        replay_initial_step: false,
        ..PlaybackConfig::default()
    };
    let playback = build_playback(record, config);
    let outcome = TerminalRenderer::headless().run(RendererContext { playback })?;
    assert!(outcome.completed);
    assert_eq!(outcome.processed_steps, 4);
    assert_eq!(outcome.last_step, Some(4));
    assert_eq!(outcome.collected_food, 0);
    Ok(())
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum, builder::FalseyValueParser};
use nomnom_app::{
    LogRenderer, build_playback, load_config,
    renderer::{Renderer, RendererContext},
    terminal::TerminalRenderer,
};
use nomnom_client::{DEFAULT_ENDPOINT, SimulationSource};
use nomnom_core::{PlaybackConfig, TerminalStep};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "nomnom-app",
    version,
    about = "Replay a NomNom collector/explorer simulation run"
)]
struct Cli {
    /// URL of the simulation server.
    #[arg(long, env = "NOMNOM_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Replay a saved simulation record instead of contacting the server.
    #[arg(long, env = "NOMNOM_FILE")]
    file: Option<PathBuf>,

    /// JSON playback configuration; flags below override its fields.
    #[arg(long, env = "NOMNOM_CONFIG")]
    config: Option<PathBuf>,

    /// Front end used to display playback.
    #[arg(long, env = "NOMNOM_RENDERER", value_enum, default_value_t = RendererKind::Terminal)]
    renderer: RendererKind,

    /// Milliseconds between steps at normal speed.
    #[arg(long, env = "NOMNOM_TICK_MS")]
    tick_ms: Option<u64>,

    /// Rate multiplier used while fast playback is on.
    #[arg(long)]
    acceleration: Option<f32>,

    /// Steps between food appearances (0 hides all food).
    #[arg(long)]
    food_interval: Option<u64>,

    /// Stop after the step with this id instead of the last recorded step.
    #[arg(long)]
    terminal_step: Option<u64>,

    /// Do not animate the first step again after placing the agents on it.
    #[arg(long)]
    skip_initial_replay: bool,

    /// Start in fast playback.
    #[arg(long)]
    fast: bool,

    /// Render the terminal UI into an off-screen buffer, one step per frame.
    #[arg(long, env = "NOMNOM_TERMINAL_HEADLESS", value_parser = FalseyValueParser::new())]
    headless: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum RendererKind {
    Terminal,
    Log,
}

impl RendererKind {
    fn default_log_filter(self) -> &'static str {
        match self {
            RendererKind::Terminal => "warn",
            RendererKind::Log => "info",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.renderer);
    if let Err(err) = run(cli) {
        error!(error = %format!("{err:#}"), "NomNom playback failed");
        return Err(err);
    }
    Ok(())
}

fn init_tracing(renderer: RendererKind) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(renderer.default_log_filter()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;

    let source = match &cli.file {
        Some(path) => SimulationSource::File(path.clone()),
        None => SimulationSource::Endpoint(cli.endpoint.clone()),
    };
    let record = source
        .load()
        .with_context(|| format!("failed to load simulation record from {source}"))?;

    let mut playback = build_playback(record, config);
    playback.clock_mut().set_accelerated(cli.fast);

    let renderer: Box<dyn Renderer> = match cli.renderer {
        RendererKind::Terminal if cli.headless => Box::new(TerminalRenderer::headless()),
        RendererKind::Terminal => Box::new(TerminalRenderer::default()),
        RendererKind::Log => Box::new(LogRenderer),
    };
    info!(renderer = renderer.name(), %source, "Starting NomNom playback");

    let summary = renderer
        .run(RendererContext { playback })
        .with_context(|| format!("{} renderer failed", renderer.name()))?;
    info!(
        processed_steps = summary.processed_steps,
        last_step = ?summary.last_step,
        collected_food = summary.collected_food,
        completed = summary.completed,
        "Playback session ended"
    );
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<PlaybackConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => PlaybackConfig::default(),
    };
    if let Some(tick_ms) = cli.tick_ms {
        config.tick_interval_ms = tick_ms;
    }
    if let Some(acceleration) = cli.acceleration {
        config.acceleration_factor = acceleration;
    }
    if let Some(interval) = cli.food_interval {
        config.food_spawn_interval = interval;
    }
    if let Some(step) = cli.terminal_step {
        config.terminal_step = TerminalStep::Id(step);
    }
    if cli.skip_initial_replay {
        config.replay_initial_step = false;
    }
    config
        .validate()
        .context("invalid playback configuration")?;
    Ok(config)
}

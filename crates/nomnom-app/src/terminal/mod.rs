use std::{
    fs::{self, File},
    io::{self, Stdout},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use nomnom_core::{
    AgentHandle, AgentKind, GridPos, PlaybackError, PlaybackState, StepReport, StopReason,
    TickOutcome,
};
use ratatui::{
    Frame, Terminal,
    backend::{CrosstermBackend, TestBackend},
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph},
};
use serde::Serialize;
use supports_color::{ColorLevel, Stream, on_cached};
use tracing::{error, info};

use crate::{
    Playback, RunSummary,
    renderer::{Renderer, RendererContext},
    scene::grid_extent,
};

const UI_TICK_MILLIS: u64 = 50;
const HEADLESS_SIZE: (u16, u16) = (80, 30);

pub struct TerminalRenderer {
    draw_interval: Duration,
    headless: bool,
}

impl Default for TerminalRenderer {
    fn default() -> Self {
        Self {
            draw_interval: Duration::from_millis(UI_TICK_MILLIS),
            headless: false,
        }
    }
}

impl TerminalRenderer {
    /// Render into an in-memory backend instead of the real terminal.
    pub fn headless() -> Self {
        Self {
            headless: true,
            ..Self::default()
        }
    }
}

impl Renderer for TerminalRenderer {
    fn name(&self) -> &'static str {
        "terminal"
    }

    fn run(&self, ctx: RendererContext) -> Result<RunSummary> {
        let mut playback = ctx.playback;
        playback.start().context("failed to start playback")?;

        if self.headless {
            let report = self.run_headless(playback)?;
            info!(
                target = "nomnom::terminal",
                frames = report.summary.frame_count,
                steps_processed = report.summary.steps_processed,
                final_step = ?report.summary.final_step,
                collected_food = report.summary.collected_food,
                peak_food_markers = report.summary.peak_food_markers,
                completed = report.summary.completed,
                "Terminal headless run completed"
            );
            return Ok(report.outcome);
        }

        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enable raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to build terminal backend")?;
        terminal.hide_cursor().ok();

        let result = run_event_loop(self, &mut terminal, playback);

        terminal.show_cursor().ok();
        if let Err(err) = disable_raw_mode() {
            error!(?err, "failed to disable raw mode");
        }
        if let Err(err) = execute!(terminal.backend_mut(), LeaveAlternateScreen) {
            error!(?err, "failed to leave alternate screen");
        }

        result
    }
}

fn run_event_loop(
    renderer: &TerminalRenderer,
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    playback: Playback,
) -> Result<RunSummary> {
    let mut app = TerminalApp::new(renderer, playback);

    loop {
        let now = Instant::now();
        app.advance(now);

        if now.duration_since(app.last_draw) >= app.draw_interval {
            terminal.draw(|frame| app.draw(frame))?;
            app.last_draw = now;
        }

        let timeout = renderer
            .draw_interval
            .saturating_sub(now.duration_since(app.last_event_check));
        let event_ready = event::poll(timeout).unwrap_or(false);
        if event_ready
            && let Event::Key(key) = event::read()?
            && app.handle_key(key)
        {
            break;
        }
        if event_ready {
            app.last_event_check = Instant::now();
        }
    }

    app.playback.stop();
    if let Some(err) = app.failure {
        return Err(err).context("playback stopped with an error");
    }
    Ok(RunSummary::from_playback(&app.playback))
}

impl TerminalRenderer {
    fn run_headless(&self, playback: Playback) -> Result<HeadlessReport> {
        let backend = TestBackend::new(HEADLESS_SIZE.0, HEADLESS_SIZE.1);
        let mut terminal = Terminal::new(backend).context("failed to build test backend")?;
        let mut app = TerminalApp::new(self, playback);
        let mut report = HeadlessReport::new(FrameStats::capture(&app.playback));
        let frames = headless_frame_cap_from_env().unwrap_or(usize::MAX);

        terminal.draw(|frame| app.draw(frame))?;
        for _ in 0..frames {
            if !app.playback.driver().is_running() {
                break;
            }
            app.step_once()
                .context("playback stopped with an error")?;
            report.record(FrameStats::capture(&app.playback));
            terminal.draw(|frame| app.draw(frame))?;
        }

        report.finalize(RunSummary::from_playback(&app.playback));

        if let Some(path) = report_file_path_from_env() {
            report.write_json(&path).with_context(|| {
                format!("failed to write headless report to {}", path.display())
            })?;
        }

        Ok(report)
    }
}

struct TerminalApp {
    playback: Playback,
    grid: (u16, u16),
    draw_interval: Duration,
    help_visible: bool,
    last_frame: Instant,
    last_draw: Instant,
    last_event_check: Instant,
    palette: Palette,
    announced_deliveries: u64,
    failure: Option<PlaybackError>,
}

impl TerminalApp {
    fn new(renderer: &TerminalRenderer, playback: Playback) -> Self {
        let grid = grid_extent(playback.driver().record());
        let now = Instant::now();
        Self {
            playback,
            grid,
            draw_interval: renderer.draw_interval,
            help_visible: false,
            last_frame: now,
            last_draw: now,
            last_event_check: now,
            palette: Palette::detect(),
            announced_deliveries: 0,
            failure: None,
        }
    }

    /// Run every step that is due and move avatars along their transitions.
    fn advance(&mut self, now: Instant) {
        let delta = now.duration_since(self.last_frame);
        self.last_frame = now;

        match self.playback.pump() {
            Ok(outcomes) => {
                for outcome in &outcomes {
                    self.note_outcome(outcome);
                }
            }
            Err(err) => self.note_failure(err),
        }

        let interval = self.playback.clock().interval().as_secs_f32();
        if interval > f32::EPSILON {
            let intervals = delta.as_secs_f32() * self.playback.clock().rate() / interval;
            for avatar in self.playback.driver_mut().pools_mut().iter_mut() {
                avatar.advance(intervals);
            }
        }
    }

    /// Apply one step immediately and settle every avatar on its destination.
    fn step_once(&mut self) -> Result<(), PlaybackError> {
        let outcome = self.playback.step_once()?;
        self.note_outcome(&outcome);
        for avatar in self.playback.driver_mut().pools_mut().iter_mut() {
            avatar.finish();
        }
        Ok(())
    }

    fn note_outcome(&mut self, outcome: &TickOutcome) {
        let report = match outcome {
            TickOutcome::Advanced(report) | TickOutcome::Completed(Some(report)) => report,
            TickOutcome::Completed(None) | TickOutcome::Idle => return,
        };
        self.note_report(report);
    }

    fn note_report(&mut self, report: &StepReport) {
        let scene = self.playback.driver_mut().scene_mut();
        if !report.spawned.is_empty() {
            scene.push_event(format!("{} food item(s) appeared", report.spawned.len()));
        }
        if report.collected_food > self.announced_deliveries {
            self.announced_deliveries = report.collected_food;
            scene.push_event(format!(
                "Food delivered, {} in storage",
                report.collected_food
            ));
        }
    }

    fn note_failure(&mut self, err: PlaybackError) {
        error!(%err, "Playback failed");
        self.playback
            .driver_mut()
            .scene_mut()
            .push_event(format!("Playback failed: {err}"));
        self.failure = Some(err);
    }

    fn draw(&mut self, frame: &mut Frame<'_>) {
        let outer = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0)])
            .split(frame.area());

        self.draw_header(frame, outer[0]);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(62), Constraint::Percentage(38)])
            .split(outer[1]);

        self.draw_map(frame, body[0]);

        let sidebar = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(9), Constraint::Min(3)])
            .split(body[1]);

        self.draw_stats(frame, sidebar[0]);
        self.draw_events(frame, sidebar[1]);

        if self.playback.driver().scene().is_completed() {
            self.draw_banner(frame, "Simulation complete. Press q to exit.");
        }
        if self.help_visible {
            self.draw_help(frame);
        }
    }

    fn draw_header(&self, frame: &mut Frame<'_>, area: Rect) {
        let driver = self.playback.driver();
        let clock = self.playback.clock();

        let (state_label, state_style) = match driver.state() {
            PlaybackState::Uninitialized => ("IDLE", self.palette.idle_style()),
            PlaybackState::Running => ("RUNNING", self.palette.running_style()),
            PlaybackState::Stopped(StopReason::Completed) => ("COMPLETE", self.palette.idle_style()),
            PlaybackState::Stopped(StopReason::Cancelled) => ("STOPPED", self.palette.idle_style()),
            PlaybackState::Stopped(StopReason::Failed) => ("FAILED", self.palette.failed_style()),
        };
        let step = driver
            .scene()
            .step()
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        let last = driver
            .terminal_step_id()
            .map_or_else(|| "-".to_string(), |id| id.to_string());

        let line = Line::from(vec![
            Span::styled(" NomNom ", self.palette.header_style()),
            Span::raw(" "),
            Span::styled(format!(" {state_label} "), state_style),
            Span::raw(format!("  Step {step}/{last}")),
            Span::raw("  "),
            Span::styled(
                format!(
                    "Speed x{:.0} ({} ms/step)",
                    clock.rate(),
                    clock.effective_interval().as_millis()
                ),
                self.palette.speed_style(clock.is_accelerated()),
            ),
            Span::raw("  "),
            Span::styled(
                format!("Delivered {}", driver.collected_food()),
                self.palette.accent_style(),
            ),
            Span::raw(format!("  Food {}", driver.food_markers().len())),
        ]);

        let block = Block::default()
            .title(self.palette.title("Playback (? for help)"))
            .borders(Borders::ALL);
        frame.render_widget(Paragraph::new(line).block(block), area);
    }

    fn draw_stats(&self, frame: &mut Frame<'_>, area: Rect) {
        let driver = self.playback.driver();
        let pools = driver.pools();
        let carrying = pools
            .pool(AgentKind::Collector)
            .iter()
            .filter(|avatar| avatar.is_carrying())
            .count();
        let moving = pools.iter().filter(|avatar| avatar.is_moving()).count();
        let warehouse = driver
            .scene()
            .warehouse()
            .map_or_else(|| "-".to_string(), |pos| pos.to_string());

        let lines = vec![
            Line::from(vec![
                Span::styled("c ", self.palette.collector_style(false)),
                Span::raw(format!(
                    "Collectors {} ({carrying} carrying, shown as C)",
                    pools.len(AgentKind::Collector)
                )),
            ]),
            Line::from(vec![
                Span::styled("e ", self.palette.explorer_style()),
                Span::raw(format!("Explorers {}", pools.len(AgentKind::Explorer))),
            ]),
            Line::from(vec![
                Span::styled("W ", self.palette.warehouse_style()),
                Span::raw(format!("Warehouse {warehouse}")),
            ]),
            Line::from(vec![
                Span::styled("* ", self.palette.food_style()),
                Span::raw(format!("Food markers {}", driver.food_markers().len())),
            ]),
            Line::raw(format!("In motion {moving}")),
            Line::raw(format!(
                "Processed {}  Queued {}",
                driver.processed_steps(),
                driver.remaining_steps()
            )),
            Line::raw(format!("Grid {}×{}", self.grid.0, self.grid.1)),
        ];

        let block = Block::default()
            .title(self.palette.title("Run"))
            .borders(Borders::ALL);
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn draw_map(&self, frame: &mut Frame<'_>, area: Rect) {
        let title = format!("Grid {}×{}", self.grid.0, self.grid.1);
        let block = Block::default()
            .title(self.palette.title(title))
            .borders(Borders::ALL);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        if inner.width < 2 || inner.height < 2 {
            return;
        }

        let width = inner.width as usize;
        let height = inner.height as usize;
        let mut grid = vec![CellGlyph::default(); width * height];
        let project = |pos: (f32, f32)| {
            let x = ((pos.0 + 0.5) / f32::from(self.grid.0) * width as f32)
                .floor()
                .clamp(0.0, (width - 1) as f32) as usize;
            let y = ((pos.1 + 0.5) / f32::from(self.grid.1) * height as f32)
                .floor()
                .clamp(0.0, (height - 1) as f32) as usize;
            y * width + x
        };
        let cell = |pos: GridPos| project((pos.x as f32, pos.z as f32));

        let scene = self.playback.driver().scene();
        if let Some(warehouse) = scene.warehouse() {
            grid[cell(warehouse)] = CellGlyph {
                ch: 'W',
                style: self.palette.warehouse_style(),
            };
        }
        for (_, position) in scene.food() {
            grid[cell(position)] = CellGlyph {
                ch: '*',
                style: self.palette.food_style(),
            };
        }
        for avatar in self.playback.driver().pools().iter() {
            let glyph = match (avatar.kind(), avatar.is_carrying()) {
                (AgentKind::Collector, true) => CellGlyph {
                    ch: 'C',
                    style: self.palette.collector_style(true),
                },
                (AgentKind::Collector, false) => CellGlyph {
                    ch: 'c',
                    style: self.palette.collector_style(false),
                },
                (AgentKind::Explorer, _) => CellGlyph {
                    ch: 'e',
                    style: self.palette.explorer_style(),
                },
            };
            grid[project(avatar.position())] = glyph;
        }

        let lines: Vec<Line> = grid
            .chunks(width)
            .map(|row| {
                Line::from(
                    row.iter()
                        .map(|cell| Span::styled(cell.ch.to_string(), cell.style))
                        .collect::<Vec<_>>(),
                )
            })
            .collect();
        frame.render_widget(Paragraph::new(Text::from(lines)), inner);
    }

    fn draw_events(&self, frame: &mut Frame<'_>, area: Rect) {
        let events: Vec<ListItem> = self
            .playback
            .driver()
            .scene()
            .events()
            .rev()
            .map(|entry| {
                let step = entry
                    .step
                    .map_or_else(|| "-".to_string(), |id| id.to_string());
                let text = format!("[s{step:>5}] {}", entry.message);
                ListItem::new(Span::styled(text, self.palette.event_style()))
            })
            .collect();
        let block = Block::default()
            .title(self.palette.title("Recent Events"))
            .borders(Borders::ALL);
        frame.render_widget(List::new(events).block(block), area);
    }

    fn draw_banner(&self, frame: &mut Frame<'_>, message: &str) {
        let size = frame.area();
        let width = (message.len() as u16 + 4).min(size.width);
        let height = 3.min(size.height);
        let area = Rect::new(
            size.x + (size.width - width) / 2,
            size.y + (size.height - height) / 2,
            width,
            height,
        );
        let paragraph = Paragraph::new(Line::styled(
            message.to_string(),
            self.palette.header_style(),
        ))
        .block(Block::default().borders(Borders::ALL));
        frame.render_widget(Clear, area);
        frame.render_widget(paragraph, area);
    }

    fn draw_help(&self, frame: &mut Frame<'_>) {
        let size = frame.area();
        let help_width = (size.width as f32 * 0.6).round() as u16;
        let help_height = 7.min(size.height);
        let help_x = size.x + (size.width - help_width) / 2;
        let help_y = size.y + (size.height - help_height) / 2;
        let area = Rect::new(help_x, help_y, help_width, help_height);

        let help_lines = vec![
            Line::from(vec![Span::styled(
                "Controls",
                self.palette.header_style().add_modifier(Modifier::BOLD),
            )]),
            Line::raw(" q / Esc     Quit"),
            Line::raw(" space / f   Toggle fast playback"),
            Line::raw(" ?           Toggle this help"),
        ];

        let paragraph = Paragraph::new(help_lines).block(
            Block::default()
                .title(self.palette.title("Help"))
                .borders(Borders::ALL)
                .style(Style::default().bg(Color::Black).fg(Color::White)),
        );
        frame.render_widget(Clear, area);
        frame.render_widget(paragraph, area);
    }

    /// Returns true when the user asked to quit.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        match (key.code, key.modifiers) {
            (KeyCode::Esc, _)
            | (KeyCode::Char('q'), _)
            | (KeyCode::Char('Q'), _)
            | (KeyCode::Char('c'), KeyModifiers::CONTROL) => return true,
            (KeyCode::Char(' ') | KeyCode::Char('f'), _) => {
                let accelerated = self.playback.toggle_acceleration();
                let message = if accelerated {
                    format!("Fast playback x{:.0}", self.playback.clock().rate())
                } else {
                    "Normal speed".to_string()
                };
                self.playback.driver_mut().scene_mut().push_event(message);
            }
            (KeyCode::Char('?') | KeyCode::Char('h'), _) => {
                self.help_visible = !self.help_visible;
            }
            _ => {}
        }
        false
    }
}

#[derive(Clone, Copy)]
struct CellGlyph {
    ch: char,
    style: Style,
}

impl Default for CellGlyph {
    fn default() -> Self {
        Self {
            ch: '·',
            style: Style::default().fg(Color::DarkGray),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct HeadlessReport {
    initial: FrameStats,
    frames: Vec<FrameStats>,
    summary: ReportSummary,
    outcome: RunSummary,
}

impl HeadlessReport {
    fn new(initial: FrameStats) -> Self {
        Self {
            initial,
            frames: Vec::new(),
            summary: ReportSummary::default(),
            outcome: RunSummary {
                processed_steps: 0,
                last_step: None,
                collected_food: 0,
                completed: false,
            },
        }
    }

    fn record(&mut self, stats: FrameStats) {
        self.frames.push(stats);
    }

    fn finalize(&mut self, outcome: RunSummary) {
        self.summary = ReportSummary::from(&self.initial, &self.frames, &outcome);
        self.outcome = outcome;
    }

    fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).context("failed to serialize headless report")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
struct FrameStats {
    step: Option<u64>,
    food_markers: usize,
    collected_food: u64,
    carrying: usize,
}

impl FrameStats {
    fn capture(playback: &Playback) -> Self {
        let driver = playback.driver();
        Self {
            step: driver.scene().step(),
            food_markers: driver.food_markers().len(),
            collected_food: driver.collected_food(),
            carrying: driver
                .pools()
                .pool(AgentKind::Collector)
                .iter()
                .filter(|avatar| avatar.is_carrying())
                .count(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
struct ReportSummary {
    frame_count: usize,
    steps_processed: u64,
    final_step: Option<u64>,
    collected_food: u64,
    peak_food_markers: usize,
    completed: bool,
}

impl ReportSummary {
    fn from(initial: &FrameStats, frames: &[FrameStats], outcome: &RunSummary) -> Self {
        let peak_food_markers = frames
            .iter()
            .map(|frame| frame.food_markers)
            .fold(initial.food_markers, usize::max);
        Self {
            frame_count: frames.len(),
            steps_processed: outcome.processed_steps,
            final_step: frames.last().map_or(initial.step, |frame| frame.step),
            collected_food: outcome.collected_food,
            peak_food_markers,
            completed: outcome.completed,
        }
    }
}

fn report_file_path_from_env() -> Option<PathBuf> {
    std::env::var_os("NOMNOM_TERMINAL_HEADLESS_REPORT").and_then(|raw| {
        if raw.is_empty() {
            None
        } else {
            Some(PathBuf::from(raw))
        }
    })
}

/// Optional cap on headless frames. Without one, headless playback runs until the driver stops.
fn headless_frame_cap_from_env() -> Option<usize> {
    std::env::var("NOMNOM_TERMINAL_HEADLESS_FRAMES")
        .ok()
        .and_then(|raw| parse_frame_cap(&raw))
}

fn parse_frame_cap(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|value| *value > 0)
}

struct Palette {
    level: Option<ColorLevel>,
}

impl Palette {
    fn detect() -> Self {
        Self {
            level: on_cached(Stream::Stdout),
        }
    }

    fn has_color(&self) -> bool {
        self.level.is_some()
    }

    fn tinted(&self, color: Color) -> Style {
        if self.has_color() {
            Style::default().fg(color)
        } else {
            Style::default()
        }
    }

    fn header_style(&self) -> Style {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    }

    fn accent_style(&self) -> Style {
        Style::default().fg(Color::LightMagenta)
    }

    fn idle_style(&self) -> Style {
        Style::default()
            .fg(Color::Black)
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD)
    }

    fn running_style(&self) -> Style {
        Style::default()
            .fg(Color::Black)
            .bg(Color::Green)
            .add_modifier(Modifier::BOLD)
    }

    fn failed_style(&self) -> Style {
        Style::default()
            .fg(Color::White)
            .bg(Color::Red)
            .add_modifier(Modifier::BOLD)
    }

    fn speed_style(&self, accelerated: bool) -> Style {
        let color = if accelerated {
            Color::Yellow
        } else {
            Color::LightCyan
        };
        Style::default().fg(color)
    }

    fn title<T: Into<String>>(&self, title: T) -> Span<'static> {
        Span::styled(title.into(), self.header_style())
    }

    fn event_style(&self) -> Style {
        self.tinted(Color::Cyan)
    }

    fn warehouse_style(&self) -> Style {
        self.tinted(Color::LightBlue).add_modifier(Modifier::BOLD)
    }

    fn food_style(&self) -> Style {
        self.tinted(Color::Green)
    }

    fn collector_style(&self, carrying: bool) -> Style {
        if carrying {
            self.tinted(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            self.tinted(Color::LightYellow)
        }
    }

    fn explorer_style(&self) -> Style {
        self.tinted(Color::LightMagenta)
    }
}

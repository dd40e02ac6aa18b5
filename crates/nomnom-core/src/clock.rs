//! Fixed-cadence tick scheduling, decoupled from render frame rate.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::info;

use crate::{ConfigError, PlaybackConfig};

/// Monotonic time, measured from an arbitrary origin.
pub trait TimeSource {
    fn now(&self) -> Duration;
}

/// Wall-clock time backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Time that only moves when told to. Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    nanos: Arc<AtomicU64>,
}

impl ManualTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos
            .fetch_add(duration_nanos(by), Ordering::SeqCst);
    }

    pub fn set(&self, to: Duration) {
        self.nanos.store(duration_nanos(to), Ordering::SeqCst);
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

fn duration_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Accumulates elapsed time and releases whole tick intervals.
///
/// The accumulator is kept in scaled time: a rate of 10 fills it ten times faster, so changing
/// the rate only affects time that elapses afterwards.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    interval_nanos: u64,
    acceleration_factor: f32,
    accelerated: bool,
    base_rate: f32,
    accumulator: u64,
    last_poll: Option<Duration>,
    max_ticks_per_poll: u32,
}

impl PlaybackClock {
    pub fn from_config(config: &PlaybackConfig) -> Self {
        Self {
            interval_nanos: duration_nanos(config.tick_interval()).max(1),
            acceleration_factor: config.acceleration_factor,
            accelerated: false,
            base_rate: 1.0,
            accumulator: 0,
            last_poll: None,
            max_ticks_per_poll: config.max_ticks_per_poll.max(1),
        }
    }

    /// Begin measuring from `now`, discarding anything accumulated so far.
    pub fn start(&mut self, now: Duration) {
        self.last_poll = Some(now);
        self.accumulator = 0;
    }

    /// Number of ticks due at `now`. The first poll only starts the clock.
    pub fn poll(&mut self, now: Duration) -> u32 {
        let Some(last) = self.last_poll.replace(now) else {
            return 0;
        };
        let elapsed = duration_nanos(now.saturating_sub(last));
        let scaled = (elapsed as f64 * f64::from(self.rate())).round() as u64;

        let cap = self
            .interval_nanos
            .saturating_mul(u64::from(self.max_ticks_per_poll));
        self.accumulator = self.accumulator.saturating_add(scaled).min(cap);

        let ticks = (self.accumulator / self.interval_nanos) as u32;
        self.accumulator -= u64::from(ticks) * self.interval_nanos;
        ticks
    }

    /// Real time left until the next tick boundary at the current rate.
    pub fn until_next_tick(&self) -> Duration {
        let remaining = self.interval_nanos.saturating_sub(self.accumulator);
        let real = (remaining as f64 / f64::from(self.rate())).ceil() as u64;
        Duration::from_nanos(real)
    }

    /// Effective rate multiplier applied to elapsed time.
    pub fn rate(&self) -> f32 {
        if self.accelerated {
            self.base_rate * self.acceleration_factor
        } else {
            self.base_rate
        }
    }

    /// Replace the base rate multiplier; acceleration still stacks on top.
    pub fn set_rate(&mut self, rate: f32) -> Result<(), ConfigError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ConfigError::InvalidConfig(
                "playback rate must be a positive number",
            ));
        }
        self.base_rate = rate;
        info!(rate = self.rate(), "Playback rate changed");
        Ok(())
    }

    /// Flip acceleration and return the new setting.
    pub fn toggle_acceleration(&mut self) -> bool {
        self.set_accelerated(!self.accelerated);
        self.accelerated
    }

    pub fn set_accelerated(&mut self, accelerated: bool) {
        if self.accelerated != accelerated {
            self.accelerated = accelerated;
            info!(accelerated, rate = self.rate(), "Playback acceleration toggled");
        }
    }

    pub fn is_accelerated(&self) -> bool {
        self.accelerated
    }

    pub fn interval(&self) -> Duration {
        Duration::from_nanos(self.interval_nanos)
    }

    /// Real time between ticks at the current rate.
    pub fn effective_interval(&self) -> Duration {
        let real = (self.interval_nanos as f64 / f64::from(self.rate())).round() as u64;
        Duration::from_nanos(real)
    }
}

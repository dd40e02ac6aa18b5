//! Binds a [`PlaybackDriver`] to a [`PlaybackClock`] and a time source.

use std::thread;

use tracing::{debug, info};

use crate::clock::{PlaybackClock, TimeSource};
use crate::driver::{PlaybackDriver, TickOutcome};
use crate::handle::{AgentHandle, PlaybackScene};
use crate::PlaybackError;

pub struct PlaybackSession<H, S, T> {
    driver: PlaybackDriver<H, S>,
    clock: PlaybackClock,
    time: T,
}

impl<H: AgentHandle, S: PlaybackScene, T: TimeSource> PlaybackSession<H, S, T> {
    pub fn new(driver: PlaybackDriver<H, S>, time: T) -> Self {
        let clock = PlaybackClock::from_config(driver.config());
        Self {
            driver,
            clock,
            time,
        }
    }

    /// Initialize the driver and start the clock at the current time.
    pub fn start(&mut self) -> Result<(), PlaybackError> {
        self.driver.initialize()?;
        self.clock.start(self.time.now());
        info!(
            interval_ms = self.clock.interval().as_millis() as u64,
            rate = self.clock.rate(),
            "Playback clock started"
        );
        Ok(())
    }

    /// Process every tick that is due, in order. Stops early on completion.
    pub fn pump(&mut self) -> Result<Vec<TickOutcome>, PlaybackError> {
        if !self.driver.is_running() {
            return Ok(Vec::new());
        }
        let due = self.clock.poll(self.time.now());
        let mut outcomes = Vec::with_capacity(due as usize);
        for _ in 0..due {
            let outcome = self.driver.process_step()?;
            let finished = !matches!(outcome, TickOutcome::Advanced(_));
            outcomes.push(outcome);
            if finished {
                break;
            }
        }
        if due > 1 {
            debug!(due, processed = outcomes.len(), "Clock released several ticks");
        }
        Ok(outcomes)
    }

    /// Process one step regardless of the clock.
    pub fn step_once(&mut self) -> Result<TickOutcome, PlaybackError> {
        self.driver.process_step()
    }

    /// Drive playback against the wall clock until it stops. Returns the number of steps applied.
    pub fn run_blocking(&mut self) -> Result<u64, PlaybackError> {
        while self.driver.is_running() {
            self.pump()?;
            if !self.driver.is_running() {
                break;
            }
            thread::sleep(self.clock.until_next_tick());
        }
        Ok(self.driver.processed_steps())
    }

    pub fn toggle_acceleration(&mut self) -> bool {
        self.clock.toggle_acceleration()
    }

    pub fn stop(&mut self) {
        self.driver.stop();
    }

    pub fn driver(&self) -> &PlaybackDriver<H, S> {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut PlaybackDriver<H, S> {
        &mut self.driver
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut PlaybackClock {
        &mut self.clock
    }

    pub fn time(&self) -> &T {
        &self.time
    }

    pub fn into_driver(self) -> PlaybackDriver<H, S> {
        self.driver
    }
}

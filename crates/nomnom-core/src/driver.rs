//! The playback state machine.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, error, info, warn};

use crate::food::{FoodMarkerId, FoodMarkers};
use crate::handle::{AgentHandle, AgentPools, PlaybackScene};
use crate::model::{AgentKey, AgentKind, SimulationRecord, StepRecord};
use crate::{MalformedStepError, PlaybackConfig, PlaybackError, RoutingError, TerminalStep};

/// Why playback stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    Cancelled,
    Failed,
}

/// Lifecycle of a [`PlaybackDriver`]. There is no way back to `Running` once stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Uninitialized,
    Running,
    Stopped(StopReason),
}

/// Side effects of one processed step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    pub step_id: u64,
    pub moves: usize,
    pub spawned: Vec<FoodMarkerId>,
    pub picked: Option<FoodMarkerId>,
    pub collected_food: u64,
}

/// Result of a single [`PlaybackDriver::process_step`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A step was applied and more remain.
    Advanced(StepReport),
    /// Playback completed. Carries the final step when one was applied on this tick.
    Completed(Option<StepReport>),
    /// The driver is stopped; nothing happened.
    Idle,
}

/// Replays a [`SimulationRecord`] onto avatar handles and a scene.
pub struct PlaybackDriver<H, S> {
    record: SimulationRecord,
    pools: AgentPools<H>,
    scene: S,
    config: PlaybackConfig,
    state: PlaybackState,
    queue: VecDeque<StepRecord>,
    routes: HashMap<AgentKey, usize>,
    carrying: HashMap<AgentKey, bool>,
    food: FoodMarkers,
    terminal_id: Option<u64>,
    last_step_id: Option<u64>,
    processed: u64,
    collected_food: u64,
}

impl<H: AgentHandle, S: PlaybackScene> PlaybackDriver<H, S> {
    pub fn new(
        record: SimulationRecord,
        pools: AgentPools<H>,
        scene: S,
        config: PlaybackConfig,
    ) -> Self {
        Self {
            record,
            pools,
            scene,
            config,
            state: PlaybackState::Uninitialized,
            queue: VecDeque::new(),
            routes: HashMap::new(),
            carrying: HashMap::new(),
            food: FoodMarkers::new(),
            terminal_id: None,
            last_step_id: None,
            processed: 0,
            collected_food: 0,
        }
    }

    /// Place the warehouse and every avatar at its first-step position, then start running.
    pub fn initialize(&mut self) -> Result<(), PlaybackError> {
        if self.state != PlaybackState::Uninitialized {
            return Err(PlaybackError::AlreadyInitialized);
        }
        if let Err(err) = self.try_initialize() {
            self.fail(&err);
            return Err(err);
        }
        Ok(())
    }

    fn try_initialize(&mut self) -> Result<(), PlaybackError> {
        self.config.validate()?;
        let first = self
            .record
            .steps
            .first()
            .cloned()
            .ok_or(MalformedStepError::NoSteps)?;
        if first.agents.is_empty() {
            return Err(MalformedStepError::NoAgents { step: first.id }.into());
        }

        for kind in AgentKind::ALL {
            for handle in self.pools.pool(kind) {
                if handle.kind() != kind {
                    return Err(RoutingError::KindMismatch {
                        pool: kind,
                        identity: handle.identity(),
                        reported: handle.kind(),
                    }
                    .into());
                }
            }
            let agents = first.count_of(kind);
            let handles = self.pools.len(kind);
            if agents != handles {
                return Err(RoutingError::PoolSizeMismatch {
                    kind,
                    agents,
                    handles,
                }
                .into());
            }
        }

        let mut routes = HashMap::with_capacity(first.agents.len());
        let mut next_slot = [0usize; 2];
        for agent in &first.agents {
            let key = agent.key();
            let slot = next_slot[agent.kind as usize];
            if routes.insert(key, slot).is_some() {
                return Err(MalformedStepError::DuplicateAgent {
                    step: first.id,
                    agent: key,
                }
                .into());
            }
            next_slot[agent.kind as usize] += 1;
        }

        self.scene.place_warehouse(self.record.storage_location);
        for agent in &first.agents {
            let key = agent.key();
            let slot = routes[&key];
            self.pools.pool_mut(agent.kind)[slot].place_at(agent.x, agent.z);
            self.carrying.insert(key, agent.has_food);
        }
        self.routes = routes;
        if !self.config.replay_initial_step {
            let mut report = StepReport {
                step_id: first.id,
                ..StepReport::default()
            };
            self.apply_step_events(&first, &mut report);
        }

        self.terminal_id = match self.config.terminal_step {
            TerminalStep::LastStep => self.record.last_step_id(),
            TerminalStep::Id(id) => Some(id),
        };
        let skip = if self.config.replay_initial_step { 0 } else { 1 };
        self.queue = self.record.steps.iter().skip(skip).cloned().collect();
        self.last_step_id = (!self.config.replay_initial_step).then_some(first.id);
        self.state = PlaybackState::Running;

        info!(
            steps = self.record.steps.len(),
            declared_steps = self.record.total_steps,
            queued = self.queue.len(),
            collectors = self.pools.len(AgentKind::Collector),
            explorers = self.pools.len(AgentKind::Explorer),
            warehouse = %self.record.storage_location,
            terminal_id = ?self.terminal_id,
            "Playback initialized"
        );
        Ok(())
    }

    /// Apply the next queued step. Only meaningful while running.
    pub fn process_step(&mut self) -> Result<TickOutcome, PlaybackError> {
        match self.state {
            PlaybackState::Uninitialized => return Err(PlaybackError::NotInitialized),
            PlaybackState::Stopped(_) => return Ok(TickOutcome::Idle),
            PlaybackState::Running => {}
        }

        let Some(step) = self.queue.pop_front() else {
            self.complete();
            return Ok(TickOutcome::Completed(None));
        };

        let report = match self.apply_step(&step) {
            Ok(report) => report,
            Err(err) => {
                self.fail(&err);
                return Err(err);
            }
        };
        self.processed += 1;
        self.last_step_id = Some(step.id);

        if self.terminal_id == Some(step.id) || self.queue.is_empty() {
            self.complete();
            Ok(TickOutcome::Completed(Some(report)))
        } else {
            Ok(TickOutcome::Advanced(report))
        }
    }

    fn apply_step(&mut self, step: &StepRecord) -> Result<StepReport, PlaybackError> {
        self.check_step(step)?;

        let mut report = StepReport {
            step_id: step.id,
            ..StepReport::default()
        };

        for agent in &step.agents {
            let key = agent.key();
            let slot = self.routes[&key];
            self.pools.pool_mut(agent.kind)[slot].move_to(
                agent.x,
                agent.z,
                self.config.move_speed,
                agent.has_food,
            );
            report.moves += 1;

            let was_carrying = self.carrying.insert(key, agent.has_food);
            if agent.kind == AgentKind::Collector && was_carrying == Some(true) && !agent.has_food
            {
                self.collected_food += 1;
                debug!(step = step.id, agent = %key, total = self.collected_food, "Food delivered");
            }
        }

        self.apply_step_events(step, &mut report);

        debug!(
            step = step.id,
            moves = report.moves,
            spawned = report.spawned.len(),
            picked = report.picked.is_some(),
            markers = self.food.len(),
            "Step applied"
        );
        Ok(report)
    }

    /// Food spawns, the pickup and the step display. Everything a step does besides moving agents.
    fn apply_step_events(&mut self, step: &StepRecord, report: &mut StepReport) {
        let interval = self.config.food_spawn_interval;
        if interval > 0 && step.id % interval == 0 {
            for food in &step.food {
                let position = food.position();
                let marker = self.food.spawn(position);
                self.scene.spawn_food(marker, position);
                report.spawned.push(marker);
            }
        }

        if let Some(pickup) = step.food_picked.filter(|pickup| pickup.picked) {
            match self.food.remove_first_at(pickup.position()) {
                Some(marker) => {
                    self.scene.despawn_food(marker.id);
                    report.picked = Some(marker.id);
                }
                None => {
                    warn!(step = step.id, position = %pickup.position(), "Pickup without a food marker");
                }
            }
        }

        self.scene.show_step(step.id);
        report.collected_food = self.collected_food;
    }

    /// Reject a step before any of its side effects run.
    fn check_step(&self, step: &StepRecord) -> Result<(), PlaybackError> {
        if step.agents.is_empty() {
            return Err(MalformedStepError::NoAgents { step: step.id }.into());
        }
        if let Some(previous) = self.last_step_id
            && step.id <= previous
        {
            return Err(MalformedStepError::OutOfOrder {
                step: step.id,
                previous,
            }
            .into());
        }
        let mut seen = Vec::with_capacity(step.agents.len());
        for agent in &step.agents {
            let key = agent.key();
            if !self.routes.contains_key(&key) {
                return Err(RoutingError::UnknownAgent {
                    step: step.id,
                    agent: key,
                }
                .into());
            }
            if seen.contains(&key) {
                return Err(MalformedStepError::DuplicateAgent {
                    step: step.id,
                    agent: key,
                }
                .into());
            }
            seen.push(key);
        }
        for kind in AgentKind::ALL {
            let agents = step.count_of(kind);
            let handles = self.pools.len(kind);
            if agents != handles {
                return Err(RoutingError::AgentCountMismatch {
                    step: step.id,
                    kind,
                    agents,
                    handles,
                }
                .into());
            }
        }
        Ok(())
    }

    fn complete(&mut self) {
        self.state = PlaybackState::Stopped(StopReason::Completed);
        self.scene.on_completed();
        info!(
            processed = self.processed,
            last_step = ?self.last_step_id,
            discarded = self.queue.len(),
            collected_food = self.collected_food,
            "Playback completed"
        );
    }

    fn fail(&mut self, err: &PlaybackError) {
        self.state = PlaybackState::Stopped(StopReason::Failed);
        error!(%err, processed = self.processed, "Playback halted");
    }

    /// Cancel a running playback. The current scene is left as is.
    pub fn stop(&mut self) {
        if self.state == PlaybackState::Running {
            self.state = PlaybackState::Stopped(StopReason::Cancelled);
            info!(processed = self.processed, remaining = self.queue.len(), "Playback cancelled");
        }
    }

    pub fn add_collected_food(&mut self, amount: u64) -> u64 {
        self.collected_food = self.collected_food.saturating_add(amount);
        self.collected_food
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == PlaybackState::Running
    }

    pub fn is_completed(&self) -> bool {
        self.state == PlaybackState::Stopped(StopReason::Completed)
    }

    pub fn processed_steps(&self) -> u64 {
        self.processed
    }

    pub fn remaining_steps(&self) -> usize {
        self.queue.len()
    }

    pub fn last_step_id(&self) -> Option<u64> {
        self.last_step_id
    }

    pub fn terminal_step_id(&self) -> Option<u64> {
        self.terminal_id
    }

    pub fn collected_food(&self) -> u64 {
        self.collected_food
    }

    pub fn food_markers(&self) -> &FoodMarkers {
        &self.food
    }

    pub fn record(&self) -> &SimulationRecord {
        &self.record
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn pools(&self) -> &AgentPools<H> {
        &self.pools
    }

    pub fn pools_mut(&mut self) -> &mut AgentPools<H> {
        &mut self.pools
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    /// Handle bound to `key`, once initialized.
    pub fn handle_for(&self, key: AgentKey) -> Option<&H> {
        let slot = *self.routes.get(&key)?;
        self.pools.pool(key.kind).get(slot)
    }
}

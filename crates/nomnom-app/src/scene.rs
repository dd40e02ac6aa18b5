//! Engine-side objects the playback driver talks to: animated avatars and the scene.

use std::collections::{BTreeMap, VecDeque};

use nomnom_core::{
    AgentHandle, AgentKind, AgentPools, FoodMarkerId, GridPos, PlaybackScene, SimulationRecord,
};
use tracing::{debug, info};

const EVENT_LOG_CAPACITY: usize = 16;

/// An on-screen agent. Positions are interpolated between the last two targets for drawing.
#[derive(Debug, Clone, PartialEq)]
pub struct Avatar {
    identity: u32,
    kind: AgentKind,
    from: (f32, f32),
    target: GridPos,
    progress: f32,
    speed: f32,
    carrying: bool,
    transitions: u64,
}

impl Avatar {
    pub fn new(kind: AgentKind, identity: u32) -> Self {
        Self {
            identity,
            kind,
            from: (0.0, 0.0),
            target: GridPos::default(),
            progress: 1.0,
            speed: 1.0,
            carrying: false,
            transitions: 0,
        }
    }

    /// Cell the avatar is heading for, or resting on.
    pub fn target(&self) -> GridPos {
        self.target
    }

    pub fn is_moving(&self) -> bool {
        self.progress < 1.0
    }

    pub fn is_carrying(&self) -> bool {
        self.carrying
    }

    /// Number of animated transitions started so far.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Interpolated position in grid units.
    pub fn position(&self) -> (f32, f32) {
        let (tx, tz) = (self.target.x as f32, self.target.z as f32);
        let t = self.progress.clamp(0.0, 1.0);
        (
            self.from.0 + (tx - self.from.0) * t,
            self.from.1 + (tz - self.from.1) * t,
        )
    }

    /// Nearest grid cell to the interpolated position.
    pub fn cell(&self) -> GridPos {
        let (x, z) = self.position();
        GridPos::new(x.round() as i32, z.round() as i32)
    }

    /// Advance the current transition by `intervals` tick intervals of travel.
    pub fn advance(&mut self, intervals: f32) {
        if !self.is_moving() || intervals <= 0.0 {
            return;
        }
        let (tx, tz) = (self.target.x as f32, self.target.z as f32);
        let distance = ((tx - self.from.0).powi(2) + (tz - self.from.1).powi(2)).sqrt();
        if distance <= f32::EPSILON || self.speed <= 0.0 {
            self.progress = 1.0;
            return;
        }
        self.progress = (self.progress + self.speed * intervals / distance).min(1.0);
    }

    /// Snap any in-flight transition to its destination.
    pub fn finish(&mut self) {
        self.progress = 1.0;
    }
}

impl AgentHandle for Avatar {
    fn identity(&self) -> u32 {
        self.identity
    }

    fn kind(&self) -> AgentKind {
        self.kind
    }

    fn place_at(&mut self, x: i32, z: i32) {
        let cell = GridPos::new(x, z);
        if self.target == cell && !self.is_moving() {
            return;
        }
        self.target = cell;
        self.from = (x as f32, z as f32);
        self.progress = 1.0;
    }

    fn move_to(&mut self, x: i32, z: i32, speed: f32, carrying: bool) {
        self.from = self.position();
        self.target = GridPos::new(x, z);
        self.speed = speed;
        self.carrying = carrying;
        self.progress = 0.0;
        self.transitions += 1;
    }
}

/// Size one pool per agent kind from the first step of the record.
pub fn build_pools(record: &SimulationRecord) -> AgentPools<Avatar> {
    let spawn = |kind| {
        let count = record
            .first_step()
            .map(|step| step.count_of(kind))
            .unwrap_or(0);
        (0..count as u32)
            .map(|identity| Avatar::new(kind, identity))
            .collect::<Vec<_>>()
    };
    let pools = AgentPools::new(spawn(AgentKind::Collector), spawn(AgentKind::Explorer));
    debug!(
        collectors = pools.len(AgentKind::Collector),
        explorers = pools.len(AgentKind::Explorer),
        "Avatar pools built"
    );
    pools
}

/// Smallest grid that contains every position mentioned by the record.
pub fn grid_extent(record: &SimulationRecord) -> (u16, u16) {
    let mut width = record.storage_location.x.max(0);
    let mut height = record.storage_location.z.max(0);
    let mut include = |pos: GridPos| {
        width = width.max(pos.x);
        height = height.max(pos.z);
    };
    for step in &record.steps {
        step.agents.iter().for_each(|agent| include(agent.position()));
        step.food.iter().for_each(|food| include(food.position()));
        if let Some(pickup) = &step.food_picked {
            include(pickup.position());
        }
    }
    let clamp = |value: i32| u16::try_from(value.saturating_add(1)).unwrap_or(u16::MAX);
    (clamp(width), clamp(height))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneEvent {
    pub step: Option<u64>,
    pub message: String,
}

/// Everything drawn besides the avatars.
#[derive(Debug, Clone, Default)]
pub struct SceneState {
    warehouse: Option<GridPos>,
    food: BTreeMap<FoodMarkerId, GridPos>,
    step: Option<u64>,
    completed: bool,
    events: VecDeque<SceneEvent>,
}

impl SceneState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warehouse(&self) -> Option<GridPos> {
        self.warehouse
    }

    pub fn step(&self) -> Option<u64> {
        self.step
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn food(&self) -> impl Iterator<Item = (FoodMarkerId, GridPos)> + '_ {
        self.food.iter().map(|(id, pos)| (*id, *pos))
    }

    pub fn food_count(&self) -> usize {
        self.food.len()
    }

    /// Recent events, oldest first.
    pub fn events(&self) -> impl DoubleEndedIterator<Item = &SceneEvent> {
        self.events.iter()
    }

    pub fn push_event(&mut self, message: impl Into<String>) {
        if self.events.len() == EVENT_LOG_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(SceneEvent {
            step: self.step,
            message: message.into(),
        });
    }
}

impl PlaybackScene for SceneState {
    fn place_warehouse(&mut self, location: GridPos) {
        self.warehouse = Some(location);
        self.push_event(format!("Warehouse at {location}"));
    }

    fn spawn_food(&mut self, marker: FoodMarkerId, position: GridPos) {
        self.food.insert(marker, position);
    }

    fn despawn_food(&mut self, marker: FoodMarkerId) {
        if let Some(position) = self.food.remove(&marker) {
            self.push_event(format!("Food picked up at {position}"));
        }
    }

    fn show_step(&mut self, step_id: u64) {
        self.step = Some(step_id);
    }

    fn on_completed(&mut self) {
        self.completed = true;
        self.push_event("Simulation complete");
        info!(step = ?self.step, "Switching to end screen");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nomnom_core::{AgentState, StepRecord};

    #[test]
    fn place_at_is_idempotent_and_cancels_motion() {
        let mut avatar = Avatar::new(AgentKind::Collector, 0);
        avatar.place_at(4, 4);
        let placed = avatar.clone();
        avatar.place_at(4, 4);
        assert_eq!(avatar, placed);

        avatar.move_to(8, 4, 1.0, false);
        avatar.advance(1.0);
        assert!(avatar.is_moving());
        avatar.place_at(2, 2);
        assert!(!avatar.is_moving());
        assert_eq!(avatar.position(), (2.0, 2.0));
    }

    #[test]
    fn move_to_interpolates_and_latest_call_wins() {
        let mut avatar = Avatar::new(AgentKind::Explorer, 1);
        avatar.place_at(0, 0);
        avatar.move_to(4, 0, 2.0, false);
        avatar.advance(1.0);
        assert_eq!(avatar.position(), (2.0, 0.0));

        avatar.move_to(2, 6, 1.0, true);
        assert_eq!(avatar.position(), (2.0, 0.0));
        assert_eq!(avatar.target(), GridPos::new(2, 6));
        assert!(avatar.is_carrying());
        avatar.advance(10.0);
        assert_eq!(avatar.cell(), GridPos::new(2, 6));
        assert_eq!(avatar.transitions(), 2);
    }

    #[test]
    fn pools_follow_first_step() {
        let agent = |id, kind| AgentState {
            id,
            kind,
            x: 1,
            z: 1,
            has_food: false,
        };
        let record = SimulationRecord {
            total_steps: 1,
            storage_location: GridPos::new(30, 2),
            steps: vec![StepRecord {
                id: 0,
                agents: vec![
                    agent(0, AgentKind::Collector),
                    agent(1, AgentKind::Collector),
                    agent(0, AgentKind::Explorer),
                ],
                food: Vec::new(),
                food_picked: None,
            }],
        };
        let pools = build_pools(&record);
        assert_eq!(pools.len(AgentKind::Collector), 2);
        assert_eq!(pools.len(AgentKind::Explorer), 1);
        assert_eq!(grid_extent(&record), (31, 3));
    }

    #[test]
    fn scene_tracks_food_and_completion() {
        let mut scene = SceneState::new();
        scene.show_step(5);
        scene.spawn_food(FoodMarkerId(0), GridPos::new(3, 7));
        scene.spawn_food(FoodMarkerId(1), GridPos::new(3, 7));
        scene.despawn_food(FoodMarkerId(0));
        scene.despawn_food(FoodMarkerId(0));
        assert_eq!(scene.food().collect::<Vec<_>>(), vec![(FoodMarkerId(1), GridPos::new(3, 7))]);

        scene.on_completed();
        assert!(scene.is_completed());
        let messages: Vec<_> = scene.events().map(|event| event.message.as_str()).collect();
        assert_eq!(messages, vec!["Food picked up at (3, 7)", "Simulation complete"]);
        assert!(scene.events().all(|event| event.step == Some(5)));
    }
}

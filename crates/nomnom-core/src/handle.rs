//! Contracts the playback driver consumes from the rendering layer.

use crate::food::FoodMarkerId;
use crate::model::{AgentKind, GridPos};

/// A controllable avatar owned by the rendering layer.
pub trait AgentHandle {
    /// Stable identity of the avatar within its pool.
    fn identity(&self) -> u32;

    /// Kind of agent this avatar represents.
    fn kind(&self) -> AgentKind;

    /// Instantaneous teleport. Used once, for initial placement.
    fn place_at(&mut self, x: i32, z: i32);

    /// Begin an animated transition towards `(x, z)`.
    ///
    /// The transition may still be in flight when the next call arrives; the newest call wins.
    /// `carrying` reports whether the agent currently holds food.
    fn move_to(&mut self, x: i32, z: i32, speed: f32, carrying: bool);
}

/// Everything besides the avatars that playback touches.
pub trait PlaybackScene {
    /// Position the warehouse. Called once during initialization.
    fn place_warehouse(&mut self, location: GridPos);

    /// Show a new food marker.
    fn spawn_food(&mut self, marker: FoodMarkerId, position: GridPos);

    /// Remove a previously spawned food marker.
    fn despawn_food(&mut self, marker: FoodMarkerId);

    /// Update the step counter display.
    fn show_step(&mut self, step_id: u64);

    /// Playback reached its terminal step. Called exactly once.
    fn on_completed(&mut self);
}

/// The two ordered avatar pools, one per agent kind, in registration order.
#[derive(Debug, Clone, Default)]
pub struct AgentPools<H> {
    collectors: Vec<H>,
    explorers: Vec<H>,
}

impl<H: AgentHandle> AgentPools<H> {
    pub fn new(collectors: Vec<H>, explorers: Vec<H>) -> Self {
        Self {
            collectors,
            explorers,
        }
    }

    pub fn pool(&self, kind: AgentKind) -> &[H] {
        match kind {
            AgentKind::Collector => &self.collectors,
            AgentKind::Explorer => &self.explorers,
        }
    }

    pub(crate) fn pool_mut(&mut self, kind: AgentKind) -> &mut [H] {
        match kind {
            AgentKind::Collector => &mut self.collectors,
            AgentKind::Explorer => &mut self.explorers,
        }
    }

    pub fn len(&self, kind: AgentKind) -> usize {
        self.pool(kind).len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty() && self.explorers.is_empty()
    }

    /// Iterate every handle, collectors first.
    pub fn iter(&self) -> impl Iterator<Item = &H> {
        self.collectors.iter().chain(self.explorers.iter())
    }

    /// Mutable access for per-frame animation. Pool sizes cannot change through it.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut H> {
        self.collectors.iter_mut().chain(self.explorers.iter_mut())
    }
}

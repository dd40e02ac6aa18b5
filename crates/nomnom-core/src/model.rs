//! Simulation record types as delivered by the simulation server.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer grid coordinate on the simulation floor.
///
/// The server names the second axis `y`; the scene treats it as depth (`z`).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GridPos {
    pub x: i32,
    #[serde(alias = "y")]
    pub z: i32,
}

impl GridPos {
    /// Construct a new grid position.
    #[must_use]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// The two kinds of agent taking part in a simulation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AgentKind {
    /// Picks up food and carries it to the warehouse.
    #[serde(rename = "collector_", alias = "collector")]
    Collector,
    /// Wanders the grid discovering food and the warehouse.
    #[serde(rename = "explorer_", alias = "explorer")]
    Explorer,
}

impl AgentKind {
    pub const ALL: [AgentKind; 2] = [AgentKind::Collector, AgentKind::Explorer];

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            AgentKind::Collector => "collector",
            AgentKind::Explorer => "explorer",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identity of an agent across steps. Ids are numbered per kind, so the kind is part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentKey {
    pub kind: AgentKind,
    pub id: u32,
}

impl fmt::Display for AgentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id)
    }
}

/// Position and payload of one agent at one step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentState {
    pub id: u32,
    #[serde(rename = "type")]
    pub kind: AgentKind,
    pub x: i32,
    #[serde(alias = "y")]
    pub z: i32,
    #[serde(default)]
    pub has_food: bool,
}

impl AgentState {
    pub fn key(&self) -> AgentKey {
        AgentKey {
            kind: self.kind,
            id: self.id,
        }
    }

    pub fn position(&self) -> GridPos {
        GridPos::new(self.x, self.z)
    }
}

/// A food item appearing on the floor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FoodState {
    pub x: i32,
    #[serde(alias = "y")]
    pub z: i32,
}

impl FoodState {
    pub fn position(&self) -> GridPos {
        GridPos::new(self.x, self.z)
    }
}

/// Pickup event attached to a step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PickedFood {
    pub x: i32,
    #[serde(alias = "y")]
    pub z: i32,
    pub picked: bool,
}

impl PickedFood {
    pub fn position(&self) -> GridPos {
        GridPos::new(self.x, self.z)
    }
}

/// One discrete simulation tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepRecord {
    pub id: u64,
    pub agents: Vec<AgentState>,
    #[serde(default)]
    pub food: Vec<FoodState>,
    #[serde(default)]
    pub food_picked: Option<PickedFood>,
}

impl StepRecord {
    /// Number of agents of `kind` listed in this step.
    pub fn count_of(&self, kind: AgentKind) -> usize {
        self.agents.iter().filter(|agent| agent.kind == kind).count()
    }
}

/// Complete, immutable description of one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimulationRecord {
    /// Declared step count; informational only and may differ from `steps.len()`.
    #[serde(default)]
    pub total_steps: u64,
    pub storage_location: GridPos,
    pub steps: Vec<StepRecord>,
}

impl SimulationRecord {
    /// The placement frame (index 0), if any.
    pub fn first_step(&self) -> Option<&StepRecord> {
        self.steps.first()
    }

    /// Id of the final step, used as the default completion id.
    pub fn last_step_id(&self) -> Option<u64> {
        self.steps.last().map(|step| step.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_state_accepts_server_wire_names() {
        let raw = r#"{"id":2,"type":"collector_","x":4,"y":9,"has_food":true}"#;
        let agent: AgentState = serde_json::from_str(raw).expect("agent");
        assert_eq!(agent.kind, AgentKind::Collector);
        assert_eq!(agent.position(), GridPos::new(4, 9));
        assert!(agent.has_food);
        assert_eq!(
            agent.key(),
            AgentKey {
                kind: AgentKind::Collector,
                id: 2
            }
        );
    }

    #[test]
    fn agent_kind_accepts_bare_spelling() {
        let kind: AgentKind = serde_json::from_str("\"explorer\"").expect("kind");
        assert_eq!(kind, AgentKind::Explorer);
        let kind: AgentKind = serde_json::from_str("\"explorer_\"").expect("kind");
        assert_eq!(kind, AgentKind::Explorer);
    }

    #[test]
    fn step_defaults_optional_fields() {
        let raw = r#"{"id":3,"agents":[{"id":0,"type":"explorer_","x":1,"z":1}]}"#;
        let step: StepRecord = serde_json::from_str(raw).expect("step");
        assert!(step.food.is_empty());
        assert!(step.food_picked.is_none());
        assert!(!step.agents[0].has_food);
        assert_eq!(step.count_of(AgentKind::Explorer), 1);
        assert_eq!(step.count_of(AgentKind::Collector), 0);
    }

    #[test]
    fn null_pickup_is_absent() {
        let raw = r#"{"id":1,"agents":[],"food":[],"food_picked":null}"#;
        let step: StepRecord = serde_json::from_str(raw).expect("step");
        assert!(step.food_picked.is_none());
    }

    #[test]
    fn last_step_id_tracks_final_entry() {
        let record = SimulationRecord {
            total_steps: 0,
            storage_location: GridPos::new(0, 0),
            steps: Vec::new(),
        };
        assert_eq!(record.last_step_id(), None);
        assert!(record.first_step().is_none());
    }
}

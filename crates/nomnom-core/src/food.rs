//! Ordered registry of food markers currently on the floor.

use crate::model::GridPos;
use serde::{Deserialize, Serialize};

/// Identifier handed out for every spawned marker; never reused.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FoodMarkerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoodMarker {
    pub id: FoodMarkerId,
    pub position: GridPos,
}

/// Live markers kept in creation order.
///
/// Spawning never checks for duplicates: two markers may share a cell.
#[derive(Debug, Clone, Default)]
pub struct FoodMarkers {
    markers: Vec<FoodMarker>,
    next_id: u64,
}

impl FoodMarkers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, position: GridPos) -> FoodMarkerId {
        let id = FoodMarkerId(self.next_id);
        self.next_id += 1;
        self.markers.push(FoodMarker { id, position });
        id
    }

    /// Remove the oldest marker at exactly `position`.
    pub fn remove_first_at(&mut self, position: GridPos) -> Option<FoodMarker> {
        let index = self
            .markers
            .iter()
            .position(|marker| marker.position == position)?;
        Some(self.markers.remove(index))
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn count_at(&self, position: GridPos) -> usize {
        self.markers
            .iter()
            .filter(|marker| marker.position == position)
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FoodMarker> {
        self.markers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removal_takes_oldest_match_only() {
        let mut markers = FoodMarkers::new();
        let first = markers.spawn(GridPos::new(3, 7));
        let other = markers.spawn(GridPos::new(1, 1));
        let second = markers.spawn(GridPos::new(3, 7));

        let removed = markers.remove_first_at(GridPos::new(3, 7)).expect("marker");
        assert_eq!(removed.id, first);
        assert_eq!(markers.len(), 2);
        let remaining: Vec<_> = markers.iter().map(|marker| marker.id).collect();
        assert_eq!(remaining, vec![other, second]);
    }

    #[test]
    fn removal_without_match_is_noop() {
        let mut markers = FoodMarkers::new();
        markers.spawn(GridPos::new(0, 0));
        assert!(markers.remove_first_at(GridPos::new(9, 9)).is_none());
        assert_eq!(markers.len(), 1);
    }

    #[test]
    fn ids_are_never_reused() {
        let mut markers = FoodMarkers::new();
        let a = markers.spawn(GridPos::new(2, 2));
        markers.remove_first_at(GridPos::new(2, 2));
        let b = markers.spawn(GridPos::new(2, 2));
        assert_ne!(a, b);
    }
}

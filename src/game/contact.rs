//! Contact oracle: the grounded predicate

use super::body::BodyId;
use super::physics::PhysicsBackend;

/// Tracked obstacle set queried for contacts with a single body
#[derive(Debug, Clone, Default)]
pub struct ContactOracle {
    obstacles: Vec<BodyId>,
}

impl ContactOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking an obstacle; tracking twice is a no-op
    pub fn track(&mut self, id: BodyId) {
        if !self.obstacles.contains(&id) {
            self.obstacles.push(id);
        }
    }

    pub fn untrack(&mut self, id: BodyId) {
        self.obstacles.retain(|&o| o != id);
    }

    pub fn obstacles(&self) -> &[BodyId] {
        &self.obstacles
    }

    /// Number of contact pairs between `body` and the tracked obstacles
    pub fn contact_count<P: PhysicsBackend>(&self, world: &P, body: BodyId) -> usize {
        world.contacts(body, &self.obstacles).len()
    }

    /// Grounded iff at least one contact pair exists
    pub fn is_grounded<P: PhysicsBackend>(&self, world: &P, body: BodyId) -> bool {
        self.contact_count(world, body) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::body::{Body, Shape};
    use crate::game::physics::ArenaWorld;
    use glam::Vec3;

    fn setup(player_y: f32) -> (ArenaWorld, ContactOracle, BodyId) {
        let mut world = ArenaWorld::default();
        let floor = world.insert(Body::kinematic(Shape::Box {
            width: 100.0,
            height: 10.0,
            depth: 100.0,
        }));
        let player = world.insert(
            Body::new(
                Shape::Box {
                    width: 5.0,
                    height: 7.0,
                    depth: 5.0,
                },
                1.0,
            )
            .with_position(Vec3::new(0.0, player_y, 0.0)),
        );
        let mut oracle = ContactOracle::new();
        oracle.track(floor);
        (world, oracle, player)
    }

    #[test]
    fn standing_on_floor_is_grounded() {
        let (world, oracle, player) = setup(8.5);
        assert!(oracle.is_grounded(&world, player));
        assert_eq!(oracle.contact_count(&world, player), 1);
    }

    #[test]
    fn nothing_below_is_not_grounded() {
        let (world, oracle, player) = setup(20.0);
        assert!(!oracle.is_grounded(&world, player));
    }

    #[test]
    fn empty_obstacle_set_is_not_grounded() {
        let (world, _, player) = setup(8.5);
        assert!(!ContactOracle::new().is_grounded(&world, player));
    }

    #[test]
    fn untracked_obstacles_are_ignored() {
        let (world, mut oracle, player) = setup(8.5);
        let floor = oracle.obstacles()[0];
        oracle.track(floor);
        assert_eq!(oracle.obstacles().len(), 1);
        oracle.untrack(floor);
        assert!(!oracle.is_grounded(&world, player));
    }
}

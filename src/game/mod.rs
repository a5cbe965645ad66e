//! Arena simulation modules

pub mod body;
pub mod camera;
pub mod combat;
pub mod contact;
pub mod impulse;
pub mod input;
pub mod mirror;
pub mod movement;
pub mod physics;
pub mod render;
pub mod session;
pub mod snapshot;

pub use session::ArenaSession;

use std::time::Duration;

use glam::Vec3;

use body::Shape;
use combat::BlasterStats;
use movement::MovementStats;

/// Gameplay constants for one client
#[derive(Debug, Clone)]
pub struct Tuning {
    pub movement: MovementStats,
    pub blaster: BlasterStats,
    pub gravity: Vec3,
    /// Separation still counted as touching
    pub contact_skin: f32,
    pub player_shape: Shape,
    pub player_mass: f32,
    pub player_damping: f32,
    /// Enemy dimensions used for every mirror
    pub mirror_shape: Shape,
    /// Scale applied to received knockback
    pub knockback_multiplier: f32,
    /// Falling below this height triggers a respawn
    pub floor_y: f32,
    pub spawn_height: f32,
    /// Inclusive integer range for the spawn x and z
    pub spawn_range: (i32, i32),
    /// `None` keeps quiet mirrors forever
    pub mirror_timeout: Option<Duration>,
}

impl Default for Tuning {
    fn default() -> Self {
        let avatar = Shape::Box {
            width: 5.0,
            height: 7.0,
            depth: 5.0,
        };
        Self {
            movement: MovementStats::default(),
            blaster: BlasterStats::default(),
            gravity: Vec3::new(0.0, -20.0, 0.0),
            contact_skin: 0.05,
            player_shape: avatar,
            player_mass: 1.0,
            player_damping: 0.9,
            mirror_shape: avatar,
            knockback_multiplier: 3.0,
            floor_y: -10.0,
            spawn_height: 15.0,
            spawn_range: (-4, 0),
            mirror_timeout: Some(Duration::from_secs(10)),
        }
    }
}

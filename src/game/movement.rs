//! Local player movement: held input to impulses and speed clamps

use glam::Vec3;

use super::body::BodyId;
use super::contact::ContactOracle;
use super::input::{InputSnapshot, InputSymbol};
use super::physics::PhysicsBackend;

/// Local player movement constants
#[derive(Debug, Clone, Copy)]
pub struct MovementStats {
    /// Horizontal speed the applied force converges towards
    pub target_speed: f32,
    /// Vertical impulse of a grounded jump
    pub jump_height: f32,
    /// Bearing change in degrees per tick while a turn symbol is held
    pub turn_speed: f32,
    /// Per-axis horizontal velocity clamp
    pub speed_limit: f32,
    /// Vertical speed above which jumps are locked out
    pub jump_lockout_speed: f32,
}

impl Default for MovementStats {
    fn default() -> Self {
        Self {
            target_speed: 40.0,
            jump_height: 15.0,
            turn_speed: 3.0,
            speed_limit: 40.0,
            jump_lockout_speed: 1.0,
        }
    }
}

/// What the integrator did this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementOutcome {
    /// Movement vector in body-local axes, after the jump lockout
    pub movement: Vec3,
    /// `None` when jump was not held and the oracle was not asked
    pub grounded: Option<bool>,
    pub applied_force: f32,
    pub impulse: Vec3,
}

/// Movement integrator for the local player body
pub struct MovementIntegrator;

impl MovementIntegrator {
    /// Horizontal movement vector in body-local axes. Opposing symbols cancel
    /// by summation.
    pub fn movement_vector(input: &InputSnapshot) -> Vec3 {
        let mut movement = Vec3::ZERO;
        for symbol in &input.held {
            match symbol {
                InputSymbol::Forward => movement.z -= 1.0,
                InputSymbol::Back => movement.z += 1.0,
                InputSymbol::StrafeLeft => movement.x -= 1.0,
                InputSymbol::StrafeRight => movement.x += 1.0,
                _ => {}
            }
        }
        movement
    }

    /// Bearing change in degrees requested this tick
    pub fn bearing_delta(input: &InputSnapshot, stats: &MovementStats) -> f32 {
        let mut delta = input.look_delta;
        if input.is_held(InputSymbol::TurnLeft) {
            delta -= stats.turn_speed;
        }
        if input.is_held(InputSymbol::TurnRight) {
            delta += stats.turn_speed;
        }
        delta
    }

    /// Force that shrinks as the body approaches the target speed
    pub fn applied_force(target_speed: f32, velocity: Vec3) -> f32 {
        let current = (velocity.x * velocity.x + velocity.z * velocity.z).sqrt();
        (target_speed - current).abs()
    }

    /// Run one tick of local movement against the physics world
    pub fn integrate<P: PhysicsBackend>(
        world: &mut P,
        oracle: &ContactOracle,
        player: BodyId,
        input: &InputSnapshot,
        stats: &MovementStats,
    ) -> Option<MovementOutcome> {
        let velocity = world.body(player)?.velocity;

        let mut movement = Self::movement_vector(input);
        let mut grounded = None;
        if input.is_held(InputSymbol::Jump) {
            let on_ground = oracle.is_grounded(world, player);
            grounded = Some(on_ground);
            if on_ground {
                movement.y += 1.0;
            }
        }

        // Already rising or falling: no stacking of jump impulses
        if velocity.y.abs() > stats.jump_lockout_speed {
            movement.y = 0.0;
        }

        let applied_force = Self::applied_force(stats.target_speed, velocity);
        let impulse = Vec3::new(
            applied_force * movement.x,
            stats.jump_height * movement.y,
            applied_force * movement.z,
        );
        world.apply_local_impulse(player, impulse);

        let delta = Self::bearing_delta(input, stats);
        let body = world.body_mut(player)?;
        let limit = stats.speed_limit;
        body.velocity.x = body.velocity.x.clamp(-limit, limit);
        body.velocity.z = body.velocity.z.clamp(-limit, limit);

        if delta != 0.0 {
            body.bearing.y += delta;
            body.apply_bearing();
        }

        Some(MovementOutcome {
            movement,
            grounded,
            applied_force,
            impulse,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::body::{Body, Material, Shape};
    use crate::game::physics::ArenaWorld;

    struct Rig {
        world: ArenaWorld,
        oracle: ContactOracle,
        player: BodyId,
    }

    fn rig(player_y: f32) -> Rig {
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
            .with_position(Vec3::new(0.0, player_y, 0.0))
            .with_material(Material { friction: 0.0 }),
        );
        let mut oracle = ContactOracle::new();
        oracle.track(floor);
        Rig {
            world,
            oracle,
            player,
        }
    }

    fn run(rig: &mut Rig, input: &InputSnapshot) -> MovementOutcome {
        MovementIntegrator::integrate(
            &mut rig.world,
            &rig.oracle,
            rig.player,
            input,
            &MovementStats::default(),
        )
        .unwrap()
    }

    #[test]
    fn opposing_symbols_cancel() {
        let input = InputSnapshot::holding([
            InputSymbol::Forward,
            InputSymbol::Back,
            InputSymbol::StrafeRight,
        ]);
        assert_eq!(
            MovementIntegrator::movement_vector(&input),
            Vec3::new(1.0, 0.0, 0.0)
        );
    }

    #[test]
    fn applied_force_decays_towards_target() {
        assert_eq!(MovementIntegrator::applied_force(40.0, Vec3::ZERO), 40.0);
        assert_eq!(
            MovementIntegrator::applied_force(40.0, Vec3::new(30.0, -50.0, 0.0)),
            10.0
        );
        assert_eq!(
            MovementIntegrator::applied_force(40.0, Vec3::new(30.0, 0.0, 40.0)),
            10.0
        );
    }

    #[test]
    fn horizontal_speed_is_clamped_every_tick() {
        let mut rig = rig(8.5);
        let input = InputSnapshot::holding([InputSymbol::Forward, InputSymbol::StrafeRight]);
        let limit = MovementStats::default().speed_limit;

        for tick in 0..120 {
            {
                let body = rig.world.body_mut(rig.player).unwrap();
                if tick % 7 == 0 {
                    body.velocity.x = 300.0;
                    body.velocity.z = -300.0;
                }
            }
            run(&mut rig, &input);
            let v = rig.world.body(rig.player).unwrap().velocity;
            assert!(v.x.abs() <= limit, "tick {tick}: vx = {}", v.x);
            assert!(v.z.abs() <= limit, "tick {tick}: vz = {}", v.z);
            rig.world.step(1.0 / 60.0);
        }
    }

    #[test]
    fn grounded_jump_applies_vertical_impulse() {
        let mut rig = rig(8.5);
        let outcome = run(&mut rig, &InputSnapshot::holding([InputSymbol::Jump]));
        assert_eq!(outcome.grounded, Some(true));
        assert_eq!(outcome.movement.y, 1.0);
        let v = rig.world.body(rig.player).unwrap().velocity;
        assert!((v.y - 15.0).abs() < 1e-4);
    }

    #[test]
    fn airborne_jump_does_nothing() {
        let mut rig = rig(30.0);
        let outcome = run(&mut rig, &InputSnapshot::holding([InputSymbol::Jump]));
        assert_eq!(outcome.grounded, Some(false));
        assert_eq!(outcome.movement.y, 0.0);
        assert_eq!(rig.world.body(rig.player).unwrap().velocity.y, 0.0);
    }

    #[test]
    fn vertical_speed_locks_out_jump_even_when_grounded() {
        let mut rig = rig(8.5);
        rig.world.body_mut(rig.player).unwrap().velocity.y = -1.5;

        let outcome = run(&mut rig, &InputSnapshot::holding([InputSymbol::Jump]));
        assert_eq!(outcome.grounded, Some(true));
        assert_eq!(outcome.movement.y, 0.0);
        assert_eq!(outcome.impulse.y, 0.0);
        assert_eq!(rig.world.body(rig.player).unwrap().velocity.y, -1.5);
    }

    #[test]
    fn idle_input_applies_no_impulse() {
        let mut rig = rig(8.5);
        rig.world.body_mut(rig.player).unwrap().velocity = Vec3::new(3.0, 0.0, 0.0);
        let outcome = run(&mut rig, &InputSnapshot::default());
        assert_eq!(outcome.impulse, Vec3::ZERO);
        assert_eq!(
            rig.world.body(rig.player).unwrap().velocity,
            Vec3::new(3.0, 0.0, 0.0)
        );
    }

    #[test]
    fn turning_updates_bearing_and_orientation() {
        let mut rig = rig(8.5);
        let mut input = InputSnapshot::holding([InputSymbol::TurnRight]);
        input.look_delta = 2.0;
        run(&mut rig, &input);

        let body = rig.world.body(rig.player).unwrap();
        assert_eq!(body.bearing.y, 5.0);
        assert!(body.orientation.abs_diff_eq(body.bearing.to_quat(), 1e-6));
    }
}

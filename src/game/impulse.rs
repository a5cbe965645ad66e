//! Self-targeted knockback consumption

use glam::Vec3;
use tracing::{debug, info};

use super::body::BodyId;
use super::physics::PhysicsBackend;
use crate::relay::protocol::{DeviceId, ImpulseRecord};
use crate::relay::{RelayPath, RelayStore};

/// What happened to one delivery of the `currentImpulse` slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImpulseOutcome {
    /// Empty slot, or a bare zero vector
    Absent,
    /// Impulse applied to the local body; carries the scaled vector
    Applied(Vec3),
    /// A flagged hit whose knockback is exactly zero
    HitWithoutForce,
    /// Redelivery of a record already consumed
    Duplicate,
}

/// Applies knockback from this client's impulse slot at most once
#[derive(Debug, Clone)]
pub struct ImpulseConsumer {
    slot: RelayPath,
    multiplier: f32,
    /// Record consumed but not yet observed deleted
    awaiting_clear: Option<ImpulseRecord>,
}

impl ImpulseConsumer {
    pub fn new(device_id: DeviceId, multiplier: f32) -> Self {
        Self {
            slot: RelayPath::current_impulse(device_id),
            multiplier,
            awaiting_clear: None,
        }
    }

    /// Decide what a delivery means without touching the world
    pub fn classify(&self, delivery: Option<&ImpulseRecord>) -> ImpulseOutcome {
        let Some(record) = delivery else {
            return ImpulseOutcome::Absent;
        };
        if self.awaiting_clear.as_ref() == Some(record) {
            return ImpulseOutcome::Duplicate;
        }
        if record.is_zero() {
            return if record.marks_hit() {
                ImpulseOutcome::HitWithoutForce
            } else {
                ImpulseOutcome::Absent
            };
        }
        ImpulseOutcome::Applied(record.vector() * self.multiplier)
    }

    /// Handle one slot delivery: apply, then delete the slot
    pub fn consume<P: PhysicsBackend>(
        &mut self,
        delivery: Option<ImpulseRecord>,
        world: &mut P,
        player: BodyId,
        relay: &dyn RelayStore,
    ) -> ImpulseOutcome {
        let outcome = self.classify(delivery.as_ref());
        match outcome {
            ImpulseOutcome::Absent => {
                if delivery.is_none() {
                    self.awaiting_clear = None;
                }
            }
            ImpulseOutcome::Duplicate => {
                debug!(slot = %self.slot, "Ignoring redelivered impulse");
            }
            ImpulseOutcome::Applied(impulse) => {
                world.apply_local_impulse(player, impulse);
                relay.delete(&self.slot);
                self.awaiting_clear = delivery;
                info!(
                    x = impulse.x,
                    y = impulse.y,
                    z = impulse.z,
                    sender = ?delivery.and_then(|r| r.sender_id),
                    "Knockback applied"
                );
            }
            ImpulseOutcome::HitWithoutForce => {
                relay.delete(&self.slot);
                self.awaiting_clear = delivery;
                info!("Hit at blast centre, no knockback");
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::body::{Body, Shape};
    use crate::game::physics::ArenaWorld;
    use crate::relay::protocol::parse_impulse;
    use crate::relay::{MemoryRelay, RelayStoreExt};

    const ME: DeviceId = DeviceId(77);

    fn rig() -> (ArenaWorld, BodyId, MemoryRelay, ImpulseConsumer) {
        let mut world = ArenaWorld::new(Vec3::ZERO, 0.05);
        let player = world.insert(Body::new(Shape::cube(5.0), 1.0).with_damping(0.0));
        (world, player, MemoryRelay::new(), ImpulseConsumer::new(ME, 3.0))
    }

    fn read_slot(relay: &MemoryRelay) -> Option<ImpulseRecord> {
        parse_impulse(relay.get(&RelayPath::current_impulse(ME)).as_ref())
    }

    #[test]
    fn applies_scaled_impulse_once_and_clears_slot() {
        let (mut world, player, relay, mut consumer) = rig();
        let record = ImpulseRecord::knockback(Vec3::new(2.0, 1.0, 0.0), DeviceId(5));
        relay.set_json(&RelayPath::current_impulse(ME), &record);

        let delivered = read_slot(&relay);
        let outcome = consumer.consume(delivered, &mut world, player, &relay);
        assert_eq!(outcome, ImpulseOutcome::Applied(Vec3::new(6.0, 3.0, 0.0)));
        assert_eq!(world.body(player).unwrap().velocity, Vec3::new(6.0, 3.0, 0.0));
        assert!(read_slot(&relay).is_none());

        // A stale redelivery of the same value must not apply again
        let outcome = consumer.consume(Some(record), &mut world, player, &relay);
        assert_eq!(outcome, ImpulseOutcome::Duplicate);
        assert_eq!(world.body(player).unwrap().velocity, Vec3::new(6.0, 3.0, 0.0));
    }

    #[test]
    fn identical_hit_after_clear_applies_again() {
        let (mut world, player, relay, mut consumer) = rig();
        let record = ImpulseRecord::knockback(Vec3::X, DeviceId(5));

        consumer.consume(Some(record), &mut world, player, &relay);
        consumer.consume(None, &mut world, player, &relay);
        let outcome = consumer.consume(Some(record), &mut world, player, &relay);
        assert_eq!(outcome, ImpulseOutcome::Applied(Vec3::new(3.0, 0.0, 0.0)));
        assert_eq!(world.body(player).unwrap().velocity.x, 6.0);
    }

    #[test]
    fn bare_zero_vector_is_absent_and_left_alone() {
        let (mut world, player, relay, mut consumer) = rig();
        let slot = RelayPath::current_impulse(ME);
        relay.set(&slot, serde_json::json!({"x": 0.0, "y": 0.0, "z": 0.0}));

        let outcome = consumer.consume(read_slot(&relay), &mut world, player, &relay);
        assert_eq!(outcome, ImpulseOutcome::Absent);
        assert_eq!(world.body(player).unwrap().velocity, Vec3::ZERO);
        assert!(relay.get(&slot).is_some());
    }

    #[test]
    fn flagged_zero_vector_is_consumed_without_force() {
        let (mut world, player, relay, mut consumer) = rig();
        let record = ImpulseRecord::knockback(Vec3::ZERO, DeviceId(5));
        relay.set_json(&RelayPath::current_impulse(ME), &record);

        let outcome = consumer.consume(read_slot(&relay), &mut world, player, &relay);
        assert_eq!(outcome, ImpulseOutcome::HitWithoutForce);
        assert_eq!(world.body(player).unwrap().velocity, Vec3::ZERO);
        assert!(read_slot(&relay).is_none());
    }
}

//! Combat resolver: shot acceptance, projectile animation, blast resolution

use std::time::{Duration, Instant};

use glam::Vec3;
use tracing::info;
use uuid::Uuid;

use super::body::{BodyId, Shape};
use super::physics::{PhysicsBackend, Ray};
use crate::relay::protocol::{DeviceId, ImpulseRecord, ProjectileWire};
use crate::relay::{RelayPath, RelayStore, RelayStoreExt};

/// Blaster constants
#[derive(Debug, Clone, Copy)]
pub struct BlasterStats {
    /// Minimum interval between accepted shots
    pub cooldown: Duration,
    /// Interval between projectile micro-steps
    pub step_interval: Duration,
    /// Projectile visual radius
    pub projectile_radius: f32,
    pub blast_radius: f32,
    /// How long the blast visual stays up
    pub blast_lifetime: Duration,
}

impl BlasterStats {
    pub fn projectile_shape(&self) -> Shape {
        Shape::Sphere {
            radius: self.projectile_radius,
        }
    }
}

impl Default for BlasterStats {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(500),
            step_interval: Duration::from_millis(10),
            projectile_radius: 1.0,
            blast_radius: 10.0,
            blast_lifetime: Duration::from_millis(300),
        }
    }
}

/// Why a shot never left the cooldown check or the raycast
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ShotRejected {
    #[error("weapon is cooling down")]
    Cooldown,

    #[error("aiming is disabled while the pointer is locked")]
    PointerLocked,

    #[error("nothing under the pointer")]
    NoTarget,

    #[error("cannot target yourself")]
    SelfHit,

    #[error("target is too close to aim at")]
    Degenerate,
}

/// Projectile being animated by this client
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveShot {
    pub id: Uuid,
    pub position: Vec3,
    pub increment: Vec3,
    pub steps_total: u32,
    pub steps_done: u32,
}

/// Projectile that completed its step count this micro-step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arrival {
    pub id: Uuid,
    pub point: Vec3,
}

/// Entity a blast may knock back
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlastTarget {
    pub device_id: DeviceId,
    pub body: BodyId,
}

/// Knockback published to one target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlastHit {
    pub device_id: DeviceId,
    pub knockback: Vec3,
}

/// Result of resolving one blast
#[derive(Debug, Clone, PartialEq)]
pub struct BlastOutcome {
    pub blast: Blast,
    pub hits: Vec<BlastHit>,
}

/// Blast visual waiting for removal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blast {
    pub id: Uuid,
    pub center: Vec3,
    pub radius: f32,
    expires_at: Instant,
}

pub struct CombatResolver {
    stats: BlasterStats,
    last_shot: Option<Instant>,
    shots: Vec<ActiveShot>,
    blasts: Vec<Blast>,
}

impl CombatResolver {
    pub fn new(stats: BlasterStats) -> Self {
        Self {
            stats,
            last_shot: None,
            shots: Vec::new(),
            blasts: Vec::new(),
        }
    }

    pub fn stats(&self) -> &BlasterStats {
        &self.stats
    }

    pub fn shots(&self) -> &[ActiveShot] {
        &self.shots
    }

    /// Cooldown check
    pub fn can_fire(&self, now: Instant) -> bool {
        self.last_shot
            .map_or(true, |last| now.saturating_duration_since(last) >= self.stats.cooldown)
    }

    /// Try to start a shot along `ray`. Rejections leave no trace: no
    /// cooldown is consumed and nothing is written to the relay.
    pub fn fire<P: PhysicsBackend>(
        &mut self,
        now: Instant,
        pointer_locked: bool,
        ray: &Ray,
        world: &P,
        shooter: BodyId,
    ) -> Result<Uuid, ShotRejected> {
        if !self.can_fire(now) {
            return Err(ShotRejected::Cooldown);
        }
        if pointer_locked {
            return Err(ShotRejected::PointerLocked);
        }

        let hit = world.raycast(ray).ok_or(ShotRejected::NoTarget)?;
        if hit.body == shooter {
            return Err(ShotRejected::SelfHit);
        }
        let origin = world
            .body(shooter)
            .map(|b| b.position)
            .ok_or(ShotRejected::NoTarget)?;

        let shot = hit.point - origin;
        let steps = (shot.x * shot.x + shot.z * shot.z).sqrt().floor();
        if !steps.is_finite() || steps < 1.0 {
            return Err(ShotRejected::Degenerate);
        }

        let id = Uuid::new_v4();
        self.shots.push(ActiveShot {
            id,
            position: origin,
            increment: shot / steps,
            steps_total: steps as u32,
            steps_done: 0,
        });
        self.last_shot = Some(now);

        info!(
            projectile_id = %id,
            steps = steps as u32,
            target = %hit.body,
            "Shot fired"
        );
        Ok(id)
    }

    /// One animation micro-step: move every projectile, broadcast its
    /// position, and retire the ones that reached their step count
    pub fn advance(&mut self, relay: &dyn RelayStore, sender: DeviceId) -> Vec<Arrival> {
        let mut arrivals = Vec::new();

        for shot in &mut self.shots {
            shot.position += shot.increment;
            shot.steps_done += 1;

            let path = RelayPath::projectile(shot.id);
            relay.set_json(
                &path,
                &ProjectileWire {
                    x: shot.position.x,
                    y: shot.position.y,
                    z: shot.position.z,
                    sender_id: Some(sender),
                },
            );

            if shot.steps_done >= shot.steps_total {
                relay.delete(&path);
                arrivals.push(Arrival {
                    id: shot.id,
                    point: shot.position,
                });
            }
        }

        self.shots.retain(|s| s.steps_done < s.steps_total);
        arrivals
    }

    /// Publish knockback to every target whose bounding box reaches into the
    /// blast sphere, and start the blast visual
    pub fn resolve_blast<P: PhysicsBackend>(
        &mut self,
        center: Vec3,
        world: &P,
        targets: &[BlastTarget],
        relay: &dyn RelayStore,
        sender: DeviceId,
        now: Instant,
    ) -> BlastOutcome {
        let radius = self.stats.blast_radius;
        let mut hits = Vec::new();

        for target in targets {
            let Some(body) = world.body(target.body) else {
                continue;
            };
            let closest = body.aabb().closest_point(center);
            if closest.distance_squared(center) > radius * radius {
                continue;
            }

            let knockback = body.position - center;
            relay.set_json(
                &RelayPath::current_impulse(target.device_id),
                &ImpulseRecord::knockback(knockback, sender),
            );
            hits.push(BlastHit {
                device_id: target.device_id,
                knockback,
            });
        }

        let blast = Blast {
            id: Uuid::new_v4(),
            center,
            radius,
            expires_at: now + self.stats.blast_lifetime,
        };
        self.blasts.push(blast);
        BlastOutcome { blast, hits }
    }

    /// Drop blast visuals past their lifetime, returning their ids
    pub fn expire_blasts(&mut self, now: Instant) -> Vec<Uuid> {
        let (expired, live): (Vec<Blast>, Vec<Blast>) =
            self.blasts.drain(..).partition(|b| now >= b.expires_at);
        self.blasts = live;
        expired.into_iter().map(|b| b.id).collect()
    }
}

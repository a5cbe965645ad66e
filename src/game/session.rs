//! Client simulation driver
//!
//! One session owns the local world and every collaborator. Relay pushes
//! queue up in the broadcast channel and are drained at the top of each
//! tick, so nothing mutates the world between tick boundaries.

use std::collections::HashSet;
use std::future::Future;
use std::time::{Duration, Instant};

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace};

use super::body::{Body, BodyId, Material, Pose, Shape};
use super::camera::Camera;
use super::combat::{BlastTarget, CombatResolver, ShotRejected};
use super::contact::ContactOracle;
use super::impulse::{ImpulseConsumer, ImpulseOutcome};
use super::input::{InputSnapshot, InputSource};
use super::mirror::{MirrorSynchronizer, SyncReport};
use super::movement::MovementIntegrator;
use super::physics::{ArenaWorld, PhysicsBackend};
use super::render::{EntityKey, RenderSurface, VisualKind};
use super::snapshot::SnapshotBuilder;
use super::Tuning;
use crate::relay::protocol::{DeviceId, PeerMap, ProjectileMap};
use crate::relay::BroadcastChannel;
use crate::util::time::Timer;

/// Timer cadences of the client loop
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    pub simulation: Duration,
    pub upload: Duration,
    pub projectile_step: Duration,
}

/// What one tick did, for logging and tests
#[derive(Debug, Default)]
pub struct TickReport {
    pub respawned: bool,
    pub impulses: Vec<ImpulseOutcome>,
    pub shot: Option<Result<uuid::Uuid, ShotRejected>>,
    pub mirrors: SyncReport,
}

/// A running client: local player, mirrors, combat and relay traffic
pub struct ArenaSession<S: RenderSurface, I: InputSource> {
    tuning: Tuning,
    world: ArenaWorld,
    oracle: ContactOracle,
    player: BodyId,
    props: Vec<BodyId>,
    mirrors: MirrorSynchronizer,
    combat: CombatResolver,
    impulses: ImpulseConsumer,
    channel: BroadcastChannel,
    snapshots: SnapshotBuilder,
    surface: S,
    input: I,
    camera: Camera,
    rng: ChaCha8Rng,
    /// Latest peer map, replaced wholesale on every delivery
    peers: PeerMap,
    /// Latest projectile collection from other shooters
    projectiles: ProjectileMap,
    rendered_projectiles: HashSet<String>,
    ticks: u64,
}

impl<S: RenderSurface, I: InputSource> ArenaSession<S, I> {
    pub fn new(
        tuning: Tuning,
        channel: BroadcastChannel,
        surface: S,
        input: I,
        viewport: (u32, u32),
        seed: u64,
    ) -> Self {
        let device_id = channel.device_id();
        let mut world = ArenaWorld::new(tuning.gravity, tuning.contact_skin);
        let mut oracle = ContactOracle::new();

        let ground = world.insert(Body::kinematic(Shape::Box {
            width: 100.0,
            height: 10.0,
            depth: 100.0,
        }));
        let crate_prop = world.insert(
            Body::new(Shape::cube(5.0), 10_000.0).with_position(Vec3::new(-20.0, 7.0, 0.0)),
        );
        oracle.track(ground);
        oracle.track(crate_prop);

        let player = world.insert(
            Body::new(tuning.player_shape, tuning.player_mass)
                .with_material(Material { friction: 0.0 })
                .with_damping(tuning.player_damping),
        );

        let mut session = Self {
            mirrors: MirrorSynchronizer::new(device_id, tuning.mirror_shape, tuning.mirror_timeout),
            combat: CombatResolver::new(tuning.blaster),
            impulses: ImpulseConsumer::new(device_id, tuning.knockback_multiplier),
            snapshots: SnapshotBuilder::new(device_id),
            camera: Camera::new(viewport),
            rng: ChaCha8Rng::seed_from_u64(seed),
            tuning,
            world,
            oracle,
            player,
            props: vec![ground, crate_prop],
            channel,
            surface,
            input,
            peers: PeerMap::new(),
            projectiles: ProjectileMap::new(),
            rendered_projectiles: HashSet::new(),
            ticks: 0,
        };
        session.spawn();
        info!(device_id = %device_id, "Arena session ready");
        session
    }

    pub fn device_id(&self) -> DeviceId {
        self.channel.device_id()
    }

    /// Place the local player at a fresh spawn point, at rest
    fn spawn(&mut self) {
        let (lo, hi) = self.tuning.spawn_range;
        let x = self.rng.gen_range(lo..=hi) as f32;
        let z = self.rng.gen_range(lo..=hi) as f32;
        let height = self.tuning.spawn_height;
        if let Some(body) = self.world.body_mut(self.player) {
            body.position = Vec3::new(x, height, z);
            body.velocity = Vec3::ZERO;
        }
    }

    /// Liveness check: respawn when the player fell below the floor
    pub fn respawn_if_fallen(&mut self) -> bool {
        let fallen = self
            .world
            .body(self.player)
            .is_some_and(|b| b.position.y < self.tuning.floor_y);
        if !fallen {
            return false;
        }
        self.spawn();
        info!(device_id = %self.device_id(), "Player fell, respawning");
        self.surface.notify("You fell! Respawning");
        true
    }

    /// One fixed-interval simulation tick
    pub fn tick(&mut self, now: Instant, dt: f32) -> TickReport {
        self.ticks += 1;
        let mut report = TickReport::default();

        let inbound = self.channel.drain();
        if let Some(peers) = inbound.peers {
            self.peers = peers;
        }
        if let Some(projectiles) = inbound.projectiles {
            self.projectiles = projectiles;
        }
        for delivery in inbound.impulses {
            let outcome =
                self.impulses
                    .consume(delivery, &mut self.world, self.player, self.channel.relay());
            if outcome == ImpulseOutcome::HitWithoutForce {
                self.surface.notify("Hit!");
            }
            report.impulses.push(outcome);
        }

        let input = self.input.sample();
        let movement = MovementIntegrator::integrate(
            &mut self.world,
            &self.oracle,
            self.player,
            &input,
            &self.tuning.movement,
        );
        if let Some(movement) = &movement {
            trace!(
                grounded = ?movement.grounded,
                force = movement.applied_force,
                impulse = ?movement.impulse,
                "Movement"
            );
        }
        report.shot = self.shoot(now, &input);

        report.respawned = self.respawn_if_fallen();

        report.mirrors = self.mirrors.apply(
            &self.peers,
            &mut self.world,
            &mut self.oracle,
            &mut self.surface,
            now,
        );
        self.reconcile_projectiles();

        self.world.step(dt);

        self.push_poses();
        for blast in self.combat.expire_blasts(now) {
            self.surface.remove(&EntityKey::Blast(blast));
        }
        report
    }

    fn shoot(
        &mut self,
        now: Instant,
        input: &InputSnapshot,
    ) -> Option<Result<uuid::Uuid, ShotRejected>> {
        let click = input.click?;
        let ray = self.camera.screen_ray(click.x, click.y);
        let result = self
            .combat
            .fire(now, input.pointer_locked, &ray, &self.world, self.player);
        match &result {
            Ok(_) => {}
            Err(e @ (ShotRejected::SelfHit | ShotRejected::Degenerate)) => {
                debug!(reason = %e, "Shot aborted");
                self.surface.notify(&e.to_string());
            }
            Err(e) => debug!(reason = %e, "Shot ignored"),
        }
        Some(result)
    }

    /// Mirror the projectile collection onto the surface, skipping our own
    /// shots which are rendered from the resolver directly
    fn reconcile_projectiles(&mut self) {
        let me = self.device_id();
        let kind = VisualKind::Projectile {
            shape: self.combat.stats().projectile_shape(),
        };
        let mut seen = HashSet::new();
        for projectile in self.projectiles.values() {
            if projectile.sender_id == Some(me) {
                continue;
            }
            self.surface.set_pose(
                EntityKey::Projectile(projectile.id.clone()),
                kind,
                Pose::at(projectile.position),
            );
            seen.insert(projectile.id.clone());
        }

        for finished in self.rendered_projectiles.difference(&seen) {
            self.surface.remove(&EntityKey::Projectile(finished.clone()));
        }
        self.rendered_projectiles = seen;
    }

    fn push_poses(&mut self) {
        if let Some(body) = self.world.body(self.player) {
            self.surface
                .set_pose(EntityKey::Body(body.id), VisualKind::LocalPlayer, body.pose());
            self.camera.follow(body.position);
        }
        for &prop in &self.props {
            if let Some(body) = self.world.body(prop) {
                self.surface
                    .set_pose(EntityKey::Body(body.id), VisualKind::Prop, body.pose());
            }
        }
    }

    /// One projectile micro-step: animate our shots and resolve arrivals
    pub fn advance_projectiles(&mut self, now: Instant) {
        let me = self.device_id();
        let arrivals = self.combat.advance(self.channel.relay(), me);

        let kind = VisualKind::Projectile {
            shape: self.combat.stats().projectile_shape(),
        };
        for shot in self.combat.shots() {
            self.surface.set_pose(
                EntityKey::Projectile(shot.id.to_string()),
                kind,
                Pose::at(shot.position),
            );
        }
        if arrivals.is_empty() {
            return;
        }

        let mut targets: Vec<BlastTarget> = self
            .mirrors
            .targets()
            .into_iter()
            .map(|(device_id, body)| BlastTarget { device_id, body })
            .collect();
        targets.push(BlastTarget {
            device_id: me,
            body: self.player,
        });

        for arrival in arrivals {
            self.surface
                .remove(&EntityKey::Projectile(arrival.id.to_string()));
            let outcome = self.combat.resolve_blast(
                arrival.point,
                &self.world,
                &targets,
                self.channel.relay(),
                me,
                now,
            );
            self.surface.set_pose(
                EntityKey::Blast(outcome.blast.id),
                VisualKind::Blast {
                    radius: outcome.blast.radius,
                },
                Pose::at(outcome.blast.center),
            );
            for hit in &outcome.hits {
                debug!(device_id = %hit.device_id, knockback = ?hit.knockback, "Blast hit");
            }
            info!(
                projectile_id = %arrival.id,
                hits = outcome.hits.len(),
                "Blast resolved"
            );
        }
    }

    /// Publish the local pose
    pub fn upload(&mut self) {
        let Some(body) = self.world.body(self.player) else {
            return;
        };
        let record = self.snapshots.build(body);
        self.channel.upload(&record);
    }

    /// Run the client loop until `shutdown` resolves, then remove this
    /// client's record from the relay
    pub async fn run<F: Future<Output = ()>>(mut self, cadence: Cadence, shutdown: F) {
        info!(
            simulation_ms = cadence.simulation.as_millis() as u64,
            upload_ms = cadence.upload.as_millis() as u64,
            "Simulation loop started"
        );

        let mut simulation = interval(cadence.simulation);
        simulation.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut upload = interval(cadence.upload);
        upload.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut projectile_step = interval(cadence.projectile_step);
        projectile_step.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut timer = Timer::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = simulation.tick() => {
                    let now = Instant::now();
                    let dt = timer.lap(now);
                    let report = self.tick(now, dt);
                    if let Some(Ok(projectile_id)) = report.shot {
                        debug!(projectile_id = %projectile_id, "Shot fired");
                    }
                    let mirrors = &report.mirrors;
                    let changed = !mirrors.created.is_empty() || !mirrors.evicted.is_empty();
                    if report.respawned || changed {
                        debug!(
                            tick = self.ticks,
                            mirrors = self.mirrors.len(),
                            updated = mirrors.updated,
                            bodies = self.world.len(),
                            obstacles = self.oracle.obstacles().len(),
                            impulses = report.impulses.len(),
                            "Tick"
                        );
                    }
                }
                _ = upload.tick() => self.upload(),
                _ = projectile_step.tick() => self.advance_projectiles(Instant::now()),
                _ = &mut shutdown => break,
            }
        }

        self.channel.retire();
        info!(
            device_id = %self.device_id(),
            ticks = self.ticks,
            uploads = self.channel.uploads(),
            "Simulation loop stopped"
        );
    }
}

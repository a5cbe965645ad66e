//! Remote mirror synchronizer: peer snapshots to kinematic bodies

use std::collections::HashMap;
use std::time::{Duration, Instant};

use glam::Vec3;
use tracing::info;

use super::body::{Body, BodyId, Shape};
use super::contact::ContactOracle;
use super::physics::PhysicsBackend;
use super::render::{EntityKey, RenderSurface, VisualKind};
use crate::relay::protocol::{DeviceId, PeerMap, RemotePlayerSnapshot};

/// Kinematic stand-in for one remote peer
#[derive(Debug, Clone)]
pub struct MirrorEntity {
    pub device_id: DeviceId,
    pub body: BodyId,
    pub snapshot: RemotePlayerSnapshot,
    /// Local time the snapshot content last changed
    last_changed: Instant,
}

/// Result of one synchronisation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub created: Vec<DeviceId>,
    pub updated: usize,
    pub evicted: Vec<DeviceId>,
}

/// Registry of peer mirrors keyed by device id
pub struct MirrorSynchronizer {
    local_device: DeviceId,
    mirrors: HashMap<DeviceId, MirrorEntity>,
    /// Snapshot each quiet peer was evicted with. A peer returns only once
    /// its record differs, and the entry goes when its record does.
    evicted: HashMap<DeviceId, RemotePlayerSnapshot>,
    shape: Shape,
    /// `None` keeps mirrors forever
    eviction_timeout: Option<Duration>,
}

impl MirrorSynchronizer {
    pub fn new(local_device: DeviceId, shape: Shape, eviction_timeout: Option<Duration>) -> Self {
        Self {
            local_device,
            mirrors: HashMap::new(),
            evicted: HashMap::new(),
            shape,
            eviction_timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.mirrors.len()
    }

    /// `(device id, body)` of every mirror
    pub fn targets(&self) -> Vec<(DeviceId, BodyId)> {
        self.mirrors.values().map(|m| (m.device_id, m.body)).collect()
    }

    /// Apply the cached peer map: create unseen mirrors, overwrite known
    /// poses, evict mirrors whose peer vanished or went quiet
    pub fn apply<P: PhysicsBackend, S: RenderSurface>(
        &mut self,
        peers: &PeerMap,
        world: &mut P,
        oracle: &mut ContactOracle,
        surface: &mut S,
        now: Instant,
    ) -> SyncReport {
        let mut report = SyncReport::default();

        for (device_id, snapshot) in peers {
            if *device_id == self.local_device {
                continue;
            }

            match self.mirrors.get_mut(device_id) {
                Some(mirror) => {
                    if mirror.snapshot != *snapshot {
                        mirror.snapshot = snapshot.clone();
                        mirror.last_changed = now;
                    }
                    report.updated += 1;
                }
                None if self.evicted.get(device_id) == Some(snapshot) => continue,
                None => {
                    self.evicted.remove(device_id);
                    let body = world.insert(Body::kinematic(self.shape));
                    oracle.track(body);
                    self.mirrors.insert(
                        *device_id,
                        MirrorEntity {
                            device_id: *device_id,
                            body,
                            snapshot: snapshot.clone(),
                            last_changed: now,
                        },
                    );
                    info!(device_id = %device_id, body = %body, "Mirroring new peer");
                    report.created.push(*device_id);
                }
            }

            if let Some(mirror) = self.mirrors.get(device_id) {
                place(world, surface, mirror.body, &mirror.snapshot);
            }
        }

        self.evicted.retain(|device_id, _| peers.contains_key(device_id));

        let timeout = self.eviction_timeout;
        let stale: Vec<(DeviceId, bool)> = self
            .mirrors
            .values()
            .filter_map(|m| {
                let quiet =
                    timeout.is_some_and(|t| now.saturating_duration_since(m.last_changed) > t);
                if !peers.contains_key(&m.device_id) {
                    Some((m.device_id, false))
                } else {
                    quiet.then_some((m.device_id, true))
                }
            })
            .collect();

        for (device_id, quiet) in stale {
            if let Some(mirror) = self.mirrors.remove(&device_id) {
                world.remove(mirror.body);
                oracle.untrack(mirror.body);
                surface.remove(&EntityKey::Body(mirror.body));
                if quiet {
                    info!(device_id = %device_id, "Evicted quiet peer mirror");
                    self.evicted.insert(device_id, mirror.snapshot);
                } else {
                    info!(device_id = %device_id, "Evicted departed peer mirror");
                }
                report.evicted.push(device_id);
            }
        }

        report
    }
}

/// Overwrite a mirror body's pose from its snapshot and push it to the surface
fn place<P: PhysicsBackend, S: RenderSurface>(
    world: &mut P,
    surface: &mut S,
    body: BodyId,
    snapshot: &RemotePlayerSnapshot,
) {
    let Some(body) = world.body_mut(body) else {
        return;
    };
    body.position = snapshot.position;
    body.velocity = Vec3::ZERO;
    body.bearing = snapshot.rotation;
    body.apply_bearing();
    surface.set_pose(EntityKey::Body(body.id), VisualKind::Mirror, body.pose());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::body::Bearing;
    use crate::game::physics::ArenaWorld;
    use crate::game::render::testing::RecordingSurface;

    const LOCAL: DeviceId = DeviceId(1);

    fn snapshot(id: u64, x: f32, stamp: u64) -> RemotePlayerSnapshot {
        RemotePlayerSnapshot {
            device_id: DeviceId(id),
            position: Vec3::new(x, 10.0, 0.0),
            rotation: Bearing::new(0.0, 45.0, 0.0),
            updated_at: Some(stamp),
        }
    }

    fn peers(entries: &[RemotePlayerSnapshot]) -> PeerMap {
        entries.iter().map(|s| (s.device_id, s.clone())).collect()
    }

    struct Rig {
        sync: MirrorSynchronizer,
        world: ArenaWorld,
        oracle: ContactOracle,
        surface: RecordingSurface,
    }

    fn rig(timeout: Option<Duration>) -> Rig {
        Rig {
            sync: MirrorSynchronizer::new(
                LOCAL,
                Shape::Box {
                    width: 5.0,
                    height: 7.0,
                    depth: 5.0,
                },
                timeout,
            ),
            world: ArenaWorld::default(),
            oracle: ContactOracle::new(),
            surface: RecordingSurface::default(),
        }
    }

    impl Rig {
        fn apply(&mut self, map: &PeerMap, now: Instant) -> SyncReport {
            self.sync
                .apply(map, &mut self.world, &mut self.oracle, &mut self.surface, now)
        }
    }

    #[test]
    fn first_snapshot_creates_exactly_one_mirror() {
        let mut rig = rig(None);
        let now = Instant::now();

        let report = rig.apply(&peers(&[snapshot(2, 0.0, 1)]), now);
        assert_eq!(report.created, vec![DeviceId(2)]);
        assert_eq!(rig.world.len(), 1);

        let body = rig.sync.mirrors.get(&DeviceId(2)).unwrap().body;
        for stamp in 2..10 {
            let report = rig.apply(&peers(&[snapshot(2, stamp as f32, stamp)]), now);
            assert!(report.created.is_empty());
            assert_eq!(report.updated, 1);
        }
        assert_eq!(rig.sync.len(), 1);
        assert_eq!(rig.world.len(), 1);
        assert_eq!(rig.sync.mirrors.get(&DeviceId(2)).unwrap().body, body);
        assert_eq!(rig.oracle.obstacles(), &[body]);
    }

    #[test]
    fn pose_is_overwritten_without_smoothing() {
        let mut rig = rig(None);
        let now = Instant::now();
        rig.apply(&peers(&[snapshot(2, 0.0, 1)]), now);
        rig.apply(&peers(&[snapshot(2, 25.0, 2)]), now);

        let body = rig.world.body(rig.sync.mirrors.get(&DeviceId(2)).unwrap().body).unwrap();
        assert_eq!(body.position, Vec3::new(25.0, 10.0, 0.0));
        assert_eq!(body.bearing.y, 45.0);
        assert!(body.is_kinematic());

        let (kind, pose) = rig.surface.poses[&EntityKey::Body(body.id)];
        assert_eq!(kind, VisualKind::Mirror);
        assert_eq!(pose.position.x, 25.0);
    }

    #[test]
    fn local_device_is_never_mirrored() {
        let mut rig = rig(None);
        let report = rig.apply(&peers(&[snapshot(1, 0.0, 1)]), Instant::now());
        assert!(report.created.is_empty());
        assert!(rig.sync.len() == 0);
    }

    #[test]
    fn quiet_peers_are_evicted_after_timeout() {
        let mut rig = rig(Some(Duration::from_secs(10)));
        let start = Instant::now();
        let frozen = peers(&[snapshot(2, 0.0, 1), snapshot(3, 0.0, 1)]);
        rig.apply(&frozen, start);

        // Peer 3 keeps publishing, peer 2 is frozen
        let later = start + Duration::from_secs(8);
        rig.apply(&peers(&[snapshot(2, 0.0, 1), snapshot(3, 1.0, 2)]), later);

        let report = rig.apply(
            &peers(&[snapshot(2, 0.0, 1), snapshot(3, 1.0, 2)]),
            start + Duration::from_secs(12),
        );
        assert_eq!(report.evicted, vec![DeviceId(2)]);
        assert!(rig.sync.mirrors.get(&DeviceId(3)).is_some());
        assert_eq!(rig.world.len(), 1);
        assert_eq!(rig.oracle.obstacles().len(), 1);
    }

    #[test]
    fn vanished_peer_is_evicted_and_can_return() {
        let mut rig = rig(None);
        let now = Instant::now();
        rig.apply(&peers(&[snapshot(2, 0.0, 1)]), now);

        let report = rig.apply(&PeerMap::new(), now);
        assert_eq!(report.evicted, vec![DeviceId(2)]);
        assert!(rig.world.len() == 0);

        let report = rig.apply(&peers(&[snapshot(2, 0.0, 2)]), now);
        assert_eq!(report.created, vec![DeviceId(2)]);
    }

    #[test]
    fn frozen_peer_stays_evicted_until_it_changes() {
        let mut rig = rig(Some(Duration::from_secs(10)));
        let start = Instant::now();
        let frozen = peers(&[snapshot(2, 0.0, 1)]);
        rig.apply(&frozen, start);

        let report = rig.apply(&frozen, start + Duration::from_secs(11));
        assert_eq!(report.evicted, vec![DeviceId(2)]);

        for tick in 1..5 {
            let now = start + Duration::from_secs(11) + Duration::from_millis(16 * tick);
            let report = rig.apply(&frozen, now);
            assert!(report.created.is_empty());
        }
        assert!(rig.sync.len() == 0);
        assert!(rig.world.len() == 0);

        let resumed = start + Duration::from_secs(12);
        let report = rig.apply(&peers(&[snapshot(2, 3.0, 2)]), resumed);
        assert_eq!(report.created, vec![DeviceId(2)]);
    }

    #[test]
    fn eviction_record_is_dropped_when_the_peer_leaves() {
        let mut rig = rig(Some(Duration::from_secs(10)));
        let start = Instant::now();
        let frozen = peers(&[snapshot(2, 0.0, 1)]);
        rig.apply(&frozen, start);
        rig.apply(&frozen, start + Duration::from_secs(11));

        rig.apply(&PeerMap::new(), start + Duration::from_secs(12));

        // Same record reappearing after a departure is a fresh peer
        let report = rig.apply(&frozen, start + Duration::from_secs(13));
        assert_eq!(report.created, vec![DeviceId(2)]);
    }
}

//! State broadcast channel: pose uploads out, peer/impulse/projectile streams in
//!
//! Push deliveries land in per-path queues and are drained once per tick,
//! so the simulation always works from a single-writer view of the relay.

use std::sync::Arc;

use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, warn};

use super::protocol::{
    parse_impulse, parse_peer_map, parse_projectile_map, DeviceId, ImpulseRecord, PeerMap,
    PlayerUpload, ProjectileMap,
};
use super::{RelayPath, RelayStore, RelayStoreExt, Subscription};

/// Everything that arrived since the previous drain
#[derive(Debug, Default)]
pub struct Inbound {
    /// Newest full peer map, if any arrived
    pub peers: Option<PeerMap>,
    /// Every self-impulse slot delivery, in arrival order
    pub impulses: Vec<Option<ImpulseRecord>>,
    /// Newest full projectile map, if any arrived
    pub projectiles: Option<ProjectileMap>,
}

/// Relay transport for one client
pub struct BroadcastChannel {
    relay: Arc<dyn RelayStore>,
    device_id: DeviceId,
    peers_rx: Subscription,
    impulse_rx: Subscription,
    projectiles_rx: Subscription,
    uploads: u64,
}

impl BroadcastChannel {
    /// Open the three standing subscriptions
    pub fn open(relay: Arc<dyn RelayStore>, device_id: DeviceId) -> Self {
        let peers_rx = relay.subscribe(&RelayPath::players());
        let impulse_rx = relay.subscribe(&RelayPath::current_impulse(device_id));
        let projectiles_rx = relay.subscribe(&RelayPath::impulses());
        Self {
            relay,
            device_id,
            peers_rx,
            impulse_rx,
            projectiles_rx,
            uploads: 0,
        }
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn relay(&self) -> &dyn RelayStore {
        self.relay.as_ref()
    }

    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    /// Non-blocking drain of every inbound queue
    pub fn drain(&mut self) -> Inbound {
        let mut inbound = Inbound::default();

        for value in drain_queue(&mut self.peers_rx, "players") {
            inbound.peers = Some(parse_peer_map(value.as_ref()));
        }
        for value in drain_queue(&mut self.impulse_rx, "currentImpulse") {
            inbound.impulses.push(parse_impulse(value.as_ref()));
        }
        for value in drain_queue(&mut self.projectiles_rx, "impulses") {
            inbound.projectiles = Some(parse_projectile_map(value.as_ref()));
        }
        inbound
    }

    /// Merge the pose upload into this client's record, leaving any pending
    /// `currentImpulse` child in place
    pub fn upload(&mut self, record: &PlayerUpload) {
        self.relay.update_json(&RelayPath::player(self.device_id), record);
        self.uploads += 1;
        if self.uploads % 200 == 0 {
            debug!(device_id = %self.device_id, uploads = self.uploads, "Pose uploads");
        }
    }

    /// Remove this client's record from the relay
    pub fn retire(&self) {
        self.relay.delete(&RelayPath::player(self.device_id));
    }
}

fn drain_queue(rx: &mut Subscription, name: &'static str) -> Vec<Option<serde_json::Value>> {
    let mut values = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(value) => values.push(value),
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => {
                if values.is_empty() {
                    warn!(subscription = name, "Relay subscription closed");
                }
                break;
            }
        }
    }
    values
}

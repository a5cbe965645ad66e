//! Relay wire records
//! These are the JSON shapes exchanged between clients through the relay store

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::game::body::Bearing;

/// Stable per-installation participant identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u64);

impl DeviceId {
    /// Lenient parse from a JSON value. Older clients wrote the id as a
    /// number, some tooling writes it as a string.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .map(DeviceId),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(DeviceId)
    }
}

/// Three-float record used for positions, bearings and impulse vectors
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3Record {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl From<Vec3> for Vec3Record {
    fn from(v: Vec3) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

impl From<Vec3Record> for Vec3 {
    fn from(r: Vec3Record) -> Self {
        Vec3::new(r.x, r.y, r.z)
    }
}

impl From<Bearing> for Vec3Record {
    fn from(b: Bearing) -> Self {
        Self { x: b.x, y: b.y, z: b.z }
    }
}

impl From<Vec3Record> for Bearing {
    fn from(r: Vec3Record) -> Self {
        Bearing::new(r.x, r.y, r.z)
    }
}

/// Pose upload written to `players/{deviceID}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerUpload {
    #[serde(rename = "deviceID")]
    pub device_id: DeviceId,
    pub position: Vec3Record,
    /// Bearing in degrees per axis
    pub rotation: Vec3Record,
    /// Unix millis of the upload, changes on every write
    #[serde(rename = "updatedAt")]
    pub updated_at: u64,
}

/// Nested pose used by the `movementData` record variant
#[derive(Debug, Clone, Deserialize)]
struct MovementData {
    position: Vec3Record,
    #[serde(default)]
    rotation: Vec3Record,
}

/// Reader view of a peer record, accepting both record variants
#[derive(Debug, Clone, Deserialize)]
struct PeerRecordWire {
    #[serde(rename = "deviceID", default)]
    device_id: Option<Value>,
    #[serde(default)]
    position: Option<Vec3Record>,
    #[serde(default)]
    rotation: Option<Vec3Record>,
    #[serde(rename = "movementData", default)]
    movement_data: Option<MovementData>,
    #[serde(rename = "updatedAt", default)]
    updated_at: Option<u64>,
}

/// Last-received pose of a peer
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlayerSnapshot {
    pub device_id: DeviceId,
    pub position: Vec3,
    pub rotation: Bearing,
    pub updated_at: Option<u64>,
}

impl RemotePlayerSnapshot {
    /// Parse one child of the `players` collection. The record's own
    /// `deviceID` wins over the key; records carrying neither a flat nor a
    /// nested pose (a bare `currentImpulse` slot, for instance) are skipped.
    pub fn from_value(key: &str, value: &Value) -> Option<Self> {
        let wire: PeerRecordWire = serde_json::from_value(value.clone()).ok()?;
        let device_id = wire
            .device_id
            .as_ref()
            .and_then(DeviceId::from_value)
            .or_else(|| key.parse().ok())?;

        let (position, rotation) = match (wire.position, wire.movement_data) {
            (Some(position), _) => (position, wire.rotation.unwrap_or_default()),
            (None, Some(data)) => (data.position, data.rotation),
            (None, None) => return None,
        };

        Some(Self {
            device_id,
            position: position.into(),
            rotation: rotation.into(),
            updated_at: wire.updated_at,
        })
    }
}

/// Full peer collection keyed by device id
pub type PeerMap = BTreeMap<DeviceId, RemotePlayerSnapshot>;

/// Parse the `players` collection value delivered by a subscription
pub fn parse_peer_map(value: Option<&Value>) -> PeerMap {
    let mut peers = PeerMap::new();
    let Some(Value::Object(entries)) = value else {
        return peers;
    };

    for (key, entry) in entries {
        match RemotePlayerSnapshot::from_value(key, entry) {
            Some(snapshot) => {
                peers.insert(snapshot.device_id, snapshot);
            }
            None => debug!(key = %key, "Skipping peer record without a pose"),
        }
    }
    peers
}

/// Knockback vector written to `players/{deviceID}/currentImpulse`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpulseRecord {
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    #[serde(default)]
    pub z: f32,
    #[serde(rename = "senderID", default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<DeviceId>,
    /// Explicit hit marker, so a knockback of exactly zero still counts as a hit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit: Option<bool>,
}

impl ImpulseRecord {
    pub fn knockback(vector: Vec3, sender_id: DeviceId) -> Self {
        Self {
            x: vector.x,
            y: vector.y,
            z: vector.z,
            sender_id: Some(sender_id),
            hit: Some(true),
        }
    }

    pub fn vector(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }

    pub fn marks_hit(&self) -> bool {
        self.hit.unwrap_or(false)
    }
}

/// Parse a `currentImpulse` slot value; null or malformed means absent
pub fn parse_impulse(value: Option<&Value>) -> Option<ImpulseRecord> {
    match value {
        None | Some(Value::Null) => None,
        Some(v) => serde_json::from_value(v.clone()).ok(),
    }
}

/// In-flight projectile broadcast under `impulses/{projectileID}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileWire {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(rename = "senderID", default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<DeviceId>,
}

/// Projectile as seen by a reader of the `impulses` collection
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileRecord {
    pub id: String,
    pub position: Vec3,
    pub sender_id: Option<DeviceId>,
}

/// Projectile collection keyed by projectile id
pub type ProjectileMap = BTreeMap<String, ProjectileRecord>;

/// Parse the `impulses` collection value delivered by a subscription
pub fn parse_projectile_map(value: Option<&Value>) -> ProjectileMap {
    let mut projectiles = ProjectileMap::new();
    let Some(Value::Object(entries)) = value else {
        return projectiles;
    };

    for (key, entry) in entries {
        match serde_json::from_value::<ProjectileWire>(entry.clone()) {
            Ok(wire) => {
                projectiles.insert(
                    key.clone(),
                    ProjectileRecord {
                        id: key.clone(),
                        position: Vec3::new(wire.x, wire.y, wire.z),
                        sender_id: wire.sender_id,
                    },
                );
            }
            Err(e) => debug!(key = %key, error = %e, "Skipping malformed projectile record"),
        }
    }
    projectiles
}

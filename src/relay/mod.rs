//! Realtime relay store: a hierarchical JSON store with push subscriptions
//!
//! The relay is a plain transport. Writes are fire-and-forget and every
//! subscription delivers the full current value at its path (never a diff).
//! Delivery order is only guaranteed per path; two different paths may be
//! observed in either order.

pub mod channel;
pub mod http;
pub mod memory;
pub mod protocol;
pub mod tree;

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

pub use channel::BroadcastChannel;
pub use http::HttpRelay;
pub use memory::MemoryRelay;

use protocol::DeviceId;

/// Receiver of full values pushed for one subscribed path. `None` means the
/// path is currently empty.
pub type Subscription = mpsc::UnboundedReceiver<Option<Value>>;

/// Transport primitives of the relay store
pub trait RelayStore: Send + Sync {
    /// Replace the value at `path`
    fn set(&self, path: &RelayPath, value: Value);

    /// Merge the children of an object `value` into `path`
    fn update(&self, path: &RelayPath, value: Value);

    fn delete(&self, path: &RelayPath);

    /// Standing subscription; the current value is delivered first
    fn subscribe(&self, path: &RelayPath) -> Subscription;
}

/// Serializing helpers over any relay store
pub trait RelayStoreExt: RelayStore {
    fn set_json<T: Serialize>(&self, path: &RelayPath, record: &T) {
        match serde_json::to_value(record) {
            Ok(value) => self.set(path, value),
            Err(e) => warn!(path = %path, error = %e, "Failed to encode relay record"),
        }
    }

    fn update_json<T: Serialize>(&self, path: &RelayPath, record: &T) {
        match serde_json::to_value(record) {
            Ok(value) => self.update(path, value),
            Err(e) => warn!(path = %path, error = %e, "Failed to encode relay record"),
        }
    }
}

impl<R: RelayStore + ?Sized> RelayStoreExt for R {}

/// Slash-separated key path into the relay tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelayPath {
    segments: Vec<String>,
}

/// Characters the hosted relay refuses in keys
const FORBIDDEN_KEY_CHARS: &[char] = &['.', '#', '$', '[', ']'];

impl RelayPath {
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Parse `a/b/c`; leading, trailing and doubled slashes are ignored
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        let segments: Vec<String> = raw
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if let Some(bad) = segments.iter().find(|s| s.contains(FORBIDDEN_KEY_CHARS)) {
            return Err(RelayError::InvalidPath(bad.clone()));
        }
        Ok(Self { segments })
    }

    pub fn child(&self, key: impl fmt::Display) -> Self {
        let mut segments = self.segments.clone();
        segments.push(key.to_string());
        Self { segments }
    }

    pub fn players() -> Self {
        Self::root().child("players")
    }

    pub fn player(device_id: DeviceId) -> Self {
        Self::players().child(device_id)
    }

    pub fn current_impulse(device_id: DeviceId) -> Self {
        Self::player(device_id).child("currentImpulse")
    }

    pub fn impulses() -> Self {
        Self::root().child("impulses")
    }

    pub fn projectile(projectile_id: impl fmt::Display) -> Self {
        Self::impulses().child(projectile_id)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// `self` equals `other` or lies beneath it
    pub fn starts_with(&self, other: &RelayPath) -> bool {
        self.segments.len() >= other.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }

    /// One path contains the other, so a write to either affects both
    pub fn overlaps(&self, other: &RelayPath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

impl fmt::Display for RelayPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

/// Relay errors
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Relay request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Relay API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Relay payload is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid relay key: {0:?}")]
    InvalidPath(String),

    #[error("Relay stream cancelled by server: {0}")]
    Cancelled(String),

    #[error("Relay writer has shut down")]
    Closed,
}

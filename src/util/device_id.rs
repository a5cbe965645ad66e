//! Persisted device identity
//!
//! A client keeps one identifier for its whole lifetime on a machine. It is
//! generated once as a large random integer and stored as a decimal string
//! in a small local file, the same role browser local storage plays for a
//! web client.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::info;

use crate::relay::protocol::DeviceId;

/// Inclusive lower and exclusive upper bound of generated identifiers.
/// Sixteen decimal digits makes collisions between peers vanishingly rare.
const DEVICE_ID_MIN: u64 = 1_000_000_000_000_000;
const DEVICE_ID_MAX: u64 = 10_000_000_000_000_000;

/// File-backed store for the local device identifier
#[derive(Debug, Clone)]
pub struct DeviceIdStore {
    path: PathBuf,
}

impl DeviceIdStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the persisted identifier, generating and saving one on first use
    pub fn load_or_create<R: Rng>(&self, rng: &mut R) -> Result<DeviceId, DeviceIdError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => {
                let id = raw
                    .parse::<DeviceId>()
                    .map_err(|_| DeviceIdError::Malformed(raw.trim().to_string()))?;
                info!(device_id = %id, "Loaded persisted device id");
                Ok(id)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let id = generate(rng);
                if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&self.path, id.to_string())?;
                info!(device_id = %id, path = %self.path.display(), "Generated new device id");
                Ok(id)
            }
            Err(e) => Err(DeviceIdError::Io(e)),
        }
    }
}

/// Generate a fresh identifier
pub fn generate<R: Rng>(rng: &mut R) -> DeviceId {
    DeviceId(rng.gen_range(DEVICE_ID_MIN..DEVICE_ID_MAX))
}

/// Device identity errors
#[derive(Debug, thiserror::Error)]
pub enum DeviceIdError {
    #[error("Device id store I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Persisted device id is not a number: {0:?}")]
    Malformed(String),
}

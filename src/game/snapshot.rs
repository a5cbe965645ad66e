//! Outbound pose snapshots

use crate::relay::protocol::{DeviceId, PlayerUpload};
use crate::util::time::unix_millis;

use super::body::Body;

/// Builds the periodic pose upload for the local player
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    device_id: DeviceId,
}

impl SnapshotBuilder {
    pub fn new(device_id: DeviceId) -> Self {
        Self { device_id }
    }

    /// Upload stamped with the current wall clock
    pub fn build(&self, body: &Body) -> PlayerUpload {
        self.build_at(body, unix_millis())
    }

    pub fn build_at(&self, body: &Body, updated_at: u64) -> PlayerUpload {
        PlayerUpload {
            device_id: self.device_id,
            position: body.position.into(),
            rotation: body.bearing.into(),
            updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::body::{Bearing, Shape};
    use glam::Vec3;
    use serde_json::json;

    #[test]
    fn upload_carries_pose_bearing_and_stamp() {
        let mut body = Body::new(Shape::cube(5.0), 1.0).with_position(Vec3::new(1.0, 2.0, 3.0));
        body.bearing = Bearing::new(0.0, 90.0, 0.0);

        let builder = SnapshotBuilder::new(DeviceId(42));
        let upload = builder.build_at(&body, 1_700_000_000_000);

        let value = serde_json::to_value(&upload).unwrap();
        assert_eq!(
            value,
            json!({
                "deviceID": 42,
                "position": {"x": 1.0, "y": 2.0, "z": 3.0},
                "rotation": {"x": 0.0, "y": 90.0, "z": 0.0},
                "updatedAt": 1_700_000_000_000u64,
            })
        );
    }

    #[test]
    fn consecutive_uploads_differ_by_stamp() {
        let body = Body::new(Shape::cube(5.0), 1.0);
        let builder = SnapshotBuilder::new(DeviceId(1));
        let a = builder.build_at(&body, 1);
        let b = builder.build_at(&body, 2);
        assert_ne!(a, b);
        assert_eq!(a.position, b.position);
    }
}

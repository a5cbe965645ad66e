//! Rendering surface seam

use std::collections::HashSet;

use tracing::{info, trace};
use uuid::Uuid;

use super::body::{BodyId, Pose, Shape};

/// Identity of a visible entity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Body(BodyId),
    Projectile(String),
    Blast(Uuid),
}

/// What a visible entity represents
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VisualKind {
    LocalPlayer,
    Mirror,
    Prop,
    Projectile { shape: Shape },
    Blast { radius: f32 },
}

/// Consumer of per-frame poses
pub trait RenderSurface {
    fn set_pose(&mut self, key: EntityKey, kind: VisualKind, pose: Pose);

    fn remove(&mut self, key: &EntityKey);

    /// Transient on-screen message for benign events
    fn notify(&mut self, message: &str);
}

/// Headless surface that traces every pose
#[derive(Debug)]
pub struct TracingSurface {
    /// Whether poses are drawn with shadow casting
    shadows: bool,
    visible: HashSet<EntityKey>,
}

impl TracingSurface {
    pub fn new(shadows: bool) -> Self {
        info!(shadows, "Headless render surface ready");
        Self {
            shadows,
            visible: HashSet::new(),
        }
    }
}

impl RenderSurface for TracingSurface {
    fn set_pose(&mut self, key: EntityKey, kind: VisualKind, pose: Pose) {
        let p = pose.position;
        trace!(?key, ?kind, x = p.x, y = p.y, z = p.z, shadows = self.shadows, "pose");
        self.visible.insert(key);
    }

    /// Unknown keys are ignored
    fn remove(&mut self, key: &EntityKey) {
        if self.visible.remove(key) {
            trace!(?key, visible = self.visible.len(), "remove");
        }
    }

    fn notify(&mut self, message: &str) {
        info!(message, "notice");
    }
}

#[cfg(test)]
pub mod testing {
    use std::collections::HashMap;

    use super::*;

    /// Surface that remembers the latest pose of every entity
    #[derive(Debug, Default)]
    pub struct RecordingSurface {
        pub poses: HashMap<EntityKey, (VisualKind, Pose)>,
        pub removed: Vec<EntityKey>,
        pub notices: Vec<String>,
    }

    impl RenderSurface for RecordingSurface {
        fn set_pose(&mut self, key: EntityKey, kind: VisualKind, pose: Pose) {
            self.poses.insert(key, (kind, pose));
        }

        fn remove(&mut self, key: &EntityKey) {
            self.poses.remove(key);
            self.removed.push(key.clone());
        }

        fn notify(&mut self, message: &str) {
            self.notices.push(message.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn tracing_surface_keeps_the_shadow_setting() {
        assert!(TracingSurface::new(true).shadows);
        assert!(!TracingSurface::new(false).shadows);
    }

    #[test]
    fn tracing_surface_tracks_visible_entities() {
        let mut surface = TracingSurface::new(false);
        let key = EntityKey::Body(BodyId(4));
        surface.set_pose(key.clone(), VisualKind::Prop, Pose::at(Vec3::ZERO));
        surface.set_pose(key.clone(), VisualKind::Prop, Pose::at(Vec3::ONE));
        assert_eq!(surface.visible.len(), 1);

        surface.remove(&key);
        surface.remove(&EntityKey::Blast(Uuid::nil()));
        assert!(surface.visible.is_empty());
    }
}

//! Physical bodies and their poses

use glam::{EulerRot, Quat, Vec3};

/// Closed set of collision/visual shapes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Box { width: f32, height: f32, depth: f32 },
    Sphere { radius: f32 },
}

impl Shape {
    pub fn cube(size: f32) -> Self {
        Self::Box {
            width: size,
            height: size,
            depth: size,
        }
    }

    /// Half extents of the axis-aligned bounds around the shape
    pub fn half_extents(&self) -> Vec3 {
        match *self {
            Shape::Box {
                width,
                height,
                depth,
            } => Vec3::new(width, height, depth) * 0.5,
            Shape::Sphere { radius } => Vec3::splat(radius),
        }
    }
}

/// Stable handle of a body inside the physics world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub u64);

impl std::fmt::Display for BodyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "body#{}", self.0)
    }
}

/// Surface material
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// 0.0 is frictionless
    pub friction: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self { friction: 0.3 }
    }
}

/// Per-axis bearing in degrees, measured from north
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bearing {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Bearing {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Bearings turn clockwise, rotations turn counter-clockwise, so each
    /// axis maps to `(360 - bearing) mod 360` before conversion.
    pub fn to_quat(self) -> Quat {
        fn axis(bearing: f32) -> f32 {
            (360.0 - bearing).rem_euclid(360.0).to_radians()
        }
        Quat::from_euler(EulerRot::XYZ, axis(self.x), axis(self.y), axis(self.z))
    }
}

/// Position and orientation pushed to the rendering surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Pose {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
        }
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_center(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    pub fn closest_point(&self, point: Vec3) -> Vec3 {
        point.clamp(self.min, self.max)
    }

    /// Slab test. Returns the entry distance along `direction`, or zero when
    /// the origin is already inside the box.
    pub fn ray_distance(&self, origin: Vec3, direction: Vec3) -> Option<f32> {
        let mut t_min = f32::NEG_INFINITY;
        let mut t_max = f32::INFINITY;

        for axis in 0..3 {
            let o = origin[axis];
            let d = direction[axis];
            if d.abs() < f32::EPSILON {
                if o < self.min[axis] || o > self.max[axis] {
                    return None;
                }
                continue;
            }
            let t1 = (self.min[axis] - o) / d;
            let t2 = (self.max[axis] - o) / d;
            t_min = t_min.max(t1.min(t2));
            t_max = t_max.min(t1.max(t2));
        }

        if t_max < t_min || t_max < 0.0 {
            None
        } else {
            Some(t_min.max(0.0))
        }
    }
}

/// A physical entity with its visual pose
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub id: BodyId,
    pub shape: Shape,
    /// Zero marks a kinematic body that contacts never push
    pub mass: f32,
    pub material: Material,
    /// Fraction of velocity lost per second
    pub linear_damping: f32,
    pub position: Vec3,
    pub velocity: Vec3,
    pub bearing: Bearing,
    pub orientation: Quat,
}

impl Body {
    /// New body at the origin. The world assigns the real id on insert.
    pub fn new(shape: Shape, mass: f32) -> Self {
        Self {
            id: BodyId(0),
            shape,
            mass: mass.max(0.0),
            material: Material::default(),
            linear_damping: 0.01,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            bearing: Bearing::default(),
            orientation: Quat::IDENTITY,
        }
    }

    pub fn kinematic(shape: Shape) -> Self {
        Self::new(shape, 0.0)
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn with_damping(mut self, linear_damping: f32) -> Self {
        self.linear_damping = linear_damping.clamp(0.0, 1.0);
        self
    }

    pub fn is_kinematic(&self) -> bool {
        self.mass == 0.0
    }

    pub fn inverse_mass(&self) -> f32 {
        if self.is_kinematic() {
            0.0
        } else {
            1.0 / self.mass
        }
    }

    /// Recompute the orientation quaternion from the bearing
    pub fn apply_bearing(&mut self) {
        self.orientation = self.bearing.to_quat();
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::from_center(self.position, self.shape.half_extents())
    }

    pub fn pose(&self) -> Pose {
        Pose {
            position: self.position,
            orientation: self.orientation,
        }
    }
}

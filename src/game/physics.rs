//! Rigid-body world: integration, contact queries and impulses
//!
//! Orientation is locked: rotations only ever come from bearings, so every
//! collider is treated as axis aligned. Kinematic bodies (mass 0) are moved
//! by their owners and never by contacts.

use std::collections::BTreeMap;

use glam::Vec3;

use super::body::{Aabb, Body, BodyId, Shape};

/// Stepping and query primitives the simulation relies on
pub trait PhysicsBackend {
    /// Insert a body and return its assigned id
    fn insert(&mut self, body: Body) -> BodyId;

    fn remove(&mut self, id: BodyId) -> Option<Body>;

    fn body(&self, id: BodyId) -> Option<&Body>;

    fn body_mut(&mut self, id: BodyId) -> Option<&mut Body>;

    /// Advance the world by `dt` seconds
    fn step(&mut self, dt: f32);

    /// Narrow-phase contact pairs between `body` and each candidate
    fn contacts(&self, body: BodyId, candidates: &[BodyId]) -> Vec<ContactPair>;

    /// Apply an impulse expressed in the body's local frame
    fn apply_local_impulse(&mut self, id: BodyId, impulse: Vec3);

    /// Nearest body hit by the ray
    fn raycast(&self, ray: &Ray) -> Option<RayHit>;
}

/// Half-line used for scene picking
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit length
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub body: BodyId,
    pub point: Vec3,
    pub distance: f32,
}

/// One touching or overlapping pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactPair {
    pub a: BodyId,
    pub b: BodyId,
    /// Unit normal pointing from `a` towards `b`
    pub normal: Vec3,
    /// Positive when overlapping, negative up to the contact skin when touching
    pub depth: f32,
}

/// Physics collider derived from a shape
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Collider {
    Cuboid { half_extents: Vec3 },
    Ball { radius: f32 },
}

impl Collider {
    pub fn from_shape(shape: &Shape) -> Self {
        match *shape {
            Shape::Box { .. } => Collider::Cuboid {
                half_extents: shape.half_extents(),
            },
            Shape::Sphere { radius } => Collider::Ball { radius },
        }
    }
}

/// Separation between two colliders: normal from `a` to `b` and overlap depth
fn separation(a: &Body, b: &Body) -> Option<(Vec3, f32)> {
    match (Collider::from_shape(&a.shape), Collider::from_shape(&b.shape)) {
        (Collider::Cuboid { half_extents: ha }, Collider::Cuboid { half_extents: hb }) => {
            let ab = Aabb::from_center(a.position, ha);
            let bb = Aabb::from_center(b.position, hb);
            let overlap = (ab.max.min(bb.max) - ab.min.max(bb.min)).to_array();
            let delta = b.position - a.position;
            let (axis, depth) = overlap
                .iter()
                .copied()
                .enumerate()
                .min_by(|x, y| x.1.total_cmp(&y.1))?;
            let mut normal = Vec3::ZERO;
            normal[axis] = if delta[axis] < 0.0 { -1.0 } else { 1.0 };
            Some((normal, depth))
        }
        (Collider::Ball { radius: ra }, Collider::Ball { radius: rb }) => {
            let delta = b.position - a.position;
            let dist = delta.length();
            let normal = if dist > f32::EPSILON { delta / dist } else { Vec3::Y };
            Some((normal, ra + rb - dist))
        }
        (Collider::Ball { radius }, Collider::Cuboid { half_extents }) => {
            ball_cuboid(a.position, radius, &Aabb::from_center(b.position, half_extents))
        }
        (Collider::Cuboid { half_extents }, Collider::Ball { radius }) => {
            ball_cuboid(b.position, radius, &Aabb::from_center(a.position, half_extents))
                .map(|(n, d)| (-n, d))
        }
    }
}

fn contact_pair(a: &Body, b: &Body) -> Option<ContactPair> {
    let (normal, depth) = separation(a, b)?;
    Some(ContactPair {
        a: a.id,
        b: b.id,
        normal,
        depth,
    })
}

/// Normal points from the ball towards the box
fn ball_cuboid(center: Vec3, radius: f32, aabb: &Aabb) -> Option<(Vec3, f32)> {
    let closest = aabb.closest_point(center);
    let delta = closest - center;
    let dist = delta.length();
    if dist > f32::EPSILON {
        return Some((delta / dist, radius - dist));
    }
    // Center inside the box: push out through the nearest face
    let to_min = center - aabb.min;
    let to_max = aabb.max - center;
    let faces = [
        (to_min.x, -Vec3::X),
        (to_max.x, Vec3::X),
        (to_min.y, -Vec3::Y),
        (to_max.y, Vec3::Y),
        (to_min.z, -Vec3::Z),
        (to_max.z, Vec3::Z),
    ];
    let (face_dist, outward) = faces.into_iter().min_by(|x, y| x.0.total_cmp(&y.0))?;
    Some((-outward, radius + face_dist))
}

/// Default backend: semi-implicit Euler with positional contact resolution
#[derive(Debug, Clone)]
pub struct ArenaWorld {
    bodies: BTreeMap<BodyId, Body>,
    next_id: u64,
    pub gravity: Vec3,
    /// Separation still counted as touching
    pub contact_skin: f32,
}

impl ArenaWorld {
    pub fn new(gravity: Vec3, contact_skin: f32) -> Self {
        Self {
            bodies: BTreeMap::new(),
            next_id: 1,
            gravity,
            contact_skin,
        }
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    fn integrate(&mut self, dt: f32) {
        let gravity = self.gravity;
        for body in self.bodies.values_mut().filter(|b| !b.is_kinematic()) {
            body.velocity += gravity * dt;
            body.velocity *= (1.0 - body.linear_damping).powf(dt);
            body.position += body.velocity * dt;
        }
    }

    fn resolve_contacts(&mut self, dt: f32) {
        let ids: Vec<BodyId> = self.bodies.keys().copied().collect();
        let gravity_dv = self.gravity.length() * dt;

        for (i, &a_id) in ids.iter().enumerate() {
            for &b_id in &ids[i + 1..] {
                let (Some(a), Some(b)) = (self.bodies.get(&a_id), self.bodies.get(&b_id)) else {
                    continue;
                };
                let (inv_a, inv_b) = (a.inverse_mass(), b.inverse_mass());
                let inv_sum = inv_a + inv_b;
                if inv_sum == 0.0 {
                    continue;
                }
                let Some(pair) = contact_pair(a, b).filter(|p| p.depth > 0.0) else {
                    continue;
                };
                let friction = (a.material.friction * b.material.friction).max(0.0).sqrt();
                let (outward, push) = (pair.normal, pair.depth / inv_sum);

                if let Some(a) = self.bodies.get_mut(&pair.a) {
                    resolve_one(a, -outward, push * inv_a, friction, gravity_dv);
                }
                if let Some(b) = self.bodies.get_mut(&pair.b) {
                    resolve_one(b, outward, push * inv_b, friction, gravity_dv);
                }
            }
        }
    }
}

/// Push `body` out along `outward`, cancel the approaching velocity and
/// bleed tangential speed proportional to the normal impulse.
fn resolve_one(body: &mut Body, outward: Vec3, push: f32, friction: f32, gravity_dv: f32) {
    if body.is_kinematic() {
        return;
    }
    body.position += outward * push;

    let normal_speed = body.velocity.dot(outward);
    if normal_speed < 0.0 {
        body.velocity -= outward * normal_speed;
    }

    let tangent = body.velocity - outward * body.velocity.dot(outward);
    let tangent_speed = tangent.length();
    if friction > 0.0 && tangent_speed > f32::EPSILON {
        let normal_dv = (-normal_speed).max(0.0) + gravity_dv;
        let reduction = (friction * normal_dv).min(tangent_speed);
        body.velocity -= tangent / tangent_speed * reduction;
    }
}

impl Default for ArenaWorld {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, -20.0, 0.0), 0.05)
    }
}

impl PhysicsBackend for ArenaWorld {
    fn insert(&mut self, mut body: Body) -> BodyId {
        let id = BodyId(self.next_id);
        self.next_id += 1;
        body.id = id;
        self.bodies.insert(id, body);
        id
    }

    fn remove(&mut self, id: BodyId) -> Option<Body> {
        self.bodies.remove(&id)
    }

    fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(&id)
    }

    fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(&id)
    }

    fn step(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        self.integrate(dt);
        self.resolve_contacts(dt);
    }

    fn contacts(&self, body: BodyId, candidates: &[BodyId]) -> Vec<ContactPair> {
        let Some(subject) = self.bodies.get(&body) else {
            return Vec::new();
        };

        candidates
            .iter()
            .filter(|&&id| id != body)
            .filter_map(|id| self.bodies.get(id))
            .filter_map(|other| contact_pair(subject, other))
            .filter(|pair| pair.depth >= -self.contact_skin)
            .collect()
    }

    fn apply_local_impulse(&mut self, id: BodyId, impulse: Vec3) {
        let Some(body) = self.bodies.get_mut(&id) else {
            return;
        };
        if body.is_kinematic() {
            return;
        }
        let world_impulse = body.orientation * impulse;
        body.velocity += world_impulse * body.inverse_mass();
        body.orientation = body.orientation.normalize();
    }

    fn raycast(&self, ray: &Ray) -> Option<RayHit> {
        self.bodies
            .values()
            .filter_map(|body| {
                let distance = match Collider::from_shape(&body.shape) {
                    Collider::Cuboid { half_extents } => {
                        Aabb::from_center(body.position, half_extents)
                            .ray_distance(ray.origin, ray.direction)?
                    }
                    Collider::Ball { radius } => ray_ball(ray, body.position, radius)?,
                };
                Some(RayHit {
                    body: body.id,
                    point: ray.at(distance),
                    distance,
                })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

fn ray_ball(ray: &Ray, center: Vec3, radius: f32) -> Option<f32> {
    let oc = ray.origin - center;
    let b = oc.dot(ray.direction);
    let c = oc.length_squared() - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let sqrt = disc.sqrt();
    let near = -b - sqrt;
    let far = -b + sqrt;
    if far < 0.0 {
        None
    } else {
        Some(near.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::body::{Material, Shape};

    fn ground(world: &mut ArenaWorld) -> BodyId {
        world.insert(Body::kinematic(Shape::Box {
            width: 100.0,
            height: 10.0,
            depth: 100.0,
        }))
    }

    fn player_at(world: &mut ArenaWorld, y: f32) -> BodyId {
        world.insert(
            Body::new(
                Shape::Box {
                    width: 5.0,
                    height: 7.0,
                    depth: 5.0,
                },
                1.0,
            )
            .with_position(Vec3::new(0.0, y, 0.0))
            .with_material(Material { friction: 0.0 }),
        )
    }

    #[test]
    fn body_falls_and_comes_to_rest_on_ground() {
        let mut world = ArenaWorld::default();
        let floor = ground(&mut world);
        let player = player_at(&mut world, 15.0);

        for _ in 0..240 {
            world.step(1.0 / 60.0);
        }

        let body = world.body(player).unwrap();
        // Ground top at y = 5, half height 3.5
        assert!((body.position.y - 8.5).abs() < 0.1, "y = {}", body.position.y);
        assert!(body.velocity.y.abs() < 0.5);
        assert!(!world.contacts(player, &[floor]).is_empty());
    }

    #[test]
    fn kinematic_bodies_do_not_move() {
        let mut world = ArenaWorld::default();
        let floor = ground(&mut world);
        player_at(&mut world, 8.0);
        for _ in 0..60 {
            world.step(1.0 / 60.0);
        }
        assert_eq!(world.body(floor).unwrap().position, Vec3::ZERO);
    }

    #[test]
    fn airborne_body_has_no_contacts() {
        let mut world = ArenaWorld::default();
        let floor = ground(&mut world);
        let player = player_at(&mut world, 30.0);
        assert!(world.contacts(player, &[floor]).is_empty());
        assert!(world.contacts(player, &[]).is_empty());
    }

    #[test]
    fn local_impulse_is_rotated_by_orientation() {
        let mut world = ArenaWorld::new(Vec3::ZERO, 0.05);
        let id = player_at(&mut world, 0.0);
        {
            let body = world.body_mut(id).unwrap();
            body.bearing.y = 90.0;
            body.apply_bearing();
        }
        world.apply_local_impulse(id, Vec3::new(0.0, 0.0, -10.0));
        let v = world.body(id).unwrap().velocity;
        // Facing a bearing of 90 degrees, local forward (-z) points along +x
        assert!((v.x - 10.0).abs() < 1e-3, "v = {v:?}");
        assert!(v.z.abs() < 1e-3);
    }

    #[test]
    fn impulse_on_kinematic_body_is_ignored() {
        let mut world = ArenaWorld::default();
        let floor = ground(&mut world);
        world.apply_local_impulse(floor, Vec3::new(5.0, 5.0, 5.0));
        assert_eq!(world.body(floor).unwrap().velocity, Vec3::ZERO);
    }

    #[test]
    fn raycast_returns_nearest_body() {
        let mut world = ArenaWorld::default();
        let floor = ground(&mut world);
        let player = player_at(&mut world, 20.0);

        let down = Ray::new(Vec3::new(0.0, 50.0, 0.0), -Vec3::Y);
        let hit = world.raycast(&down).unwrap();
        assert_eq!(hit.body, player);
        assert!((hit.point.y - 23.5).abs() < 1e-4);

        let beside = Ray::new(Vec3::new(20.0, 50.0, 0.0), -Vec3::Y);
        let hit = world.raycast(&beside).unwrap();
        assert_eq!(hit.body, floor);
        assert!((hit.point.y - 5.0).abs() < 1e-4);

        let away = Ray::new(Vec3::new(0.0, 50.0, 0.0), Vec3::Y);
        assert!(world.raycast(&away).is_none());
    }

    #[test]
    fn ball_rests_on_box() {
        let mut world = ArenaWorld::default();
        let floor = ground(&mut world);
        let ball = world.insert(
            Body::new(Shape::Sphere { radius: 1.0 }, 1.0).with_position(Vec3::new(0.0, 10.0, 0.0)),
        );
        for _ in 0..240 {
            world.step(1.0 / 60.0);
        }
        let y = world.body(ball).unwrap().position.y;
        assert!((y - 6.0).abs() < 0.1, "y = {y}");
        assert!(!world.contacts(ball, &[floor]).is_empty());
    }
}

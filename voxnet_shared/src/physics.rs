//! Movement and swept collision against the voxel grid.

use crate::{
    math::{Aabb, Vec3},
    state::WorldState,
};

/// Physics parameters. Identical on both ends; replay depends on it.
#[derive(Debug, Clone, Copy)]
pub struct PhysicsConfig {
    /// Vertical acceleration in blocks/s².
    pub gravity: f32,
    pub walk_speed: f32,
    pub jump_speed: f32,
    /// Half-width, half-height, half-depth of a living body.
    pub body_half_extents: Vec3,
    pub eye_height: f32,
    pub particle_half_extents: Vec3,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: -24.0,
            walk_speed: 4.3,
            jump_speed: 8.0,
            body_half_extents: Vec3::new(0.3, 0.9, 0.3),
            eye_height: 1.6,
            particle_half_extents: Vec3::new(0.1, 0.1, 0.1),
        }
    }
}

/// Outcome of one swept move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sweep {
    /// Motion actually applied.
    pub motion: Vec3,
    pub hit_x: bool,
    pub hit_y: bool,
    pub hit_z: bool,
}

impl Sweep {
    /// Landed on something while moving down.
    pub fn landed(&self, requested: Vec3) -> bool {
        self.hit_y && requested.y < 0.0
    }

    /// `velocity` with every blocked axis zeroed.
    pub fn clamp_velocity(&self, velocity: Vec3) -> Vec3 {
        Vec3::new(
            if self.hit_x { 0.0 } else { velocity.x },
            if self.hit_y { 0.0 } else { velocity.y },
            if self.hit_z { 0.0 } else { velocity.z },
        )
    }
}

/// Moves `bounds` by `motion`, stopping at solid voxel faces. Axes resolve in
/// Y, X, Z order against the boxes under the swept volume.
pub fn sweep(world: &WorldState, bounds: Aabb, motion: Vec3) -> Sweep {
    let boxes = world.solid_boxes(&bounds.expand_towards(motion));
    let mut moved = bounds;

    let mut dy = motion.y;
    for b in &boxes {
        dy = moved.clip_y(b, dy);
    }
    moved = moved.translate(Vec3::new(0.0, dy, 0.0));

    let mut dx = motion.x;
    for b in &boxes {
        dx = moved.clip_x(b, dx);
    }
    moved = moved.translate(Vec3::new(dx, 0.0, 0.0));

    let mut dz = motion.z;
    for b in &boxes {
        dz = moved.clip_z(b, dz);
    }

    Sweep {
        motion: Vec3::new(dx, dy, dz),
        hit_x: dx != motion.x,
        hit_y: dy != motion.y,
        hit_z: dz != motion.z,
    }
}

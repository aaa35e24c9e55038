//! Math types.
//!
//! This module intentionally stays small and deterministic.
//! It avoids SIMD/unsafe and focuses on stable semantics: every operation
//! here runs identically on client and server, which replay depends on.

use std::ops::{Add, AddAssign, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// 3D vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const ONE: Self = Self {
        x: 1.0,
        y: 1.0,
        z: 1.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn len_sq(self) -> f32 {
        self.dot(self)
    }

    pub fn lerp(self, to: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self::new(
            self.x + (to.x - self.x) * t,
            self.y + (to.y - self.y) * t,
            self.z + (to.z - self.z) * t,
        )
    }

    /// Voxel cell containing this point.
    pub fn block_pos(self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }

    /// Unit look direction for a yaw/pitch pair in radians.
    pub fn from_yaw_pitch(yaw: f32, pitch: f32) -> Self {
        let (sy, cy) = yaw.sin_cos();
        let (sp, cp) = pitch.sin_cos();
        Self::new(-sy * cp, sp, -cy * cp)
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

/// Integer voxel coordinate in world space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub fn below(self) -> Self {
        self.offset(0, -1, 0)
    }

    pub fn above(self) -> Self {
        self.offset(0, 1, 0)
    }

    /// Minimum corner as a float vector.
    pub fn corner(self) -> Vec3 {
        Vec3::new(self.x as f32, self.y as f32, self.z as f32)
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Box centred horizontally on `feet`, extending `half_extents` sideways
    /// and `2 * half_extents.y` upward.
    pub fn around_feet(feet: Vec3, half_extents: Vec3) -> Self {
        Self::new(
            Vec3::new(feet.x - half_extents.x, feet.y, feet.z - half_extents.z),
            Vec3::new(
                feet.x + half_extents.x,
                feet.y + half_extents.y * 2.0,
                feet.z + half_extents.z,
            ),
        )
    }

    /// Unit cube occupied by a voxel.
    pub fn of_block(pos: BlockPos) -> Self {
        let min = pos.corner();
        Self::new(min, min + Vec3::ONE)
    }

    pub fn translate(self, by: Vec3) -> Self {
        Self::new(self.min + by, self.max + by)
    }

    /// Grows the box in the direction of `motion` so it covers the full sweep.
    pub fn expand_towards(self, motion: Vec3) -> Self {
        let mut out = self;
        if motion.x < 0.0 {
            out.min.x += motion.x;
        } else {
            out.max.x += motion.x;
        }
        if motion.y < 0.0 {
            out.min.y += motion.y;
        } else {
            out.max.y += motion.y;
        }
        if motion.z < 0.0 {
            out.min.z += motion.z;
        } else {
            out.max.z += motion.z;
        }
        out
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
            && self.min.z < other.max.z
            && self.max.z > other.min.z
    }

    /// Clamps a movement of `dx` along X so `self` stops at `other`'s face.
    pub fn clip_x(&self, other: &Aabb, mut dx: f32) -> f32 {
        if self.max.y <= other.min.y
            || self.min.y >= other.max.y
            || self.max.z <= other.min.z
            || self.min.z >= other.max.z
        {
            return dx;
        }
        if dx > 0.0 && self.max.x <= other.min.x {
            dx = dx.min(other.min.x - self.max.x);
        } else if dx < 0.0 && self.min.x >= other.max.x {
            dx = dx.max(other.max.x - self.min.x);
        }
        dx
    }

    /// Clamps a movement of `dy` along Y so `self` stops at `other`'s face.
    pub fn clip_y(&self, other: &Aabb, mut dy: f32) -> f32 {
        if self.max.x <= other.min.x
            || self.min.x >= other.max.x
            || self.max.z <= other.min.z
            || self.min.z >= other.max.z
        {
            return dy;
        }
        if dy > 0.0 && self.max.y <= other.min.y {
            dy = dy.min(other.min.y - self.max.y);
        } else if dy < 0.0 && self.min.y >= other.max.y {
            dy = dy.max(other.max.y - self.min.y);
        }
        dy
    }

    /// Clamps a movement of `dz` along Z so `self` stops at `other`'s face.
    pub fn clip_z(&self, other: &Aabb, mut dz: f32) -> f32 {
        if self.max.x <= other.min.x
            || self.min.x >= other.max.x
            || self.max.y <= other.min.y
            || self.min.y >= other.max.y
        {
            return dz;
        }
        if dz > 0.0 && self.max.z <= other.min.z {
            dz = dz.min(other.min.z - self.max.z);
        } else if dz < 0.0 && self.min.z >= other.max.z {
            dz = dz.max(other.max.z - self.min.z);
        }
        dz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec3_lerp_midpoint() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(2.0, 4.0, 6.0);
        let mid = a.lerp(b, 0.5);
        assert_eq!(mid, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn block_pos_floors_negative_coordinates() {
        assert_eq!(
            Vec3::new(-0.5, 1.99, 3.0).block_pos(),
            BlockPos::new(-1, 1, 3)
        );
    }

    #[test]
    fn clip_y_stops_on_top_face() {
        let floor = Aabb::of_block(BlockPos::new(0, 0, 0));
        let body = Aabb::new(Vec3::new(0.2, 1.5, 0.2), Vec3::new(0.8, 3.3, 0.8));
        assert_eq!(body.clip_y(&floor, -2.0), -0.5);
        // Not overlapping horizontally: no clip.
        let beside = body.translate(Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(beside.clip_y(&floor, -2.0), -2.0);
    }
}

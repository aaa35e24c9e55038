//! Column light heights.
//!
//! Each vertical column caches the y of its highest opaque voxel (0 when the
//! column has none). A voxel is lit when it sits at or above that height.

use crate::{
    error::{Error, Result},
    math::BlockPos,
    packet::{Decode, Encode, Packet},
};

use super::{ChangeSet, CHUNK_SIZE};

const COLUMNS: usize = (CHUNK_SIZE * CHUNK_SIZE) as usize;

/// Horizontal chunk coordinate of a light column group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnCoord {
    pub x: i32,
    pub z: i32,
}

impl ColumnCoord {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Column group holding `pos` and the column index within it.
    pub fn locate(pos: BlockPos) -> (Self, u16) {
        let coord = Self::new(pos.x.div_euclid(CHUNK_SIZE), pos.z.div_euclid(CHUNK_SIZE));
        let lx = pos.x.rem_euclid(CHUNK_SIZE);
        let lz = pos.z.rem_euclid(CHUNK_SIZE);
        (coord, (lz * CHUNK_SIZE + lx) as u16)
    }

    /// World x/z of column `index`.
    pub fn column_at_index(self, index: u16) -> (i32, i32) {
        let i = index as i32;
        (
            self.x * CHUNK_SIZE + i % CHUNK_SIZE,
            self.z * CHUNK_SIZE + i / CHUNK_SIZE,
        )
    }
}

impl Encode for ColumnCoord {
    fn encode(&self, p: &mut Packet) {
        p.write(self.x);
        p.write(self.z);
    }
}

impl Decode for ColumnCoord {
    fn decode(p: &mut Packet) -> Result<Self> {
        Ok(Self::new(p.read()?, p.read()?))
    }
}

/// Cached light heights for a CHUNK_SIZE x CHUNK_SIZE group of columns.
#[derive(Debug, Clone, PartialEq)]
pub struct LightChunkState {
    coord: ColumnCoord,
    heights: Vec<i32>,
    changes: ChangeSet<u16, i32>,
}

impl LightChunkState {
    pub fn new(coord: ColumnCoord) -> Self {
        Self {
            coord,
            heights: vec![0; COLUMNS],
            changes: ChangeSet::default(),
        }
    }

    pub fn coord(&self) -> ColumnCoord {
        self.coord
    }

    pub fn height(&self, index: u16) -> i32 {
        self.heights[index as usize]
    }

    /// Tracked write.
    pub fn set_height(&mut self, index: u16, height: i32) {
        let prior = self.heights[index as usize];
        self.changes.record(index, prior);
        self.heights[index as usize] = height;
    }

    /// Whether any height changed since the last delta.
    pub fn is_dirty(&self) -> bool {
        self.changes.is_dirty()
    }

    pub fn write_forward(&mut self, p: &mut Packet) {
        let touched = self.changes.take();
        p.write(touched.len() as u16);
        for index in touched.keys() {
            p.write(*index);
            p.write(self.heights[*index as usize]);
        }
    }

    pub fn write_inverse(&mut self, p: &mut Packet) {
        let touched = self.changes.take();
        p.write(touched.len() as u16);
        for (index, prior) in touched {
            p.write(index);
            p.write(prior);
        }
    }

    pub fn apply_delta(&mut self, p: &mut Packet) -> Result<()> {
        let count: u16 = p.read()?;
        for _ in 0..count {
            let index: u16 = p.read()?;
            let height: i32 = p.read()?;
            let slot = self
                .heights
                .get_mut(index as usize)
                .ok_or(Error::OutOfRange {
                    offset: index as usize,
                    wanted: 1,
                    len: COLUMNS,
                })?;
            *slot = height;
        }
        Ok(())
    }

    pub fn discard(&mut self) {
        self.changes.clear();
    }

    pub fn write_full(&self, p: &mut Packet) {
        p.write(self.coord);
        for h in &self.heights {
            p.write(*h);
        }
    }

    pub fn read_full(p: &mut Packet) -> Result<Self> {
        let coord: ColumnCoord = p.read()?;
        let mut light = Self::new(coord);
        for slot in light.heights.iter_mut() {
            *slot = p.read()?;
        }
        Ok(light)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketType;

    #[test]
    fn locate_round_trips() {
        let (coord, index) = ColumnCoord::locate(BlockPos::new(-3, 40, 18));
        assert_eq!(coord, ColumnCoord::new(-1, 1));
        assert_eq!(coord.column_at_index(index), (-3, 18));
    }

    #[test]
    fn height_delta_duality() {
        let a = LightChunkState::new(ColumnCoord::new(0, 0));
        let mut b = a.clone();
        b.set_height(7, 5);
        b.set_height(7, 3);

        let mut undo = Packet::new(PacketType::WorldChange);
        b.clone().write_inverse(&mut undo);
        let mut restored = b.clone();
        restored.apply_delta(&mut undo).unwrap();
        assert_eq!(restored.height(7), 0);
        assert_eq!(b.height(7), 3);
    }
}

//! Voxel chunk state.

use crate::{
    block::BlockKind,
    error::Result,
    math::BlockPos,
    packet::{Decode, Encode, Packet},
};

use super::ChangeSet;

/// Edge length of a cubic chunk.
pub const CHUNK_SIZE: i32 = 16;
/// Cells per chunk.
pub const CHUNK_VOLUME: usize = (CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE) as usize;

/// Chunk coordinate (world block coordinate divided by [`CHUNK_SIZE`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkCoord {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Chunk holding `pos` and the cell index of `pos` within it.
    pub fn locate(pos: BlockPos) -> (Self, u16) {
        let coord = Self::new(
            pos.x.div_euclid(CHUNK_SIZE),
            pos.y.div_euclid(CHUNK_SIZE),
            pos.z.div_euclid(CHUNK_SIZE),
        );
        let lx = pos.x.rem_euclid(CHUNK_SIZE);
        let ly = pos.y.rem_euclid(CHUNK_SIZE);
        let lz = pos.z.rem_euclid(CHUNK_SIZE);
        (coord, ((ly * CHUNK_SIZE + lz) * CHUNK_SIZE + lx) as u16)
    }

    /// World position of cell `index` in this chunk.
    pub fn block_at_index(self, index: u16) -> BlockPos {
        let i = index as i32;
        let lx = i % CHUNK_SIZE;
        let lz = (i / CHUNK_SIZE) % CHUNK_SIZE;
        let ly = i / (CHUNK_SIZE * CHUNK_SIZE);
        BlockPos::new(
            self.x * CHUNK_SIZE + lx,
            self.y * CHUNK_SIZE + ly,
            self.z * CHUNK_SIZE + lz,
        )
    }
}

impl Encode for ChunkCoord {
    fn encode(&self, p: &mut Packet) {
        p.write(self.x);
        p.write(self.y);
        p.write(self.z);
    }
}

impl Decode for ChunkCoord {
    fn decode(p: &mut Packet) -> Result<Self> {
        Ok(Self::new(p.read()?, p.read()?, p.read()?))
    }
}

/// Fixed-size voxel grid with a per-cell change record.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkState {
    coord: ChunkCoord,
    blocks: Vec<BlockKind>,
    changes: ChangeSet<u16, BlockKind>,
}

impl ChunkState {
    pub fn new(coord: ChunkCoord) -> Self {
        Self {
            coord,
            blocks: vec![BlockKind::Air; CHUNK_VOLUME],
            changes: ChangeSet::default(),
        }
    }

    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    pub fn get(&self, index: u16) -> BlockKind {
        self.blocks[index as usize]
    }

    /// Tracked write. Returns the replaced kind.
    pub fn set(&mut self, index: u16, kind: BlockKind) -> BlockKind {
        let prior = self.blocks[index as usize];
        self.changes.record(index, prior);
        self.blocks[index as usize] = kind;
        prior
    }

    pub fn is_dirty(&self) -> bool {
        self.changes.is_dirty()
    }

    pub fn write_forward(&mut self, p: &mut Packet) {
        let touched = self.changes.take();
        p.write(touched.len() as u16);
        for index in touched.keys() {
            p.write(*index);
            p.write(self.blocks[*index as usize]);
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

    /// Applies cell writes. Light travels in its own delta section, so
    /// nothing is recomputed here.
    pub fn apply_delta(&mut self, p: &mut Packet) -> Result<()> {
        let count: u16 = p.read()?;
        for _ in 0..count {
            let index: u16 = p.read()?;
            let kind: BlockKind = p.read()?;
            let slot = self
                .blocks
                .get_mut(index as usize)
                .ok_or(crate::error::Error::OutOfRange {
                    offset: index as usize,
                    wanted: 1,
                    len: CHUNK_VOLUME,
                })?;
            *slot = kind;
        }
        Ok(())
    }

    pub fn discard(&mut self) {
        self.changes.clear();
    }

    pub fn write_full(&self, p: &mut Packet) {
        p.write(self.coord);
        for kind in &self.blocks {
            p.write(*kind);
        }
    }

    pub fn read_full(p: &mut Packet) -> Result<Self> {
        let coord: ChunkCoord = p.read()?;
        let mut chunk = Self::new(coord);
        for slot in chunk.blocks.iter_mut() {
            *slot = p.read()?;
        }
        Ok(chunk)
    }
}

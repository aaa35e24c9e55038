//! Block kinds and their static properties.

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    packet::{Decode, Encode, Packet},
};

/// Voxel material. The discriminant is the wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum BlockKind {
    #[default]
    Air = 0,
    Stone = 1,
    Dirt = 2,
    Grass = 3,
    Sapling = 4,
    Glass = 5,
    Planks = 6,
}

impl BlockKind {
    pub const ALL: [BlockKind; 7] = [
        BlockKind::Air,
        BlockKind::Stone,
        BlockKind::Dirt,
        BlockKind::Grass,
        BlockKind::Sapling,
        BlockKind::Glass,
        BlockKind::Planks,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Result<Self> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or(Error::UnknownBlock(code))
    }

    /// Lowercase name, as typed at a console.
    pub fn name(self) -> &'static str {
        match self {
            BlockKind::Air => "air",
            BlockKind::Stone => "stone",
            BlockKind::Dirt => "dirt",
            BlockKind::Grass => "grass",
            BlockKind::Sapling => "sapling",
            BlockKind::Glass => "glass",
            BlockKind::Planks => "planks",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Blocks sky light; participates in column light height.
    pub fn is_opaque(self) -> bool {
        matches!(
            self,
            BlockKind::Stone | BlockKind::Dirt | BlockKind::Grass | BlockKind::Planks
        )
    }

    /// Has a collision box.
    pub fn is_solid(self) -> bool {
        !matches!(self, BlockKind::Air | BlockKind::Sapling)
    }

    /// Can hold a sapling on top.
    pub fn is_soil(self) -> bool {
        matches!(self, BlockKind::Dirt | BlockKind::Grass)
    }
}

impl Encode for BlockKind {
    fn encode(&self, p: &mut Packet) {
        p.write(self.code());
    }
}

impl Decode for BlockKind {
    fn decode(p: &mut Packet) -> Result<Self> {
        BlockKind::from_code(p.read()?)
    }
}

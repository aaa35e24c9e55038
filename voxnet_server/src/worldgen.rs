//! Flat world generation.
//!
//! Terrain is two chunk layers tall: stone up to `STONE_TOP`, dirt above it
//! and a grass surface at `SURFACE_Y`, with saplings scattered on top. The
//! same seed always yields the same world.

use rand::{rngs::StdRng, Rng, SeedableRng};
use voxnet_shared::{
    block::BlockKind,
    math::{BlockPos, Vec3},
    state::{ChunkCoord, ChunkState, WorldState, CHUNK_SIZE},
};

const STONE_TOP: i32 = 5;
const SURFACE_Y: i32 = 8;
const CHUNK_LAYERS: i32 = 2;
/// One surface column in this many grows a sapling.
const SAPLING_ONE_IN: u32 = 48;

/// Builds a `size` x `size` chunk world with freshly rebuilt light and no
/// pending changes.
pub fn generate(seed: u64, size: i32) -> WorldState {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut world = WorldState::new(seed);

    for cx in 0..size {
        for cz in 0..size {
            for cy in 0..CHUNK_LAYERS {
                let coord = ChunkCoord::new(cx, cy, cz);
                let mut chunk = ChunkState::new(coord);
                fill_chunk(&mut chunk, &mut rng);
                chunk.discard();
                world.insert_chunk(chunk);
            }
        }
    }
    world.rebuild_light();
    world
}

fn fill_chunk(chunk: &mut ChunkState, rng: &mut StdRng) {
    let origin = chunk.coord();
    for lx in 0..CHUNK_SIZE {
        for lz in 0..CHUNK_SIZE {
            let x = origin.x * CHUNK_SIZE + lx;
            let z = origin.z * CHUNK_SIZE + lz;
            let sapling = rng.gen_ratio(1, SAPLING_ONE_IN);
            for ly in 0..CHUNK_SIZE {
                let y = origin.y * CHUNK_SIZE + ly;
                let kind = match y {
                    y if y <= STONE_TOP => BlockKind::Stone,
                    y if y < SURFACE_Y => BlockKind::Dirt,
                    SURFACE_Y => BlockKind::Grass,
                    y if y == SURFACE_Y + 1 && sapling => BlockKind::Sapling,
                    _ => continue,
                };
                let (_, index) = ChunkCoord::locate(BlockPos::new(x, y, z));
                chunk.set(index, kind);
            }
        }
    }
}

/// Where new players appear: standing on the surface in the middle of the
/// world.
pub fn spawn_point(size: i32) -> Vec3 {
    let centre = (size * CHUNK_SIZE) as f32 / 2.0 + 0.5;
    Vec3::new(centre, (SURFACE_Y + 1) as f32, centre)
}

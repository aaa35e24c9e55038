//! World aggregate.
//!
//! Holds the clock, deterministic RNG position, voxel chunks, light columns
//! and the entity registry, plus the per-tick bookkeeping that turns their
//! change records into one world delta.
//!
//! World delta layout (forward and inverse share it):
//! 1. clock block
//! 2. `u32` chunk count, then `(coord, chunk delta)` per touched chunk
//! 3. `u32` light count, then `(coord, light delta)` per touched column group
//! 4. `u32` insertion count, then `(id, kind, full record)` per insertion
//! 5. `u32` update count, then `(id, entity delta)` per dirty entity
//! 6. `u32` removal count, then `id` per removal
//!
//! A forward delta inserts the entities that entered this tick and removes
//! the ones that left; an inverse delta does the opposite, reinserting
//! departed entities with their start-of-tick values. Apply order is always
//! insertions, updates, removals, so the reader never needs the direction.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::{
    block::BlockKind,
    error::{Error, Result},
    math::{Aabb, BlockPos},
    packet::{Decode, Packet},
};

use super::{
    ChangeSet, ChunkCoord, ChunkState, ColumnCoord, EntityId, EntityKind, EntityState,
    FieldValue, LightChunkState, Trackable, CHUNK_SIZE, CHUNK_VOLUME,
};

/// Brightness of a voxel with open sky above it.
pub const MAX_BRIGHTNESS: u8 = 15;

// ─── Clock ───

#[derive(Debug, Clone, PartialEq)]
pub enum ClockField {
    Tick(u64),
    RngPosition(u64),
}

impl FieldValue for ClockField {
    fn id(&self) -> u8 {
        match self {
            ClockField::Tick(_) => 0,
            ClockField::RngPosition(_) => 1,
        }
    }

    fn encode_value(&self, p: &mut Packet) {
        match self {
            ClockField::Tick(v) | ClockField::RngPosition(v) => p.write(*v),
        }
    }

    fn decode(id: u8, p: &mut Packet) -> Result<Self> {
        Ok(match id {
            0 => ClockField::Tick(p.read()?),
            1 => ClockField::RngPosition(p.read()?),
            field => return Err(Error::UnknownField { block: "clock", field }),
        })
    }
}

/// Tick counter and RNG stream position.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClockState {
    tick: u64,
    rng_position: u64,
    changes: ChangeSet<u8, ClockField>,
}

impl ClockState {
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn rng_position(&self) -> u64 {
        self.rng_position
    }

    pub fn set_tick(&mut self, v: u64) {
        self.track(ClockField::Tick(self.tick));
        self.tick = v;
    }

    pub fn set_rng_position(&mut self, v: u64) {
        self.track(ClockField::RngPosition(self.rng_position));
        self.rng_position = v;
    }
}

impl Trackable for ClockState {
    type Field = ClockField;

    fn changes(&self) -> &ChangeSet<u8, ClockField> {
        &self.changes
    }

    fn changes_mut(&mut self) -> &mut ChangeSet<u8, ClockField> {
        &mut self.changes
    }

    fn current(&self, like: &ClockField) -> ClockField {
        match like {
            ClockField::Tick(_) => ClockField::Tick(self.tick),
            ClockField::RngPosition(_) => ClockField::RngPosition(self.rng_position),
        }
    }

    fn all_fields(&self) -> Vec<ClockField> {
        vec![
            ClockField::Tick(self.tick),
            ClockField::RngPosition(self.rng_position),
        ]
    }

    fn assign(&mut self, value: ClockField) {
        match value {
            ClockField::Tick(v) => self.tick = v,
            ClockField::RngPosition(v) => self.rng_position = v,
        }
    }
}

// ─── Applied change summary ───

/// What an applied delta touched. Handed to the render collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickChanges {
    pub tick: u64,
    pub chunks: BTreeSet<ChunkCoord>,
    pub lights: BTreeSet<ColumnCoord>,
    pub entities: BTreeSet<EntityId>,
    pub entered: BTreeSet<EntityId>,
    pub left: BTreeSet<EntityId>,
}

impl TickChanges {
    /// Folds a later change summary into this one.
    pub fn merge(&mut self, later: TickChanges) {
        self.tick = later.tick;
        self.chunks.extend(later.chunks);
        self.lights.extend(later.lights);
        self.entities.extend(later.entities);
        for id in later.entered {
            self.left.remove(&id);
            self.entered.insert(id);
        }
        for id in later.left {
            self.entered.remove(&id);
            self.left.insert(id);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
            && self.lights.is_empty()
            && self.entities.is_empty()
            && self.entered.is_empty()
            && self.left.is_empty()
    }
}

// ─── World ───

/// Entities queued for the next tick boundary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Staging {
    spawns: Vec<(EntityId, EntityState)>,
    despawns: BTreeSet<EntityId>,
}

impl Staging {
    pub fn spawn_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.spawns.iter().map(|(id, _)| *id)
    }

    pub fn is_empty(&self) -> bool {
        self.spawns.is_empty() && self.despawns.is_empty()
    }
}

/// Complete replicated world.
#[derive(Debug, Clone)]
pub struct WorldState {
    seed: u64,
    clock: ClockState,
    chunks: BTreeMap<ChunkCoord, ChunkState>,
    lights: BTreeMap<ColumnCoord, LightChunkState>,
    /// Entity registry; `None` is the empty kind.
    slots: Vec<Option<EntityState>>,

    touched_chunks: BTreeSet<ChunkCoord>,
    touched_lights: BTreeSet<ColumnCoord>,
    touched_entities: BTreeSet<EntityId>,
    entered: BTreeSet<EntityId>,
    left: BTreeMap<EntityId, EntityState>,

    staged: Staging,
}

impl PartialEq for WorldState {
    /// Compares replicated state only; per-tick bookkeeping is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.seed == other.seed
            && self.clock.tick == other.clock.tick
            && self.clock.rng_position == other.clock.rng_position
            && self.chunks == other.chunks
            && self.lights == other.lights
            && self.live_entities().eq(other.live_entities())
    }
}

impl WorldState {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            clock: ClockState::default(),
            chunks: BTreeMap::new(),
            lights: BTreeMap::new(),
            slots: Vec::new(),
            touched_chunks: BTreeSet::new(),
            touched_lights: BTreeSet::new(),
            touched_entities: BTreeSet::new(),
            entered: BTreeSet::new(),
            left: BTreeMap::new(),
            staged: Staging::default(),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn tick(&self) -> u64 {
        self.clock.tick
    }

    pub fn rng_position(&self) -> u64 {
        self.clock.rng_position
    }

    pub fn advance_tick(&mut self) {
        let next = self.clock.tick + 1;
        self.clock.set_tick(next);
    }

    /// Next value of the world's deterministic random stream.
    ///
    /// The stream is a pure function of `(seed, position)`, so restoring the
    /// tracked position restores the stream.
    pub fn next_random(&mut self) -> u64 {
        let position = self.clock.rng_position;
        self.clock.set_rng_position(position + 1);
        splitmix64(self.seed ^ position.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }

    // ─── Voxels ───

    /// Adds a generated chunk. Untracked; call [`WorldState::rebuild_light`]
    /// once generation is done.
    pub fn insert_chunk(&mut self, chunk: ChunkState) {
        let coord = chunk.coord();
        let column = ColumnCoord::new(coord.x, coord.z);
        self.lights
            .entry(column)
            .or_insert_with(|| LightChunkState::new(column));
        self.chunks.insert(coord, chunk);
    }

    pub fn chunk(&self, coord: ChunkCoord) -> Option<&ChunkState> {
        self.chunks.get(&coord)
    }

    pub fn chunk_coords(&self) -> Vec<ChunkCoord> {
        self.chunks.keys().copied().collect()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn light(&self, coord: ColumnCoord) -> Option<&LightChunkState> {
        self.lights.get(&coord)
    }

    /// Voxels across all loaded chunks.
    pub fn total_volume(&self) -> usize {
        self.chunks.len() * CHUNK_VOLUME
    }

    /// Highest chunk-aligned y covered by any loaded chunk.
    fn top_y(&self) -> i32 {
        self.chunks
            .keys()
            .map(|c| (c.y + 1) * CHUNK_SIZE - 1)
            .max()
            .unwrap_or(0)
    }

    pub fn block_at(&self, pos: BlockPos) -> BlockKind {
        let (coord, index) = ChunkCoord::locate(pos);
        self.chunks
            .get(&coord)
            .map(|c| c.get(index))
            .unwrap_or(BlockKind::Air)
    }

    /// Cached column light height at world column `(x, z)`.
    pub fn light_height(&self, x: i32, z: i32) -> i32 {
        let (coord, index) = ColumnCoord::locate(BlockPos::new(x, 0, z));
        self.lights.get(&coord).map(|l| l.height(index)).unwrap_or(0)
    }

    /// Whether `pos` has no opaque voxel above it.
    pub fn is_lit(&self, pos: BlockPos) -> bool {
        pos.y >= self.light_height(pos.x, pos.z)
    }

    /// Sky brightness in `0..=15`; drops by one per voxel below the column
    /// light height.
    pub fn brightness_at(&self, pos: BlockPos) -> u8 {
        let depth = self.light_height(pos.x, pos.z) - pos.y;
        if depth <= 0 {
            MAX_BRIGHTNESS
        } else {
            MAX_BRIGHTNESS.saturating_sub(depth.min(MAX_BRIGHTNESS as i32) as u8)
        }
    }

    /// Tracked voxel write. Recalculates the column light height before
    /// returning. Returns `false` when the chunk is not loaded.
    pub fn set_block(&mut self, pos: BlockPos, kind: BlockKind) -> bool {
        let (coord, index) = ChunkCoord::locate(pos);
        let Some(chunk) = self.chunks.get_mut(&coord) else {
            return false;
        };
        let old = chunk.set(index, kind);
        self.touched_chunks.insert(coord);
        self.relight(pos, old, kind);
        true
    }

    fn relight(&mut self, pos: BlockPos, old: BlockKind, new: BlockKind) {
        let (coord, index) = ColumnCoord::locate(pos);
        let Some(current) = self.lights.get(&coord).map(|l| l.height(index)) else {
            return;
        };

        let next = if new.is_opaque() {
            current.max(pos.y)
        } else if pos.y == current {
            self.scan_height(pos.x, pos.z, current - 1)
        } else {
            current
        };

        if next != current {
            trace!(x = pos.x, z = pos.z, from = current, to = next, ?old, "relight");
            if let Some(light) = self.lights.get_mut(&coord) {
                light.set_height(index, next);
                self.touched_lights.insert(coord);
            }
        }
    }

    /// Highest opaque y at or below `from` in column `(x, z)`, or 0.
    fn scan_height(&self, x: i32, z: i32, from: i32) -> i32 {
        (0..=from)
            .rev()
            .find(|y| self.block_at(BlockPos::new(x, *y, z)).is_opaque())
            .unwrap_or(0)
    }

    /// Recomputes every column height from the voxel grid. Untracked.
    pub fn rebuild_light(&mut self) {
        let top = self.top_y();
        let coords: Vec<ColumnCoord> = self.lights.keys().copied().collect();
        for coord in coords {
            let mut heights = Vec::with_capacity((CHUNK_SIZE * CHUNK_SIZE) as usize);
            for index in 0..(CHUNK_SIZE * CHUNK_SIZE) as u16 {
                let (x, z) = coord.column_at_index(index);
                heights.push(self.scan_height(x, z, top));
            }
            if let Some(light) = self.lights.get_mut(&coord) {
                for (index, h) in heights.into_iter().enumerate() {
                    light.set_height(index as u16, h);
                }
                light.discard();
            }
        }
    }

    /// Collision boxes of solid voxels intersecting `area`.
    pub fn solid_boxes(&self, area: &Aabb) -> Vec<Aabb> {
        let lo = area.min.block_pos();
        let hi = area.max.block_pos();
        let mut out = Vec::new();
        for y in lo.y..=hi.y {
            for z in lo.z..=hi.z {
                for x in lo.x..=hi.x {
                    let pos = BlockPos::new(x, y, z);
                    if self.block_at(pos).is_solid() {
                        let b = Aabb::of_block(pos);
                        if b.intersects(area) {
                            out.push(b);
                        }
                    }
                }
            }
        }
        out
    }

    // ─── Entities ───

    /// Registry kind of `id`; free and out-of-range ids are `Empty`.
    pub fn kind_of(&self, id: EntityId) -> EntityKind {
        self.slots
            .get(id as usize)
            .and_then(|s| s.as_ref())
            .map(|e| e.kind())
            .unwrap_or(EntityKind::Empty)
    }

    pub fn entity(&self, id: EntityId) -> Option<&EntityState> {
        self.slots.get(id as usize).and_then(|s| s.as_ref())
    }

    /// Mutable access; marks the entity touched for this tick.
    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut EntityState> {
        let entity = self.slots.get_mut(id as usize).and_then(|s| s.as_mut())?;
        self.touched_entities.insert(id);
        Some(entity)
    }

    /// Registered ids, ascending.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.live_entities().map(|(id, _)| id).collect()
    }

    pub fn entity_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn live_entities(&self) -> impl Iterator<Item = (EntityId, &EntityState)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|e| (i as EntityId, e)))
    }

    /// Queues `entity` for registration at the start of the next tick and
    /// reserves its id.
    pub fn stage_spawn(&mut self, entity: EntityState) -> EntityId {
        let reserved: BTreeSet<EntityId> = self.staged.spawn_ids().collect();
        let id = (0..)
            .find(|id: &EntityId| {
                self.kind_of(*id) == EntityKind::Empty
                    && !reserved.contains(id)
                    && !self.left.contains_key(id)
            })
            .unwrap_or(0);
        self.staged.spawns.push((id, entity));
        id
    }

    /// Queues `id` for removal at the end of the current tick.
    pub fn stage_despawn(&mut self, id: EntityId) {
        self.staged.despawns.insert(id);
    }

    /// Registers staged spawns. Their construction-time changes are dropped.
    pub fn register_staged(&mut self) {
        for (id, mut entity) in std::mem::take(&mut self.staged.spawns) {
            entity.discard();
            self.put_slot(id, entity);
            self.entered.insert(id);
        }
    }

    /// Removes staged despawns, remembering them for the delta.
    pub fn remove_staged(&mut self) {
        for id in std::mem::take(&mut self.staged.despawns) {
            if let Some(entity) = self.slots.get_mut(id as usize).and_then(|s| s.take()) {
                self.touched_entities.remove(&id);
                self.left.insert(id, entity);
            }
        }
    }

    /// Drops staged spawns and despawns.
    pub fn clear_staged(&mut self) {
        self.staged = Staging::default();
    }

    /// What is queued for the next tick boundary. Staging is not part of any
    /// delta, so rollback has to carry it separately.
    pub fn staging(&self) -> &Staging {
        &self.staged
    }

    /// Replaces the queue with `staging`. Spawns whose id is already
    /// registered are dropped.
    pub fn restore_staging(&mut self, mut staging: Staging) {
        staging.spawns.retain(|(id, _)| self.kind_of(*id) == EntityKind::Empty);
        self.staged = staging;
    }

    fn put_slot(&mut self, id: EntityId, entity: EntityState) {
        let index = id as usize;
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index] = Some(entity);
    }

    // ─── Deltas ───

    /// Emits this tick's forward or inverse delta and clears all per-tick
    /// bookkeeping. Returns what the tick touched.
    pub fn write_delta(&mut self, p: &mut Packet, inverse: bool) -> TickChanges {
        let mut summary = TickChanges {
            tick: self.clock.tick,
            ..TickChanges::default()
        };
        if inverse {
            self.clock.write_inverse(p);
        } else {
            self.clock.write_forward(p);
        }

        let chunks: BTreeSet<ChunkCoord> = std::mem::take(&mut self.touched_chunks)
            .into_iter()
            .filter(|c| self.chunks.get(c).is_some_and(|c| c.is_dirty()))
            .collect();
        p.write(chunks.len() as u32);
        summary.chunks = chunks.clone();
        for coord in chunks {
            p.write(coord);
            if let Some(chunk) = self.chunks.get_mut(&coord) {
                if inverse {
                    chunk.write_inverse(p);
                } else {
                    chunk.write_forward(p);
                }
            }
        }

        let lights: BTreeSet<ColumnCoord> = std::mem::take(&mut self.touched_lights)
            .into_iter()
            .filter(|c| self.lights.get(c).is_some_and(|l| l.is_dirty()))
            .collect();
        p.write(lights.len() as u32);
        summary.lights = lights.clone();
        for coord in lights {
            p.write(coord);
            if let Some(light) = self.lights.get_mut(&coord) {
                if inverse {
                    light.write_inverse(p);
                } else {
                    light.write_forward(p);
                }
            }
        }

        let entered = std::mem::take(&mut self.entered);
        let mut left = std::mem::take(&mut self.left);
        let touched = std::mem::take(&mut self.touched_entities);

        // Insertions.
        if inverse {
            p.write(left.len() as u32);
            for (id, entity) in left.iter_mut() {
                entity.rewind();
                entity.discard();
                p.write(*id);
                p.write(entity.kind());
                entity.write_full(p);
            }
        } else {
            p.write(entered.len() as u32);
            for id in &entered {
                let entity = match self.slots.get_mut(*id as usize).and_then(|s| s.as_mut()) {
                    Some(e) => e,
                    None => match left.get_mut(id) {
                        Some(e) => e,
                        None => continue,
                    },
                };
                entity.discard();
                p.write(*id);
                p.write(entity.kind());
                entity.write_full(p);
            }
        }

        // Updates.
        let updates: Vec<EntityId> = touched
            .into_iter()
            .filter(|id| !entered.contains(id) && !left.contains_key(id))
            .filter(|id| self.entity(*id).is_some_and(|e| e.is_dirty()))
            .collect();
        p.write(updates.len() as u32);
        summary.entities = updates.iter().copied().collect();
        for id in updates {
            if let Some(entity) = self.slots.get_mut(id as usize).and_then(|s| s.as_mut()) {
                p.write(id);
                if inverse {
                    entity.write_inverse(p);
                } else {
                    entity.write_forward(p);
                }
            }
        }

        // Removals.
        if inverse {
            p.write(entered.len() as u32);
            for id in &entered {
                if let Some(entity) = self.slots.get_mut(*id as usize).and_then(|s| s.as_mut()) {
                    entity.discard();
                }
                p.write(*id);
            }
        } else {
            p.write(left.len() as u32);
            for id in left.keys() {
                p.write(*id);
            }
        }

        summary.entered = entered.difference(&left.keys().copied().collect()).copied().collect();
        summary.left = left
            .keys()
            .filter(|id| !entered.contains(id))
            .copied()
            .collect();
        summary
    }

    /// Clears per-tick bookkeeping without emitting anything.
    pub fn discard(&mut self) {
        self.clock.discard();
        for coord in std::mem::take(&mut self.touched_chunks) {
            if let Some(chunk) = self.chunks.get_mut(&coord) {
                chunk.discard();
            }
        }
        for coord in std::mem::take(&mut self.touched_lights) {
            if let Some(light) = self.lights.get_mut(&coord) {
                light.discard();
            }
        }
        for slot in self.slots.iter_mut().flatten() {
            slot.discard();
        }
        self.touched_entities.clear();
        self.entered.clear();
        self.left.clear();
    }

    /// Applies a world delta written by [`WorldState::write_delta`] in either
    /// direction. Never records changes.
    pub fn apply_delta(&mut self, p: &mut Packet) -> Result<TickChanges> {
        let mut changes = TickChanges::default();
        self.clock.apply_delta(p)?;

        let chunk_count = u32::decode(p)?;
        for _ in 0..chunk_count {
            let coord: ChunkCoord = p.read()?;
            let chunk = self.chunks.get_mut(&coord).ok_or(Error::UnknownChunk {
                x: coord.x,
                y: coord.y,
                z: coord.z,
            })?;
            chunk.apply_delta(p)?;
            changes.chunks.insert(coord);
        }

        let light_count = u32::decode(p)?;
        for _ in 0..light_count {
            let coord: ColumnCoord = p.read()?;
            let light = self.lights.get_mut(&coord).ok_or(Error::UnknownChunk {
                x: coord.x,
                y: 0,
                z: coord.z,
            })?;
            light.apply_delta(p)?;
            changes.lights.insert(coord);
        }

        let insert_count = u32::decode(p)?;
        for _ in 0..insert_count {
            let id: EntityId = p.read()?;
            let kind: EntityKind = p.read()?;
            let entity = EntityState::read_full(kind, p)?;
            if self.entity(id).is_some() {
                return Err(Error::EntityExists(id));
            }
            self.put_slot(id, entity);
            changes.entered.insert(id);
        }

        let update_count = u32::decode(p)?;
        for _ in 0..update_count {
            let id: EntityId = p.read()?;
            let entity = self
                .slots
                .get_mut(id as usize)
                .and_then(|s| s.as_mut())
                .ok_or(Error::UnknownEntity(id))?;
            entity.apply_delta(p)?;
            changes.entities.insert(id);
        }

        let removal_count = u32::decode(p)?;
        for _ in 0..removal_count {
            let id: EntityId = p.read()?;
            self.slots
                .get_mut(id as usize)
                .and_then(|s| s.take())
                .ok_or(Error::UnknownEntity(id))?;
            if !changes.entered.remove(&id) {
                changes.left.insert(id);
            }
        }

        changes.tick = self.clock.tick;
        Ok(changes)
    }

    // ─── Snapshots ───

    /// Writes the complete replicated state.
    pub fn write_snapshot(&self, p: &mut Packet) {
        p.write(self.seed);
        p.write(self.clock.tick);
        p.write(self.clock.rng_position);

        p.write(self.chunks.len() as u32);
        for chunk in self.chunks.values() {
            chunk.write_full(p);
        }

        p.write(self.lights.len() as u32);
        for light in self.lights.values() {
            light.write_full(p);
        }

        p.write(self.entity_count() as u32);
        for (id, entity) in self.live_entities() {
            p.write(id);
            p.write(entity.kind());
            entity.write_full(p);
        }
    }

    /// Reads a snapshot written by [`WorldState::write_snapshot`].
    pub fn read_snapshot(p: &mut Packet) -> Result<Self> {
        let mut world = WorldState::new(p.read()?);
        world.clock.assign(ClockField::Tick(p.read()?));
        world.clock.assign(ClockField::RngPosition(p.read()?));

        let chunk_count = u32::decode(p)?;
        for _ in 0..chunk_count {
            let chunk = ChunkState::read_full(p)?;
            world.chunks.insert(chunk.coord(), chunk);
        }

        let light_count = u32::decode(p)?;
        for _ in 0..light_count {
            let light = LightChunkState::read_full(p)?;
            world.lights.insert(light.coord(), light);
        }

        let entity_count = u32::decode(p)?;
        for _ in 0..entity_count {
            let id: EntityId = p.read()?;
            let kind: EntityKind = p.read()?;
            let entity = EntityState::read_full(kind, p)?;
            world.put_slot(id, entity);
        }

        world.discard();
        Ok(world)
    }
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::FaultClass, math::Vec3, packet::PacketType};

    fn one_chunk_world() -> WorldState {
        let mut world = WorldState::new(7);
        world.insert_chunk(ChunkState::new(ChunkCoord::new(0, 0, 0)));
        world.rebuild_light();
        world
    }

    fn drain(world: &mut WorldState, inverse: bool) -> Packet {
        let mut p = Packet::new(PacketType::WorldChange);
        world.write_delta(&mut p, inverse);
        p
    }

    #[test]
    fn light_height_follows_placements_and_removals() {
        let mut world = one_chunk_world();
        assert_eq!(world.light_height(3, 3), 0);

        world.set_block(BlockPos::new(3, 5, 3), BlockKind::Stone);
        assert_eq!(world.light_height(3, 3), 5);

        world.set_block(BlockPos::new(3, 3, 3), BlockKind::Stone);
        assert_eq!(world.light_height(3, 3), 5);

        world.set_block(BlockPos::new(3, 5, 3), BlockKind::Air);
        assert_eq!(world.light_height(3, 3), 3);

        world.set_block(BlockPos::new(3, 3, 3), BlockKind::Air);
        assert_eq!(world.light_height(3, 3), 0);
    }

    #[test]
    fn transparent_block_at_height_triggers_rescan() {
        let mut world = one_chunk_world();
        world.set_block(BlockPos::new(0, 2, 0), BlockKind::Dirt);
        world.set_block(BlockPos::new(0, 6, 0), BlockKind::Dirt);
        world.set_block(BlockPos::new(0, 6, 0), BlockKind::Glass);
        assert_eq!(world.light_height(0, 0), 2);
        assert!(world.is_lit(BlockPos::new(0, 6, 0)));
        assert_eq!(world.brightness_at(BlockPos::new(0, 0, 0)), MAX_BRIGHTNESS - 2);
    }

    #[test]
    fn world_delta_duality_with_entities() {
        let mut world = one_chunk_world();
        let walker = world.stage_spawn(EntityState::living(Vec3::new(1.0, 1.0, 1.0)));
        let doomed = world.stage_spawn(EntityState::generic(Vec3::ZERO));
        world.register_staged();
        world.discard();
        let a = world.clone();

        // Tick: move, build, spawn, despawn.
        world.advance_tick();
        world.set_block(BlockPos::new(4, 4, 4), BlockKind::Planks);
        if let Some(e) = world.entity_mut(walker) {
            e.body.set_position(Vec3::new(2.0, 1.0, 1.0));
        }
        if let Some(e) = world.entity_mut(doomed) {
            e.body.set_position(Vec3::new(8.0, 8.0, 8.0));
        }
        world.stage_despawn(doomed);
        world.remove_staged();
        let fresh = world.stage_spawn(EntityState::generic(Vec3::ONE));
        assert_eq!(fresh, 2);

        let mut undo_src = world.clone();
        let mut undo = drain(&mut undo_src, true);
        let mut redo = drain(&mut world, false);
        let b = world.clone();

        let mut restored = b.clone();
        let changes = restored.apply_delta(&mut undo).unwrap();
        assert_eq!(restored, a);
        assert!(changes.entered.contains(&doomed));
        assert_eq!(
            restored.entity(doomed).map(|e| e.body.position()),
            Some(Vec3::ZERO)
        );

        let mut reached = a.clone();
        let changes = reached.apply_delta(&mut redo).unwrap();
        assert_eq!(reached, b);
        assert!(changes.left.contains(&doomed));
        assert_eq!(changes.tick, 1);
    }

    #[test]
    fn delta_drain_is_idempotent() {
        let mut world = one_chunk_world();
        world.advance_tick();
        world.set_block(BlockPos::new(1, 1, 1), BlockKind::Stone);
        let first = drain(&mut world, false);
        let second = drain(&mut world, false);
        let mut empty = Packet::new(PacketType::WorldChange);
        WorldState::new(0).write_delta(&mut empty, false);
        assert!(first.size() > second.size());
        assert_eq!(second.payload(), empty.payload());
    }

    #[test]
    fn unknown_entity_in_delta_is_invariant_violation() {
        let mut p = Packet::new(PacketType::WorldChange);
        p.write(0u8); // clock
        p.write(0u32); // chunks
        p.write(0u32); // lights
        p.write(0u32); // insertions
        p.write(1u32); // updates
        p.write(9u32);
        let mut world = one_chunk_world();
        let err = world.apply_delta(&mut p).unwrap_err();
        assert!(matches!(err, Error::UnknownEntity(9)));
    }

    #[test]
    fn insertion_over_registered_id_is_invariant_violation() {
        let mut world = one_chunk_world();
        let player = world.stage_spawn(EntityState::player(Vec3::ONE));
        world.register_staged();
        world.discard();

        let mut p = Packet::new(PacketType::WorldChange);
        p.write(0u8); // clock
        p.write(0u32); // chunks
        p.write(0u32); // lights
        p.write(1u32); // insertions
        p.write(player);
        p.write(EntityKind::Generic);
        EntityState::generic(Vec3::ZERO).write_full(&mut p);
        p.write(0u32); // updates
        p.write(0u32); // removals

        let err = world.apply_delta(&mut p).unwrap_err();
        assert!(matches!(err, Error::EntityExists(id) if id == player));
        assert_eq!(err.class(), FaultClass::Invariant);
        assert_eq!(world.kind_of(player), EntityKind::Player);
    }

    #[test]
    fn restored_staging_skips_ids_taken_meanwhile() {
        let mut world = one_chunk_world();
        let debris = world.stage_spawn(EntityState::generic(Vec3::ONE));
        let saved = world.staging().clone();
        world.register_staged();
        world.discard();

        world.restore_staging(saved.clone());
        assert!(world.staging().is_empty());

        let mut other = one_chunk_world();
        other.restore_staging(saved);
        assert_eq!(other.staging().spawn_ids().collect::<Vec<_>>(), vec![debris]);
        other.register_staged();
        assert_eq!(other.kind_of(debris), EntityKind::Generic);
    }

    #[test]
    fn snapshot_round_trip() {
        let mut world = one_chunk_world();
        world.set_block(BlockPos::new(2, 3, 4), BlockKind::Grass);
        world.stage_spawn(EntityState::player(Vec3::new(1.0, 4.0, 1.0)));
        world.register_staged();
        world.next_random();
        world.discard();

        let mut p = Packet::new(PacketType::WorldState);
        world.write_snapshot(&mut p);
        let back = WorldState::read_snapshot(&mut p).unwrap();
        assert_eq!(back, world);
        assert_eq!(back.kind_of(0), EntityKind::Player);
        assert_eq!(back.light_height(2, 4), 3);
    }

    #[test]
    fn rng_stream_replays_from_position() {
        let mut a = WorldState::new(99);
        let first: Vec<u64> = (0..4).map(|_| a.next_random()).collect();
        let mut b = WorldState::new(99);
        assert_eq!(b.next_random(), first[0]);
        b.clock.assign(ClockField::RngPosition(2));
        assert_eq!(b.next_random(), first[2]);
    }
}

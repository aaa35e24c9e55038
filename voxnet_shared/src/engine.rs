//! World tick.
//!
//! [`Simulation::tick`] advances a [`WorldState`] by one step and writes the
//! step's forward or inverse delta. Everything here is a pure function of the
//! world and the hooks' inputs, so two runs from the same state produce the
//! same bytes.

use tracing::trace;

use crate::{
    block::BlockKind,
    input::{InputButtons, PlayerInput},
    math::{Aabb, BlockPos, Vec3},
    packet::Packet,
    physics::{sweep, PhysicsConfig},
    state::{
        BuildMode, ChunkCoord, EntityId, EntityKind, EntityState, TickChanges, WorldState,
        CHUNK_VOLUME,
    },
};

/// One random voxel tick per this many voxels.
pub const RANDOM_TICK_DIVISOR: usize = 400;
/// Reach of a player's break/build ray, in blocks.
pub const REACH: f32 = 4.0;
const RAY_STEP: f32 = 0.05;
const DEBRIS_COUNT: usize = 4;
const DEBRIS_LIFE_SECS: f32 = 1.0;

/// Caller-supplied steps around the entity update.
pub trait TickHooks {
    /// Runs after staged spawns are registered, before the tick counter
    /// advances. Feeds queued input to entities.
    fn pre_tick(&mut self, _world: &mut WorldState) {}

    /// Runs after voxel ticks, before staged despawns are removed.
    fn post_tick(&mut self, _world: &mut WorldState) {}
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl TickHooks for NoHooks {}

/// Copies one tick of player input onto a player entity. Non-player entities
/// are left alone.
pub fn apply_input(entity: &mut EntityState, input: PlayerInput) {
    if entity.kind() != EntityKind::Player {
        return;
    }
    let rotation = entity.body.rotation();
    if rotation.y != input.yaw {
        entity.body.set_rotation(Vec3::new(rotation.x, input.yaw, rotation.z));
    }
    if let Some(living) = entity.as_living_mut() {
        if living.jump() != input.jumping() {
            living.set_jump(input.jumping());
        }
        if living.horizontal() != input.horizontal {
            living.set_horizontal(input.horizontal);
        }
        if living.vertical() != input.vertical {
            living.set_vertical(input.vertical);
        }
    }
    if let Some(player) = entity.as_player_mut() {
        if player.pitch() != input.pitch {
            player.set_pitch(input.pitch);
        }
        if input.selected != BlockKind::Air && player.selected() != input.selected {
            player.set_selected(input.selected);
        }
        if player.input() != input {
            player.set_input(input);
        }
    }
}

/// The per-tick world rules.
#[derive(Debug, Clone)]
pub struct Simulation {
    physics: PhysicsConfig,
    dt: f32,
}

impl Simulation {
    pub fn new(tick_hz: u32) -> Self {
        Self::with_physics(tick_hz, PhysicsConfig::default())
    }

    pub fn with_physics(tick_hz: u32, physics: PhysicsConfig) -> Self {
        Self {
            physics,
            dt: 1.0 / tick_hz.max(1) as f32,
        }
    }

    pub fn physics(&self) -> &PhysicsConfig {
        &self.physics
    }

    /// Seconds per tick.
    pub fn dt(&self) -> f32 {
        self.dt
    }

    /// Runs one tick and writes its delta into `out` (appended after any
    /// payload already there). Returns what the tick touched.
    pub fn tick(
        &self,
        world: &mut WorldState,
        hooks: &mut impl TickHooks,
        out: &mut Packet,
        want_inverse: bool,
    ) -> TickChanges {
        world.register_staged();
        hooks.pre_tick(world);
        world.advance_tick();

        for id in world.entity_ids() {
            self.tick_entity(world, id);
        }
        self.random_voxel_ticks(world);

        hooks.post_tick(world);
        world.remove_staged();
        let changes = world.write_delta(out, want_inverse);

        trace!(tick = changes.tick, bytes = out.size(), want_inverse, "ticked");
        changes
    }

    fn tick_entity(&self, world: &mut WorldState, id: EntityId) {
        match world.kind_of(id) {
            EntityKind::Empty => {}
            EntityKind::Generic => self.tick_generic(world, id),
            EntityKind::Living => self.tick_living(world, id),
            EntityKind::Player => {
                self.tick_player_actions(world, id);
                self.tick_living(world, id);
            }
            EntityKind::Particle => self.tick_particle(world, id),
        }
    }

    /// Generic entities drift with their velocity, ignoring the grid.
    fn tick_generic(&self, world: &mut WorldState, id: EntityId) {
        let Some(entity) = world.entity(id) else { return };
        let velocity = entity.body.velocity();
        if velocity == Vec3::ZERO {
            return;
        }
        let position = entity.body.position() + velocity * self.dt;
        if let Some(entity) = world.entity_mut(id) {
            entity.body.set_position(position);
        }
    }

    /// Input to velocity, gravity, then swept collision.
    fn tick_living(&self, world: &mut WorldState, id: EntityId) {
        let Some(entity) = world.entity(id) else { return };
        let Some(living) = entity.as_living() else { return };
        let body = &entity.body;

        let yaw = body.rotation().y;
        let (sy, cy) = yaw.sin_cos();
        let forward = Vec3::new(-sy, 0.0, -cy);
        let right = Vec3::new(cy, 0.0, -sy);
        let mut wish = right * living.horizontal() + forward * living.vertical();
        let len_sq = wish.len_sq();
        if len_sq > 1.0 {
            wish = wish * (1.0 / len_sq.sqrt());
        }

        let mut velocity = body.velocity();
        velocity.x = wish.x * self.physics.walk_speed;
        velocity.z = wish.z * self.physics.walk_speed;
        velocity.y += self.physics.gravity * self.dt;
        if living.jump() && body.grounded() {
            velocity.y = self.physics.jump_speed;
        }

        let requested = velocity * self.dt;
        let bounds = Aabb::around_feet(body.position(), self.physics.body_half_extents);
        let moved = sweep(world, bounds, requested);
        let position = body.position() + moved.motion;
        let velocity = moved.clamp_velocity(velocity);
        let grounded = moved.landed(requested);

        let prior = (body.position(), body.velocity(), body.grounded());
        let Some(entity) = world.entity_mut(id) else { return };
        if prior.0 != position {
            entity.body.set_position(position);
        }
        if prior.1 != velocity {
            entity.body.set_velocity(velocity);
        }
        if prior.2 != grounded {
            entity.body.set_grounded(grounded);
        }
    }

    /// Mode toggle and break/build along the look ray.
    fn tick_player_actions(&self, world: &mut WorldState, id: EntityId) {
        let Some(entity) = world.entity(id) else { return };
        let Some(player) = entity.as_player() else { return };
        let input = player.input();
        let mut mode = player.mode();
        let selected = player.selected();
        let feet = entity.body.position();
        let eye = feet + Vec3::new(0.0, self.physics.eye_height, 0.0);
        let look = Vec3::from_yaw_pitch(entity.body.rotation().y, player.pitch());

        if input.buttons.contains(InputButtons::TOGGLE_MODE) {
            mode = mode.toggled();
            if let Some(player) = world.entity_mut(id).and_then(|e| e.as_player_mut()) {
                player.set_mode(mode);
            }
        }
        if !input.buttons.contains(InputButtons::ACTION) {
            return;
        }

        let Some((hit, before)) = raycast(world, eye, look, REACH) else {
            return;
        };
        match mode {
            BuildMode::Break => {
                let broken = world.block_at(hit);
                world.set_block(hit, BlockKind::Air);
                self.spawn_debris(world, hit, broken);
                trace!(entity = id, ?hit, ?broken, "block broken");
            }
            BuildMode::Build => {
                let Some(cell) = before else { return };
                let body = Aabb::around_feet(feet, self.physics.body_half_extents);
                if selected == BlockKind::Air
                    || (selected.is_solid() && Aabb::of_block(cell).intersects(&body))
                {
                    return;
                }
                world.set_block(cell, selected);
                trace!(entity = id, ?cell, ?selected, "block placed");
            }
        }
    }

    fn spawn_debris(&self, world: &mut WorldState, pos: BlockPos, block: BlockKind) {
        let centre = pos.corner() + Vec3::new(0.5, 0.5, 0.5);
        for _ in 0..DEBRIS_COUNT {
            let r = world.next_random();
            let velocity = Vec3::new(
                unit(r) * 2.0,
                2.0 + unit(r >> 16).abs() * 2.0,
                unit(r >> 32) * 2.0,
            );
            world.stage_spawn(EntityState::particle(centre, velocity, block, DEBRIS_LIFE_SECS));
        }
    }

    /// Gravity, collision and ageing; stages its own despawn at end of life.
    fn tick_particle(&self, world: &mut WorldState, id: EntityId) {
        let Some(entity) = world.entity(id) else { return };
        let Some(particle) = entity.as_particle() else { return };
        let life = particle.life() - self.dt;

        let mut velocity = entity.body.velocity();
        velocity.y += self.physics.gravity * self.dt;
        let requested = velocity * self.dt;
        let bounds = Aabb::around_feet(entity.body.position(), self.physics.particle_half_extents);
        let moved = sweep(world, bounds, requested);
        let position = entity.body.position() + moved.motion;
        let velocity = moved.clamp_velocity(velocity);
        let grounded = moved.landed(requested);
        let was_grounded = entity.body.grounded();

        let Some(entity) = world.entity_mut(id) else { return };
        entity.body.set_position(position);
        entity.body.set_velocity(velocity);
        if was_grounded != grounded {
            entity.body.set_grounded(grounded);
        }
        if let Some(particle) = entity.as_particle_mut() {
            particle.set_life(life.max(0.0));
        }
        if life <= 0.0 {
            world.stage_despawn(id);
        }
    }

    /// Ticks `total volume / 400` voxels picked by the world RNG.
    fn random_voxel_ticks(&self, world: &mut WorldState) {
        let count = world.total_volume() / RANDOM_TICK_DIVISOR;
        if count == 0 {
            return;
        }
        let coords: Vec<ChunkCoord> = world.chunk_coords();
        for _ in 0..count {
            let r = world.next_random();
            let coord = coords[(r % coords.len() as u64) as usize];
            let index = ((r >> 32) % CHUNK_VOLUME as u64) as u16;
            let pos = coord.block_at_index(index);
            self.tick_voxel(world, pos);
        }
    }

    fn tick_voxel(&self, world: &mut WorldState, pos: BlockPos) {
        match world.block_at(pos) {
            BlockKind::Grass => {
                let r = world.next_random();
                let dx = (r % 3) as i32 - 1;
                let dy = ((r >> 8) % 3) as i32 - 1;
                let dz = ((r >> 16) % 3) as i32 - 1;
                let target = pos.offset(dx, dy, dz);
                if target != pos
                    && world.block_at(target) == BlockKind::Dirt
                    && world.is_lit(target)
                {
                    world.set_block(target, BlockKind::Grass);
                }
            }
            BlockKind::Sapling => {
                if !world.is_lit(pos) || !world.block_at(pos.below()).is_soil() {
                    world.set_block(pos, BlockKind::Air);
                }
            }
            _ => {}
        }
    }
}

/// Maps the low 16 bits of `r` to `[-1, 1]`.
fn unit(r: u64) -> f32 {
    (r & 0xFFFF) as f32 / 32767.5 - 1.0
}

/// First solid voxel along `dir` from `origin` within `reach`, and the last
/// non-solid cell visited before it.
pub fn raycast(
    world: &WorldState,
    origin: Vec3,
    dir: Vec3,
    reach: f32,
) -> Option<(BlockPos, Option<BlockPos>)> {
    let start = origin.block_pos();
    let mut last = start;
    let mut empty = None;
    let steps = (reach / RAY_STEP) as usize;
    for i in 0..=steps {
        let cell = (origin + dir * (i as f32 * RAY_STEP)).block_pos();
        if i > 0 && cell == last {
            continue;
        }
        if world.block_at(cell).is_solid() {
            return Some((cell, empty));
        }
        empty = Some(cell);
        last = cell;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        packet::PacketType,
        state::{ChunkState, Trackable},
    };

    /// Two chunks, stone floor at y = 0 with grass on top at y = 1.
    fn flat_world() -> WorldState {
        let mut world = WorldState::new(42);
        world.insert_chunk(ChunkState::new(ChunkCoord::new(0, 0, 0)));
        world.insert_chunk(ChunkState::new(ChunkCoord::new(1, 0, 0)));
        for x in 0..32 {
            for z in 0..16 {
                world.set_block(BlockPos::new(x, 0, z), BlockKind::Stone);
                world.set_block(BlockPos::new(x, 1, z), BlockKind::Dirt);
            }
        }
        world.set_block(BlockPos::new(3, 1, 3), BlockKind::Grass);
        world.discard();
        world.rebuild_light();
        world
    }

    struct Feed {
        player: EntityId,
        inputs: Vec<PlayerInput>,
    }

    impl TickHooks for Feed {
        fn pre_tick(&mut self, world: &mut WorldState) {
            let input = if self.inputs.is_empty() {
                PlayerInput::neutral()
            } else {
                self.inputs.remove(0)
            };
            if let Some(entity) = world.entity_mut(self.player) {
                apply_input(entity, input);
            }
        }
    }

    fn spawn_player(world: &mut WorldState) -> EntityId {
        let id = world.stage_spawn(EntityState::player(Vec3::new(8.5, 2.0, 8.5)));
        world.register_staged();
        world.discard();
        id
    }

    fn run(world: &mut WorldState, player: EntityId, inputs: Vec<PlayerInput>) -> Vec<Vec<u8>> {
        let sim = Simulation::new(20);
        let n = inputs.len() + 2;
        let mut hooks = Feed { player, inputs };
        (0..n)
            .map(|_| {
                let mut out = Packet::new(PacketType::WorldChange);
                sim.tick(world, &mut hooks, &mut out, false);
                out.payload().to_vec()
            })
            .collect()
    }

    fn walking_inputs() -> Vec<PlayerInput> {
        (0..12)
            .map(|i| PlayerInput {
                buttons: if i == 3 { InputButtons::JUMP } else { InputButtons::empty() },
                horizontal: 0.3,
                vertical: 1.0,
                yaw: 0.2 * i as f32,
                ..PlayerInput::neutral()
            })
            .collect()
    }

    #[test]
    fn ticks_are_deterministic() {
        let mut a = flat_world();
        let pa = spawn_player(&mut a);
        let mut b = flat_world();
        let pb = spawn_player(&mut b);

        let da = run(&mut a, pa, walking_inputs());
        let db = run(&mut b, pb, walking_inputs());
        assert_eq!(da, db);
        assert_eq!(a, b);
        assert!(a.rng_position() > 0);
    }

    #[test]
    fn inverse_deltas_unwind_every_tick() {
        let mut world = flat_world();
        let player = spawn_player(&mut world);
        let start = world.clone();

        let sim = Simulation::new(20);
        let mut hooks = Feed {
            player,
            inputs: walking_inputs(),
        };
        let mut undo = Vec::new();
        for _ in 0..10 {
            let mut out = Packet::new(PacketType::WorldChange);
            sim.tick(&mut world, &mut hooks, &mut out, true);
            undo.push(out);
        }
        for mut delta in undo.into_iter().rev() {
            world.apply_delta(&mut delta).unwrap();
        }
        assert_eq!(world, start);
    }

    #[test]
    fn player_lands_and_stays_grounded() {
        let mut world = flat_world();
        let player = spawn_player(&mut world);
        run(&mut world, player, vec![PlayerInput::neutral(); 20]);
        let body = &world.entity(player).unwrap().body;
        assert!(body.grounded());
        assert!((body.position().y - 2.0).abs() < 1e-4);
        assert_eq!(body.velocity().y, 0.0);
    }

    #[test]
    fn breaking_spawns_debris_that_expires() {
        let mut world = flat_world();
        let player = spawn_player(&mut world);
        let down = PlayerInput {
            buttons: InputButtons::ACTION,
            pitch: -1.5,
            ..PlayerInput::neutral()
        };
        let sim = Simulation::new(20);
        let mut hooks = Feed {
            player,
            inputs: vec![down],
        };
        let mut out = Packet::new(PacketType::WorldChange);
        sim.tick(&mut world, &mut hooks, &mut out, false);
        assert_eq!(world.block_at(BlockPos::new(8, 1, 8)), BlockKind::Air);

        let mut out = Packet::new(PacketType::WorldChange);
        sim.tick(&mut world, &mut hooks, &mut out, false);
        assert_eq!(world.entity_count(), 1 + DEBRIS_COUNT);
        assert!(world
            .entity_ids()
            .iter()
            .any(|id| world.kind_of(*id) == EntityKind::Particle));

        for _ in 0..30 {
            let mut out = Packet::new(PacketType::WorldChange);
            sim.tick(&mut world, &mut hooks, &mut out, false);
        }
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    fn toggle_then_build_places_selected_block() {
        let mut world = flat_world();
        let player = spawn_player(&mut world);
        let look_down = PlayerInput {
            pitch: -0.9,
            selected: BlockKind::Glass,
            ..PlayerInput::neutral()
        };
        let inputs = vec![
            look_down,
            PlayerInput {
                buttons: InputButtons::TOGGLE_MODE,
                ..look_down
            },
            PlayerInput {
                buttons: InputButtons::ACTION,
                ..look_down
            },
        ];
        run(&mut world, player, inputs);
        let entity = world.entity(player).unwrap();
        assert_eq!(entity.as_player().unwrap().mode(), BuildMode::Build);
        assert_eq!(entity.as_player().unwrap().selected(), BlockKind::Glass);
        let placed = (0..32)
            .flat_map(|x| (0..16).map(move |z| BlockPos::new(x, 2, z)))
            .filter(|p| world.block_at(*p) == BlockKind::Glass)
            .count();
        assert_eq!(placed, 1);
    }

    #[test]
    fn sapling_without_light_dies() {
        let mut world = flat_world();
        world.set_block(BlockPos::new(5, 2, 5), BlockKind::Sapling);
        world.set_block(BlockPos::new(5, 6, 5), BlockKind::Stone);
        world.discard();
        Simulation::new(20).tick_voxel(&mut world, BlockPos::new(5, 2, 5));
        assert_eq!(world.block_at(BlockPos::new(5, 2, 5)), BlockKind::Air);
        assert!(world.chunk(ChunkCoord::new(0, 0, 0)).unwrap().is_dirty());
    }

    #[test]
    fn apply_input_ignores_non_players() {
        let mut entity = EntityState::living(Vec3::ZERO);
        apply_input(&mut entity, walking_inputs()[3]);
        assert!(!entity.is_dirty());
        assert!(!entity.body.is_dirty());
    }
}

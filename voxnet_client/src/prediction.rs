//! Client-side prediction and rollback reconciliation.
//!
//! The predictor runs the same [`Simulation`] as the authority, one tick per
//! local tick, storing each tick's inverse delta in a tick-indexed ring. When
//! the authority's delta for tick `T` arrives, every predicted tick from the
//! newest down to `T` is undone, the authoritative delta is applied on top of
//! the confirmed end of `T - 1`, and the still-unacknowledged inputs are
//! replayed up to the present tick.
//!
//! A missing ring slot or a truncated delta is a desync: the predicted world
//! is abandoned and the driver waits for a fresh snapshot.

use std::collections::VecDeque;

use tracing::{debug, trace, warn};
use voxnet_shared::{
    engine::{apply_input, Simulation, TickHooks},
    error::{Error, Result},
    history::DeltaHistory,
    input::{PlayerInput, TaggedInput},
    packet::{Packet, PacketType},
    protocol::{ChangeHeader, SnapshotHeader},
    state::{ColumnCoord, EntityId, Staging, TickChanges, WorldState},
};

/// Where the driver is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No usable world; waiting for a snapshot.
    AwaitingSnapshot,
    /// Running ahead of the authority.
    Predicting,
    /// Rolling back and replaying; only observable from inside `reconcile`.
    Reconciling,
}

/// Feeds one input to the local player during the pre-tick step.
struct LocalInput {
    player: EntityId,
    input: PlayerInput,
}

impl TickHooks for LocalInput {
    fn pre_tick(&mut self, world: &mut WorldState) {
        if let Some(entity) = world.entity_mut(self.player) {
            apply_input(entity, self.input);
        }
    }
}

/// Prediction/reconciliation driver.
#[derive(Debug)]
pub struct Predictor {
    sim: Simulation,
    world: WorldState,
    player: EntityId,
    phase: Phase,
    /// Inverse deltas, each with the staging the tick left behind.
    history: DeltaHistory<Staging>,
    /// Inputs sent but not yet consumed by the authority, oldest first.
    unacked: VecDeque<TaggedInput>,
    next_input_id: u64,
    /// Newest tick known to match the authority.
    confirmed_tick: u64,
    last_input: PlayerInput,
}

impl Predictor {
    pub fn new(sim: Simulation, history_capacity: usize) -> Self {
        Self {
            sim,
            world: WorldState::new(0),
            player: 0,
            phase: Phase::AwaitingSnapshot,
            history: DeltaHistory::new(history_capacity),
            unacked: VecDeque::new(),
            next_input_id: 1,
            confirmed_tick: 0,
            last_input: PlayerInput::neutral(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// The controlled entity, once a snapshot has named it.
    pub fn player(&self) -> Option<EntityId> {
        (self.phase != Phase::AwaitingSnapshot).then_some(self.player)
    }

    pub fn confirmed_tick(&self) -> u64 {
        self.confirmed_tick
    }

    pub fn unacked_len(&self) -> usize {
        self.unacked.len()
    }

    /// Abandons the predicted world until the next snapshot.
    pub fn desync(&mut self) {
        self.phase = Phase::AwaitingSnapshot;
        self.unacked.clear();
        self.history.clear();
    }

    /// Replaces the world with a `WorldState` packet's snapshot.
    pub fn load_snapshot(&mut self, packet: &mut Packet) -> Result<TickChanges> {
        let header: SnapshotHeader = packet.read()?;
        let world = WorldState::read_snapshot(packet)?;

        self.world = world;
        self.player = header.player;
        self.confirmed_tick = self.world.tick();
        self.history.clear();
        self.unacked.retain(|i| i.input_id > header.input_ack);
        self.phase = Phase::Predicting;
        debug!(tick = self.confirmed_tick, player = self.player, "snapshot loaded");

        Ok(TickChanges {
            tick: self.world.tick(),
            chunks: self.world.chunk_coords().into_iter().collect(),
            lights: self
                .world
                .chunk_coords()
                .into_iter()
                .map(|c| ColumnCoord::new(c.x, c.z))
                .collect(),
            entities: Default::default(),
            entered: self.world.entity_ids().into_iter().collect(),
            left: Default::default(),
        })
    }

    /// Whether another tick can be predicted without evicting a ring slot the
    /// next reconciliation needs.
    pub fn can_predict(&self) -> bool {
        self.phase == Phase::Predicting
            && self.world.tick() + 1 - self.confirmed_tick < self.history.capacity() as u64
    }

    /// Predicts one tick with `input`. Returns the tagged input to send and
    /// the tick's changes, or `None` while waiting for a snapshot or when
    /// too far ahead of the authority.
    pub fn predict(&mut self, input: PlayerInput) -> Option<(TaggedInput, TickChanges)> {
        if !self.can_predict() {
            return None;
        }
        let tagged = TaggedInput {
            input_id: self.next_input_id,
            input,
        };
        self.next_input_id += 1;
        self.unacked.push_back(tagged);
        self.last_input = input;

        let tick = self.world.tick() + 1;
        let changes = self.simulate(tick);
        Some((tagged, changes))
    }

    /// Input the authority is expected to apply at `tick`: the unacknowledged
    /// inputs queue up one per tick after the confirmed tick.
    fn input_for(&self, tick: u64) -> PlayerInput {
        let index = (tick - self.confirmed_tick - 1) as usize;
        self.unacked
            .get(index)
            .map(|t| t.input)
            .unwrap_or_else(|| self.last_input.idle())
    }

    fn simulate(&mut self, tick: u64) -> TickChanges {
        let mut hooks = LocalInput {
            player: self.player,
            input: self.input_for(tick),
        };
        let mut undo = Packet::new(PacketType::WorldChange);
        let changes = self.sim.tick(&mut self.world, &mut hooks, &mut undo, true);
        self.history
            .store_with(tick, &undo, self.world.staging().clone());
        changes
    }

    /// Reconciles against an authoritative `WorldChange` packet. Returns the
    /// net changes to show. Any error leaves the driver in
    /// [`Phase::AwaitingSnapshot`].
    pub fn reconcile(&mut self, packet: &mut Packet) -> Result<TickChanges> {
        if self.phase == Phase::AwaitingSnapshot {
            return Ok(TickChanges::default());
        }
        let header: ChangeHeader = packet.read()?;
        if header.tick <= self.confirmed_tick {
            trace!(tick = header.tick, "stale authoritative delta");
            return Ok(TickChanges::default());
        }

        self.phase = Phase::Reconciling;
        let result = self.rollback_and_replay(header, packet);
        match &result {
            Ok(_) => self.phase = Phase::Predicting,
            // A partially applied delta leaves nothing to predict from.
            Err(e) => {
                warn!(tick = header.tick, error = %e, class = ?e.class(), "desync; awaiting snapshot");
                self.desync();
            }
        }
        result
    }

    fn rollback_and_replay(
        &mut self,
        header: ChangeHeader,
        packet: &mut Packet,
    ) -> Result<TickChanges> {
        let target = header.tick;
        let current = self.world.tick();
        if target > current + 1 {
            // The authority skipped a tick we never saw.
            return Err(Error::HistoryEvicted {
                tick: current + 1,
                capacity: self.history.capacity(),
            });
        }

        // Every slot must be resident before anything is touched.
        let mut undo = Vec::new();
        for tick in (target..=current).rev() {
            undo.push(self.history.get(tick, PacketType::WorldChange)?);
        }

        // Spawns queued by the predicted `target` survive the rollback.
        let staged = if target <= current {
            self.history.extra(target)?.clone()
        } else {
            self.world.staging().clone()
        };

        let mut net = TickChanges::default();
        for mut delta in undo {
            net.merge(self.world.apply_delta(&mut delta)?);
        }
        net.merge(self.world.apply_delta(packet)?);
        self.world.restore_staging(staged);

        self.unacked.retain(|i| i.input_id > header.input_ack);
        self.confirmed_tick = target;

        for tick in target + 1..=current {
            net.merge(self.simulate(tick));
        }
        trace!(
            confirmed = target,
            replayed = current.saturating_sub(target),
            pending = self.unacked.len(),
            "reconciled"
        );
        Ok(net)
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;
    use voxnet_shared::{
        block::BlockKind,
        input::InputButtons,
        math::{BlockPos, Vec3},
        state::{ChunkCoord, ChunkState, EntityState},
    };

    const HZ: u32 = 20;

    /// Authority-side fixture: world with a floor and one player.
    fn authority() -> (WorldState, EntityId) {
        let mut world = WorldState::new(11);
        world.insert_chunk(ChunkState::new(ChunkCoord::new(0, 0, 0)));
        for x in 0..16 {
            for z in 0..16 {
                world.set_block(BlockPos::new(x, 0, z), BlockKind::Stone);
            }
        }
        world.discard();
        world.rebuild_light();
        let id = world.stage_spawn(EntityState::player(Vec3::new(8.5, 1.0, 8.5)));
        world.register_staged();
        world.discard();
        (world, id)
    }

    fn snapshot(world: &WorldState, player: EntityId, ack: u64) -> Packet {
        let mut p = Packet::new(PacketType::WorldState);
        p.write(SnapshotHeader {
            player,
            input_ack: ack,
        });
        world.write_snapshot(&mut p);
        p.reset_read();
        p
    }

    /// Runs one authoritative tick feeding `input` and returns the packet the
    /// client would receive.
    fn authority_tick(
        world: &mut WorldState,
        player: EntityId,
        input: PlayerInput,
        ack: u64,
    ) -> Packet {
        let mut delta = Packet::new(PacketType::WorldChange);
        let mut hooks = LocalInput { player, input };
        Simulation::new(HZ).tick(world, &mut hooks, &mut delta, false);

        let mut p = Packet::new(PacketType::WorldChange);
        let tick = world.tick();
        p.write(ChangeHeader {
            tick,
            input_ack: ack,
        });
        p.write_all(delta.payload());
        p
    }

    fn synced() -> (Predictor, WorldState, EntityId) {
        let (world, player) = authority();
        let mut predictor = Predictor::new(Simulation::new(HZ), 16);
        predictor.load_snapshot(&mut snapshot(&world, player, 0)).unwrap();
        (predictor, world, player)
    }

    #[test]
    fn idle_prediction_converges_without_change() {
        let (mut predictor, mut server, player) = synced();
        for _ in 0..3 {
            predictor.predict(PlayerInput::neutral()).unwrap();
        }
        let predicted = predictor.world().clone();

        for tick_ack in 1..=3 {
            let mut p = authority_tick(&mut server, player, PlayerInput::neutral(), tick_ack);
            predictor.reconcile(&mut p).unwrap();
        }
        assert_eq!(predictor.world(), &predicted);
        assert_eq!(predictor.world(), &server);
        assert_eq!(predictor.phase(), Phase::Predicting);
        assert_eq!(predictor.unacked_len(), 0);
    }

    #[test]
    fn misprediction_is_corrected_and_replayed() {
        let (mut predictor, mut server, player) = synced();
        let walk = PlayerInput {
            vertical: 1.0,
            ..PlayerInput::neutral()
        };
        predictor.predict(walk).unwrap();
        predictor.predict(walk).unwrap();
        predictor.predict(walk).unwrap();

        // The authority never got input 1 in time and ran tick 1 idle.
        let mut p = authority_tick(&mut server, player, PlayerInput::neutral(), 0);
        predictor.reconcile(&mut p).unwrap();
        assert_eq!(predictor.confirmed_tick(), 1);
        assert_eq!(predictor.unacked_len(), 3);
        assert_eq!(predictor.world().tick(), 3);

        // Ticks 2 and 3 consume inputs 1 and 2, as the replay assumed.
        for ack in 1..=2 {
            let mut p = authority_tick(&mut server, player, walk, ack);
            predictor.reconcile(&mut p).unwrap();
        }
        assert_eq!(predictor.world(), &server);
        assert_eq!(predictor.unacked_len(), 1);
    }

    #[test]
    fn agreeing_authority_keeps_predicted_debris() {
        let (mut predictor, mut server, player) = synced();
        let look_down = PlayerInput {
            pitch: -FRAC_PI_2,
            ..PlayerInput::neutral()
        };
        let dig = PlayerInput {
            buttons: InputButtons::ACTION,
            ..look_down
        };
        predictor.predict(dig).unwrap();
        predictor.predict(look_down).unwrap();
        predictor.predict(look_down).unwrap();
        let predicted = predictor.world().clone();
        assert_eq!(predicted.block_at(BlockPos::new(8, 0, 8)), BlockKind::Air);
        assert!(predicted.entity_count() > 1, "debris registered on tick 2");

        // Debris staged on tick 1 joins the world on tick 2, after the
        // authority's tick 1 delta.
        let mut p = authority_tick(&mut server, player, dig, 1);
        predictor.reconcile(&mut p).unwrap();
        assert_eq!(predictor.world(), &predicted);

        for ack in 2..=3 {
            let mut p = authority_tick(&mut server, player, look_down, ack);
            predictor.reconcile(&mut p).unwrap();
        }
        assert_eq!(predictor.world(), &server);
        assert_eq!(predictor.world(), &predicted);
    }

    #[test]
    fn evicted_slot_is_a_desync() {
        let (world, player) = authority();
        let mut predictor = Predictor::new(Simulation::new(HZ), 4);
        predictor.load_snapshot(&mut snapshot(&world, player, 0)).unwrap();
        for _ in 0..3 {
            predictor.predict(PlayerInput::neutral()).unwrap();
        }
        // Three ticks ahead with four slots: the ring is full.
        assert!(predictor.predict(PlayerInput::neutral()).is_none());

        // An authoritative delta for a tick whose slot was never written.
        let mut p = Packet::new(PacketType::WorldChange);
        p.write(ChangeHeader {
            tick: 9,
            input_ack: 0,
        });
        let err = predictor.reconcile(&mut p).unwrap_err();
        assert!(err.is_desync());
        assert_eq!(predictor.phase(), Phase::AwaitingSnapshot);
        assert!(predictor.predict(PlayerInput::neutral()).is_none());
    }

    #[test]
    fn truncated_delta_is_a_desync() {
        let (mut predictor, _server, _player) = synced();
        predictor.predict(PlayerInput::neutral()).unwrap();
        let mut p = Packet::new(PacketType::WorldChange);
        p.write(ChangeHeader {
            tick: 1,
            input_ack: 0,
        });
        p.write(1u8); // one clock field, then nothing
        let err = predictor.reconcile(&mut p).unwrap_err();
        assert!(err.is_desync());
        assert_eq!(predictor.phase(), Phase::AwaitingSnapshot);
    }

    #[test]
    fn authority_ahead_of_prediction_applies_directly() {
        let (mut predictor, mut server, player) = synced();
        let mut p = authority_tick(&mut server, player, PlayerInput::neutral(), 0);
        predictor.reconcile(&mut p).unwrap();
        assert_eq!(predictor.world(), &server);

        // Duplicates are ignored.
        let mut again = authority_tick(&mut server.clone(), player, PlayerInput::neutral(), 0);
        let mut stale = Packet::new(PacketType::WorldChange);
        stale.write(ChangeHeader {
            tick: 1,
            input_ack: 0,
        });
        assert!(predictor.reconcile(&mut stale).unwrap().is_empty());
        predictor.reconcile(&mut again).unwrap();
        assert_eq!(predictor.world().tick(), 2);
    }

    #[test]
    fn snapshot_then_jump_prediction_matches_authority() {
        let (mut predictor, mut server, player) = synced();
        // Let the player settle on the floor first.
        for ack in 0..2 {
            predictor.predict(PlayerInput::neutral()).unwrap();
            let mut p = authority_tick(&mut server, player, PlayerInput::neutral(), ack + 1);
            predictor.reconcile(&mut p).unwrap();
        }
        let jump = PlayerInput {
            buttons: InputButtons::JUMP,
            ..PlayerInput::neutral()
        };
        predictor.predict(jump).unwrap();
        let mut p = authority_tick(&mut server, player, jump, 3);
        let changes = predictor.reconcile(&mut p).unwrap();
        assert!(changes.entities.contains(&player));
        assert_eq!(predictor.world(), &server);
        let y = predictor.world().entity(player).unwrap().body.position().y;
        assert!(y > 1.0);
    }
}

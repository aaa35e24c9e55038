//! Interpolation.
//!
//! The simulation advances in discrete ticks. The client renders at its own
//! rate and interpolates entity positions between the last two ticks. This
//! buffer only reads world state.

use std::collections::BTreeMap;

use voxnet_shared::{
    math::Vec3,
    state::{EntityId, WorldState},
};

/// Entity positions at the previous and the current tick.
#[derive(Debug, Default)]
pub struct InterpBuffer {
    previous: BTreeMap<EntityId, Vec3>,
    current: BTreeMap<EntityId, Vec3>,
    tick: u64,
}

impl InterpBuffer {
    fn positions(world: &WorldState) -> BTreeMap<EntityId, Vec3> {
        world
            .entity_ids()
            .into_iter()
            .filter_map(|id| world.entity(id).map(|e| (id, e.body.position())))
            .collect()
    }

    /// Records the world's positions as the newest tick.
    pub fn capture(&mut self, world: &WorldState) {
        self.previous = std::mem::replace(&mut self.current, Self::positions(world));
        self.tick = world.tick();
    }

    /// Replaces the newest tick's positions after a rollback rewrote it.
    /// The previous tick stays as it was shown.
    pub fn correct(&mut self, world: &WorldState) {
        self.current = Self::positions(world);
        self.tick = world.tick();
    }

    /// Forgets history, e.g. after a snapshot jump.
    pub fn reset(&mut self, world: &WorldState) {
        self.capture(world);
        self.previous = self.current.clone();
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Position of `entity` at `alpha` in [0, 1] between the previous (0)
    /// and current (1) tick. Entities new this tick sit at their current
    /// position.
    pub fn interp_entity(&self, entity: EntityId, alpha: f32) -> Option<Vec3> {
        let b = *self.current.get(&entity)?;
        match self.previous.get(&entity) {
            Some(a) => Some(a.lerp(b, alpha)),
            None => Some(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxnet_shared::state::EntityState;

    #[test]
    fn interpolates_between_captures() {
        let mut world = WorldState::new(0);
        let id = world.stage_spawn(EntityState::generic(Vec3::ZERO));
        world.register_staged();

        let mut buf = InterpBuffer::default();
        buf.capture(&world);
        assert_eq!(buf.interp_entity(id, 0.5), Some(Vec3::ZERO));

        if let Some(e) = world.entity_mut(id) {
            e.body.set_position(Vec3::new(2.0, 0.0, 0.0));
        }
        buf.capture(&world);
        assert_eq!(buf.interp_entity(id, 0.5), Some(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(buf.interp_entity(id + 1, 0.5), None);

        if let Some(e) = world.entity_mut(id) {
            e.body.set_position(Vec3::new(4.0, 0.0, 0.0));
        }
        buf.correct(&world);
        assert_eq!(buf.interp_entity(id, 0.5), Some(Vec3::new(2.0, 0.0, 0.0)));

        if let Some(e) = world.entity_mut(id) {
            e.body.set_position(Vec3::new(2.0, 0.0, 0.0));
        }
        buf.reset(&world);
        assert_eq!(buf.interp_entity(id, 0.0), Some(Vec3::new(2.0, 0.0, 0.0)));
    }
}

//! Change-tracked state.
//!
//! Every replicated value lives in a state object that records, per tick, the
//! value each field held *before* its first mutation. At the end of the tick
//! exactly one of three things consumes that record:
//! - [`Trackable::write_forward`]: emit the current values of touched fields.
//! - [`Trackable::write_inverse`]: emit the recorded prior values.
//! - [`Trackable::discard`]: drop the record without emitting.
//!
//! Both deltas share one layout: a touched-field count followed by
//! `(field id, value)` pairs in ascending id order. Applying a delta assigns
//! fields directly and never records changes.

mod chunk;
mod entity;
mod light;
mod world;

pub use chunk::{ChunkCoord, ChunkState, CHUNK_SIZE, CHUNK_VOLUME};
pub use entity::{
    BodyField, BodyState, BuildMode, EntityId, EntityKind, EntityState, Extension, LivingField,
    LivingState, ParticleField, ParticleState, PlayerField, PlayerState,
};
pub use light::{ColumnCoord, LightChunkState};
pub use world::{ClockField, ClockState, Staging, TickChanges, WorldState};

use std::{collections::BTreeMap, fmt};

use crate::{
    error::Result,
    packet::{Decode, Packet},
};

/// Prior values of the keys touched during the current tick.
///
/// Only the first write of a key per tick is recorded; later writes leave the
/// recorded prior untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet<K: Ord + Copy, V> {
    prior: BTreeMap<K, V>,
}

impl<K: Ord + Copy, V> Default for ChangeSet<K, V> {
    fn default() -> Self {
        Self {
            prior: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Copy, V> ChangeSet<K, V> {
    /// Records `prior` for `key` unless a value is already pending.
    /// Returns whether this was the first write of the tick.
    pub fn record(&mut self, key: K, prior: V) -> bool {
        if self.prior.contains_key(&key) {
            return false;
        }
        self.prior.insert(key, prior);
        true
    }

    pub fn is_dirty(&self) -> bool {
        !self.prior.is_empty()
    }

    pub fn len(&self) -> usize {
        self.prior.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prior.is_empty()
    }

    pub fn prior(&self, key: K) -> Option<&V> {
        self.prior.get(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.prior.iter().map(|(k, v)| (*k, v))
    }

    /// Removes and returns the record, leaving the set clean.
    pub fn take(&mut self) -> BTreeMap<K, V> {
        std::mem::take(&mut self.prior)
    }

    pub fn clear(&mut self) {
        self.prior.clear();
    }
}

/// One field of a trackable block, carrying its value.
pub trait FieldValue: Clone + PartialEq + fmt::Debug {
    /// Stable numeric id within the owning block.
    fn id(&self) -> u8;

    /// Writes the value only; the id is written by the caller.
    fn encode_value(&self, p: &mut Packet);

    /// Reads the value for field `id`.
    fn decode(id: u8, p: &mut Packet) -> Result<Self>;
}

/// A block of tracked fields sharing one field-id space.
pub trait Trackable {
    type Field: FieldValue;

    fn changes(&self) -> &ChangeSet<u8, Self::Field>;
    fn changes_mut(&mut self) -> &mut ChangeSet<u8, Self::Field>;

    /// Current value of the same field as `like`.
    fn current(&self, like: &Self::Field) -> Self::Field;

    /// Current values of every field, in id order.
    fn all_fields(&self) -> Vec<Self::Field>;

    /// Direct assignment that bypasses change tracking.
    fn assign(&mut self, value: Self::Field);

    /// Called by every setter with the value being replaced.
    fn track(&mut self, prior: Self::Field) {
        let id = prior.id();
        self.changes_mut().record(id, prior);
    }

    fn is_dirty(&self) -> bool {
        self.changes().is_dirty()
    }

    fn write_forward(&mut self, p: &mut Packet) {
        let touched = self.changes_mut().take();
        p.write(touched.len() as u8);
        for (id, prior) in &touched {
            p.write(*id);
            self.current(prior).encode_value(p);
        }
    }

    fn write_inverse(&mut self, p: &mut Packet) {
        let touched = self.changes_mut().take();
        p.write(touched.len() as u8);
        for (id, prior) in touched {
            p.write(id);
            prior.encode_value(p);
        }
    }

    fn apply_delta(&mut self, p: &mut Packet) -> Result<()> {
        let count = u8::decode(p)?;
        for _ in 0..count {
            let id = u8::decode(p)?;
            let value = Self::Field::decode(id, p)?;
            self.assign(value);
        }
        Ok(())
    }

    fn discard(&mut self) {
        self.changes_mut().clear();
    }

    /// Every field in delta layout; readable by `apply_delta`.
    fn write_full(&self, p: &mut Packet) {
        let fields = self.all_fields();
        p.write(fields.len() as u8);
        for field in fields {
            p.write(field.id());
            field.encode_value(p);
        }
    }

    /// Restores every touched field to its recorded prior, keeping the record.
    fn rewind(&mut self) {
        let priors: Vec<Self::Field> = self.changes().iter().map(|(_, v)| v.clone()).collect();
        for prior in priors {
            self.assign(prior);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_write_per_tick_wins() {
        let mut set: ChangeSet<u8, i32> = ChangeSet::default();
        assert!(set.record(3, 10));
        assert!(!set.record(3, 20));
        assert_eq!(set.prior(3), Some(&10));
        assert!(set.is_dirty());

        let taken = set.take();
        assert_eq!(taken.len(), 1);
        assert!(!set.is_dirty());
        // New tick: recording is open again.
        assert!(set.record(3, 30));
    }

    #[test]
    fn iteration_is_key_ordered() {
        let mut set: ChangeSet<u16, u8> = ChangeSet::default();
        set.record(9, 0);
        set.record(2, 0);
        set.record(5, 0);
        let keys: Vec<u16> = set.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![2, 5, 9]);
    }
}

//! Tick-indexed delta history.
//!
//! A fixed-capacity ring where tick `t` lives in slot `t % capacity`. Writing
//! tick `t + capacity` silently evicts tick `t`; asking for an evicted tick is
//! a desync, never a stale read.

use bytes::Bytes;

use crate::{
    error::{Error, Result},
    packet::{Packet, PacketType},
};

/// Ring of per-tick deltas, each stored with an `X` the owner needs beside
/// it when replaying.
#[derive(Debug, Clone)]
pub struct DeltaHistory<X = ()> {
    slots: Vec<Option<Slot<X>>>,
}

#[derive(Debug, Clone)]
struct Slot<X> {
    tick: u64,
    payload: Bytes,
    extra: X,
}

impl<X> DeltaHistory<X> {
    /// `capacity` is clamped to at least one slot.
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::new();
        slots.resize_with(capacity.max(1), || None);
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot_of(&self, tick: u64) -> usize {
        (tick % self.slots.len() as u64) as usize
    }

    fn resident(&self, tick: u64) -> Result<&Slot<X>> {
        match &self.slots[self.slot_of(tick)] {
            Some(slot) if slot.tick == tick => Ok(slot),
            _ => Err(Error::HistoryEvicted {
                tick,
                capacity: self.slots.len(),
            }),
        }
    }

    /// Stores the payload of `delta` and `extra` for `tick`, replacing
    /// whatever shared its slot.
    pub fn store_with(&mut self, tick: u64, delta: &Packet, extra: X) {
        let slot = self.slot_of(tick);
        self.slots[slot] = Some(Slot {
            tick,
            payload: Bytes::copy_from_slice(delta.payload()),
            extra,
        });
    }

    /// Whether `tick` is still resident.
    pub fn contains(&self, tick: u64) -> bool {
        self.resident(tick).is_ok()
    }

    /// A fresh readable packet holding the delta for `tick`.
    pub fn get(&self, tick: u64, kind: PacketType) -> Result<Packet> {
        self.resident(tick)
            .map(|slot| Packet::with_payload(kind, &slot.payload))
    }

    /// The value stored beside the delta for `tick`.
    pub fn extra(&self, tick: u64) -> Result<&X> {
        self.resident(tick).map(|slot| &slot.extra)
    }

    /// Oldest and newest resident ticks.
    pub fn tick_range(&self) -> Option<(u64, u64)> {
        let ticks = self.slots.iter().flatten().map(|slot| slot.tick);
        let oldest = ticks.clone().min()?;
        let newest = ticks.max()?;
        Some((oldest, newest))
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }
}

impl DeltaHistory {
    /// Stores the payload of `delta` for `tick`.
    pub fn store(&mut self, tick: u64, delta: &Packet) {
        self.store_with(tick, delta, ());
    }
}

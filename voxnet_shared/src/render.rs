//! Rendering abstraction.
//!
//! This crate intentionally does not depend on a graphics backend. A renderer
//! receives applied changes through [`RenderSink`] and reads everything else
//! through the world's read-only queries (`block_at`, `brightness_at`).

use crate::state::{TickChanges, WorldState};

/// Consumer of applied world changes.
pub trait RenderSink: Send {
    /// Called after every applied tick, rollback or snapshot with what it
    /// touched. `world` is already in its new state.
    fn apply_tick_changes(&mut self, world: &WorldState, changes: &TickChanges);
}

/// A no-op renderer useful for headless runs.
#[derive(Debug, Default)]
pub struct NullRenderer;

impl RenderSink for NullRenderer {
    fn apply_tick_changes(&mut self, _world: &WorldState, _changes: &TickChanges) {}
}

/// Keeps every change summary it was handed. Handy in tests.
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub applied: Vec<TickChanges>,
}

impl RenderSink for RecordingRenderer {
    fn apply_tick_changes(&mut self, _world: &WorldState, changes: &TickChanges) {
        self.applied.push(changes.clone());
    }
}

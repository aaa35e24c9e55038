//! Input handling.
//!
//! In a real client this would integrate with windowing, raw mouse/keyboard
//! and action bindings. This module folds whatever frames were sampled during
//! one tick into the single `PlayerInput` the simulation consumes.

use voxnet_shared::{
    block::BlockKind,
    input::{InputButtons, PlayerInput},
};

/// User input state at a moment in time.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputState {
    pub forward: f32,
    pub right: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub jump: bool,
    /// Action button went down this frame.
    pub action: bool,
    /// Mode toggle went down this frame.
    pub toggle_mode: bool,
    /// Block chosen this frame, if the selection changed.
    pub select: Option<BlockKind>,
}

/// Accumulates frames between ticks.
///
/// Axes and look angles take the latest frame; buttons are OR-ed across every
/// frame so a press shorter than a tick is never lost.
#[derive(Debug, Clone, Default)]
pub struct InputAccumulator {
    latest: InputState,
    buttons: InputButtons,
    selected: BlockKind,
}

impl InputAccumulator {
    pub fn push(&mut self, frame: InputState) {
        self.latest = frame;
        if frame.jump {
            self.buttons |= InputButtons::JUMP;
        }
        if frame.action {
            self.buttons |= InputButtons::ACTION;
        }
        if frame.toggle_mode {
            self.buttons |= InputButtons::TOGGLE_MODE;
        }
        if let Some(kind) = frame.select {
            self.selected = kind;
        }
    }

    /// Produces this tick's input and starts a new tick. Axes and look carry
    /// over; buttons reset.
    pub fn take(&mut self) -> PlayerInput {
        let input = PlayerInput {
            buttons: std::mem::take(&mut self.buttons),
            horizontal: self.latest.right.clamp(-1.0, 1.0),
            vertical: self.latest.forward.clamp(-1.0, 1.0),
            yaw: self.latest.yaw,
            pitch: self.latest.pitch,
            selected: self.selected,
        };
        // Edge-triggered buttons must not repeat on the next tick; a held jump
        // is re-sampled from the next frame.
        self.latest.jump = false;
        self.latest.action = false;
        self.latest.toggle_mode = false;
        input
    }
}

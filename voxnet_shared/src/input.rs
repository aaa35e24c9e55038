//! Per-tick player input.
//!
//! One `PlayerInput` drives one player for one tick. The client produces it by
//! aggregating raw frames; the server consumes one per player per tick.

use crate::{
    block::BlockKind,
    error::Result,
    packet::{Decode, Encode, Packet},
};

bitflags::bitflags! {
    /// Digital inputs held during a tick.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InputButtons: u8 {
        const JUMP = 1 << 0;
        const ACTION = 1 << 1;     // Break or place, depending on mode
        const TOGGLE_MODE = 1 << 2;
    }
}

/// Input snapshot for one tick. `Default` is the neutral/idle input.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerInput {
    pub buttons: InputButtons,
    /// Strafe axis in [-1, 1].
    pub horizontal: f32,
    /// Forward axis in [-1, 1].
    pub vertical: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub selected: BlockKind,
}

impl PlayerInput {
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Same look direction and selection with no movement or buttons.
    pub fn idle(&self) -> Self {
        Self {
            buttons: InputButtons::empty(),
            horizontal: 0.0,
            vertical: 0.0,
            ..*self
        }
    }

    pub fn jumping(&self) -> bool {
        self.buttons.contains(InputButtons::JUMP)
    }
}

impl Encode for PlayerInput {
    fn encode(&self, p: &mut Packet) {
        p.write(self.buttons.bits());
        p.write(self.horizontal);
        p.write(self.vertical);
        p.write(self.yaw);
        p.write(self.pitch);
        p.write(self.selected);
    }
}

impl Decode for PlayerInput {
    fn decode(p: &mut Packet) -> Result<Self> {
        Ok(Self {
            buttons: InputButtons::from_bits_truncate(p.read()?),
            horizontal: p.read()?,
            vertical: p.read()?,
            yaw: p.read()?,
            pitch: p.read()?,
            selected: p.read()?,
        })
    }
}

/// Input tagged with the client tick it was produced for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaggedInput {
    pub input_id: u64,
    pub input: PlayerInput,
}

impl Encode for TaggedInput {
    fn encode(&self, p: &mut Packet) {
        p.write(self.input_id);
        p.write(self.input);
    }
}

impl Decode for TaggedInput {
    fn decode(p: &mut Packet) -> Result<Self> {
        Ok(Self {
            input_id: p.read()?,
            input: p.read()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketType;

    #[test]
    fn tagged_input_survives_the_wire() {
        let tagged = TaggedInput {
            input_id: 42,
            input: PlayerInput {
                buttons: InputButtons::JUMP | InputButtons::ACTION,
                horizontal: -1.0,
                vertical: 0.5,
                yaw: 1.25,
                pitch: -0.3,
                selected: BlockKind::Planks,
            },
        };
        let mut p = Packet::new(PacketType::ClientInput);
        p.write(tagged);
        assert_eq!(p.read::<TaggedInput>().unwrap(), tagged);
    }
}

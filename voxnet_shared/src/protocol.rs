//! Message payloads carried by each packet type.
//!
//! | Type        | Direction | Payload                                        |
//! |-------------|-----------|------------------------------------------------|
//! | PlayerId    | c → s     | player name                                    |
//! | ClientInput | c → s     | [`TaggedInput`]                                |
//! | WorldState  | s → c     | [`SnapshotHeader`], world snapshot             |
//! | WorldChange | s → c     | [`ChangeHeader`], forward world delta          |
//! | SaveWorld   | c → s     | file stem (empty: timestamped name)            |
//! | LoadWorld   | c → s     | file stem                                      |

use crate::{
    error::Result,
    input::TaggedInput,
    packet::{Decode, Encode, Packet, PacketType},
    state::EntityId,
};

/// Prefix of every `WorldChange` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeHeader {
    /// Tick the delta advances the world to.
    pub tick: u64,
    /// Id of the last input from this client consumed at or before `tick`;
    /// 0 when none has been.
    pub input_ack: u64,
}

impl Encode for ChangeHeader {
    fn encode(&self, p: &mut Packet) {
        p.write(self.tick);
        p.write(self.input_ack);
    }
}

impl Decode for ChangeHeader {
    fn decode(p: &mut Packet) -> Result<Self> {
        Ok(Self {
            tick: p.read()?,
            input_ack: p.read()?,
        })
    }
}

/// Prefix of every `WorldState` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    /// Entity the receiving client controls. It may only be registered by a
    /// later delta.
    pub player: EntityId,
    pub input_ack: u64,
}

impl Encode for SnapshotHeader {
    fn encode(&self, p: &mut Packet) {
        p.write(self.player);
        p.write(self.input_ack);
    }
}

impl Decode for SnapshotHeader {
    fn decode(p: &mut Packet) -> Result<Self> {
        Ok(Self {
            player: p.read()?,
            input_ack: p.read()?,
        })
    }
}

pub fn player_id(name: &str) -> Packet {
    let mut p = Packet::new(PacketType::PlayerId);
    p.write(name);
    p
}

pub fn client_input(input: TaggedInput) -> Packet {
    let mut p = Packet::new(PacketType::ClientInput);
    p.write(input);
    p
}

pub fn save_world(stem: &str) -> Packet {
    let mut p = Packet::new(PacketType::SaveWorld);
    p.write(stem);
    p
}

pub fn load_world(stem: &str) -> Packet {
    let mut p = Packet::new(PacketType::LoadWorld);
    p.write(stem);
    p
}

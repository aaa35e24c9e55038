//! Entity state.
//!
//! An entity is a shared body block plus a per-kind extension. Each block owns
//! its own field-id space and its own change record; deltas write the body
//! block first, then extension blocks from the most general to the most
//! specific, each prefixed by its own touched count.

use crate::{
    block::BlockKind,
    error::{Error, Result},
    input::PlayerInput,
    math::Vec3,
    packet::{Decode, Encode, Packet},
};

use super::{ChangeSet, FieldValue, Trackable};

/// Registry slot index.
pub type EntityId = u32;

/// Entity kind. `Empty` marks a free registry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntityKind {
    Empty = 0,
    Generic = 1,
    Living = 2,
    Player = 3,
    Particle = 4,
}

impl EntityKind {
    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            0 => EntityKind::Empty,
            1 => EntityKind::Generic,
            2 => EntityKind::Living,
            3 => EntityKind::Player,
            4 => EntityKind::Particle,
            other => return Err(Error::UnknownEntityKind(other)),
        })
    }
}

impl Encode for EntityKind {
    fn encode(&self, p: &mut Packet) {
        p.write(*self as u8);
    }
}

impl Decode for EntityKind {
    fn decode(p: &mut Packet) -> Result<Self> {
        EntityKind::from_code(p.read()?)
    }
}

/// What a player's action button does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BuildMode {
    #[default]
    Break = 0,
    Build = 1,
}

impl BuildMode {
    pub fn toggled(self) -> Self {
        match self {
            BuildMode::Break => BuildMode::Build,
            BuildMode::Build => BuildMode::Break,
        }
    }
}

impl Encode for BuildMode {
    fn encode(&self, p: &mut Packet) {
        p.write(*self as u8);
    }
}

impl Decode for BuildMode {
    fn decode(p: &mut Packet) -> Result<Self> {
        match u8::decode(p)? {
            0 => Ok(BuildMode::Break),
            1 => Ok(BuildMode::Build),
            other => Err(Error::UnknownField {
                block: "build mode",
                field: other,
            }),
        }
    }
}

// ─── Body ───

#[derive(Debug, Clone, PartialEq)]
pub enum BodyField {
    Position(Vec3),
    Rotation(Vec3),
    Scale(Vec3),
    Velocity(Vec3),
    Grounded(bool),
}

impl FieldValue for BodyField {
    fn id(&self) -> u8 {
        match self {
            BodyField::Position(_) => 0,
            BodyField::Rotation(_) => 1,
            BodyField::Scale(_) => 2,
            BodyField::Velocity(_) => 3,
            BodyField::Grounded(_) => 4,
        }
    }

    fn encode_value(&self, p: &mut Packet) {
        match self {
            BodyField::Position(v)
            | BodyField::Rotation(v)
            | BodyField::Scale(v)
            | BodyField::Velocity(v) => p.write(*v),
            BodyField::Grounded(v) => p.write(*v),
        }
    }

    fn decode(id: u8, p: &mut Packet) -> Result<Self> {
        Ok(match id {
            0 => BodyField::Position(p.read()?),
            1 => BodyField::Rotation(p.read()?),
            2 => BodyField::Scale(p.read()?),
            3 => BodyField::Velocity(p.read()?),
            4 => BodyField::Grounded(p.read()?),
            field => return Err(Error::UnknownField { block: "body", field }),
        })
    }
}

/// Fields shared by every entity kind.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyState {
    position: Vec3,
    rotation: Vec3,
    scale: Vec3,
    velocity: Vec3,
    grounded: bool,
    changes: ChangeSet<u8, BodyField>,
}

impl BodyState {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            velocity: Vec3::ZERO,
            grounded: false,
            changes: ChangeSet::default(),
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn grounded(&self) -> bool {
        self.grounded
    }

    pub fn set_position(&mut self, v: Vec3) {
        self.track(BodyField::Position(self.position));
        self.position = v;
    }

    pub fn set_rotation(&mut self, v: Vec3) {
        self.track(BodyField::Rotation(self.rotation));
        self.rotation = v;
    }

    pub fn set_scale(&mut self, v: Vec3) {
        self.track(BodyField::Scale(self.scale));
        self.scale = v;
    }

    pub fn set_velocity(&mut self, v: Vec3) {
        self.track(BodyField::Velocity(self.velocity));
        self.velocity = v;
    }

    pub fn set_grounded(&mut self, v: bool) {
        self.track(BodyField::Grounded(self.grounded));
        self.grounded = v;
    }
}

impl Trackable for BodyState {
    type Field = BodyField;

    fn changes(&self) -> &ChangeSet<u8, BodyField> {
        &self.changes
    }

    fn changes_mut(&mut self) -> &mut ChangeSet<u8, BodyField> {
        &mut self.changes
    }

    fn current(&self, like: &BodyField) -> BodyField {
        match like {
            BodyField::Position(_) => BodyField::Position(self.position),
            BodyField::Rotation(_) => BodyField::Rotation(self.rotation),
            BodyField::Scale(_) => BodyField::Scale(self.scale),
            BodyField::Velocity(_) => BodyField::Velocity(self.velocity),
            BodyField::Grounded(_) => BodyField::Grounded(self.grounded),
        }
    }

    fn all_fields(&self) -> Vec<BodyField> {
        vec![
            BodyField::Position(self.position),
            BodyField::Rotation(self.rotation),
            BodyField::Scale(self.scale),
            BodyField::Velocity(self.velocity),
            BodyField::Grounded(self.grounded),
        ]
    }

    fn assign(&mut self, value: BodyField) {
        match value {
            BodyField::Position(v) => self.position = v,
            BodyField::Rotation(v) => self.rotation = v,
            BodyField::Scale(v) => self.scale = v,
            BodyField::Velocity(v) => self.velocity = v,
            BodyField::Grounded(v) => self.grounded = v,
        }
    }
}

// ─── Living ───

#[derive(Debug, Clone, PartialEq)]
pub enum LivingField {
    Jump(bool),
    Horizontal(f32),
    Vertical(f32),
}

impl FieldValue for LivingField {
    fn id(&self) -> u8 {
        match self {
            LivingField::Jump(_) => 0,
            LivingField::Horizontal(_) => 1,
            LivingField::Vertical(_) => 2,
        }
    }

    fn encode_value(&self, p: &mut Packet) {
        match self {
            LivingField::Jump(v) => p.write(*v),
            LivingField::Horizontal(v) | LivingField::Vertical(v) => p.write(*v),
        }
    }

    fn decode(id: u8, p: &mut Packet) -> Result<Self> {
        Ok(match id {
            0 => LivingField::Jump(p.read()?),
            1 => LivingField::Horizontal(p.read()?),
            2 => LivingField::Vertical(p.read()?),
            field => {
                return Err(Error::UnknownField {
                    block: "living",
                    field,
                })
            }
        })
    }
}

/// Queued movement input of a living entity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LivingState {
    jump: bool,
    horizontal: f32,
    vertical: f32,
    changes: ChangeSet<u8, LivingField>,
}

impl LivingState {
    pub fn jump(&self) -> bool {
        self.jump
    }

    pub fn horizontal(&self) -> f32 {
        self.horizontal
    }

    pub fn vertical(&self) -> f32 {
        self.vertical
    }

    pub fn set_jump(&mut self, v: bool) {
        self.track(LivingField::Jump(self.jump));
        self.jump = v;
    }

    pub fn set_horizontal(&mut self, v: f32) {
        self.track(LivingField::Horizontal(self.horizontal));
        self.horizontal = v;
    }

    pub fn set_vertical(&mut self, v: f32) {
        self.track(LivingField::Vertical(self.vertical));
        self.vertical = v;
    }
}

impl Trackable for LivingState {
    type Field = LivingField;

    fn changes(&self) -> &ChangeSet<u8, LivingField> {
        &self.changes
    }

    fn changes_mut(&mut self) -> &mut ChangeSet<u8, LivingField> {
        &mut self.changes
    }

    fn current(&self, like: &LivingField) -> LivingField {
        match like {
            LivingField::Jump(_) => LivingField::Jump(self.jump),
            LivingField::Horizontal(_) => LivingField::Horizontal(self.horizontal),
            LivingField::Vertical(_) => LivingField::Vertical(self.vertical),
        }
    }

    fn all_fields(&self) -> Vec<LivingField> {
        vec![
            LivingField::Jump(self.jump),
            LivingField::Horizontal(self.horizontal),
            LivingField::Vertical(self.vertical),
        ]
    }

    fn assign(&mut self, value: LivingField) {
        match value {
            LivingField::Jump(v) => self.jump = v,
            LivingField::Horizontal(v) => self.horizontal = v,
            LivingField::Vertical(v) => self.vertical = v,
        }
    }
}

// ─── Player ───

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerField {
    Pitch(f32),
    Mode(BuildMode),
    Selected(BlockKind),
    Input(PlayerInput),
}

impl FieldValue for PlayerField {
    fn id(&self) -> u8 {
        match self {
            PlayerField::Pitch(_) => 0,
            PlayerField::Mode(_) => 1,
            PlayerField::Selected(_) => 2,
            PlayerField::Input(_) => 3,
        }
    }

    fn encode_value(&self, p: &mut Packet) {
        match self {
            PlayerField::Pitch(v) => p.write(*v),
            PlayerField::Mode(v) => p.write(*v),
            PlayerField::Selected(v) => p.write(*v),
            PlayerField::Input(v) => p.write(*v),
        }
    }

    fn decode(id: u8, p: &mut Packet) -> Result<Self> {
        Ok(match id {
            0 => PlayerField::Pitch(p.read()?),
            1 => PlayerField::Mode(p.read()?),
            2 => PlayerField::Selected(p.read()?),
            3 => PlayerField::Input(p.read()?),
            field => {
                return Err(Error::UnknownField {
                    block: "player",
                    field,
                })
            }
        })
    }
}

/// Player-only fields layered over [`LivingState`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerState {
    pitch: f32,
    mode: BuildMode,
    selected: BlockKind,
    input: PlayerInput,
    changes: ChangeSet<u8, PlayerField>,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            pitch: 0.0,
            mode: BuildMode::Break,
            selected: BlockKind::Planks,
            input: PlayerInput::neutral(),
            changes: ChangeSet::default(),
        }
    }
}

impl PlayerState {
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    pub fn selected(&self) -> BlockKind {
        self.selected
    }

    /// Input applied during the most recent tick.
    pub fn input(&self) -> PlayerInput {
        self.input
    }

    pub fn set_pitch(&mut self, v: f32) {
        self.track(PlayerField::Pitch(self.pitch));
        self.pitch = v;
    }

    pub fn set_mode(&mut self, v: BuildMode) {
        self.track(PlayerField::Mode(self.mode));
        self.mode = v;
    }

    pub fn set_selected(&mut self, v: BlockKind) {
        self.track(PlayerField::Selected(self.selected));
        self.selected = v;
    }

    pub fn set_input(&mut self, v: PlayerInput) {
        self.track(PlayerField::Input(self.input));
        self.input = v;
    }
}

impl Trackable for PlayerState {
    type Field = PlayerField;

    fn changes(&self) -> &ChangeSet<u8, PlayerField> {
        &self.changes
    }

    fn changes_mut(&mut self) -> &mut ChangeSet<u8, PlayerField> {
        &mut self.changes
    }

    fn current(&self, like: &PlayerField) -> PlayerField {
        match like {
            PlayerField::Pitch(_) => PlayerField::Pitch(self.pitch),
            PlayerField::Mode(_) => PlayerField::Mode(self.mode),
            PlayerField::Selected(_) => PlayerField::Selected(self.selected),
            PlayerField::Input(_) => PlayerField::Input(self.input),
        }
    }

    fn all_fields(&self) -> Vec<PlayerField> {
        vec![
            PlayerField::Pitch(self.pitch),
            PlayerField::Mode(self.mode),
            PlayerField::Selected(self.selected),
            PlayerField::Input(self.input),
        ]
    }

    fn assign(&mut self, value: PlayerField) {
        match value {
            PlayerField::Pitch(v) => self.pitch = v,
            PlayerField::Mode(v) => self.mode = v,
            PlayerField::Selected(v) => self.selected = v,
            PlayerField::Input(v) => self.input = v,
        }
    }
}

// ─── Particle ───

#[derive(Debug, Clone, PartialEq)]
pub enum ParticleField {
    Life(f32),
    MaxLife(f32),
    Block(BlockKind),
}

impl FieldValue for ParticleField {
    fn id(&self) -> u8 {
        match self {
            ParticleField::Life(_) => 0,
            ParticleField::MaxLife(_) => 1,
            ParticleField::Block(_) => 2,
        }
    }

    fn encode_value(&self, p: &mut Packet) {
        match self {
            ParticleField::Life(v) | ParticleField::MaxLife(v) => p.write(*v),
            ParticleField::Block(v) => p.write(*v),
        }
    }

    fn decode(id: u8, p: &mut Packet) -> Result<Self> {
        Ok(match id {
            0 => ParticleField::Life(p.read()?),
            1 => ParticleField::MaxLife(p.read()?),
            2 => ParticleField::Block(p.read()?),
            field => {
                return Err(Error::UnknownField {
                    block: "particle",
                    field,
                })
            }
        })
    }
}

/// Short-lived debris.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleState {
    life: f32,
    max_life: f32,
    block: BlockKind,
    changes: ChangeSet<u8, ParticleField>,
}

impl ParticleState {
    pub fn new(block: BlockKind, max_life: f32) -> Self {
        Self {
            life: max_life,
            max_life,
            block,
            changes: ChangeSet::default(),
        }
    }

    pub fn life(&self) -> f32 {
        self.life
    }

    pub fn max_life(&self) -> f32 {
        self.max_life
    }

    pub fn block(&self) -> BlockKind {
        self.block
    }

    pub fn set_life(&mut self, v: f32) {
        self.track(ParticleField::Life(self.life));
        self.life = v;
    }

    pub fn set_block(&mut self, v: BlockKind) {
        self.track(ParticleField::Block(self.block));
        self.block = v;
    }
}

impl Trackable for ParticleState {
    type Field = ParticleField;

    fn changes(&self) -> &ChangeSet<u8, ParticleField> {
        &self.changes
    }

    fn changes_mut(&mut self) -> &mut ChangeSet<u8, ParticleField> {
        &mut self.changes
    }

    fn current(&self, like: &ParticleField) -> ParticleField {
        match like {
            ParticleField::Life(_) => ParticleField::Life(self.life),
            ParticleField::MaxLife(_) => ParticleField::MaxLife(self.max_life),
            ParticleField::Block(_) => ParticleField::Block(self.block),
        }
    }

    fn all_fields(&self) -> Vec<ParticleField> {
        vec![
            ParticleField::Life(self.life),
            ParticleField::MaxLife(self.max_life),
            ParticleField::Block(self.block),
        ]
    }

    fn assign(&mut self, value: ParticleField) {
        match value {
            ParticleField::Life(v) => self.life = v,
            ParticleField::MaxLife(v) => self.max_life = v,
            ParticleField::Block(v) => self.block = v,
        }
    }
}

// ─── Composition ───

/// Per-kind blocks layered over the body.
#[derive(Debug, Clone, PartialEq)]
pub enum Extension {
    Generic,
    Living(LivingState),
    Player(LivingState, PlayerState),
    Particle(ParticleState),
}

/// A complete entity record.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    pub body: BodyState,
    pub ext: Extension,
}

impl EntityState {
    pub fn generic(position: Vec3) -> Self {
        Self {
            body: BodyState::new(position),
            ext: Extension::Generic,
        }
    }

    pub fn living(position: Vec3) -> Self {
        Self {
            body: BodyState::new(position),
            ext: Extension::Living(LivingState::default()),
        }
    }

    pub fn player(position: Vec3) -> Self {
        Self {
            body: BodyState::new(position),
            ext: Extension::Player(LivingState::default(), PlayerState::default()),
        }
    }

    pub fn particle(position: Vec3, velocity: Vec3, block: BlockKind, max_life: f32) -> Self {
        let mut body = BodyState::new(position);
        body.set_velocity(velocity);
        body.set_scale(Vec3::new(0.2, 0.2, 0.2));
        body.discard();
        Self {
            body,
            ext: Extension::Particle(ParticleState::new(block, max_life)),
        }
    }

    /// Default-valued record of `kind`, ready to receive a full field set.
    pub fn blank(kind: EntityKind) -> Result<Self> {
        Ok(match kind {
            EntityKind::Generic => Self::generic(Vec3::ZERO),
            EntityKind::Living => Self::living(Vec3::ZERO),
            EntityKind::Player => Self::player(Vec3::ZERO),
            EntityKind::Particle => Self {
                body: BodyState::new(Vec3::ZERO),
                ext: Extension::Particle(ParticleState::new(BlockKind::Air, 0.0)),
            },
            EntityKind::Empty => return Err(Error::UnknownEntityKind(EntityKind::Empty as u8)),
        })
    }

    pub fn kind(&self) -> EntityKind {
        match self.ext {
            Extension::Generic => EntityKind::Generic,
            Extension::Living(_) => EntityKind::Living,
            Extension::Player(..) => EntityKind::Player,
            Extension::Particle(_) => EntityKind::Particle,
        }
    }

    pub fn as_living(&self) -> Option<&LivingState> {
        match &self.ext {
            Extension::Living(l) | Extension::Player(l, _) => Some(l),
            _ => None,
        }
    }

    pub fn as_living_mut(&mut self) -> Option<&mut LivingState> {
        match &mut self.ext {
            Extension::Living(l) | Extension::Player(l, _) => Some(l),
            _ => None,
        }
    }

    pub fn as_player(&self) -> Option<&PlayerState> {
        match &self.ext {
            Extension::Player(_, p) => Some(p),
            _ => None,
        }
    }

    pub fn as_player_mut(&mut self) -> Option<&mut PlayerState> {
        match &mut self.ext {
            Extension::Player(_, p) => Some(p),
            _ => None,
        }
    }

    pub fn as_particle(&self) -> Option<&ParticleState> {
        match &self.ext {
            Extension::Particle(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_particle_mut(&mut self) -> Option<&mut ParticleState> {
        match &mut self.ext {
            Extension::Particle(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.body.is_dirty()
            || match &self.ext {
                Extension::Generic => false,
                Extension::Living(l) => l.is_dirty(),
                Extension::Player(l, p) => l.is_dirty() || p.is_dirty(),
                Extension::Particle(p) => p.is_dirty(),
            }
    }

    pub fn write_forward(&mut self, p: &mut Packet) {
        self.body.write_forward(p);
        match &mut self.ext {
            Extension::Generic => {}
            Extension::Living(l) => l.write_forward(p),
            Extension::Player(l, pl) => {
                l.write_forward(p);
                pl.write_forward(p);
            }
            Extension::Particle(pt) => pt.write_forward(p),
        }
    }

    pub fn write_inverse(&mut self, p: &mut Packet) {
        self.body.write_inverse(p);
        match &mut self.ext {
            Extension::Generic => {}
            Extension::Living(l) => l.write_inverse(p),
            Extension::Player(l, pl) => {
                l.write_inverse(p);
                pl.write_inverse(p);
            }
            Extension::Particle(pt) => pt.write_inverse(p),
        }
    }

    pub fn apply_delta(&mut self, p: &mut Packet) -> Result<()> {
        self.body.apply_delta(p)?;
        match &mut self.ext {
            Extension::Generic => {}
            Extension::Living(l) => l.apply_delta(p)?,
            Extension::Player(l, pl) => {
                l.apply_delta(p)?;
                pl.apply_delta(p)?;
            }
            Extension::Particle(pt) => pt.apply_delta(p)?,
        }
        Ok(())
    }

    pub fn discard(&mut self) {
        self.body.discard();
        match &mut self.ext {
            Extension::Generic => {}
            Extension::Living(l) => l.discard(),
            Extension::Player(l, pl) => {
                l.discard();
                pl.discard();
            }
            Extension::Particle(pt) => pt.discard(),
        }
    }

    /// Every block with every field, in delta layout.
    pub fn write_full(&self, p: &mut Packet) {
        self.body.write_full(p);
        match &self.ext {
            Extension::Generic => {}
            Extension::Living(l) => l.write_full(p),
            Extension::Player(l, pl) => {
                l.write_full(p);
                pl.write_full(p);
            }
            Extension::Particle(pt) => pt.write_full(p),
        }
    }

    /// Reads a record written by [`EntityState::write_full`].
    pub fn read_full(kind: EntityKind, p: &mut Packet) -> Result<Self> {
        let mut entity = Self::blank(kind)?;
        entity.apply_delta(p)?;
        Ok(entity)
    }

    /// Restores the start-of-tick values of every touched field.
    pub fn rewind(&mut self) {
        self.body.rewind();
        match &mut self.ext {
            Extension::Generic => {}
            Extension::Living(l) => l.rewind(),
            Extension::Player(l, pl) => {
                l.rewind();
                pl.rewind();
            }
            Extension::Particle(pt) => pt.rewind(),
        }
    }
}

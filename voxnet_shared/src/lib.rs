//! `voxnet_shared`
//!
//! Shared libraries used by both client and server.
//!
//! Design goals:
//! - Deterministic: the same world and inputs always produce the same bytes.
//! - Every replicated mutation is change-tracked and replayable both ways.
//! - Explicit world handles; no global state.
//! - No `unsafe`.

pub mod block;
pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod input;
pub mod math;
pub mod net;
pub mod packet;
pub mod physics;
pub mod protocol;
pub mod render;
pub mod state;

pub use error::{Error, FaultClass, Result};

pub mod prelude {
    //! Commonly used exports.

    pub use crate::block::*;
    pub use crate::config::*;
    pub use crate::engine::*;
    pub use crate::error::{Error, FaultClass};
    pub use crate::history::*;
    pub use crate::input::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::packet::*;
    pub use crate::render::*;
    pub use crate::state::*;
}

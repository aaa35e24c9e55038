//! `voxnet_client`
//!
//! Client-side systems:
//! - Connection to the authoritative server
//! - Input aggregation into one command per tick
//! - Prediction and rollback reconciliation
//! - Interpolation of entity positions between ticks
//! - Rendering abstraction wiring

pub mod client;
pub mod input;
pub mod interp;
pub mod prediction;

pub use client::GameClient;
pub use prediction::{Phase, Predictor};

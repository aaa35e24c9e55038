//! `voxnet_server`
//!
//! Server-side systems:
//! - Fixed timestep authoritative simulation
//! - Player claiming and per-tick input consumption
//! - Per-client delta streaming with snapshot fallback
//! - World save/load
//! - Flat world generation
//!
//! Networking model: one reliable ordered connection per client carrying
//! framed packets both ways.

pub mod server;
pub mod worldgen;

pub use server::GameServer;

//! Configuration system.
//!
//! Loads engine configuration from JSON strings or files. Every field has a
//! serde default, so a partial file only overrides what it names.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Root configuration shared by client/server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Server listen address, e.g. `127.0.0.1:40000`.
    pub server_addr: String,
    /// Fixed simulation tick rate.
    pub tick_hz: u32,
    /// Player name (client only).
    pub player_name: String,
    /// Seed for world generation and the world RNG (server only).
    pub world_seed: u64,
    /// Slots in each tick-indexed delta ring.
    pub history_capacity: usize,
    /// Most deltas streamed to one client per tick.
    pub max_catchup_ticks: usize,
    /// Largest frame payload accepted from a peer.
    pub max_payload_bytes: u32,
    /// Where `SaveWorld`/`LoadWorld` read and write snapshots.
    pub save_dir: String,
    /// Chunks per horizontal axis of a generated world.
    pub world_size: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:40000".to_string(),
            tick_hz: 20,
            player_name: "Player".to_string(),
            world_seed: 0x5EED,
            history_capacity: 64,
            max_catchup_ticks: 32,
            max_payload_bytes: 4 * 1024 * 1024,
            save_dir: "saves".to_string(),
            world_size: 4,
        }
    }
}

impl EngineConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = EngineConfig::from_json_str(r#"{ "tick_hz": 30, "world_seed": 7 }"#).unwrap();
        assert_eq!(cfg.tick_hz, 30);
        assert_eq!(cfg.world_seed, 7);
        assert_eq!(cfg.history_capacity, 64);
        assert_eq!(cfg.max_catchup_ticks, 32);
        assert_eq!(cfg.save_dir, "saves");
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(EngineConfig::from_json_str(r#"{ "tick_hz": "fast" }"#).is_err());
    }
}

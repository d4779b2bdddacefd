//! Configuration system.
//!
//! Loads realm configuration from JSON strings/files (file IO left to app).

use serde::{Deserialize, Serialize};

/// Root configuration shared by client/server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealmConfig {
    /// Server listen address, e.g. `127.0.0.1:40000`.
    pub server_addr: String,
    /// Fixed simulation tick rate.
    pub tick_hz: u32,
    /// Mob AI advances once every this many server ticks.
    #[serde(default = "default_mob_tick_divisor")]
    pub mob_tick_divisor: u32,
    /// World generation seed.
    #[serde(default = "default_world_seed")]
    pub world_seed: u64,
    /// Seconds before a mined tile is restored. Observed deployments have
    /// used both 60 and 180; settable until that is decided.
    #[serde(default = "default_tile_respawn_secs")]
    pub tile_respawn_secs: f32,
    /// Maximum mining reach, in tiles.
    #[serde(default = "default_mine_radius")]
    pub mine_radius: f32,
    /// Directory for persisted state (`users.json`, chat transcript).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Seconds between dirty-store flushes.
    #[serde(default = "default_flush_secs")]
    pub flush_secs: f32,
    /// Player name (client only).
    #[serde(default = "default_player_name")]
    pub player_name: String,
}

fn default_mob_tick_divisor() -> u32 {
    10
}

fn default_world_seed() -> u64 {
    1848
}

fn default_tile_respawn_secs() -> f32 {
    60.0
}

fn default_mine_radius() -> f32 {
    10.0
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_flush_secs() -> f32 {
    5.0
}

fn default_player_name() -> String {
    "Stranger".to_string()
}

impl Default for RealmConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:40000".to_string(),
            tick_hz: 20,
            mob_tick_divisor: default_mob_tick_divisor(),
            world_seed: default_world_seed(),
            tile_respawn_secs: default_tile_respawn_secs(),
            mine_radius: default_mine_radius(),
            data_dir: default_data_dir(),
            flush_secs: default_flush_secs(),
            player_name: default_player_name(),
        }
    }
}

impl RealmConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Tile respawn delay expressed in server ticks.
    pub fn tile_respawn_ticks(&self) -> u64 {
        (self.tile_respawn_secs * self.tick_hz as f32).ceil() as u64
    }

    /// Flush interval expressed in server ticks.
    pub fn flush_ticks(&self) -> u64 {
        (self.flush_secs * self.tick_hz as f32).ceil().max(1.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let cfg = RealmConfig::from_json_str(
            r#"{"server_addr":"127.0.0.1:1234","tick_hz":20}"#,
        )
        .unwrap();
        assert_eq!(cfg.tile_respawn_secs, 60.0);
        assert_eq!(cfg.mine_radius, 10.0);
    }

    #[test]
    fn respawn_ticks_scale_with_rate() {
        let cfg = RealmConfig {
            tick_hz: 20,
            tile_respawn_secs: 60.0,
            ..Default::default()
        };
        assert_eq!(cfg.tile_respawn_ticks(), 1200);
    }
}

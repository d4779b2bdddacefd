//! Player model.
//!
//! Two shapes of the same player:
//! - [`PlayerRecord`] is the persistent per-username document, owned by the
//!   user store; it survives disconnects.
//! - [`LiveSession`] is the transient mirror held while a connection is
//!   bound to a record, plus session-only state (HP, chat channel).

use serde::{Deserialize, Serialize};

use crate::chat::GLOBAL_CHANNEL;
use crate::math::Vec2;
use crate::net::{PlayerState, SessionId};
use crate::tiles;

/// Default spawn for fresh records.
pub const SPAWN_X: f32 = 200.0;
pub const SPAWN_Y: f32 = 200.0;
pub const SPAWN_LEVEL: &str = "town";

/// Starting (and respawn) health for a live session.
pub const BASE_HP: i32 = 100;

/// Unarmed attack stat.
pub const BASE_ATTACK: i32 = 3;

/// What a player holds in each hand.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Equipment {
    pub left_hand: Option<String>,
    pub right_hand: Option<String>,
}

/// Persistent per-username document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerRecord {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub level: String,
    pub glyph: char,
    #[serde(default)]
    pub inventory: Vec<String>,
    #[serde(default)]
    pub friends: Vec<String>,
    #[serde(default)]
    pub bank_gold: i64,
    #[serde(default)]
    pub equipment: Equipment,
}

impl PlayerRecord {
    /// The document created on first login for an unknown name.
    pub fn fresh(name: &str) -> Self {
        Self {
            name: name.to_string(),
            x: SPAWN_X,
            y: SPAWN_Y,
            level: SPAWN_LEVEL.to_string(),
            glyph: tiles::PLAYER,
            inventory: Vec::new(),
            friends: Vec::new(),
            bank_gold: 0,
            equipment: Equipment::default(),
        }
    }
}

/// Transient state for one bound connection.
#[derive(Debug, Clone)]
pub struct LiveSession {
    pub id: SessionId,
    pub record: PlayerRecord,
    pub hp: i32,
    pub chat_channel: String,
}

impl LiveSession {
    pub fn bind(id: SessionId, record: PlayerRecord) -> Self {
        Self {
            id,
            record,
            hp: BASE_HP,
            chat_channel: GLOBAL_CHANNEL.to_string(),
        }
    }

    pub fn pos(&self) -> Vec2 {
        Vec2::new(self.record.x, self.record.y)
    }

    /// Wire view for `Init` and `PlayerUpdate`.
    pub fn wire_state(&self) -> PlayerState {
        PlayerState {
            id: self.id,
            name: self.record.name.clone(),
            x: self.record.x,
            y: self.record.y,
            level: self.record.level.clone(),
            glyph: self.record.glyph,
            inventory: self.record.inventory.clone(),
        }
    }

    /// Defense stat from worn equipment.
    pub fn defense(&self) -> i32 {
        item_defense(self.record.equipment.left_hand.as_deref())
            + item_defense(self.record.equipment.right_hand.as_deref())
    }

    /// Attack stat from held equipment.
    pub fn attack(&self) -> i32 {
        BASE_ATTACK
            + item_attack(self.record.equipment.left_hand.as_deref())
            + item_attack(self.record.equipment.right_hand.as_deref())
    }
}

fn item_defense(item: Option<&str>) -> i32 {
    match item {
        Some("shield") => 2,
        Some("armor") => 3,
        _ => 0,
    }
}

fn item_attack(item: Option<&str>) -> i32 {
    match item {
        Some("sword") => 4,
        Some("pickaxe") => 1,
        _ => 0,
    }
}

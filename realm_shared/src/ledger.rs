//! World-change ledger.
//!
//! Tracks temporary terrain edits (mined tiles) keyed by `"level:x,y"`, each
//! with a restore deadline measured in server ticks. At most one pending
//! change exists per key; a second mutation on the same key replaces the
//! entry and its deadline. The sweep only restores keys that still exist at
//! expiry, so a replaced timer can never resurrect an already-restored tile.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::tiles::Tile;

/// A temporary mutation of static terrain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorldChange {
    pub x: i32,
    pub y: i32,
    pub level: String,
    pub glyph: char,
    pub color: char,
}

impl WorldChange {
    /// A mined-out hole at the given tile.
    pub fn hole(level: &str, x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            level: level.to_string(),
            glyph: Tile::VOID.glyph,
            color: Tile::VOID.color,
        }
    }

    /// Ledger key, `"level:x,y"`.
    pub fn key(&self) -> String {
        change_key(&self.level, self.x, self.y)
    }
}

pub fn change_key(level: &str, x: i32, y: i32) -> String {
    format!("{}:{},{}", level, x, y)
}

/// Pending ledger entry.
#[derive(Debug, Clone)]
struct Pending {
    change: WorldChange,
    restore_at_tick: u64,
}

/// The ledger: all pending terrain changes with their restore deadlines.
#[derive(Default)]
pub struct ChangeLedger {
    entries: HashMap<String, Pending>,
}

impl ChangeLedger {
    /// Records a change, replacing any existing entry (and timer) for the key.
    pub fn apply(&mut self, change: WorldChange, now_tick: u64, ttl_ticks: u64) {
        let key = change.key();
        self.entries.insert(
            key,
            Pending {
                change,
                restore_at_tick: now_tick.saturating_add(ttl_ticks),
            },
        );
    }

    /// Whether a change is pending for the key.
    pub fn contains(&self, level: &str, x: i32, y: i32) -> bool {
        self.entries.contains_key(&change_key(level, x, y))
    }

    /// Removes and returns every entry whose deadline has passed.
    ///
    /// Entries replaced since scheduling simply carry the newer deadline, so
    /// they are not returned here until that deadline passes.
    pub fn sweep_expired(&mut self, now_tick: u64) -> Vec<WorldChange> {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, p)| p.restore_at_tick <= now_tick)
            .map(|(k, _)| k.clone())
            .collect();

        let mut restored = Vec::with_capacity(expired.len());
        for key in expired {
            if let Some(p) = self.entries.remove(&key) {
                restored.push(p.change);
            }
        }
        restored.sort_by(|a, b| a.key().cmp(&b.key()));
        restored
    }

    /// Full snapshot for login payloads.
    pub fn snapshot(&self) -> Vec<WorldChange> {
        let mut changes: Vec<WorldChange> =
            self.entries.values().map(|p| p.change.clone()).collect();
        changes.sort_by(|a, b| a.key().cmp(&b.key()));
        changes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_format() {
        assert_eq!(change_key("town", 10, -3), "town:10,-3");
    }

    #[test]
    fn sweep_restores_only_after_deadline() {
        let mut ledger = ChangeLedger::default();
        ledger.apply(WorldChange::hole("town", 10, 10), 0, 100);

        assert!(ledger.sweep_expired(99).is_empty());
        let restored = ledger.sweep_expired(100);
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].x, 10);
        assert!(ledger.is_empty());
    }

    #[test]
    fn second_mutation_replaces_timer() {
        let mut ledger = ChangeLedger::default();
        ledger.apply(WorldChange::hole("town", 5, 5), 0, 100);
        // Re-mined at tick 80: deadline moves to 180.
        ledger.apply(WorldChange::hole("town", 5, 5), 80, 100);

        assert!(ledger.sweep_expired(100).is_empty());
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.sweep_expired(180).len(), 1);
    }

    #[test]
    fn restore_is_idempotent_after_removal() {
        let mut ledger = ChangeLedger::default();
        ledger.apply(WorldChange::hole("town", 1, 2), 0, 10);
        assert_eq!(ledger.sweep_expired(10).len(), 1);
        // Deadline long gone, key absent: nothing to restore.
        assert!(ledger.sweep_expired(1000).is_empty());
    }

    #[test]
    fn snapshot_lists_pending_changes() {
        let mut ledger = ChangeLedger::default();
        ledger.apply(WorldChange::hole("town", 1, 1), 0, 100);
        ledger.apply(WorldChange::hole("dungeon_1", 2, 2), 0, 100);

        let snap = ledger.snapshot();
        assert_eq!(snap.len(), 2);
        assert!(snap.iter().any(|c| c.level == "town"));
        assert!(snap.iter().any(|c| c.level == "dungeon_1"));
    }
}

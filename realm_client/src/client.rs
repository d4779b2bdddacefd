//! Client implementation.
//!
//! The client maintains:
//! - A reliable connection (handshake + all game traffic)
//! - A typed mirror of broadcast state: player roster, presence list, tile
//!   overrides keyed like the server ledger, chat backlog, per-level mobs
//! - Request helpers for every client->server message
//!
//! Rendering and input are out of scope; the interactive binary and the
//! integration tests drive this type directly.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use realm_shared::{
    chat::ChatMessage,
    config::RealmConfig,
    ledger::WorldChange,
    mob::MobState,
    net::{
        NetMsg, OnlineEntry, PlayerState, ReliableConn, SessionId, PROTOCOL_VERSION,
    },
};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Client connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Not connected to any server.
    Disconnected,
    /// Handshake complete, not yet logged in.
    Connected,
    /// Logged in; `Init` snapshot applied.
    LoggedIn,
}

/// High-level game client.
pub struct GameClient {
    pub session_id: SessionId,
    pub state: ClientState,

    conn: ReliableConn,

    /// World seed from the login snapshot; terrain regenerates from it.
    pub world_seed: Option<u64>,
    /// Every live player by session, self included.
    pub roster: HashMap<SessionId, PlayerState>,
    /// Latest presence list.
    pub online: Vec<OnlineEntry>,
    /// Mined-out tiles, keyed `"level:x,y"` like the server ledger.
    pub tile_overrides: HashMap<String, WorldChange>,
    /// Chat backlog, oldest first.
    pub chat_log: Vec<ChatMessage>,
    /// Latest mob state per level.
    pub mobs: HashMap<String, Vec<MobState>>,
    /// Pending summon offers: (requester session, requester name).
    pub summons: Vec<(SessionId, String)>,
    /// Where the server last teleported us, if anywhere.
    pub last_teleport: Option<(f32, f32, String)>,
}

impl GameClient {
    /// Connects to a server and performs the handshake.
    pub async fn connect(cfg: &RealmConfig) -> anyhow::Result<Self> {
        let server_addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;

        info!(server = %server_addr, "Connecting to server");

        let stream = TcpStream::connect(server_addr)
            .await
            .context("tcp connect")?;
        let mut conn = ReliableConn::new(stream);

        conn.send(&NetMsg::Hello {
            protocol: PROTOCOL_VERSION,
        })
        .await?;

        let welcome = conn.recv().await?;
        let session_id = match welcome {
            NetMsg::Welcome { session_id } => session_id,
            other => anyhow::bail!("expected Welcome, got {other:?}"),
        };

        info!(session = %session_id, "Connected to server");

        Ok(Self {
            session_id,
            state: ClientState::Connected,
            conn,
            world_seed: None,
            roster: HashMap::new(),
            online: Vec::new(),
            tile_overrides: HashMap::new(),
            chat_log: Vec::new(),
            mobs: HashMap::new(),
            summons: Vec::new(),
            last_teleport: None,
        })
    }

    /// Sends the login request; the `Init` snapshot arrives via [`poll`].
    pub async fn login(&mut self, name: &str) -> anyhow::Result<()> {
        self.conn
            .send(&NetMsg::Login {
                name: name.to_string(),
            })
            .await
    }

    /// Polls for one broadcast event. Returns false on timeout.
    pub async fn poll(&mut self, timeout: Duration) -> anyhow::Result<bool> {
        match self.conn.recv_timeout(timeout).await {
            Ok(Some(msg)) => {
                self.apply_event(msg);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => {
                warn!(error = %e, "Connection error");
                self.state = ClientState::Disconnected;
                Err(e)
            }
        }
    }

    /// Drains events until the deadline passes.
    pub async fn poll_for(&mut self, window: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(());
            }
            self.poll(deadline - now).await?;
        }
    }

    /// Polls until logged in or the deadline passes.
    pub async fn wait_init(&mut self, window: Duration) -> anyhow::Result<bool> {
        let deadline = tokio::time::Instant::now() + window;
        while self.state != ClientState::LoggedIn {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            self.poll(deadline - now).await?;
        }
        Ok(true)
    }

    /// Applies one server event to the local mirror.
    pub fn apply_event(&mut self, msg: NetMsg) {
        match msg {
            NetMsg::Init {
                id,
                seed,
                players,
                world_changes,
            } => {
                self.session_id = id;
                self.world_seed = Some(seed);
                self.roster = players.into_iter().map(|p| (p.id, p)).collect();
                self.tile_overrides = world_changes
                    .into_iter()
                    .map(|c| (c.key(), c))
                    .collect();
                self.state = ClientState::LoggedIn;
            }
            NetMsg::OnlineList(list) => self.online = list,
            NetMsg::PlayerUpdate(p) => {
                self.roster.insert(p.id, p);
            }
            NetMsg::PlayerDisconnect { id } => {
                self.roster.remove(&id);
            }
            NetMsg::TileUpdate(change) => {
                self.tile_overrides.insert(change.key(), change);
            }
            NetMsg::TileRestore { x, y, level } => {
                self.tile_overrides
                    .remove(&realm_shared::ledger::change_key(&level, x, y));
            }
            NetMsg::ChatEvent(msg) => self.chat_log.push(msg),
            NetMsg::SummonReceived { from_id, from_name } => {
                self.summons.push((from_id, from_name));
            }
            NetMsg::Teleported { x, y, level } => {
                self.last_teleport = Some((x, y, level));
            }
            NetMsg::MobUpdate { level, mobs } => {
                self.mobs.insert(level, mobs);
            }
            NetMsg::Disconnect { reason } => {
                info!(reason = %reason, "Disconnected by server");
                self.state = ClientState::Disconnected;
            }
            other => {
                debug!(?other, "Unhandled event");
            }
        }
    }

    // ─── Requests ───

    pub async fn send_move(
        &mut self,
        x: f32,
        y: f32,
        level: &str,
        glyph: char,
    ) -> anyhow::Result<()> {
        self.conn
            .send(&NetMsg::Move {
                x,
                y,
                level: level.to_string(),
                glyph,
                inventory: None,
            })
            .await
    }

    pub async fn send_mine(&mut self, x: i32, y: i32, level: &str) -> anyhow::Result<()> {
        self.conn
            .send(&NetMsg::MineRequest {
                x,
                y,
                level: level.to_string(),
            })
            .await
    }

    pub async fn send_attack(&mut self, mob_id: u64, level: &str) -> anyhow::Result<()> {
        self.conn
            .send(&NetMsg::AttackRequest {
                mob_id,
                level: level.to_string(),
            })
            .await
    }

    pub async fn send_chat(&mut self, text: &str) -> anyhow::Result<()> {
        self.conn
            .send(&NetMsg::Chat {
                text: text.to_string(),
            })
            .await
    }

    pub async fn send_inventory(&mut self, inventory: Vec<String>) -> anyhow::Result<()> {
        self.conn.send(&NetMsg::UpdateInventory { inventory }).await
    }

    pub async fn send_bank(&mut self, bank_gold: i64) -> anyhow::Result<()> {
        self.conn.send(&NetMsg::UpdateBank { bank_gold }).await
    }

    pub async fn send_add_friend(&mut self, name: &str) -> anyhow::Result<()> {
        self.conn
            .send(&NetMsg::AddFriend {
                name: name.to_string(),
            })
            .await
    }

    pub async fn send_summon_request(&mut self, target: SessionId) -> anyhow::Result<()> {
        self.conn.send(&NetMsg::SummonRequest { target }).await
    }

    pub async fn send_summon_accept(&mut self, from: SessionId) -> anyhow::Result<()> {
        self.conn.send(&NetMsg::SummonAccept { from }).await
    }

    /// Returns the underlying connection peer.
    pub fn server_peer(&self) -> anyhow::Result<SocketAddr> {
        self.conn.peer_addr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_override_bookkeeping() {
        let mut overrides: HashMap<String, WorldChange> = HashMap::new();
        let change = WorldChange::hole("town", 10, 10);
        overrides.insert(change.key(), change);
        assert!(overrides.contains_key("town:10,10"));

        overrides.remove(&realm_shared::ledger::change_key("town", 10, 10));
        assert!(overrides.is_empty());
    }
}

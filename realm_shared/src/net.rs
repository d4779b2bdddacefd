//! Networking primitives.
//!
//! Goals:
//! - One persistent reliable channel per client (TCP, length-prefixed JSON).
//! - One message enum covering handshake, requests, and broadcast events.
//! - Keep serialization explicit and versionable.
//!
//! The server is authoritative for mob and terrain state; position and
//! inventory updates are accepted from clients as reported.

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    sync::atomic::{AtomicU32, Ordering},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    time,
};

use crate::{chat::ChatMessage, ledger::WorldChange, mob::MobState};

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

static NEXT_SESSION_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies a connected session (distinct from the persistent player name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u32);

impl SessionId {
    pub fn new_unique() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Wire view of a live player, sent in `Init` and on every movement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerState {
    pub id: SessionId,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub level: String,
    pub glyph: char,
    pub inventory: Vec<String>,
}

/// Presence roster entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OnlineEntry {
    pub id: SessionId,
    pub name: String,
    pub level: String,
    pub friends: Vec<String>,
}

/// High-level message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NetMsg {
    // ─── Connection handshake ───
    Hello {
        protocol: u32,
    },
    Welcome {
        session_id: SessionId,
    },

    // ─── Client -> server requests ───
    Login {
        name: String,
    },
    Move {
        x: f32,
        y: f32,
        level: String,
        glyph: char,
        inventory: Option<Vec<String>>,
    },
    MineRequest {
        x: i32,
        y: i32,
        level: String,
    },
    AttackRequest {
        mob_id: u64,
        level: String,
    },
    UpdateInventory {
        inventory: Vec<String>,
    },
    UpdateBank {
        bank_gold: i64,
    },
    AddFriend {
        name: String,
    },
    Chat {
        text: String,
    },
    SummonRequest {
        target: SessionId,
    },
    SummonAccept {
        from: SessionId,
    },

    // ─── Server -> client events ───
    /// Full snapshot at login: who is online and which tiles are mined out.
    Init {
        id: SessionId,
        seed: u64,
        players: Vec<PlayerState>,
        world_changes: Vec<WorldChange>,
    },
    OnlineList(Vec<OnlineEntry>),
    PlayerUpdate(PlayerState),
    PlayerDisconnect {
        id: SessionId,
    },
    TileUpdate(WorldChange),
    TileRestore {
        x: i32,
        y: i32,
        level: String,
    },
    ChatEvent(ChatMessage),
    SummonReceived {
        from_id: SessionId,
        from_name: String,
    },
    Teleported {
        x: f32,
        y: f32,
        level: String,
    },
    MobUpdate {
        level: String,
        mobs: Vec<MobState>,
    },

    // ─── Disconnect ───
    Disconnect {
        reason: String,
    },
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn send(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(msg).context("serialize msg")?;
        let mut buf = BytesMut::with_capacity(4 + payload.len());
        buf.put_u32(payload.len() as u32);
        buf.extend_from_slice(&payload);
        self.stream.write_all(&buf).await.context("tcp write")?;
        Ok(())
    }

    pub async fn recv(&mut self) -> anyhow::Result<NetMsg> {
        let mut len_buf = [0u8; 4];
        self.stream
            .read_exact(&mut len_buf)
            .await
            .context("tcp read len")?;
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        self.stream
            .read_exact(&mut payload)
            .await
            .context("tcp read payload")?;
        let msg = serde_json::from_slice(&payload).context("deserialize msg")?;
        Ok(msg)
    }

    /// Receives a message within the given timeout.
    pub async fn recv_timeout(
        &mut self,
        timeout: std::time::Duration,
    ) -> anyhow::Result<Option<NetMsg>> {
        match time::timeout(timeout, self.recv()).await {
            Ok(Ok(msg)) => Ok(Some(msg)),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Splits into independently-owned read/write halves, so a reader task
    /// and a writer task can run concurrently over one connection.
    pub fn into_split(self) -> (FrameReader, FrameWriter) {
        let (rd, wr) = self.stream.into_split();
        (FrameReader { rd }, FrameWriter { wr })
    }
}

/// Read half of a split connection.
#[derive(Debug)]
pub struct FrameReader {
    rd: OwnedReadHalf,
}

impl FrameReader {
    pub async fn recv(&mut self) -> anyhow::Result<NetMsg> {
        let mut len_buf = [0u8; 4];
        self.rd
            .read_exact(&mut len_buf)
            .await
            .context("tcp read len")?;
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        self.rd
            .read_exact(&mut payload)
            .await
            .context("tcp read payload")?;
        serde_json::from_slice(&payload).context("deserialize msg")
    }
}

/// Write half of a split connection.
#[derive(Debug)]
pub struct FrameWriter {
    wr: OwnedWriteHalf,
}

impl FrameWriter {
    pub async fn send(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(msg).context("serialize msg")?;
        let mut buf = BytesMut::with_capacity(4 + payload.len());
        buf.put_u32(payload.len() as u32);
        buf.extend_from_slice(&payload);
        self.wr.write_all(&buf).await.context("tcp write")?;
        Ok(())
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

/// Convenience codec helpers.
pub fn encode_to_bytes(msg: &NetMsg) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize")?;
    Ok(Bytes::from(payload))
}

pub fn decode_from_bytes(b: &[u8]) -> anyhow::Result<NetMsg> {
    serde_json::from_slice(b).context("deserialize")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn netmsg_roundtrip_bytes() {
        let msg = NetMsg::Hello {
            protocol: PROTOCOL_VERSION,
        };
        let bytes = encode_to_bytes(&msg).unwrap();
        let back = decode_from_bytes(&bytes).unwrap();
        assert_eq!(msg, back);
    }

    #[test]
    fn login_and_mine_roundtrip() {
        let login = NetMsg::Login {
            name: "Alice".into(),
        };
        assert_eq!(decode_from_bytes(&encode_to_bytes(&login).unwrap()).unwrap(), login);

        let mine = NetMsg::MineRequest {
            x: 10,
            y: 10,
            level: "town".into(),
        };
        assert_eq!(decode_from_bytes(&encode_to_bytes(&mine).unwrap()).unwrap(), mine);
    }

    #[test]
    fn session_ids_are_unique() {
        let a = SessionId::new_unique();
        let b = SessionId::new_unique();
        assert_ne!(a, b);
    }
}

//! `realm_client`
//!
//! Client-side systems:
//! - Connection management (handshake, login)
//! - Typed view of broadcast world state (roster, tiles, chat, mobs)
//! - Request helpers for every client->server message

pub mod client;

pub use client::GameClient;

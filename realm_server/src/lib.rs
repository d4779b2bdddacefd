//! `realm_server`
//!
//! Server-side systems:
//! - Session/presence registry bound to persistent player records
//! - Fixed-timestep tick loop (mob AI, ledger sweep, store flush)
//! - World-change ledger with timed tile restoration
//! - Chat relay with rooms and transcript
//! - Console commands over stdin

pub mod server;

pub use server::GameServer;

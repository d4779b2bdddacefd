//! Chat types, slash commands, and spam limiting.
//!
//! Channels are `global` plus ad-hoc named rooms; a session is in exactly
//! one channel at a time. Routing is by channel match, done by the server
//! against its session table. Every accepted message is appended to the
//! on-disk transcript (see `persist::ChatTranscript`).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// The channel every session starts in.
pub const GLOBAL_CHANNEL: &str = "global";

/// Sender name used for server-generated lines.
pub const SYSTEM_USER: &str = "System";

/// Maximum message length in characters.
pub const MAX_MESSAGE_LENGTH: usize = 256;

/// Rate limit: messages per window.
pub const RATE_LIMIT_MESSAGES: u32 = 5;
/// Rate limit: window duration.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(10);

/// A chat message as it travels on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub user: String,
    pub text: String,
    pub channel: String,
}

impl ChatMessage {
    pub fn new(user: &str, text: &str, channel: &str) -> Self {
        Self {
            user: user.to_string(),
            text: text.to_string(),
            channel: channel.to_string(),
        }
    }

    /// A server-generated notice, addressed like a global line.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            user: SYSTEM_USER.to_string(),
            text: text.into(),
            channel: GLOBAL_CHANNEL.to_string(),
        }
    }
}

/// Parsed slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// `/join <room>` (alias `/room`); empty argument defaults to "meeting".
    Join(String),
    /// `/global` (alias `/world`).
    Global,
    /// `/me <action>`.
    Emote(String),
}

/// Parses a leading slash command, if any.
pub fn parse_command(text: &str) -> Option<ChatCommand> {
    if !text.starts_with('/') {
        return None;
    }
    let mut parts = text.splitn(2, ' ');
    let cmd = parts.next().unwrap_or("").to_lowercase();
    let arg = parts.next().unwrap_or("").trim();

    match cmd.as_str() {
        "/join" | "/room" => {
            let room = if arg.is_empty() { "meeting" } else { arg };
            Some(ChatCommand::Join(room.to_string()))
        }
        "/global" | "/world" => Some(ChatCommand::Global),
        "/me" => Some(ChatCommand::Emote(arg.to_string())),
        _ => None,
    }
}

/// Rate limiter for chat spam prevention (sliding window).
#[derive(Debug, Clone)]
pub struct RateLimiter {
    history: VecDeque<Instant>,
    max_messages: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_messages: u32, window: Duration) -> Self {
        Self {
            history: VecDeque::with_capacity(max_messages as usize),
            max_messages,
            window,
        }
    }

    /// Records a message being sent. Returns false if rate limited.
    pub fn record_message(&mut self) -> bool {
        let now = Instant::now();

        while let Some(&front) = self.history.front() {
            if now.duration_since(front) >= self.window {
                self.history.pop_front();
            } else {
                break;
            }
        }

        if self.history.len() as u32 >= self.max_messages {
            return false;
        }
        self.history.push_back(now);
        true
    }

    /// Remaining messages in the current window.
    pub fn remaining(&self) -> u32 {
        self.max_messages.saturating_sub(self.history.len() as u32)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        RateLimiter::new(RATE_LIMIT_MESSAGES, RATE_LIMIT_WINDOW)
    }
}

/// Validates raw chat text: non-empty after trim, within length bounds.
pub fn validate_text(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && trimmed.chars().count() <= MAX_MESSAGE_LENGTH
}

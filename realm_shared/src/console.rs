//! Server console.
//!
//! Provides:
//! - Console variables (cvars) with typed values
//! - Bare-name cvar query/set (`sv_mine_radius`, `sv_mine_radius 12`)
//! - Command history
//! - Input parsing with quoted arguments
//!
//! Game-level commands (`status`, `save`, `quit`) live on the server, which
//! falls back to this module for anything cvar-shaped.

use std::collections::HashMap;

use anyhow::bail;

/// Console variable value.
#[derive(Debug, Clone, PartialEq)]
pub enum CvarValue {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
}

impl CvarValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            CvarValue::Int(v) => Some(*v),
            CvarValue::Float(v) => Some(*v as i64),
            CvarValue::Bool(v) => Some(if *v { 1 } else { 0 }),
            CvarValue::String(s) => s.parse().ok(),
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            CvarValue::Float(v) => Some(*v),
            CvarValue::Int(v) => Some(*v as f64),
            CvarValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            CvarValue::Bool(v) => *v,
            CvarValue::Int(v) => *v != 0,
            CvarValue::Float(v) => *v != 0.0,
            CvarValue::String(s) => !s.is_empty() && s != "0" && s.to_lowercase() != "false",
        }
    }

    /// Parses the loosest matching type: int, float, bool, then string.
    pub fn parse_loose(s: &str) -> CvarValue {
        if let Ok(v) = s.parse::<i64>() {
            CvarValue::Int(v)
        } else if let Ok(v) = s.parse::<f64>() {
            CvarValue::Float(v)
        } else if s == "true" {
            CvarValue::Bool(true)
        } else if s == "false" {
            CvarValue::Bool(false)
        } else {
            CvarValue::String(s.trim_matches('"').to_string())
        }
    }
}

impl std::fmt::Display for CvarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CvarValue::Int(v) => write!(f, "{}", v),
            CvarValue::Float(v) => write!(f, "{}", v),
            CvarValue::String(v) => write!(f, "\"{}\"", v),
            CvarValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

bitflags::bitflags! {
    /// Cvar flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CvarFlags: u32 {
        const NONE = 0;
        const ARCHIVE = 1 << 0;      // Saved to config
        const REPLICATED = 1 << 1;   // Server -> client
        const SERVER_ONLY = 1 << 2;  // Never sent to clients
    }
}

impl Default for CvarFlags {
    fn default() -> Self {
        Self::NONE
    }
}

/// Console variable metadata.
#[derive(Debug, Clone)]
pub struct Cvar {
    pub name: String,
    pub value: CvarValue,
    pub default: CvarValue,
    pub description: String,
    pub flags: CvarFlags,
}

/// The console: a cvar table plus line parsing and history.
pub struct Console {
    cvars: HashMap<String, Cvar>,
    history: Vec<String>,
    max_history: usize,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        Self {
            cvars: HashMap::new(),
            history: Vec::new(),
            max_history: 100,
        }
    }

    /// Registers a console variable.
    pub fn register_cvar(
        &mut self,
        name: &str,
        default: CvarValue,
        description: &str,
        flags: CvarFlags,
    ) {
        let cvar = Cvar {
            name: name.to_string(),
            value: default.clone(),
            default,
            description: description.to_string(),
            flags,
        };
        self.cvars.insert(name.to_string(), cvar);
    }

    /// Executes a console line. Returns output lines.
    ///
    /// Handles built-ins (`echo`, `help`, `cvarlist`, `set`) and bare cvar
    /// query/assignment; anything else reports an unknown command so the
    /// caller can try its own command table first.
    pub fn exec(&mut self, line: &str) -> anyhow::Result<Vec<String>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            return Ok(Vec::new());
        }

        self.history.push(line.to_string());
        if self.history.len() > self.max_history {
            self.history.remove(0);
        }

        let tokens = parse_command_line(line);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let cmd = tokens[0].as_str();
        let args: Vec<&str> = tokens[1..].iter().map(|s| s.as_str()).collect();

        match cmd {
            "echo" => Ok(vec![args.join(" ")]),
            "help" => Ok(vec![
                "Built-ins: echo, help, cvarlist, set <cvar> <value>".to_string(),
                "Type a cvar name alone to query it, or with a value to set it.".to_string(),
            ]),
            "cvarlist" => {
                let mut lines: Vec<String> = self
                    .cvars
                    .values()
                    .map(|c| format!("  {} = {} (default: {}) - {}", c.name, c.value, c.default, c.description))
                    .collect();
                lines.sort();
                Ok(lines)
            }
            "set" => {
                if args.len() < 2 {
                    bail!("usage: set <cvar> <value>");
                }
                let value = CvarValue::parse_loose(&args[1..].join(" "));
                self.set_cvar(args[0], value.clone())?;
                Ok(vec![format!("{} = {}", args[0], value)])
            }
            name if self.cvars.contains_key(name) => {
                if args.is_empty() {
                    let c = &self.cvars[name];
                    Ok(vec![format!("{} = {} (default: {})", c.name, c.value, c.default)])
                } else {
                    let value = CvarValue::parse_loose(&args.join(" "));
                    self.set_cvar(name, value.clone())?;
                    Ok(vec![format!("{} = {}", name, value)])
                }
            }
            other => Ok(vec![format!("Unknown command: {}", other)]),
        }
    }

    /// Gets a cvar value.
    pub fn get_cvar(&self, name: &str) -> Option<CvarValue> {
        self.cvars.get(name).map(|c| c.value.clone())
    }

    /// Sets a cvar value.
    pub fn set_cvar(&mut self, name: &str, value: CvarValue) -> anyhow::Result<()> {
        match self.cvars.get_mut(name) {
            Some(cvar) => {
                cvar.value = value;
                Ok(())
            }
            None => bail!("unknown cvar: {}", name),
        }
    }

    /// Gets command history.
    pub fn history(&self) -> &[String] {
        &self.history
    }
}

/// Parses a command line into tokens, respecting quotes.
fn parse_command_line(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ' ' | '\t' if !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_cvar_roundtrip() {
        let mut console = Console::new();
        console.register_cvar(
            "sv_mine_radius",
            CvarValue::Float(10.0),
            "Maximum mining reach",
            CvarFlags::NONE,
        );

        assert_eq!(console.get_cvar("sv_mine_radius"), Some(CvarValue::Float(10.0)));

        console.exec("set sv_mine_radius 12").unwrap();
        assert_eq!(console.get_cvar("sv_mine_radius"), Some(CvarValue::Int(12)));
        assert_eq!(
            console.get_cvar("sv_mine_radius").and_then(|v| v.as_float()),
            Some(12.0)
        );
    }

    #[test]
    fn bare_cvar_query_and_set() {
        let mut console = Console::new();
        console.register_cvar(
            "sv_respawn_secs",
            CvarValue::Float(60.0),
            "Tile respawn delay",
            CvarFlags::NONE,
        );

        let out = console.exec("sv_respawn_secs").unwrap();
        assert!(out[0].contains("60"));

        console.exec("sv_respawn_secs 180").unwrap();
        assert_eq!(console.get_cvar("sv_respawn_secs"), Some(CvarValue::Int(180)));
    }

    #[test]
    fn parse_quoted_args() {
        let tokens = parse_command_line(r#"broadcast "server restarting soon" now"#);
        assert_eq!(tokens, vec!["broadcast", "server restarting soon", "now"]);
    }
}

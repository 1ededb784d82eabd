//! Command definitions
//!
//! Represents store commands from clients.

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    Get = 0x01,
    SetNxPx = 0x02,
    CompareAndDelete = 0x03,
    Ping = 0x04,
    PExpire = 0x05,
    PTtl = 0x06,
    CompareAndPExpire = 0x07,
    Set = 0x08,
}

impl CommandType {
    /// Map a wire byte to a command type
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(CommandType::Get),
            0x02 => Some(CommandType::SetNxPx),
            0x03 => Some(CommandType::CompareAndDelete),
            0x04 => Some(CommandType::Ping),
            0x05 => Some(CommandType::PExpire),
            0x06 => Some(CommandType::PTtl),
            0x07 => Some(CommandType::CompareAndPExpire),
            0x08 => Some(CommandType::Set),
            _ => None,
        }
    }
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Get a value by key
    Get { key: String },

    /// Set if absent, with expiry
    SetNxPx { key: String, value: String, ttl_ms: u64 },

    /// Delete if the stored value matches
    CompareAndDelete { key: String, expected: String },

    /// Ping (health check)
    Ping,

    /// Set or refresh expiry on an existing key
    PExpire { key: String, ttl_ms: u64 },

    /// Remaining TTL in PTTL convention
    PTtl { key: String },

    /// Refresh expiry if the stored value matches
    CompareAndPExpire { key: String, expected: String, ttl_ms: u64 },

    /// Unconditional set, no expiry
    Set { key: String, value: String },
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Get { .. } => CommandType::Get,
            Command::SetNxPx { .. } => CommandType::SetNxPx,
            Command::CompareAndDelete { .. } => CommandType::CompareAndDelete,
            Command::Ping => CommandType::Ping,
            Command::PExpire { .. } => CommandType::PExpire,
            Command::PTtl { .. } => CommandType::PTtl,
            Command::CompareAndPExpire { .. } => CommandType::CompareAndPExpire,
            Command::Set { .. } => CommandType::Set,
        }
    }

    /// Key the command targets, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            Command::Get { key }
            | Command::SetNxPx { key, .. }
            | Command::CompareAndDelete { key, .. }
            | Command::PExpire { key, .. }
            | Command::PTtl { key }
            | Command::CompareAndPExpire { key, .. }
            | Command::Set { key, .. } => Some(key),
            Command::Ping => None,
        }
    }
}

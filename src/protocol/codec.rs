//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol.
//!
//! ## Wire Format
//!
//! ### Request (Command) Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │ Cmd (1)  │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! ### Payload Fields
//! - string: len (4 bytes) + UTF-8 bytes
//! - ttl:    milliseconds (8 bytes)
//!
//! ### Payload by Command Type
//! - GET:                 key
//! - SET_NX_PX:           key + value + ttl
//! - COMPARE_AND_DEL:     key + expected
//! - PING:                empty
//! - PEXPIRE:             key + ttl
//! - PTTL:                key
//! - COMPARE_AND_PEXPIRE: key + expected + ttl
//! - SET:                 key + value
//!
//! ### Response Format
//! ```text
//! ┌──────────┬──────────┬─────────────────────────────┐
//! │Status(1) │ Len (4)  │         Payload             │
//! └──────────┴──────────┴─────────────────────────────┘
//! ```
//!
//! All integers are big-endian.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, BytesMut};

use super::{Command, CommandType, Response, Status};
use crate::error::{LockError, Result};

/// Header size: 1 byte command/status + 4 bytes length
pub const HEADER_SIZE: usize = 5;

/// Maximum payload size (16 MB)
pub const MAX_PAYLOAD_SIZE: u32 = 16 * 1024 * 1024;

// =============================================================================
// Payload Field Helpers
// =============================================================================

fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_u32(value.len() as u32);
    buf.put_slice(value.as_bytes());
}

/// Sequential reader over a command payload
struct PayloadReader<'a> {
    command: &'static str,
    buf: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    fn new(command: &'static str, buf: &'a [u8]) -> Self {
        Self { command, buf }
    }

    fn string(&mut self, field: &str) -> Result<String> {
        if self.buf.remaining() < 4 {
            return Err(LockError::Protocol(format!(
                "{} command: missing {} length",
                self.command, field
            )));
        }
        let len = self.buf.get_u32() as usize;

        if self.buf.remaining() < len {
            return Err(LockError::Protocol(format!(
                "{} command: incomplete {} (expected {}, got {})",
                self.command,
                field,
                len,
                self.buf.remaining()
            )));
        }
        let raw = self.buf[..len].to_vec();
        self.buf.advance(len);

        String::from_utf8(raw).map_err(|_| {
            LockError::Protocol(format!("{} command: {} is not valid UTF-8", self.command, field))
        })
    }

    fn ttl(&mut self) -> Result<u64> {
        if self.buf.remaining() < 8 {
            return Err(LockError::Protocol(format!(
                "{} command: missing ttl",
                self.command
            )));
        }
        let ttl_ms = self.buf.get_u64();
        if ttl_ms == 0 {
            return Err(LockError::Protocol(format!(
                "{} command: ttl must be non-zero",
                self.command
            )));
        }
        Ok(ttl_ms)
    }

    fn finish(self) -> Result<()> {
        if self.buf.has_remaining() {
            return Err(LockError::Protocol(format!(
                "{} command: {} trailing bytes",
                self.command,
                self.buf.remaining()
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Command Encoding/Decoding
// =============================================================================

/// Encode a command to bytes
///
/// Format: cmd_type (1) + payload_len (4) + payload
pub fn encode_command(command: &Command) -> Vec<u8> {
    let mut payload = BytesMut::new();

    match command {
        Command::Get { key } | Command::PTtl { key } => {
            put_string(&mut payload, key);
        }
        Command::SetNxPx { key, value, ttl_ms } => {
            put_string(&mut payload, key);
            put_string(&mut payload, value);
            payload.put_u64(*ttl_ms);
        }
        Command::CompareAndDelete { key, expected } => {
            put_string(&mut payload, key);
            put_string(&mut payload, expected);
        }
        Command::Ping => {}
        Command::PExpire { key, ttl_ms } => {
            put_string(&mut payload, key);
            payload.put_u64(*ttl_ms);
        }
        Command::CompareAndPExpire {
            key,
            expected,
            ttl_ms,
        } => {
            put_string(&mut payload, key);
            put_string(&mut payload, expected);
            payload.put_u64(*ttl_ms);
        }
        Command::Set { key, value } => {
            put_string(&mut payload, key);
            put_string(&mut payload, value);
        }
    }

    // Build full message: header + payload
    let mut message = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    message.put_u8(command.command_type() as u8);
    message.put_u32(payload.len() as u32);
    message.put_slice(&payload);

    message.to_vec()
}

/// Decode a command from bytes
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    let (cmd_byte, payload) = split_frame(bytes, "")?;

    let cmd_type = CommandType::from_byte(cmd_byte).ok_or_else(|| {
        LockError::Protocol(format!("Unknown command type: 0x{:02x}", cmd_byte))
    })?;

    let command = match cmd_type {
        CommandType::Get => {
            let mut reader = PayloadReader::new("GET", payload);
            let key = reader.string("key")?;
            reader.finish()?;
            Command::Get { key }
        }
        CommandType::SetNxPx => {
            let mut reader = PayloadReader::new("SET_NX_PX", payload);
            let key = reader.string("key")?;
            let value = reader.string("value")?;
            let ttl_ms = reader.ttl()?;
            reader.finish()?;
            Command::SetNxPx { key, value, ttl_ms }
        }
        CommandType::CompareAndDelete => {
            let mut reader = PayloadReader::new("COMPARE_AND_DEL", payload);
            let key = reader.string("key")?;
            let expected = reader.string("expected value")?;
            reader.finish()?;
            Command::CompareAndDelete { key, expected }
        }
        CommandType::Ping => {
            if !payload.is_empty() {
                return Err(LockError::Protocol(format!(
                    "PING command: unexpected payload of {} bytes",
                    payload.len()
                )));
            }
            Command::Ping
        }
        CommandType::PExpire => {
            let mut reader = PayloadReader::new("PEXPIRE", payload);
            let key = reader.string("key")?;
            let ttl_ms = reader.ttl()?;
            reader.finish()?;
            Command::PExpire { key, ttl_ms }
        }
        CommandType::PTtl => {
            let mut reader = PayloadReader::new("PTTL", payload);
            let key = reader.string("key")?;
            reader.finish()?;
            Command::PTtl { key }
        }
        CommandType::CompareAndPExpire => {
            let mut reader = PayloadReader::new("COMPARE_AND_PEXPIRE", payload);
            let key = reader.string("key")?;
            let expected = reader.string("expected value")?;
            let ttl_ms = reader.ttl()?;
            reader.finish()?;
            Command::CompareAndPExpire {
                key,
                expected,
                ttl_ms,
            }
        }
        CommandType::Set => {
            let mut reader = PayloadReader::new("SET", payload);
            let key = reader.string("key")?;
            let value = reader.string("value")?;
            reader.finish()?;
            Command::Set { key, value }
        }
    };

    Ok(command)
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
///
/// Format: status (1) + payload_len (4) + payload
pub fn encode_response(response: &Response) -> Vec<u8> {
    let payload = response.payload.as_deref().unwrap_or(&[]);

    let mut message = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    message.put_u8(response.status as u8);
    message.put_u32(payload.len() as u32);
    message.put_slice(payload);

    message.to_vec()
}

/// Decode a response from bytes
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    let (status_byte, payload) = split_frame(bytes, "response ")?;

    let status = match status_byte {
        0x00 => Status::Ok,
        0x01 => Status::NotFound,
        0x02 => Status::Error,
        _ => {
            return Err(LockError::Protocol(format!(
                "Unknown response status: 0x{:02x}",
                status_byte
            )))
        }
    };

    let payload = if payload.is_empty() {
        None
    } else {
        Some(payload.to_vec())
    };

    Ok(Response { status, payload })
}

/// Validate a frame header and split off its payload
fn split_frame<'a>(bytes: &'a [u8], what: &str) -> Result<(u8, &'a [u8])> {
    if bytes.len() < HEADER_SIZE {
        return Err(LockError::Protocol(format!(
            "Incomplete {}header: expected {} bytes, got {}",
            what,
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let mut header = &bytes[..HEADER_SIZE];
    let tag = header.get_u8();
    let payload_len = header.get_u32() as usize;

    if payload_len > MAX_PAYLOAD_SIZE as usize {
        return Err(LockError::Protocol(format!(
            "{}payload too large: {} bytes (max {})",
            what, payload_len, MAX_PAYLOAD_SIZE
        )));
    }

    let total_len = HEADER_SIZE + payload_len;
    if bytes.len() < total_len {
        return Err(LockError::Protocol(format!(
            "Incomplete {}payload: expected {} bytes, got {}",
            what,
            total_len,
            bytes.len()
        )));
    }

    Ok((tag, &bytes[HEADER_SIZE..total_len]))
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one raw frame (header + payload) from a stream
fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let payload_len = (&header[1..]).get_u32() as usize;
    if payload_len > MAX_PAYLOAD_SIZE as usize {
        return Err(LockError::Protocol(format!(
            "Payload too large: {} bytes (max {})",
            payload_len, MAX_PAYLOAD_SIZE
        )));
    }

    let mut frame = vec![0u8; HEADER_SIZE + payload_len];
    frame[..HEADER_SIZE].copy_from_slice(&header);
    if payload_len > 0 {
        reader.read_exact(&mut frame[HEADER_SIZE..])?;
    }
    Ok(frame)
}

/// Read a complete command from a stream
///
/// Blocks until a complete command is received or an error occurs
pub fn read_command<R: Read>(reader: &mut R) -> Result<Command> {
    decode_command(&read_frame(reader)?)
}

/// Write a command to a stream
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    writer.write_all(&encode_command(command))?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    decode_response(&read_frame(reader)?)
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    writer.write_all(&encode_response(response))?;
    writer.flush()?;
    Ok(())
}

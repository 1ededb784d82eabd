//! Response definitions
//!
//! Represents responses to clients.

use crate::error::{LockError, Result};

/// Response status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    NotFound = 0x01,
    Error = 0x02,
}

/// A response to send to client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code
    pub status: Status,

    /// Optional payload (value for GET, result for others, message for ERROR)
    pub payload: Option<Vec<u8>>,
}

impl Response {
    /// Create an OK response with optional payload
    pub fn ok(payload: Option<Vec<u8>>) -> Self {
        Self {
            status: Status::Ok,
            payload,
        }
    }

    /// Create an OK response carrying a boolean outcome
    pub fn flag(value: bool) -> Self {
        Self::ok(Some(vec![value as u8]))
    }

    /// Create an OK response carrying a signed integer
    pub fn integer(value: i64) -> Self {
        Self::ok(Some(value.to_be_bytes().to_vec()))
    }

    /// Create a NOT_FOUND response
    pub fn not_found() -> Self {
        Self {
            status: Status::NotFound,
            payload: None,
        }
    }

    /// Create an ERROR response
    pub fn error(message: &str) -> Self {
        Self {
            status: Status::Error,
            payload: Some(message.as_bytes().to_vec()),
        }
    }

    /// Fail with the server's message if this is an ERROR response
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            Status::Error => {
                let message = self
                    .payload
                    .map(|p| String::from_utf8_lossy(&p).into_owned())
                    .unwrap_or_default();
                Err(LockError::StoreOperationFailed(message))
            }
            _ => Ok(self),
        }
    }

    /// Interpret the payload as a boolean outcome
    pub fn as_flag(&self) -> Result<bool> {
        match self.payload.as_deref() {
            Some([0]) => Ok(false),
            Some([1]) => Ok(true),
            other => Err(LockError::Protocol(format!(
                "Expected 1-byte flag payload, got {:?}",
                other
            ))),
        }
    }

    /// Interpret the payload as a signed integer
    pub fn as_integer(&self) -> Result<i64> {
        let bytes: [u8; 8] = self
            .payload
            .as_deref()
            .and_then(|p| p.try_into().ok())
            .ok_or_else(|| LockError::Protocol("Expected 8-byte integer payload".to_string()))?;
        Ok(i64::from_be_bytes(bytes))
    }

    /// Interpret the payload as a UTF-8 string
    pub fn as_text(&self) -> Result<String> {
        let bytes = self.payload.clone().unwrap_or_default();
        String::from_utf8(bytes)
            .map_err(|e| LockError::Protocol(format!("Invalid UTF-8 payload: {}", e)))
    }
}

//! Ownership tokens
//!
//! A token is the only evidence that a lock record was written by a given
//! acquisition. Tokens are random v4 UUIDs drawn from the OS CSPRNG, so
//! collisions across every lock a deployment ever issues are negligible.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LockError;

/// Unguessable value identifying one acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnershipToken(Uuid);

impl OwnershipToken {
    /// Mint a fresh random token
    pub fn mint() -> Self {
        Self(Uuid::new_v4())
    }

    /// The token as stored in the lock record
    pub fn as_stored(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl fmt::Display for OwnershipToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for OwnershipToken {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| LockError::Serialization(format!("invalid ownership token '{}': {}", s, e)))
    }
}

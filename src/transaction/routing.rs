//! Read/write routing across the primary and replica pools
//!
//! Writes always go to the primary. Reads follow the configured preference:
//! `primary`, `secondary` (replicas in round-robin, primary when there are
//! none) or `nearest` (the pool with the fewest checked-out connections).
//! Routing picks a pool once per transaction; the transaction then keeps its
//! connection.
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::driver::pool::ConnectionPool;
use crate::relationship::errors::ParseEnumError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadPreference {
    #[default]
    Primary,
    Secondary,
    Nearest,
}

impl fmt::Display for ReadPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadPreference::Primary => f.write_str("primary"),
            ReadPreference::Secondary => f.write_str("secondary"),
            ReadPreference::Nearest => f.write_str("nearest"),
        }
    }
}

impl FromStr for ReadPreference {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "primary" => Ok(ReadPreference::Primary),
            "secondary" | "replica" => Ok(ReadPreference::Secondary),
            "nearest" => Ok(ReadPreference::Nearest),
            _ => Err(ParseEnumError::new("read_preference", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    Read,
    Write,
}

pub struct Router {
    primary: ConnectionPool,
    replicas: Vec<ConnectionPool>,
    preference: ReadPreference,
    next_replica: AtomicUsize,
}

impl Router {
    pub fn new(primary: ConnectionPool, replicas: Vec<ConnectionPool>, preference: ReadPreference) -> Self {
        Router {
            primary,
            replicas,
            preference,
            next_replica: AtomicUsize::new(0),
        }
    }

    pub fn single(primary: ConnectionPool) -> Self {
        Self::new(primary, Vec::new(), ReadPreference::Primary)
    }

    pub fn primary(&self) -> &ConnectionPool {
        &self.primary
    }

    pub fn replicas(&self) -> &[ConnectionPool] {
        &self.replicas
    }

    pub fn preference(&self) -> ReadPreference {
        self.preference
    }

    pub fn route(&self, mode: AccessMode) -> &ConnectionPool {
        if mode == AccessMode::Write || self.replicas.is_empty() {
            return &self.primary;
        }
        match self.preference {
            ReadPreference::Primary => &self.primary,
            ReadPreference::Secondary => {
                let idx = self.next_replica.fetch_add(1, Ordering::Relaxed) % self.replicas.len();
                &self.replicas[idx]
            }
            ReadPreference::Nearest => std::iter::once(&self.primary)
                .chain(self.replicas.iter())
                .min_by_key(|pool| pool.in_use())
                .unwrap_or(&self.primary),
        }
    }

    /// Primary first, then replicas
    pub fn pools(&self) -> impl Iterator<Item = &ConnectionPool> {
        std::iter::once(&self.primary).chain(self.replicas.iter())
    }
}

//! Common types and errors for Raidlink
//!
//! This crate provides the canonical entity structures and the error
//! taxonomy shared across all Raidlink components.

pub mod entities;
pub mod telemetry;

use thiserror::Error;

/// Core error taxonomy for sync operations
///
/// The coordinator keys its retry-vs-fail behavior off these variants:
/// only [`RaidError::Connectivity`] triggers the local fallback paths.
#[derive(Error, Debug)]
pub enum RaidError {
    #[error("no route to remote: {0}")]
    Connectivity(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("operation not permitted: {0}")]
    Permission(String),

    #[error("remote rejected the payload: {fields}")]
    Validation { fields: serde_json::Value },

    #[error("entity not found")]
    NotFound,

    #[error("raid already holds its {limit} configured races")]
    Capacity { limit: u32 },

    #[error("composition rule violated: {0}")]
    Composition(#[from] CompositionViolation),

    #[error("unexpected status {status} from remote")]
    UnexpectedStatus { status: u16 },

    #[error("mapping error: {0}")]
    Mapping(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RaidError {
    /// True for failures caused by the network path, not by the request
    /// itself. These are the only errors the coordinator degrades on.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, RaidError::Connectivity(_))
    }

    /// True for failures that must reach the caller untouched: retrying
    /// or writing locally would persist invalid or unauthorized state.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            RaidError::Auth(_) | RaidError::Permission(_) | RaidError::Validation { .. }
        )
    }
}

/// Domain-level composition failures, always raised locally
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompositionViolation {
    #[error("member aged {age} is below the bracket floor of {minimum}")]
    BelowBracketFloor { age: u32, minimum: u32 },

    #[error("junior members (under {adult_floor}) require an escort aged {escort_floor} or more")]
    JuniorWithoutEscort { adult_floor: u32, escort_floor: u32 },

    #[error("bracket thresholds must be strictly increasing, got {a}, {b}, {c}")]
    UnorderedBrackets { a: u32, b: u32, c: u32 },

    #[error(
        "price ordering requires licensed ({licensed}) <= minor ({minor}) <= non-licensed ({non_licensed})"
    )]
    PriceOrdering {
        licensed: f64,
        minor: f64,
        non_licensed: f64,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RaidError>;

/// Where a read result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Served by the remote API and reconciled into the cache
    Fresh,
    /// Served from the local cache after a connectivity failure
    Cached,
}

/// A read result tagged with its origin
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub data: T,
    pub freshness: Freshness,
}

impl<T> Fetched<T> {
    pub fn fresh(data: T) -> Self {
        Self {
            data,
            freshness: Freshness::Fresh,
        }
    }

    pub fn cached(data: T) -> Self {
        Self {
            data,
            freshness: Freshness::Cached,
        }
    }

    pub fn is_cached(&self) -> bool {
        self.freshness == Freshness::Cached
    }
}

/// Outcome of a write-shape operation
///
/// `confirmed` is false when the write only reached the local store and
/// an outbound entry was queued; `id` is then a provisional clock-derived
/// identifier, replaced once the queue replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteAck {
    pub id: i64,
    pub confirmed: bool,
}

impl WriteAck {
    pub fn confirmed(id: i64) -> Self {
        Self {
            id,
            confirmed: true,
        }
    }

    pub fn pending(id: i64) -> Self {
        Self {
            id,
            confirmed: false,
        }
    }
}

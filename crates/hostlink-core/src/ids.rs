//! Correlation ids linking a request to its eventual response.
//!
//! Ids are plain integers on the wire. Two values are reserved:
//! - `0` marks a fire-and-forget request (no response expected)
//! - `-1` is returned by `invoke` when the transport is unavailable and is
//!   never transmitted

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

/// Integer id correlating a `Request` with its `Response`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(i64);

impl CorrelationId {
    /// Id carried by fire-and-forget requests.
    pub const EVENT: Self = Self(0);
    /// Sentinel returned when nothing could be transmitted.
    pub const UNAVAILABLE: Self = Self(-1);

    /// Wrap a raw wire value.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw wire value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Whether this id marks a fire-and-forget request.
    #[must_use]
    pub const fn is_event(self) -> bool {
        self.0 == 0
    }

    /// Whether this id expects exactly one response.
    #[must_use]
    pub const fn is_call(self) -> bool {
        self.0 > 0
    }

    /// Whether this is the "transport unavailable" sentinel.
    #[must_use]
    pub const fn is_unavailable(self) -> bool {
        self.0 == -1
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for CorrelationId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

/// Monotonic id source owned by one bridge instance.
///
/// Starts at 1 and increments forever. Ids are never reused and there is no
/// wraparound handling.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicI64,
}

impl IdAllocator {
    /// Create an allocator whose first id is 1.
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(1),
        }
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> CorrelationId {
        CorrelationId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// The id the next call to [`next_id`](Self::next_id) will return.
    pub fn peek(&self) -> CorrelationId {
        CorrelationId(self.next.load(Ordering::Relaxed))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

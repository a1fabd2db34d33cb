//! Exclusive processing lease.
//!
//! At most one of price validation, rule evaluation, or explanation
//! verification may be in flight for a line item. The lease carries an owner
//! and an expiry so a worker crash never strands the item: an expired lease
//! is treated as free.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use lineguard_core::WorkerId;

pub const DEFAULT_LEASE_TTL_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingLease {
    pub owner: WorkerId,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ProcessingLease {
    pub fn acquire(owner: WorkerId, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            owner,
            acquired_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn acquire_default(owner: WorkerId, now: DateTime<Utc>) -> Self {
        Self::acquire(owner, now, Duration::seconds(DEFAULT_LEASE_TTL_SECS))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// A lease still blocks other workers only while unexpired.
    pub fn blocks(&self, candidate: WorkerId, now: DateTime<Utc>) -> bool {
        self.owner != candidate && !self.is_expired(now)
    }
}

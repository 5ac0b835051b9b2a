//! Lock rows and acquisition results

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

use crate::clock::{elapsed_secs, parse_timestamp};

/// Lock key covering a whole store
pub const MAIN_LOCK_KEY: &str = "MAIN";

/// Opaque proof of ownership, minted fresh on every successful acquisition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LockToken(String);

impl LockToken {
    /// Mint a new random token
    pub fn mint() -> Self {
        LockToken(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Wrap a token read back from storage or supplied by a caller
    pub fn from_raw(raw: impl Into<String>) -> Self {
        LockToken(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of `app_writer_lock`, timestamps kept as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockRow {
    pub lock_key: String,
    pub holder: String,
    pub token: LockToken,
    pub acquired_at: String,
    pub heartbeat_at: String,
}

impl LockRow {
    pub fn heartbeat_time(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.heartbeat_at)
    }

    /// Seconds since the last heartbeat; `None` when the stored value does not parse
    pub fn age_secs(&self, now: NaiveDateTime) -> Option<i64> {
        self.heartbeat_time().map(|hb| elapsed_secs(hb, now))
    }

    /// A lease is stale once its age exceeds the timeout; unreadable heartbeats count as stale
    pub fn is_stale(&self, now: NaiveDateTime, timeout_secs: i64) -> bool {
        self.age_secs(now).map_or(true, |age| age > timeout_secs)
    }

    pub(crate) fn holder_info(&self, now: NaiveDateTime) -> LockHolder {
        LockHolder {
            lock_key: self.lock_key.clone(),
            holder: self.holder.clone(),
            acquired_at: self.acquired_at.clone(),
            heartbeat_at: self.heartbeat_at.clone(),
            age_secs: self.age_secs(now),
        }
    }
}

/// Who currently holds a lock, as shown to a caller that lost the race
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockHolder {
    pub lock_key: String,
    pub holder: String,
    pub acquired_at: String,
    pub heartbeat_at: String,
    pub age_secs: Option<i64>,
}

/// A lease won by this caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseGrant {
    pub lock_key: String,
    pub holder: String,
    pub token: LockToken,
    pub acquired_at: String,
    pub heartbeat_at: String,
    /// Previous holder when the lease was taken over after a timeout
    pub stolen_from: Option<String>,
}

/// Result of `LockManager::try_acquire`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired(LeaseGrant),
    Contended(LockHolder),
}

impl AcquireOutcome {
    pub fn acquired(&self) -> bool {
        matches!(self, AcquireOutcome::Acquired(_))
    }

    pub fn token(&self) -> Option<&LockToken> {
        match self {
            AcquireOutcome::Acquired(grant) => Some(&grant.token),
            AcquireOutcome::Contended(_) => None,
        }
    }

    /// Holder after the attempt: the caller on success, the incumbent on contention
    pub fn holder(&self) -> &str {
        match self {
            AcquireOutcome::Acquired(grant) => &grant.holder,
            AcquireOutcome::Contended(holder) => &holder.holder,
        }
    }

    pub fn heartbeat_at(&self) -> &str {
        match self {
            AcquireOutcome::Acquired(grant) => &grant.heartbeat_at,
            AcquireOutcome::Contended(holder) => &holder.heartbeat_at,
        }
    }

    pub fn acquired_at(&self) -> &str {
        match self {
            AcquireOutcome::Acquired(grant) => &grant.acquired_at,
            AcquireOutcome::Contended(holder) => &holder.acquired_at,
        }
    }

    pub fn into_grant(self) -> Option<LeaseGrant> {
        match self {
            AcquireOutcome::Acquired(grant) => Some(grant),
            AcquireOutcome::Contended(_) => None,
        }
    }
}

/// Rows targeted by a forced clear
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockTarget {
    All,
    Key(String),
}

impl fmt::Display for LockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockTarget::All => f.write_str("ALL"),
            LockTarget::Key(key) => f.write_str(key),
        }
    }
}

//! Retention policies and cutoff computation.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::dataset::{DatasetRecord, Policy};
use thiserror::Error;

/// Size thresholds are stored in gigabytes of 1024³ bytes.
pub const BYTES_PER_GIGABYTE: u64 = 1024 * 1024 * 1024;

pub const SECONDS_PER_DAY: u64 = 86_400;

/// A file is expired when it was last modified at or before the cutoff.
pub fn is_expired(cutoff: DateTime<Utc>, modified: DateTime<Utc>) -> bool {
    modified <= cutoff
}

/// How a sweep target decides which files to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Act on every file older than `max_age`.
    Age { max_age: Duration },
    /// Act on files in walk order until the subtree fits in `max_bytes`.
    Size { max_bytes: u64 },
}

impl RetentionPolicy {
    pub fn age_days(days: u64) -> Self {
        Self::Age {
            max_age: Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY)),
        }
    }

    pub fn size_gigabytes(gigabytes: u64) -> Self {
        Self::Size {
            max_bytes: gigabytes.saturating_mul(BYTES_PER_GIGABYTE),
        }
    }

    /// The policy a catalog record asks for, if it carries a usable one.
    ///
    /// Records flagged `integrity_error` and records without a threshold
    /// have none.
    pub fn from_record(record: &DatasetRecord) -> Option<Self> {
        let threshold = record.retention?;
        match record.policy {
            Policy::Age => Some(Self::age_days(threshold)),
            Policy::Size => Some(Self::size_gigabytes(threshold)),
            Policy::IntegrityError => None,
        }
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Age { max_age } => write!(f, "age > {}", humantime::format_duration(*max_age)),
            Self::Size { max_bytes } => write!(f, "size > {max_bytes} bytes"),
        }
    }
}

/// Computed cutoff for an age policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionCutoff {
    /// Files modified at or before this instant are expired.
    pub cutoff_timestamp: DateTime<Utc>,

    pub retention_period: Duration,
}

impl RetentionCutoff {
    pub fn compute(
        retention_period: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self, RetentionPolicyError> {
        let period = chrono::Duration::from_std(retention_period)
            .map_err(|_| RetentionPolicyError::CutoffUnderflow(retention_period))?;
        let cutoff_timestamp = now
            .checked_sub_signed(period)
            .ok_or(RetentionPolicyError::CutoffUnderflow(retention_period))?;

        Ok(Self {
            cutoff_timestamp,
            retention_period,
        })
    }

    pub fn is_expired(&self, modified: DateTime<Utc>) -> bool {
        is_expired(self.cutoff_timestamp, modified)
    }

    /// Human-readable representation for logging.
    pub fn display(&self) -> String {
        format!(
            "cutoff={}, period={}",
            self.cutoff_timestamp.to_rfc3339(),
            humantime::format_duration(self.retention_period)
        )
    }
}

#[derive(Error, Debug)]
pub enum RetentionPolicyError {
    /// The retention period reaches further back than representable time.
    #[error("Cutoff timestamp underflow for retention period {0:?}")]
    CutoffUnderflow(Duration),
}

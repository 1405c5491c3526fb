//! Delivery policy: what happens to a job once its attempt is over.
//!
//! The pipeline delivers at most once. A failed attempt is never retried or
//! re-enqueued; it is dropped, and the drop carries a reason for telemetry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::errors::{BlobError, JobError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    RateLimited,
    UnknownActor,
    BlobMissing,
    Validation,
    Provider,
    TimedOut,
    Parse,
    Panicked,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::RateLimited => "rate_limited",
            DropReason::UnknownActor => "unknown_actor",
            DropReason::BlobMissing => "blob_missing",
            DropReason::Validation => "validation",
            DropReason::Provider => "provider",
            DropReason::TimedOut => "timed_out",
            DropReason::Parse => "parse",
            DropReason::Panicked => "panicked",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&JobError> for DropReason {
    fn from(err: &JobError) -> Self {
        match err {
            JobError::RateLimited => DropReason::RateLimited,
            JobError::UnknownActor(_) => DropReason::UnknownActor,
            JobError::Blob(BlobError::NotFound(_) | BlobError::InvalidUtf8(_)) => {
                DropReason::BlobMissing
            }
            JobError::Validation(_) => DropReason::Validation,
            JobError::Provider(_) => DropReason::Provider,
            JobError::TimedOut { .. } => DropReason::TimedOut,
            JobError::Parse(_) => DropReason::Parse,
        }
    }
}

/// How one attempt ended, as seen by the consumer loop.
#[derive(Debug)]
pub enum Attempt<'a> {
    Succeeded,
    Failed(&'a JobError),
    Panicked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Completed,
    Dropped { reason: DropReason },
}

impl Settlement {
    /// Dropped jobs count against `errors`.
    pub fn counts_as_error(&self) -> bool {
        matches!(self, Settlement::Dropped { .. })
    }
}

pub trait DeliveryPolicy: Send + Sync {
    fn settle(&self, attempt: Attempt<'_>) -> Settlement;
}

/// Deliver at most once, drop on any failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtMostOnce;

impl DeliveryPolicy for AtMostOnce {
    fn settle(&self, attempt: Attempt<'_>) -> Settlement {
        match attempt {
            Attempt::Succeeded => Settlement::Completed,
            Attempt::Failed(err) => Settlement::Dropped {
                reason: DropReason::from(err),
            },
            Attempt::Panicked => Settlement::Dropped {
                reason: DropReason::Panicked,
            },
        }
    }
}

//! Queue module: delayed, at-most-once job delivery.

mod delay;
mod delivery;
mod memory;

pub use delay::DelayWindow;
pub use delivery::{AtMostOnce, Attempt, DeliveryPolicy, DropReason, Settlement};
pub use memory::InMemoryJobQueue;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Job, JobId, NewJob};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue is closed")]
    Closed,
}

/// A delivered job. The consumer owns it and must settle it exactly once.
///
/// - Queue は scheduled → in-flight → completed / dropped の遷移を管理
/// - Consumer は side effect を実行して結果を報告するだけ
#[async_trait]
pub trait JobLease: Send {
    fn job(&self) -> &Job;

    async fn settle(self: Box<Self>, settlement: Settlement);

    async fn complete(self: Box<Self>) {
        self.settle(Settlement::Completed).await
    }

    async fn discard(self: Box<Self>, reason: DropReason) {
        self.settle(Settlement::Dropped { reason }).await
    }
}

/// Queue port. The in-memory queue is the only implementation; persistence
/// across restarts is not a goal.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Schedule a job after a random delay from the queue's window.
    async fn enqueue(&self, job: NewJob) -> Result<JobId, QueueError>;

    /// Wait for the next eligible job; `None` once the queue is closed.
    async fn lease(&self) -> Option<Box<dyn JobLease>>;

    async fn counts(&self) -> QueueCounts;

    /// Stop delivery. Jobs still waiting for their delay are dropped silently.
    async fn close(&self);
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueCounts {
    pub scheduled: u64,
    pub in_flight: u64,
    pub completed: u64,
    pub dropped: u64,
    pub dropped_by_reason: BTreeMap<DropReason, u64>,
}

impl QueueCounts {
    /// Nothing waiting and nothing being processed.
    pub fn is_idle(&self) -> bool {
        self.scheduled == 0 && self.in_flight == 0
    }
}

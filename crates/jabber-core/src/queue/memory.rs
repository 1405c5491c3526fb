//! In-memory job queue.
//!
//! Scheduled jobs sit in a min-heap keyed by eligibility time. `lease` pops the
//! earliest eligible job or sleeps until the next one (or until an enqueue
//! wakes it up).

use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{DelayWindow, DropReason, JobLease, JobQueue, QueueCounts, QueueError, Settlement};
use crate::domain::{ActorId, Job, JobId, NewJob};
use crate::ports::IdGenerator;

/// Heap entry. Ordering is reversed so `BinaryHeap` pops the earliest first;
/// `seq` breaks ties in submission order.
#[derive(Debug)]
struct ScheduledJob {
    ready_at: Instant,
    seq: u64,
    job: Job,
}

impl PartialEq for ScheduledJob {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at && self.seq == other.seq
    }
}

impl Eq for ScheduledJob {}

impl PartialOrd for ScheduledJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (other.ready_at, other.seq).cmp(&(self.ready_at, self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    scheduled: BinaryHeap<ScheduledJob>,

    /// Latest eligibility time handed out per actor, for actors whose latest
    /// job is not yet eligible.
    last_ready: HashMap<ActorId, Instant>,

    next_seq: u64,
    in_flight: u64,
    completed: u64,
    dropped: HashMap<DropReason, u64>,
    closed: bool,
}

impl QueueState {
    fn counts(&self) -> QueueCounts {
        QueueCounts {
            scheduled: self.scheduled.len() as u64,
            in_flight: self.in_flight,
            completed: self.completed,
            dropped: self.dropped.values().sum(),
            dropped_by_reason: self.dropped.iter().map(|(k, v)| (*k, *v)).collect(),
        }
    }
}

pub struct InMemoryJobQueue {
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
    ids: Arc<dyn IdGenerator>,
    window: DelayWindow,
}

impl InMemoryJobQueue {
    pub fn new(window: DelayWindow, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            notify: Arc::new(Notify::new()),
            ids,
            window,
        }
    }

    pub fn window(&self) -> DelayWindow {
        self.window
    }

    /// Schedule with an explicit delay instead of sampling the window.
    ///
    /// A job never becomes eligible before an earlier job of the same actor.
    pub async fn enqueue_after(&self, new_job: NewJob, delay: Duration) -> Result<JobId, QueueError> {
        let job = Job::new(self.ids.generate_job_id(), new_job);
        let job_id = job.job_id;
        {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(QueueError::Closed);
            }

            let now = Instant::now();
            // 過ぎた ready_at は clamp に効かないので捨てる
            state.last_ready.retain(|_, at| *at > now);

            let mut ready_at = now + delay;
            if let Some(prev) = state.last_ready.get(&job.actor_id) {
                ready_at = ready_at.max(*prev);
            }
            state.last_ready.insert(job.actor_id.clone(), ready_at);

            let seq = state.next_seq;
            state.next_seq += 1;
            state.scheduled.push(ScheduledJob { ready_at, seq, job });
        }
        self.notify.notify_one();

        tracing::debug!(%job_id, delay_ms = delay.as_millis() as u64, "job scheduled");
        Ok(job_id)
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: NewJob) -> Result<JobId, QueueError> {
        let delay = self.window.sample();
        self.enqueue_after(job, delay).await
    }

    async fn lease(&self) -> Option<Box<dyn JobLease>> {
        loop {
            // waiter を lock 中に登録しておく（close の notify_waiters を取りこぼさない）
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_wake = {
                let mut state = self.state.lock().await;
                if state.closed {
                    return None;
                }

                let next = state.scheduled.peek().map(|entry| entry.ready_at);
                if next.is_some_and(|ready_at| ready_at <= Instant::now())
                    && let Some(entry) = state.scheduled.pop()
                {
                    state.in_flight += 1;
                    return Some(Box::new(InMemoryLease {
                        job: entry.job,
                        state: Arc::clone(&self.state),
                    }));
                }
                next
            };

            match next_wake {
                Some(wake_at) => {
                    tokio::select! {
                        _ = &mut notified => {},
                        _ = tokio::time::sleep_until(wake_at) => {},
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn counts(&self) -> QueueCounts {
        self.state.lock().await.counts()
    }

    async fn close(&self) {
        let pending = {
            let mut state = self.state.lock().await;
            state.closed = true;
            let pending = state.scheduled.len();
            state.scheduled.clear();
            pending
        };
        if pending > 0 {
            tracing::info!(pending, "queue closed, pending jobs dropped");
        }
        self.notify.notify_waiters();
    }
}

struct InMemoryLease {
    job: Job,
    state: Arc<Mutex<QueueState>>,
}

#[async_trait]
impl JobLease for InMemoryLease {
    fn job(&self) -> &Job {
        &self.job
    }

    async fn settle(self: Box<Self>, settlement: Settlement) {
        let mut state = self.state.lock().await;
        state.in_flight = state.in_flight.saturating_sub(1);
        match settlement {
            Settlement::Completed => state.completed += 1,
            Settlement::Dropped { reason } => *state.dropped.entry(reason).or_default() += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BlobId;
    use crate::ports::{SystemClock, UlidGenerator};
    use ulid::Ulid;

    fn queue(min_ms: u64, max_ms: u64) -> InMemoryJobQueue {
        InMemoryJobQueue::new(
            DelayWindow::from_millis(min_ms, max_ms),
            Arc::new(UlidGenerator::new(SystemClock)),
        )
    }

    fn new_job(actor: &str) -> NewJob {
        NewJob {
            actor_id: ActorId::new(actor),
            system_prompt_blob_id: BlobId::from(Ulid::new()),
            user_prompt_blob_id: BlobId::from(Ulid::new()),
        }
    }

    #[tokio::test]
    async fn degenerate_window_delivers_after_the_delay_and_not_before() {
        let queue = queue(100, 100);
        let started = Instant::now();
        let job_id = queue.enqueue(new_job("ann@corp.example")).await.unwrap();

        let early = tokio::time::timeout(Duration::from_millis(60), queue.lease()).await;
        assert!(early.is_err(), "delivered before the delay elapsed");

        let lease = queue.lease().await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(lease.job().job_id, job_id);
    }

    #[tokio::test]
    async fn lease_moves_job_to_in_flight_and_settle_counts_it() {
        let queue = queue(0, 0);
        queue.enqueue(new_job("ann@corp.example")).await.unwrap();
        queue.enqueue(new_job("bob@corp.example")).await.unwrap();
        assert_eq!(queue.counts().await.scheduled, 2);

        let first = queue.lease().await.unwrap();
        let counts = queue.counts().await;
        assert_eq!((counts.scheduled, counts.in_flight), (1, 1));

        first.complete().await;
        let second = queue.lease().await.unwrap();
        second.discard(DropReason::RateLimited).await;

        let counts = queue.counts().await;
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.dropped, 1);
        assert_eq!(counts.dropped_by_reason.get(&DropReason::RateLimited), Some(&1));
        assert!(counts.is_idle());
    }

    #[tokio::test]
    async fn actor_ordering_state_is_dropped_once_eligible() {
        let queue = queue(0, 0);
        queue
            .enqueue_after(new_job("ann@corp.example"), Duration::from_millis(5))
            .await
            .unwrap();
        queue
            .enqueue_after(new_job("bob@corp.example"), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(queue.state.lock().await.last_ready.len(), 2);

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue
            .enqueue_after(new_job("cy@corp.example"), Duration::ZERO)
            .await
            .unwrap();

        let state = queue.state.lock().await;
        assert!(!state.last_ready.contains_key(&ActorId::new("ann@corp.example")));
        assert!(state.last_ready.contains_key(&ActorId::new("bob@corp.example")));
    }

    #[tokio::test]
    async fn same_actor_jobs_keep_submission_order() {
        let queue = queue(0, 0);
        let ann_first = queue
            .enqueue_after(new_job("ann@corp.example"), Duration::from_millis(80))
            .await
            .unwrap();
        let ann_second = queue
            .enqueue_after(new_job("ann@corp.example"), Duration::from_millis(5))
            .await
            .unwrap();
        let bob = queue
            .enqueue_after(new_job("bob@corp.example"), Duration::from_millis(5))
            .await
            .unwrap();

        let mut order = Vec::new();
        for _ in 0..3 {
            let lease = queue.lease().await.unwrap();
            order.push(lease.job().job_id);
            lease.complete().await;
        }

        assert_eq!(order, vec![bob, ann_first, ann_second]);
    }

    #[tokio::test]
    async fn enqueue_wakes_a_waiting_lease() {
        let queue = Arc::new(queue(0, 0));
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.lease().await.map(|l| l.job().job_id) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let job_id = queue.enqueue(new_job("ann@corp.example")).await.unwrap();

        let leased = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(leased, Some(job_id));
    }

    #[tokio::test]
    async fn close_releases_waiters_and_rejects_new_jobs() {
        let queue = Arc::new(queue(10_000, 10_000));
        queue.enqueue(new_job("ann@corp.example")).await.unwrap();
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.lease().await.is_none() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        queue.close().await;

        assert!(tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap());
        assert!(matches!(
            queue.enqueue(new_job("ann@corp.example")).await,
            Err(QueueError::Closed)
        ));
        assert_eq!(queue.counts().await.scheduled, 0);
    }
}

//! WorkerGroup - consumer loop
//!
//! - queue から lease した job を actor ごとの lane（tokio task + mpsc）に流す
//! - lane は 1 件ずつ順番に処理する（同じ actor の会話に同時に書き込まない）
//! - 別 actor の lane は並行に走る
//! - job は lane 内で spawn して実行するので、panic しても lane は止まらない

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::app::processor::JobProcessor;
use crate::domain::actor::ActorId;
use crate::domain::stats::{Scope, StatKey};
use crate::ports::StatsSink;
use crate::queue::{Attempt, DeliveryPolicy, JobLease, JobQueue, Settlement};

/// What a lane needs to run and settle one job.
#[derive(Clone)]
struct LaneContext {
    processor: Arc<JobProcessor>,
    policy: Arc<dyn DeliveryPolicy>,
    stats: Arc<dyn StatsSink>,
}

/// Consumer handle.
/// - `request_shutdown` で lease を止める
/// - `shutdown_and_join` で lane が手元の job を終えるまで待つ
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerGroup {
    pub fn spawn(
        queue: Arc<dyn JobQueue>,
        processor: Arc<JobProcessor>,
        policy: Arc<dyn DeliveryPolicy>,
        stats: Arc<dyn StatsSink>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = LaneContext {
            processor,
            policy,
            stats,
        };
        let join = tokio::spawn(consumer_loop(queue, ctx, shutdown_rx));
        Self { shutdown_tx, join }
    }

    /// Stop taking new leases. Jobs already handed to a lane still run.
    pub fn request_shutdown(&self) {
        // receiver が既に drop されていても問題ない
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(err) = self.join.await {
            tracing::error!(error = %err, "consumer loop terminated abnormally");
        }
    }
}

async fn consumer_loop(
    queue: Arc<dyn JobQueue>,
    ctx: LaneContext,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut lanes: HashMap<ActorId, mpsc::UnboundedSender<Box<dyn JobLease>>> = HashMap::new();
    let mut lane_joins: Vec<JoinHandle<()>> = Vec::new();

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let lease = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            lease = queue.lease() => lease,
        };

        let Some(lease) = lease else {
            // queue closed
            break;
        };

        let actor_id = lease.job().actor_id.clone();
        let lane = lanes.entry(actor_id.clone()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            lane_joins.push(tokio::spawn(lane_loop(actor_id.clone(), rx, ctx.clone())));
            tx
        });
        if let Err(mpsc::error::SendError(lease)) = lane.send(lease) {
            tracing::error!(actor = %actor_id, "lane is gone, running job inline");
            run_one(lease, &ctx).await;
        }
    }

    // sender を落とすと lane は受信済みの job を処理してから終わる
    drop(lanes);
    for join in lane_joins {
        if let Err(err) = join.await {
            tracing::error!(error = %err, "lane terminated abnormally");
        }
    }
    tracing::debug!("consumer loop stopped");
}

async fn lane_loop(
    actor: ActorId,
    mut rx: mpsc::UnboundedReceiver<Box<dyn JobLease>>,
    ctx: LaneContext,
) {
    tracing::debug!(%actor, "lane started");
    while let Some(lease) = rx.recv().await {
        run_one(lease, &ctx).await;
    }
}

/// Run one job to completion and settle its lease. Never panics.
async fn run_one(lease: Box<dyn JobLease>, ctx: &LaneContext) {
    let job = lease.job().clone();
    let processor = Arc::clone(&ctx.processor);
    let handle = tokio::spawn({
        let job = job.clone();
        async move { processor.process(&job).await }
    });

    let result = handle.await;
    let settlement = match &result {
        Ok(Ok(_)) => ctx.policy.settle(Attempt::Succeeded),
        Ok(Err(err)) => ctx.policy.settle(Attempt::Failed(err)),
        Err(_) => ctx.policy.settle(Attempt::Panicked),
    };

    if let Settlement::Dropped { reason } = settlement {
        let error = match &result {
            Ok(Err(err)) => err.to_string(),
            Err(join_err) => join_err.to_string(),
            Ok(Ok(_)) => String::new(),
        };
        tracing::error!(
            job_id = %job.job_id,
            actor = %job.actor_id,
            %reason,
            %error,
            "job dropped"
        );
    }
    if settlement.counts_as_error() {
        match ctx.processor.directory.get(job.actor_id.as_str()) {
            Some(actor) => {
                ctx.stats
                    .increment_for_actor(&actor.name, StatKey::Errors, Scope::ActorAndOverall)
            }
            None => ctx.stats.increment_overall(StatKey::Errors),
        }
    }

    lease.settle(settlement).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::processor::tests::{fixture, job_for};
    use crate::domain::NewJob;
    use crate::queue::{AtMostOnce, DelayWindow, DropReason, InMemoryJobQueue};
    use crate::ports::{SystemClock, UlidGenerator};
    use std::time::Duration;

    fn queue() -> Arc<InMemoryJobQueue> {
        Arc::new(InMemoryJobQueue::new(
            DelayWindow::from_millis(0, 0),
            Arc::new(UlidGenerator::new(SystemClock)),
        ))
    }

    async fn wait_idle(queue: &InMemoryJobQueue) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if queue.counts().await.is_idle() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn failures_are_counted_and_dropped_while_the_loop_keeps_running() {
        let f = fixture(
            &["not json", r#"[{"kind":"bsky-post","content":"still alive"}]"#],
            5,
        );
        let stats = f.stats.clone();
        let feed = f.feed.clone();
        let bad = job_for(&f, "ann@corp.example", "s", "u1").await;
        let good = job_for(&f, "ann@corp.example", "s", "u2").await;
        let queue = queue();
        let workers = WorkerGroup::spawn(
            queue.clone(),
            Arc::new(f.processor),
            Arc::new(AtMostOnce),
            stats.clone(),
        );

        for job in [bad, good] {
            queue
                .enqueue(NewJob {
                    actor_id: job.actor_id,
                    system_prompt_blob_id: job.system_prompt_blob_id,
                    user_prompt_blob_id: job.user_prompt_blob_id,
                })
                .await
                .unwrap();
        }
        wait_idle(&queue).await;
        workers.shutdown_and_join().await;

        let counts = queue.counts().await;
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.dropped_by_reason.get(&DropReason::Parse), Some(&1));
        assert_eq!(feed.posts()[0].text, "still alive");

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.for_actor("Ann").errors, 1);
        assert_eq!(snapshot.overall.errors, 1);
        assert_eq!(snapshot.overall.posts_made, 1);
    }

    #[tokio::test]
    async fn unknown_actor_error_counts_overall_only() {
        let f = fixture(&[], 5);
        let stats = f.stats.clone();
        let job = job_for(&f, "ghost@corp.example", "s", "u").await;
        let queue = queue();
        let workers = WorkerGroup::spawn(
            queue.clone(),
            Arc::new(f.processor),
            Arc::new(AtMostOnce),
            stats.clone(),
        );

        queue
            .enqueue(NewJob {
                actor_id: job.actor_id,
                system_prompt_blob_id: job.system_prompt_blob_id,
                user_prompt_blob_id: job.user_prompt_blob_id,
            })
            .await
            .unwrap();
        wait_idle(&queue).await;
        workers.shutdown_and_join().await;

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.overall.errors, 1);
        assert!(snapshot.employee_stats.is_empty());
        assert_eq!(
            queue.counts().await.dropped_by_reason.get(&DropReason::UnknownActor),
            Some(&1)
        );
    }

    #[tokio::test]
    async fn same_actor_jobs_run_one_at_a_time_in_order() {
        let replies: Vec<String> = (0..4)
            .map(|i| format!(r#"[{{"kind":"bsky-post","content":"reply {i}"}}]"#))
            .collect();
        let refs: Vec<&str> = replies.iter().map(String::as_str).collect();
        let mut f = fixture(&refs, 10);
        f.processor.provider = Arc::new(
            crate::impls::ScriptedProvider::new(refs.iter().copied())
                .with_latency(Duration::from_millis(15)),
        );
        let conversations = f.conversations.clone();
        let mut jobs = Vec::new();
        for i in 0..4 {
            jobs.push(job_for(&f, "ann@corp.example", "s", &format!("email {i}")).await);
        }
        let queue = queue();
        let stats = f.stats.clone();
        let workers = WorkerGroup::spawn(
            queue.clone(),
            Arc::new(f.processor),
            Arc::new(AtMostOnce),
            stats,
        );

        for job in jobs {
            queue
                .enqueue(NewJob {
                    actor_id: job.actor_id,
                    system_prompt_blob_id: job.system_prompt_blob_id,
                    user_prompt_blob_id: job.user_prompt_blob_id,
                })
                .await
                .unwrap();
        }
        wait_idle(&queue).await;
        workers.shutdown_and_join().await;

        let history = conversations
            .history(&crate::domain::ActorId::new("ann@corp.example"))
            .await;
        let users: Vec<&str> = history
            .iter()
            .filter(|m| m.role == crate::domain::Role::User)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(users, vec!["email 0", "email 1", "email 2", "email 3"]);
        // user と assistant が交互に並ぶ
        for pair in history[1..].chunks(2) {
            assert_eq!(pair[0].role, crate::domain::Role::User);
            assert_eq!(pair[1].role, crate::domain::Role::Assistant);
        }
    }

    struct PanickingProvider;

    #[async_trait::async_trait]
    impl crate::ports::ChatProvider for PanickingProvider {
        async fn complete(
            &self,
            _request: &crate::ports::ChatRequest,
        ) -> Result<String, crate::domain::ProviderError> {
            panic!("provider blew up");
        }
    }

    #[tokio::test]
    async fn panicking_job_is_dropped_and_the_lane_survives() {
        let mut f = fixture(&[], 5);
        f.processor.provider = Arc::new(PanickingProvider);
        let stats = f.stats.clone();
        let first = job_for(&f, "ann@corp.example", "s", "u1").await;
        let second = job_for(&f, "ann@corp.example", "s", "u2").await;
        let queue = queue();
        let workers = WorkerGroup::spawn(
            queue.clone(),
            Arc::new(f.processor),
            Arc::new(AtMostOnce),
            stats.clone(),
        );

        for job in [first, second] {
            queue
                .enqueue(NewJob {
                    actor_id: job.actor_id,
                    system_prompt_blob_id: job.system_prompt_blob_id,
                    user_prompt_blob_id: job.user_prompt_blob_id,
                })
                .await
                .unwrap();
        }
        wait_idle(&queue).await;
        workers.shutdown_and_join().await;

        assert_eq!(
            queue.counts().await.dropped_by_reason.get(&DropReason::Panicked),
            Some(&2)
        );
        assert_eq!(stats.snapshot().for_actor("Ann").errors, 2);
    }

    #[tokio::test]
    async fn shutdown_with_an_idle_queue_returns() {
        let f = fixture(&[], 5);
        let stats = f.stats.clone();
        let workers = WorkerGroup::spawn(queue(), Arc::new(f.processor), Arc::new(AtMostOnce), stats);

        tokio::time::timeout(Duration::from_secs(1), workers.shutdown_and_join())
            .await
            .unwrap();
    }
}

//! JobProcessor - 1 job の処理
//!
//! 1. actor を directory から引く
//! 2. prompt blob を 2 つとも take する（片方が無くても両方消費する）
//! 3. rate limiter に通す
//! 4. 会話を組み立てて truncate
//! 5. provider 呼び出し（timeout 付き、temperature はランダム）
//! 6. 送った会話（truncate 済み）と応答を保存してから parse
//! 7. dispatcher で action を実行

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::app::conversations::ConversationStore;
use crate::app::dispatcher::ActionDispatcher;
use crate::app::truncate::Truncator;
use crate::domain::action::Action;
use crate::domain::actor::ActorDirectory;
use crate::domain::errors::{JobError, ProviderError};
use crate::domain::job::Job;
use crate::domain::message::Message;
use crate::domain::outcome::ActionOutcome;
use crate::ports::{BlobStore, ChatProvider, ChatRequest, RateLimiter};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureWindow {
    pub min: f64,
    pub max: f64,
}

impl TemperatureWindow {
    pub fn sample(&self) -> f64 {
        if self.min >= self.max {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }
}

pub struct JobProcessor {
    pub(crate) directory: Arc<ActorDirectory>,
    pub(crate) blobs: Arc<dyn BlobStore>,
    pub(crate) limiter: Arc<dyn RateLimiter>,
    pub(crate) provider: Arc<dyn ChatProvider>,
    pub(crate) conversations: Arc<ConversationStore>,
    pub(crate) truncator: Truncator,
    pub(crate) dispatcher: ActionDispatcher,
    pub(crate) temperature: TemperatureWindow,
    pub(crate) provider_timeout: Duration,
}

impl JobProcessor {
    #[tracing::instrument(
        name = "job",
        skip_all,
        fields(job_id = %job.job_id, actor = %job.actor_id)
    )]
    pub async fn process(&self, job: &Job) -> Result<Vec<ActionOutcome>, JobError> {
        let actor = self
            .directory
            .get(job.actor_id.as_str())
            .ok_or_else(|| JobError::UnknownActor(job.actor_id.clone()))?;

        let system_prompt = self.blobs.take_text(job.system_prompt_blob_id).await;
        let user_prompt = self.blobs.take_text(job.user_prompt_blob_id).await;
        let (system_prompt, user_prompt) = match (system_prompt, user_prompt) {
            (Ok(system), Ok(user)) => (system, user),
            (Err(err), _) | (_, Err(err)) => {
                tracing::warn!(error = %err, "prompt blob unavailable");
                return Err(err.into());
            }
        };

        if !self.limiter.try_acquire() {
            tracing::warn!("rate limit exceeded, job skipped");
            return Err(JobError::RateLimited);
        }

        let system = Message::system(job.job_id, system_prompt);
        let user = Message::user(job.job_id, user_prompt);
        let draft = self.conversations.draft(&job.actor_id, system, user).await;
        let messages = self.truncator.truncate(&draft)?;
        tracing::debug!(
            kept = messages.len(),
            history = draft.len(),
            cost = self.truncator.total_cost(&messages),
            "conversation truncated"
        );

        let request = ChatRequest {
            messages,
            temperature: self.temperature.sample(),
        };
        let reply = tokio::time::timeout(self.provider_timeout, self.provider.complete(&request))
            .await
            .map_err(|_| JobError::TimedOut {
                stage: "provider",
                after: self.provider_timeout,
            })??;
        if reply.trim().is_empty() {
            return Err(ProviderError::EmptyResponse.into());
        }

        let assistant = Message::assistant(job.job_id, reply.clone());
        self.conversations
            .record_turn(&job.actor_id, request.messages, assistant)
            .await;

        let actions = Action::parse_list(&reply)?;
        tracing::debug!(count = actions.len(), "provider reply parsed");

        Ok(self.dispatcher.dispatch(&actions, actor).await)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::app::stats::RuntimeStats;
    use crate::domain::actor::fixtures::actor;
    use crate::domain::errors::{BlobError, ValidationError};
    use crate::domain::message::Role;
    use crate::domain::{ActorId, JobId};
    use crate::impls::{
        DirectoryMailer, InMemoryBlobStore, RecordingFeed, RecordingTransport, ScriptedProvider,
        TokenBucket,
    };
    use crate::ports::{SystemClock, UlidGenerator};
    use ulid::Ulid;

    pub(crate) struct Fixture {
        pub processor: JobProcessor,
        pub blobs: Arc<InMemoryBlobStore>,
        pub provider: Arc<ScriptedProvider>,
        pub feed: Arc<RecordingFeed>,
        pub stats: Arc<RuntimeStats>,
        pub conversations: Arc<ConversationStore>,
    }

    pub(crate) fn fixture(replies: &[&str], rate_limit: u32) -> Fixture {
        let clock: Arc<SystemClock> = Arc::new(SystemClock);
        let directory = Arc::new(
            ActorDirectory::new(vec![
                actor("Ann", "ann@corp.example"),
                actor("Bob", "bob@corp.example"),
            ])
            .unwrap(),
        );
        let blobs = Arc::new(InMemoryBlobStore::new(
            Arc::new(UlidGenerator::new(SystemClock)),
            clock.clone(),
        ));
        let provider = Arc::new(ScriptedProvider::new(replies.iter().copied()));
        let feed = Arc::new(RecordingFeed::new());
        let stats = Arc::new(RuntimeStats::new());
        let conversations = Arc::new(ConversationStore::new());
        let dispatcher = ActionDispatcher::new(
            feed.clone(),
            Arc::new(DirectoryMailer::new(
                Arc::clone(&directory),
                RecordingTransport::new(),
            )),
            stats.clone(),
            Duration::from_secs(5),
        );
        let processor = JobProcessor {
            directory,
            blobs: blobs.clone(),
            limiter: Arc::new(TokenBucket::new(rate_limit, Duration::from_secs(600), clock)),
            provider: provider.clone(),
            conversations: conversations.clone(),
            truncator: Truncator::new(67_336, 342),
            dispatcher,
            temperature: TemperatureWindow { min: 0.01, max: 0.6 },
            provider_timeout: Duration::from_secs(5),
        };
        Fixture {
            processor,
            blobs,
            provider,
            feed,
            stats,
            conversations,
        }
    }

    pub(crate) async fn job_for(f: &Fixture, actor: &str, system: &str, user: &str) -> Job {
        Job::new(
            JobId::from(Ulid::new()),
            crate::domain::NewJob {
                actor_id: ActorId::new(actor),
                system_prompt_blob_id: f.blobs.store_text(system).await,
                user_prompt_blob_id: f.blobs.store_text(user).await,
            },
        )
    }

    #[tokio::test]
    async fn happy_path_posts_and_records_the_turn() {
        let f = fixture(&[r#"[{"kind":"bsky-post","content":"hello world"}]"#], 5);
        let job = job_for(&f, "ann@corp.example", "You are Ann.", "Subject: hi").await;

        let outcomes = f.processor.process(&job).await.unwrap();

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_success());
        assert_eq!(f.feed.posts()[0].text, "hello world");

        let history = f.conversations.history(&job.actor_id).await;
        assert_eq!(
            history.iter().map(|m| m.role).collect::<Vec<_>>(),
            vec![Role::System, Role::User, Role::Assistant]
        );
        assert!(f.blobs.is_empty().await);

        let request = &f.provider.requests()[0];
        assert!((0.01..=0.6).contains(&request.temperature));
        assert_eq!(request.messages.len(), 2);
    }

    #[tokio::test]
    async fn second_job_sees_previous_turns() {
        let f = fixture(
            &[
                r#"[{"kind":"bsky-post","content":"one"}]"#,
                r#"[{"kind":"bsky-post","content":"two"}]"#,
            ],
            5,
        );
        let first = job_for(&f, "ann@corp.example", "sys", "first email").await;
        let second = job_for(&f, "ann@corp.example", "sys", "second email").await;

        f.processor.process(&first).await.unwrap();
        f.processor.process(&second).await.unwrap();

        let sent = &f.provider.requests()[1].messages;
        assert_eq!(
            sent.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            vec!["sys", "first email", r#"[{"kind":"bsky-post","content":"one"}]"#, "second email"]
        );
    }

    #[tokio::test]
    async fn unknown_actor_is_rejected_before_anything_runs() {
        let f = fixture(&[], 5);
        let job = job_for(&f, "nobody@corp.example", "s", "u").await;

        let err = f.processor.process(&job).await.unwrap_err();

        assert!(matches!(err, JobError::UnknownActor(_)));
        assert!(f.provider.requests().is_empty());
    }

    #[tokio::test]
    async fn missing_blob_abandons_the_job_and_consumes_the_other() {
        let f = fixture(&["[]"], 5);
        let job = job_for(&f, "ann@corp.example", "s", "u").await;
        f.blobs.take(job.system_prompt_blob_id).await.unwrap();

        let err = f.processor.process(&job).await.unwrap_err();

        assert!(matches!(err, JobError::Blob(BlobError::NotFound(id)) if id == job.system_prompt_blob_id));
        assert!(f.blobs.is_empty().await);
        assert!(f.provider.requests().is_empty());
    }

    #[tokio::test]
    async fn denied_rate_limit_skips_the_provider() {
        let f = fixture(&[r#"[{"kind":"bsky-post","content":"x"}]"#], 1);
        let first = job_for(&f, "ann@corp.example", "s", "u1").await;
        let second = job_for(&f, "ann@corp.example", "s", "u2").await;

        f.processor.process(&first).await.unwrap();
        let err = f.processor.process(&second).await.unwrap_err();

        assert!(matches!(err, JobError::RateLimited));
        assert_eq!(f.provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn unparseable_reply_is_kept_in_history() {
        let f = fixture(&["I'd rather not."], 5);
        let job = job_for(&f, "ann@corp.example", "s", "u").await;

        let err = f.processor.process(&job).await.unwrap_err();

        assert!(matches!(err, JobError::Parse(_)));
        let history = f.conversations.history(&job.actor_id).await;
        assert_eq!(history.last().map(|m| m.content.as_str()), Some("I'd rather not."));
        assert!(f.feed.posts().is_empty());
    }

    #[tokio::test]
    async fn stored_history_stays_within_the_budget() {
        let replies: Vec<String> = (0..60)
            .map(|n| format!(r#"[{{"kind":"bsky-post","content":"post {n}"}}]"#))
            .collect();
        let refs: Vec<&str> = replies.iter().map(String::as_str).collect();
        let mut f = fixture(&refs, 60);
        f.processor.truncator = Truncator::new(2_342, 342);
        let ann = ActorId::new("ann@corp.example");

        for n in 0..60 {
            let user = format!("{n:04}{}", "x".repeat(996));
            let job = job_for(&f, "ann@corp.example", "You are Ann.", &user).await;
            f.processor.process(&job).await.unwrap();
        }

        let history = f.conversations.history(&ann).await;
        let (reply, sent) = history.split_last().unwrap();
        assert_eq!(reply.role, Role::Assistant);
        assert!(f.processor.truncator.total_cost(sent) <= f.processor.truncator.budget() + 1e-6);
        // system + 2 通分の user/assistant + 今回の user + reply 程度に収まる
        assert!(history.len() < 20, "stored {} messages", history.len());
        assert!(sent.last().unwrap().content.starts_with("0059"));

        let last_request = f.provider.requests().pop().unwrap();
        assert_eq!(last_request.messages, sent);
    }

    #[tokio::test]
    async fn oversized_framing_is_a_validation_error() {
        let mut f = fixture(&["[]"], 5);
        f.processor.truncator = Truncator::new(400, 342);
        let job = job_for(&f, "ann@corp.example", &"s".repeat(100), "u").await;

        let err = f.processor.process(&job).await.unwrap_err();

        assert!(matches!(
            err,
            JobError::Validation(ValidationError::OverBudget { .. })
        ));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let mut f = fixture(&[], 5);
        f.processor.provider = Arc::new(
            ScriptedProvider::new(["[]"]).with_latency(Duration::from_millis(200)),
        );
        f.processor.provider_timeout = Duration::from_millis(20);
        let job = job_for(&f, "ann@corp.example", "s", "u").await;

        let err = f.processor.process(&job).await.unwrap_err();

        assert!(matches!(err, JobError::TimedOut { stage: "provider", .. }));
        assert!(f.conversations.history(&job.actor_id).await.is_empty());
    }

    #[test]
    fn temperature_stays_in_window() {
        let window = TemperatureWindow { min: 0.01, max: 0.6 };
        for _ in 0..500 {
            assert!((0.01..=0.6).contains(&window.sample()));
        }
        assert_eq!(TemperatureWindow { min: 0.3, max: 0.3 }.sample(), 0.3);
    }
}

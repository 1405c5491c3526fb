//! PipelineBuilder - パイプラインの構築とワイヤリング
//!
//! - 外部 integration（provider, SNS, mail）と actor directory は必須
//! - build() 時に不足分をまとめて報告する（Fail-fast）
//! - 設定は build() の中で validate する

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::app::config::{ConfigError, PipelineConfig};
use crate::app::conversations::ConversationStore;
use crate::app::dispatcher::ActionDispatcher;
use crate::app::gc_loop::GcLoop;
use crate::app::ingest::{InboundEmail, IngestReport, Ingestor};
use crate::app::processor::{JobProcessor, TemperatureWindow};
use crate::app::stats::RuntimeStats;
use crate::app::status::PipelineStatus;
use crate::app::truncate::Truncator;
use crate::app::worker_loop::WorkerGroup;
use crate::domain::actor::ActorDirectory;
use crate::domain::stats::StatsSnapshot;
use crate::impls::{DirectoryMailer, InMemoryBlobStore, TokenBucket};
use crate::ports::{
    BlobStore, ChatProvider, Clock, IdGenerator, MailTransport, SocialFeed, SystemClock,
    UlidGenerator,
};
use crate::queue::{AtMostOnce, DeliveryPolicy, InMemoryJobQueue, JobQueue, QueueCounts, QueueError};

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing components: {0:?}. These must be provided before build().")]
    Missing(Vec<&'static str>),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// # 使用例
/// ```ignore
/// let pipeline = PipelineBuilder::new(config)
///     .directory(directory)
///     .provider(provider)
///     .feed(feed)
///     .mail_transport(transport)
///     .build()?;
/// let running = pipeline.start();
/// ```
pub struct PipelineBuilder {
    config: PipelineConfig,
    directory: Option<Arc<ActorDirectory>>,
    provider: Option<Arc<dyn ChatProvider>>,
    feed: Option<Arc<dyn SocialFeed>>,
    transport: Option<Arc<dyn MailTransport>>,
    clock: Arc<dyn Clock>,
    policy: Arc<dyn DeliveryPolicy>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            directory: None,
            provider: None,
            feed: None,
            transport: None,
            clock: Arc::new(SystemClock),
            policy: Arc::new(AtMostOnce),
        }
    }

    pub fn directory(mut self, directory: ActorDirectory) -> Self {
        self.directory = Some(Arc::new(directory));
        self
    }

    pub fn provider(mut self, provider: Arc<dyn ChatProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn feed(mut self, feed: Arc<dyn SocialFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Raw transport. The pipeline wraps it in the directory allow-list.
    pub fn mail_transport(mut self, transport: Arc<dyn MailTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn delivery_policy(mut self, policy: Arc<dyn DeliveryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> Result<Pipeline, BuildError> {
        let mut missing = Vec::new();
        if self.directory.is_none() {
            missing.push("directory");
        }
        if self.provider.is_none() {
            missing.push("provider");
        }
        if self.feed.is_none() {
            missing.push("feed");
        }
        if self.transport.is_none() {
            missing.push("mail_transport");
        }
        let (Some(directory), Some(provider), Some(feed), Some(transport)) =
            (self.directory, self.provider, self.feed, self.transport)
        else {
            return Err(BuildError::Missing(missing));
        };

        let config = self.config;
        config.validate()?;

        let clock = self.clock;
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(Arc::clone(&clock)));

        let mut blob_store = InMemoryBlobStore::new(Arc::clone(&ids), Arc::clone(&clock));
        if let Some(ttl) = config.blob_ttl() {
            blob_store = blob_store.with_ttl(ttl);
        }
        let blobs: Arc<dyn BlobStore> = Arc::new(blob_store);
        let queue = Arc::new(InMemoryJobQueue::new(config.delay_window(), ids));
        let stats = Arc::new(RuntimeStats::new());
        let conversations = Arc::new(ConversationStore::new());

        let mailer = Arc::new(DirectoryMailer::new(Arc::clone(&directory), transport));
        let dispatcher = ActionDispatcher::new(
            Arc::clone(&feed),
            mailer,
            stats.clone(),
            config.integration_timeout(),
        );
        let processor = Arc::new(JobProcessor {
            directory: Arc::clone(&directory),
            blobs: Arc::clone(&blobs),
            limiter: Arc::new(TokenBucket::new(
                config.rate_limit_amount,
                config.rate_limit_interval(),
                clock,
            )),
            provider,
            conversations: Arc::clone(&conversations),
            truncator: Truncator::from_config(&config),
            dispatcher,
            temperature: TemperatureWindow {
                min: config.min_temperature,
                max: config.max_temperature,
            },
            provider_timeout: config.provider_timeout(),
        });
        let ingestor = Ingestor::new(
            Arc::clone(&directory),
            Arc::clone(&blobs),
            queue.clone(),
            feed,
            stats.clone(),
            config.integration_timeout(),
        );

        Ok(Pipeline {
            config,
            directory,
            blobs,
            queue,
            stats,
            conversations,
            processor,
            ingestor,
            policy: self.policy,
        })
    }
}

/// A wired but not yet running pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    directory: Arc<ActorDirectory>,
    blobs: Arc<dyn BlobStore>,
    queue: Arc<InMemoryJobQueue>,
    stats: Arc<RuntimeStats>,
    conversations: Arc<ConversationStore>,
    processor: Arc<JobProcessor>,
    ingestor: Ingestor,
    policy: Arc<dyn DeliveryPolicy>,
}

impl Pipeline {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn directory(&self) -> &ActorDirectory {
        &self.directory
    }

    pub fn blobs(&self) -> Arc<dyn BlobStore> {
        Arc::clone(&self.blobs)
    }

    pub fn queue(&self) -> Arc<InMemoryJobQueue> {
        Arc::clone(&self.queue)
    }

    pub async fn receive(&self, email: &InboundEmail) -> Result<IngestReport, QueueError> {
        self.ingestor.receive(email).await
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub async fn queue_counts(&self) -> QueueCounts {
        self.queue.counts().await
    }

    pub async fn status(&self, with_conversations: bool) -> PipelineStatus {
        let conversations = if with_conversations {
            self.conversations.snapshot().await
        } else {
            Default::default()
        };
        PipelineStatus {
            stats: self.stats(),
            queue: self.queue_counts().await,
            conversations,
        }
    }

    /// Start the consumer loop and the blob reaper.
    pub fn start(&self) -> RunningPipeline {
        let workers = WorkerGroup::spawn(
            self.queue.clone(),
            Arc::clone(&self.processor),
            Arc::clone(&self.policy),
            self.stats.clone(),
        );
        let (gc_shutdown, gc_rx) = watch::channel(false);
        let gc = GcLoop::new(Arc::clone(&self.blobs), self.config.reaper_interval());
        let gc_join = tokio::spawn(gc.run(gc_rx));
        tracing::info!(actors = self.directory.len(), "pipeline started");

        RunningPipeline {
            queue: self.queue.clone(),
            workers,
            gc_shutdown,
            gc_join,
        }
    }
}

pub struct RunningPipeline {
    queue: Arc<InMemoryJobQueue>,
    workers: WorkerGroup,
    gc_shutdown: watch::Sender<bool>,
    gc_join: JoinHandle<()>,
}

impl RunningPipeline {
    /// Close the queue (pending jobs are dropped), let lanes finish the job in
    /// hand, then stop the reaper.
    pub async fn shutdown(self) {
        self.queue.close().await;
        self.workers.shutdown_and_join().await;
        let _ = self.gc_shutdown.send(true);
        if let Err(err) = self.gc_join.await {
            tracing::error!(error = %err, "blob gc terminated abnormally");
        }
        tracing::info!("pipeline stopped");
    }
}

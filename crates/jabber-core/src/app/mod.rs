//! App - アプリケーション層
//!
//! ports を組み合わせてパイプラインを実装します。
//!
//! # 主要コンポーネント
//! - **PipelineBuilder**: ワイヤリングと起動時検証
//! - **Ingestor**: inbound email → blob + job
//! - **JobProcessor**: 1 job の処理（blob → truncate → provider → dispatch）
//! - **ActionDispatcher**: action ごとの integration 呼び出し
//! - **WorkerGroup**: consumer loop と actor ごとの lane
//! - **GcLoop**: 期限切れ blob の回収

pub mod builder;
pub mod config;
pub mod conversations;
pub mod dispatcher;
pub mod gc_loop;
pub mod ingest;
pub mod processor;
pub mod stats;
pub mod status;
pub mod truncate;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, Pipeline, PipelineBuilder, RunningPipeline};
pub use self::config::{ConfigError, PipelineConfig};
pub use self::conversations::ConversationStore;
pub use self::dispatcher::ActionDispatcher;
pub use self::gc_loop::GcLoop;
pub use self::ingest::{InboundEmail, IngestReport, Ingestor};
pub use self::processor::{JobProcessor, TemperatureWindow};
pub use self::stats::RuntimeStats;
pub use self::status::PipelineStatus;
pub use self::truncate::Truncator;
pub use self::worker_loop::WorkerGroup;

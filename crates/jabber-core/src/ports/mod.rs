//! Ports - 抽象化レイヤー
//!
//! 外部システム（LLM プロバイダ、SNS、メール、Blob storage、rate limit）への
//! インターフェースを trait として定義します。
//! 実装は `impls`（in-memory / テスト用）か、crate の外に置きます。

pub mod blob_store;
pub mod clock;
pub mod id_generator;
pub mod mailer;
pub mod provider;
pub mod rate_limiter;
pub mod social;
pub mod stats_sink;

pub use self::blob_store::BlobStore;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::mailer::{MailTransport, OutgoingEmail};
pub use self::provider::{ChatProvider, ChatRequest};
pub use self::rate_limiter::RateLimiter;
pub use self::social::{PostRef, ReplyTo, SocialFeed};
pub use self::stats_sink::StatsSink;

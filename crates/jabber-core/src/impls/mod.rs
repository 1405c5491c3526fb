//! Impls - ports の in-process 実装
//!
//! - **InMemoryBlobStore**: TTL 付きの destructive-read blob storage
//! - **TokenBucket**: Clock ベースの rate limiter
//! - **DirectoryMailer**: allow-list を強制する MailTransport decorator
//! - **ScriptedProvider / RecordingFeed / RecordingTransport**: テストと `simulate` 用

pub mod directory_mailer;
pub mod inmem_blob;
pub mod recording_feed;
pub mod scripted_provider;
pub mod token_bucket;

pub use self::directory_mailer::{DirectoryMailer, RecordingTransport};
pub use self::inmem_blob::InMemoryBlobStore;
pub use self::recording_feed::{PublishedPost, RecordingFeed};
pub use self::scripted_provider::ScriptedProvider;
pub use self::token_bucket::TokenBucket;

//! jabber-core
//!
//! Email → provider → action pipeline.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, actor, job, message, action, outcome, stats, errors）
//! - **ports**: 抽象化レイヤー（BlobStore, RateLimiter, ChatProvider, SocialFeed, MailTransport, ...）
//! - **impls**: in-process 実装（InMemoryBlobStore, TokenBucket, DirectoryMailer, ...）
//! - **queue**: 遅延付き at-most-once job queue
//! - **app**: アプリケーションロジック（ingest, processor, dispatcher, worker_loop, builder）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;

//! ChatProvider port - 生成テキストのプロバイダ
//!
//! The wire protocol lives outside this crate; the pipeline only needs "send
//! these messages, get text back".

use async_trait::async_trait;

use crate::domain::errors::ProviderError;
use crate::domain::message::Message;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub temperature: f64,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Return the content of the first completion choice.
    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError>;
}

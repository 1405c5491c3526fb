//! Offline integrations for `jabber simulate`.
//!
//! Nothing leaves the process: posts and emails are written to the log, and
//! provider replies come from a canned file.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use jabber_core::domain::{Actor, ActorDirectory, IntegrationError, ProviderError};
use jabber_core::ports::{ChatProvider, ChatRequest, MailTransport, OutgoingEmail, PostRef, ReplyTo, SocialFeed};

#[derive(Debug, Default)]
pub struct LoggingFeed {
    next: AtomicU64,
}

#[async_trait]
impl SocialFeed for LoggingFeed {
    async fn publish(
        &self,
        actor: &Actor,
        text: &str,
        reply_to: Option<&ReplyTo>,
    ) -> Result<PostRef, IntegrationError> {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        let post = PostRef {
            uri: format!("at://{}/app.bsky.feed.post/{n}", actor.bsky.identifier),
            cid: format!("console-{n}"),
        };
        tracing::info!(
            actor = %actor.name,
            uri = %post.uri,
            reply_to = reply_to.map(|r| r.parent.uri.as_str()).unwrap_or("-"),
            text,
            "post published"
        );
        Ok(post)
    }
}

#[derive(Debug, Default)]
pub struct LoggingTransport;

#[async_trait]
impl MailTransport for LoggingTransport {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<(), IntegrationError> {
        tracing::info!(
            from = %email.from,
            to = %email.to,
            cc = ?email.cc,
            subject = %email.subject,
            "email delivered"
        );
        Ok(())
    }
}

/// Replies keyed by actor. The request's system prompt identifies the actor.
#[derive(Debug)]
pub struct CannedReplies {
    by_system_prompt: HashMap<String, String>,
}

impl CannedReplies {
    /// `replies` maps actor name to the raw reply. Non-string JSON values are
    /// serialized, so a file can hold the action list directly.
    pub fn new(
        directory: &ActorDirectory,
        replies: HashMap<String, serde_json::Value>,
    ) -> anyhow::Result<Self> {
        let mut by_system_prompt = HashMap::new();
        for (name, reply) in replies {
            let actor = directory
                .actors()
                .find(|a| a.name == name)
                .ok_or_else(|| anyhow::anyhow!("reply for unknown actor {name:?}"))?;
            let raw = match reply {
                serde_json::Value::String(s) => s,
                other => serde_json::to_string(&other)?,
            };
            by_system_prompt.insert(actor.system_prompt.clone(), raw);
        }
        Ok(Self { by_system_prompt })
    }
}

#[async_trait]
impl ChatProvider for CannedReplies {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ProviderError> {
        let system = request
            .messages
            .first()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        tracing::debug!(
            messages = request.messages.len(),
            temperature = request.temperature,
            "canned completion"
        );
        self.by_system_prompt
            .get(system)
            .cloned()
            .ok_or_else(|| ProviderError::Request("no canned reply for this actor".to_string()))
    }
}

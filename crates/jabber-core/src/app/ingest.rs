//! Ingest - inbound email を job に変換する
//!
//! 受信者（OriginalRecipient, Cc, Bcc）ごとに:
//! 1. directory で actor を引く（いなければ overall の errors）
//! 2. SNS の session を確認（失敗したら actor の errors）
//! 3. メール本文と actor の system prompt を blob に置いて enqueue

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::actor::ActorDirectory;
use crate::domain::ids::JobId;
use crate::domain::job::NewJob;
use crate::domain::stats::{Scope, StatKey};
use crate::ports::{BlobStore, SocialFeed, StatsSink};
use crate::queue::{JobQueue, QueueError};

/// Inbound webhook payload (the mail provider's field names).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InboundEmail {
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub cc: Option<String>,
    #[serde(default)]
    pub bcc: Option<String>,
    pub original_recipient: String,
    #[serde(default)]
    pub subject: String,
    #[serde(rename = "MessageID", default)]
    pub message_id: String,
    #[serde(default)]
    pub text_body: Option<String>,
    #[serde(default)]
    pub html_body: Option<String>,
}

impl InboundEmail {
    /// HTML when it has content, otherwise the text part. `None` if both are blank.
    pub fn body(&self) -> Option<&str> {
        let html = self.html_body.as_deref().filter(|b| !b.trim().is_empty());
        html.or(self.text_body.as_deref())
            .filter(|b| !b.trim().is_empty())
    }

    /// OriginalRecipient, then Bcc, then Cc entries; trimmed, de-duplicated.
    pub fn recipients(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        std::iter::once(self.original_recipient.as_str())
            .chain(self.bcc.as_deref().into_iter().flat_map(|s| s.split(',')))
            .chain(self.cc.as_deref().into_iter().flat_map(|s| s.split(',')))
            .map(str::trim)
            .filter(|address| !address.is_empty())
            .filter(|address| seen.insert(address.to_string()))
            .map(str::to_string)
            .collect()
    }

    /// The user prompt handed to the provider.
    pub fn render(&self, body: &str) -> String {
        let mut out = format!("To: {}\nFrom: {}\n", self.original_recipient, self.from);
        if let Some(cc) = self.cc.as_deref().filter(|s| !s.is_empty()) {
            out.push_str(&format!("CC: {cc}\n"));
        }
        if let Some(bcc) = self.bcc.as_deref().filter(|s| !s.is_empty()) {
            out.push_str(&format!("BCC: {bcc}\n"));
        }
        out.push_str(&format!("Subject: {}\nBody:\n\n{body}", self.subject));
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub empty_body: bool,
    /// (actor email, job id)
    pub enqueued: Vec<(String, JobId)>,
    pub unknown_recipients: Vec<String>,
    pub session_failures: Vec<String>,
}

pub struct Ingestor {
    directory: Arc<ActorDirectory>,
    blobs: Arc<dyn BlobStore>,
    queue: Arc<dyn JobQueue>,
    feed: Arc<dyn SocialFeed>,
    stats: Arc<dyn StatsSink>,
    session_timeout: Duration,
}

impl Ingestor {
    pub fn new(
        directory: Arc<ActorDirectory>,
        blobs: Arc<dyn BlobStore>,
        queue: Arc<dyn JobQueue>,
        feed: Arc<dyn SocialFeed>,
        stats: Arc<dyn StatsSink>,
        session_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            blobs,
            queue,
            feed,
            stats,
            session_timeout,
        }
    }

    #[tracing::instrument(name = "ingest", skip_all, fields(from = %email.from, message_id = %email.message_id))]
    pub async fn receive(&self, email: &InboundEmail) -> Result<IngestReport, QueueError> {
        let mut report = IngestReport::default();

        let Some(body) = email.body() else {
            tracing::warn!("email has an empty body");
            self.stats.increment_overall(StatKey::Errors);
            report.empty_body = true;
            return Ok(report);
        };
        self.stats.increment_overall(StatKey::EmailsReceived);

        for address in email.recipients() {
            let Some(actor) = self.directory.get(&address) else {
                tracing::warn!(recipient = %address, "no actor for recipient");
                self.stats.increment_overall(StatKey::Errors);
                report.unknown_recipients.push(address);
                continue;
            };

            // overall の emails_received は上で数えた
            self.stats
                .increment_for_actor(&actor.name, StatKey::EmailsReceived, Scope::ActorOnly);

            let session = tokio::time::timeout(self.session_timeout, self.feed.ensure_session(actor))
                .await
                .unwrap_or(Err(crate::domain::IntegrationError::TimedOut(self.session_timeout)));
            if let Err(err) = session {
                tracing::error!(actor = %actor.name, error = %err, "social session unavailable");
                self.stats
                    .increment_for_actor(&actor.name, StatKey::Errors, Scope::ActorAndOverall);
                report.session_failures.push(address);
                continue;
            }

            let user_prompt_blob_id = self.blobs.store_text(&email.render(body)).await;
            let system_prompt_blob_id = self.blobs.store_text(&actor.system_prompt).await;
            let job_id = self
                .queue
                .enqueue(NewJob {
                    actor_id: actor.id().clone(),
                    system_prompt_blob_id,
                    user_prompt_blob_id,
                })
                .await?;
            tracing::info!(actor = %actor.name, %job_id, "job enqueued");
            report.enqueued.push((actor.email.to_string(), job_id));
        }

        Ok(report)
    }
}

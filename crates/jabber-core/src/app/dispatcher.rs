//! ActionDispatcher - provider の指示を各 integration に振り分ける
//!
//! - action ごとに独立して成功/失敗を記録する（最初の失敗で止めない）
//! - 成功カウンタは integration が成功を返したときだけ増やす
//! - thread は 1 投稿ごとに `posts_made` を 1 増やす。途中で失敗したら
//!   `errors` を 1 増やし、残りの entry は投稿しない

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::action::Action;
use crate::domain::actor::Actor;
use crate::domain::errors::IntegrationError;
use crate::domain::outcome::{ActionOutcome, Artifact};
use crate::domain::stats::{Scope, StatKey};
use crate::ports::{MailTransport, OutgoingEmail, PostRef, ReplyTo, SocialFeed, StatsSink};

pub struct ActionDispatcher {
    feed: Arc<dyn SocialFeed>,
    mailer: Arc<dyn MailTransport>,
    stats: Arc<dyn StatsSink>,
    integration_timeout: Duration,
}

impl ActionDispatcher {
    pub fn new(
        feed: Arc<dyn SocialFeed>,
        mailer: Arc<dyn MailTransport>,
        stats: Arc<dyn StatsSink>,
        integration_timeout: Duration,
    ) -> Self {
        Self {
            feed,
            mailer,
            stats,
            integration_timeout,
        }
    }

    /// Run every action in order. One outcome per action, same order.
    pub async fn dispatch(&self, actions: &[Action], actor: &Actor) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::with_capacity(actions.len());
        for (index, action) in actions.iter().enumerate() {
            let outcome = self.run(index, action, actor).await;
            if outcome.is_success() {
                tracing::info!(actor = %actor.name, action = %outcome.action, index, "action succeeded");
            } else {
                self.stats
                    .increment_for_actor(&actor.name, StatKey::Errors, Scope::ActorAndOverall);
                tracing::error!(
                    actor = %actor.name,
                    action = %outcome.action,
                    index,
                    reason = outcome.reason.as_deref().unwrap_or_default(),
                    "action failed"
                );
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn run(&self, index: usize, action: &Action, actor: &Actor) -> ActionOutcome {
        let kind = action.kind();
        match action {
            Action::BskyPost { content } => match self.post(actor, content, None).await {
                Ok(post) => ActionOutcome::success(index, kind)
                    .with_artifacts(vec![Artifact::PostUri(post.uri)]),
                Err(err) => ActionOutcome::failure(index, kind, err.to_string()),
            },
            Action::BskyThread { content } => {
                let (published, result) = self.publish_thread(actor, content).await;
                let artifacts = published
                    .into_iter()
                    .map(|post| Artifact::PostUri(post.uri))
                    .collect();
                match result {
                    Ok(()) => ActionOutcome::success(index, kind).with_artifacts(artifacts),
                    Err(err) => {
                        ActionOutcome::failure(index, kind, err.to_string()).with_artifacts(artifacts)
                    }
                }
            }
            Action::EmailSend {
                to,
                cc,
                subject,
                body,
            } => {
                let email = OutgoingEmail {
                    from: actor.email.to_string(),
                    to: to.clone(),
                    cc: cc.clone(),
                    subject: subject.clone(),
                    body: body.clone(),
                };
                match self.bounded(self.mailer.deliver(&email)).await {
                    Ok(()) => {
                        self.stats.increment_for_actor(
                            &actor.name,
                            StatKey::EmailsSent,
                            Scope::ActorAndOverall,
                        );
                        ActionOutcome::success(index, kind)
                            .with_artifacts(vec![Artifact::Recipient(to.clone())])
                    }
                    Err(err) => ActionOutcome::failure(index, kind, err.to_string()),
                }
            }
        }
    }

    /// Publish one post and count it once it is confirmed.
    async fn post(
        &self,
        actor: &Actor,
        text: &str,
        reply_to: Option<&ReplyTo>,
    ) -> Result<PostRef, IntegrationError> {
        let post = self.bounded(self.feed.publish(actor, text, reply_to)).await?;
        self.stats
            .increment_for_actor(&actor.name, StatKey::PostsMade, Scope::ActorAndOverall);
        tracing::debug!(actor = %actor.name, uri = %post.uri, "post published");
        Ok(post)
    }

    /// Root post first, then each entry replies to the previous one.
    /// Returns what was published even when a later entry fails.
    async fn publish_thread(
        &self,
        actor: &Actor,
        entries: &[String],
    ) -> (Vec<PostRef>, Result<(), IntegrationError>) {
        let mut published: Vec<PostRef> = Vec::with_capacity(entries.len());
        for text in entries {
            let reply_to = match (published.first(), published.last()) {
                (Some(root), Some(parent)) => Some(ReplyTo {
                    root: root.clone(),
                    parent: parent.clone(),
                }),
                _ => None,
            };
            match self.post(actor, text, reply_to.as_ref()).await {
                Ok(post) => published.push(post),
                Err(err) => return (published, Err(err)),
            }
        }
        (published, Ok(()))
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, IntegrationError>>,
    ) -> Result<T, IntegrationError> {
        tokio::time::timeout(self.integration_timeout, call)
            .await
            .unwrap_or(Err(IntegrationError::TimedOut(self.integration_timeout)))
    }
}

//! RecordingFeed - 投稿を記録するだけの SocialFeed
//!
//! Posts get synthetic `at://` uris. Texts registered with `reject_text` and
//! actors registered with `deny_session` fail, which is how tests inject
//! integration errors.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::actor::Actor;
use crate::domain::errors::IntegrationError;
use crate::ports::{PostRef, ReplyTo, SocialFeed};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPost {
    pub author: String,
    pub text: String,
    pub post: PostRef,
    pub reply_to: Option<ReplyTo>,
}

#[derive(Default)]
pub struct RecordingFeed {
    posts: Mutex<Vec<PublishedPost>>,
    rejected_texts: Mutex<HashSet<String>>,
    denied_sessions: Mutex<HashSet<String>>,
}

impl RecordingFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_text(&self, text: impl Into<String>) {
        self.rejected_texts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(text.into());
    }

    pub fn deny_session(&self, identifier: impl Into<String>) {
        self.denied_sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identifier.into());
    }

    pub fn posts(&self) -> Vec<PublishedPost> {
        self.posts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SocialFeed for RecordingFeed {
    async fn ensure_session(&self, actor: &Actor) -> Result<(), IntegrationError> {
        let denied = self
            .denied_sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&actor.bsky.identifier);
        if denied {
            return Err(IntegrationError::NoSession(actor.bsky.identifier.clone()));
        }
        Ok(())
    }

    async fn publish(
        &self,
        actor: &Actor,
        text: &str,
        reply_to: Option<&ReplyTo>,
    ) -> Result<PostRef, IntegrationError> {
        self.ensure_session(actor).await?;

        let rejected = self
            .rejected_texts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(text);
        if rejected {
            return Err(IntegrationError::Rejected(format!("post refused: {text:?}")));
        }

        let mut posts = self.posts.lock().unwrap_or_else(PoisonError::into_inner);
        let n = posts.len() + 1;
        let post = PostRef {
            uri: format!("at://{}/app.bsky.feed.post/{n}", actor.bsky.identifier),
            cid: format!("cid-{n}"),
        };
        posts.push(PublishedPost {
            author: actor.name.clone(),
            text: text.to_string(),
            post: post.clone(),
            reply_to: reply_to.cloned(),
        });
        Ok(post)
    }
}

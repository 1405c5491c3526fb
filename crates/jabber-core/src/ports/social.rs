//! SocialFeed port - ソーシャルフィードへの投稿
//!
//! Threads are built by the dispatcher out of single publishes: every entry after
//! the first replies to the previous post and carries the thread root.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::actor::Actor;
use crate::domain::errors::IntegrationError;

/// Strong reference to a published post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRef {
    pub uri: String,
    pub cid: String,
}

/// Where a reply attaches in a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTo {
    pub root: PostRef,
    pub parent: PostRef,
}

#[async_trait]
pub trait SocialFeed: Send + Sync {
    /// Make sure the actor has a usable session (log in if needed).
    async fn ensure_session(&self, _actor: &Actor) -> Result<(), IntegrationError> {
        Ok(())
    }

    async fn publish(
        &self,
        actor: &Actor,
        text: &str,
        reply_to: Option<&ReplyTo>,
    ) -> Result<PostRef, IntegrationError>;
}

//! Mailer port - メール送信
//!
//! `MailTransport` is the raw outbound transport. The dispatcher talks to it
//! through `DirectoryMailer`, which enforces the recipient allow-list.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::IntegrationError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<(), IntegrationError>;
}

#[async_trait]
impl<M: MailTransport + ?Sized> MailTransport for Arc<M> {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<(), IntegrationError> {
        (**self).deliver(email).await
    }
}

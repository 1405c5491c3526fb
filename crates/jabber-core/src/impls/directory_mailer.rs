//! DirectoryMailer - 宛先を actor directory で制限する MailTransport
//!
//! - `to` が directory にない → `RecipientNotAllowed`
//! - `cc` のうち directory にないものは黙って落とす

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::actor::ActorDirectory;
use crate::domain::errors::IntegrationError;
use crate::ports::{MailTransport, OutgoingEmail};

pub struct DirectoryMailer<M> {
    directory: Arc<ActorDirectory>,
    transport: M,
}

impl<M: MailTransport> DirectoryMailer<M> {
    pub fn new(directory: Arc<ActorDirectory>, transport: M) -> Self {
        Self {
            directory,
            transport,
        }
    }
}

#[async_trait]
impl<M: MailTransport> MailTransport for DirectoryMailer<M> {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<(), IntegrationError> {
        if !self.directory.contains(&email.to) {
            return Err(IntegrationError::RecipientNotAllowed(email.to.clone()));
        }

        let cc: Vec<String> = email
            .cc
            .iter()
            .filter(|address| self.directory.contains(address))
            .cloned()
            .collect();
        if cc.len() != email.cc.len() {
            tracing::debug!(
                dropped = email.cc.len() - cc.len(),
                "filtered cc recipients outside the directory"
            );
        }

        let filtered = OutgoingEmail {
            cc,
            ..email.clone()
        };
        self.transport.deliver(&filtered).await
    }
}

/// Keeps every delivered email in memory.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn deliver(&self, email: &OutgoingEmail) -> Result<(), IntegrationError> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(email.clone());
        Ok(())
    }
}

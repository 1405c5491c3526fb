//! Errors - エラー型と分類
//!
//! - Job-level errors (`JobError`) abandon the job attempt. They are caught at the
//!   consumer boundary, counted and the job is dropped. Nothing is retried.
//! - Action-level errors (`IntegrationError`) stay inside the dispatch loop and
//!   never affect sibling actions.

use std::time::Duration;

use super::action::ParseError;
use super::actor::ActorId;
use super::ids::BlobId;

/// Conversation framing / budget violations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing system message")]
    MissingSystemMessage,

    #[error("missing user message")]
    MissingUserMessage,

    #[error("system and user messages exceed the token budget ({needed:.1} > {budget:.1})")]
    OverBudget { needed: f64, budget: f64 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlobError {
    #[error("blob {0} not found")]
    NotFound(BlobId),

    #[error("blob {0} is not valid UTF-8")]
    InvalidUtf8(BlobId),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),

    #[error("provider returned no content")]
    EmptyResponse,
}

/// Failure of one downstream action (post, thread, email).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrationError {
    #[error("recipient {0} is not allow-listed")]
    RecipientNotAllowed(String),

    #[error("no social session for {0}")]
    NoSession(String),

    #[error("rejected by integration: {0}")]
    Rejected(String),

    #[error("integration call timed out after {0:?}")]
    TimedOut(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("unparseable provider response: {0}")]
    Parse(#[from] ParseError),

    #[error("rate limit denied")]
    RateLimited,

    #[error("{stage} timed out after {after:?}")]
    TimedOut { stage: &'static str, after: Duration },

    #[error("unknown actor {0}")]
    UnknownActor(ActorId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn validation_messages_match_the_framing_rules() {
        assert_eq!(ValidationError::MissingSystemMessage.to_string(), "missing system message");
        assert_eq!(ValidationError::MissingUserMessage.to_string(), "missing user message");
    }

    #[test]
    fn job_error_wraps_sources() {
        let id = BlobId::from_ulid(Ulid::new());
        let err: JobError = BlobError::NotFound(id).into();
        assert_eq!(err.to_string(), format!("blob {id} not found"));

        let err: JobError = ProviderError::EmptyResponse.into();
        assert!(matches!(err, JobError::Provider(ProviderError::EmptyResponse)));
    }
}

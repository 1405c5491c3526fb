//! Outcome model: per-action result of a dispatch.
//!
//! One `ActionOutcome` is produced for every action in a provider turn, in
//! the same order, whether the action succeeded or not.

use serde::{Deserialize, Serialize};

use super::action::ActionKind;

/// We serialize as SCREAMING_SNAKE_CASE: SUCCESS / FAILURE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Success,
    Failure,
}

/// Something a successful (or partially successful) action produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Artifact {
    /// URI of a published social post.
    PostUri(String),

    /// Address an email was delivered to.
    Recipient(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Position of the action in the provider turn.
    pub index: usize,
    pub action: ActionKind,
    pub kind: OutcomeKind,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ActionOutcome {
    pub fn success(index: usize, action: ActionKind) -> Self {
        Self {
            index,
            action,
            kind: OutcomeKind::Success,
            artifacts: Vec::new(),
            reason: None,
        }
    }

    pub fn failure(index: usize, action: ActionKind, reason: impl Into<String>) -> Self {
        Self {
            index,
            action,
            kind: OutcomeKind::Failure,
            artifacts: Vec::new(),
            reason: Some(reason.into()),
        }
    }

    pub fn with_artifacts(mut self, artifacts: Vec<Artifact>) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }
}

use serde::{Deserialize, Serialize};

use super::ids::JobId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a conversation.
///
/// `id` is the job whose round-trip produced the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: JobId,
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(id: JobId, content: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(id: JobId, content: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(id: JobId, content: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

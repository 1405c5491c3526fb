//! Actions: the structured instructions a provider turn produces.
//!
//! The provider's raw text is validated against this closed schema before
//! anything is executed. A shape mismatch anywhere in the list rejects the whole
//! list; there is no partial accept.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum length of one social post, in UTF-16 code units.
pub const MAX_POST_CHARS: usize = 300;

/// Post length as the limit counts it: an emoji outside the BMP is two units.
pub fn post_length(text: &str) -> usize {
    text.encode_utf16().count()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Action {
    EmailSend {
        to: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        cc: Vec<String>,
        subject: String,
        body: String,
    },
    BskyPost {
        content: String,
    },
    BskyThread {
        content: Vec<String>,
    },
}

/// Fieldless mirror of [`Action`] for logs and outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    EmailSend,
    BskyPost,
    BskyThread,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::EmailSend => "email-send",
            ActionKind::BskyPost => "bsky-post",
            ActionKind::BskyThread => "bsky-thread",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("response is not a valid action list: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response contains no actions")]
    Empty,

    #[error("action {index}: post is {chars} UTF-16 units long (max {max})", max = MAX_POST_CHARS)]
    PostTooLong { index: usize, chars: usize },

    #[error("action {index}: thread has no entries")]
    EmptyThread { index: usize },

    #[error(
        "action {index}: thread entry {entry} is {chars} UTF-16 units long (max {max})",
        max = MAX_POST_CHARS
    )]
    ThreadEntryTooLong {
        index: usize,
        entry: usize,
        chars: usize,
    },

    #[error("action {index}: {address:?} is not an email address")]
    InvalidAddress { index: usize, address: String },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::EmailSend { .. } => ActionKind::EmailSend,
            Action::BskyPost { .. } => ActionKind::BskyPost,
            Action::BskyThread { .. } => ActionKind::BskyThread,
        }
    }

    /// Parse and validate a provider reply into a non-empty action list.
    pub fn parse_list(raw: &str) -> Result<Vec<Action>, ParseError> {
        let actions: Vec<Action> = serde_json::from_str(raw.trim())?;
        if actions.is_empty() {
            return Err(ParseError::Empty);
        }
        for (index, action) in actions.iter().enumerate() {
            action.validate(index)?;
        }
        Ok(actions)
    }

    fn validate(&self, index: usize) -> Result<(), ParseError> {
        match self {
            Action::BskyPost { content } => {
                let chars = post_length(content);
                if chars > MAX_POST_CHARS {
                    return Err(ParseError::PostTooLong { index, chars });
                }
            }
            Action::BskyThread { content } => {
                if content.is_empty() {
                    return Err(ParseError::EmptyThread { index });
                }
                for (entry, text) in content.iter().enumerate() {
                    let chars = post_length(text);
                    if chars > MAX_POST_CHARS {
                        return Err(ParseError::ThreadEntryTooLong {
                            index,
                            entry,
                            chars,
                        });
                    }
                }
            }
            Action::EmailSend { to, cc, .. } => {
                for address in std::iter::once(to).chain(cc) {
                    if !looks_like_email(address) {
                        return Err(ParseError::InvalidAddress {
                            index,
                            address: address.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Structural check only: `local@domain.tld`, no whitespace.
pub fn looks_like_email(address: &str) -> bool {
    if address.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

//! Actors (employee personas) and the directory they are looked up in.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an actor: the email address the actor receives mail on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(email: impl Into<String>) -> Self {
        Self(email.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Login for the actor's social account.
#[derive(Clone, Serialize, Deserialize)]
pub struct SocialCredentials {
    pub identifier: String,
    pub password: String,
}

impl fmt::Debug for SocialCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocialCredentials")
            .field("identifier", &self.identifier)
            .field("password", &"***")
            .finish()
    }
}

/// An employee persona that receives mail and reacts to it.
///
/// `system_prompt` is rendered outside of this crate; the pipeline only moves it
/// through the blob store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub name: String,
    pub email: ActorId,
    pub bsky: SocialCredentials,
    pub system_prompt: String,
}

impl Actor {
    pub fn id(&self) -> &ActorId {
        &self.email
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("actor directory is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("duplicate actor email: {0}")]
    DuplicateEmail(ActorId),
}

/// Known actors, keyed by email.
///
/// Besides routing inbound mail, the directory is the allow-list for outgoing
/// mail: only addresses in here may receive email.
#[derive(Debug, Clone, Default)]
pub struct ActorDirectory {
    by_email: HashMap<ActorId, Actor>,
}

impl ActorDirectory {
    pub fn new(actors: Vec<Actor>) -> Result<Self, DirectoryError> {
        let mut by_email = HashMap::with_capacity(actors.len());
        for actor in actors {
            let email = actor.email.clone();
            if by_email.insert(email.clone(), actor).is_some() {
                return Err(DirectoryError::DuplicateEmail(email));
            }
        }
        Ok(Self { by_email })
    }

    /// Parse a JSON array of actors.
    pub fn from_json(raw: &str) -> Result<Self, DirectoryError> {
        let actors: Vec<Actor> = serde_json::from_str(raw)?;
        Self::new(actors)
    }

    pub fn get(&self, email: &str) -> Option<&Actor> {
        self.by_email.get(&ActorId::new(email.trim()))
    }

    pub fn contains(&self, email: &str) -> bool {
        self.get(email).is_some()
    }

    pub fn len(&self) -> usize {
        self.by_email.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_email.is_empty()
    }

    pub fn actors(&self) -> impl Iterator<Item = &Actor> {
        self.by_email.values()
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::actor;
    use super::*;

    #[test]
    fn directory_looks_up_by_trimmed_email() {
        let dir = ActorDirectory::new(vec![actor("Ann", "ann@corp.example")]).unwrap();

        assert!(dir.contains(" ann@corp.example "));
        assert!(!dir.contains("bob@corp.example"));
        assert_eq!(dir.get("ann@corp.example").unwrap().name, "Ann");
    }

    #[test]
    fn duplicate_emails_are_rejected() {
        let err = ActorDirectory::new(vec![
            actor("Ann", "ann@corp.example"),
            actor("Annie", "ann@corp.example"),
        ])
        .unwrap_err();

        assert!(matches!(err, DirectoryError::DuplicateEmail(id) if id.as_str() == "ann@corp.example"));
    }

    #[test]
    fn directory_parses_from_json() {
        let raw = r#"[
          {
            "name": "Ann",
            "email": "ann@corp.example",
            "bsky": { "identifier": "ann.bsky.social", "password": "pw" },
            "systemPrompt": "You are Ann."
          }
        ]"#;

        let dir = ActorDirectory::from_json(raw).unwrap();
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.get("ann@corp.example").unwrap().system_prompt, "You are Ann.");
    }

    #[test]
    fn credentials_debug_hides_password() {
        let a = actor("Ann", "ann@corp.example");
        let shown = format!("{:?}", a.bsky);
        assert!(!shown.contains("app-password"));
    }
}

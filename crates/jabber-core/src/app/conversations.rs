//! Per-actor conversation history.
//!
//! Only the actor's lane writes to its entry, so the lock here is never held
//! across a provider call.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::Mutex;

use crate::domain::actor::ActorId;
use crate::domain::message::Message;

#[derive(Default)]
pub struct ConversationStore {
    by_actor: Mutex<HashMap<ActorId, Vec<Message>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn history(&self, actor: &ActorId) -> Vec<Message> {
        self.by_actor
            .lock()
            .await
            .get(actor)
            .cloned()
            .unwrap_or_default()
    }

    /// The conversation to submit for this turn: stored history with `system`
    /// as the first message and `user` appended. Nothing is persisted.
    pub async fn draft(&self, actor: &ActorId, system: Message, user: Message) -> Vec<Message> {
        let mut draft = self.history(actor).await;
        match draft.first_mut() {
            Some(first) => *first = system,
            None => draft.push(system),
        }
        draft.push(user);
        draft
    }

    /// Persist one round-trip: the conversation exactly as it was sent (already
    /// truncated) followed by the reply. Replaces the stored history, so it never
    /// grows past one budget plus one assistant turn.
    pub async fn record_turn(&self, actor: &ActorId, sent: Vec<Message>, assistant: Message) {
        let mut history = sent;
        history.push(assistant);
        self.by_actor.lock().await.insert(actor.clone(), history);
    }

    /// Debug view keyed by actor email.
    pub async fn snapshot(&self) -> BTreeMap<String, Vec<Message>> {
        self.by_actor
            .lock()
            .await
            .iter()
            .map(|(actor, history)| (actor.to_string(), history.clone()))
            .collect()
    }
}

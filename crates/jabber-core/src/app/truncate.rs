//! Conversation truncation against a token budget.
//!
//! Cost is estimated from the character count (`cost_per_char`, default 0.6).
//! The system and user messages are always kept; interior messages are picked
//! greedily from the most recent backwards, skipping any that no longer fit.

use crate::app::config::PipelineConfig;
use crate::domain::errors::ValidationError;
use crate::domain::message::{Message, Role};

pub const DEFAULT_COST_PER_CHAR: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Truncator {
    max_tokens: f64,
    reserved_tokens: f64,
    cost_per_char: f64,
}

impl Truncator {
    pub fn new(max_tokens: u32, reserved_tokens: u32) -> Self {
        Self {
            max_tokens: f64::from(max_tokens),
            reserved_tokens: f64::from(reserved_tokens),
            cost_per_char: DEFAULT_COST_PER_CHAR,
        }
    }

    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self::new(cfg.max_conversation_tokens, cfg.reserved_response_tokens)
            .with_cost_per_char(cfg.token_cost_per_char)
    }

    pub fn with_cost_per_char(mut self, cost_per_char: f64) -> Self {
        self.cost_per_char = cost_per_char;
        self
    }

    pub fn cost(&self, message: &Message) -> f64 {
        message.content.chars().count() as f64 * self.cost_per_char
    }

    /// Tokens available to the whole prompt.
    pub fn budget(&self) -> f64 {
        self.max_tokens - self.reserved_tokens
    }

    pub fn total_cost(&self, conversation: &[Message]) -> f64 {
        conversation.iter().map(|m| self.cost(m)).sum()
    }

    pub fn truncate(&self, conversation: &[Message]) -> Result<Vec<Message>, ValidationError> {
        let Some((system, rest)) = conversation.split_first() else {
            return Err(ValidationError::MissingSystemMessage);
        };
        if system.role != Role::System {
            return Err(ValidationError::MissingSystemMessage);
        }
        let Some((user, interior)) = rest.split_last() else {
            return Err(ValidationError::MissingUserMessage);
        };
        if user.role != Role::User {
            return Err(ValidationError::MissingUserMessage);
        }

        let framing = self.cost(system) + self.cost(user);
        if framing > self.budget() {
            return Err(ValidationError::OverBudget {
                needed: framing,
                budget: self.budget(),
            });
        }

        let mut remaining = self.budget() - framing;
        let mut keep = vec![false; interior.len()];
        for (i, message) in interior.iter().enumerate().rev() {
            let cost = self.cost(message);
            if cost > remaining {
                continue;
            }
            remaining -= cost;
            keep[i] = true;
        }

        let mut out = Vec::with_capacity(interior.len() + 2);
        out.push(system.clone());
        out.extend(
            interior
                .iter()
                .zip(&keep)
                .filter(|(_, kept)| **kept)
                .map(|(m, _)| m.clone()),
        );
        out.push(user.clone());
        Ok(out)
    }
}

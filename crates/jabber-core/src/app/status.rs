//! Status - debug 用のスナップショット

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::message::Message;
use crate::domain::stats::StatsSnapshot;
use crate::queue::QueueCounts;

/// Everything an operator surface may show. Counters do not survive restarts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    pub stats: StatsSnapshot,
    pub queue: QueueCounts,
    /// Conversation history keyed by actor email.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub conversations: BTreeMap<String, Vec<Message>>,
}

//! Counters exposed to the telemetry surface.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatKey {
    EmailsReceived,
    PostsMade,
    EmailsSent,
    Errors,
}

/// Whether an actor-level increment also bumps the process-wide counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    ActorAndOverall,
    ActorOnly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub emails_received: u64,
    pub posts_made: u64,
    pub emails_sent: u64,
    pub errors: u64,
}

impl Counters {
    pub fn increment(&mut self, key: StatKey) {
        let slot = match key {
            StatKey::EmailsReceived => &mut self.emails_received,
            StatKey::PostsMade => &mut self.posts_made,
            StatKey::EmailsSent => &mut self.emails_sent,
            StatKey::Errors => &mut self.errors,
        };
        *slot = slot.saturating_add(1);
    }

    pub fn get(&self, key: StatKey) -> u64 {
        match key {
            StatKey::EmailsReceived => self.emails_received,
            StatKey::PostsMade => self.posts_made,
            StatKey::EmailsSent => self.emails_sent,
            StatKey::Errors => self.errors,
        }
    }
}

/// Read-only view: `{emailsReceived, postsMade, emailsSent, errors, employeeStats}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    #[serde(flatten)]
    pub overall: Counters,
    pub employee_stats: BTreeMap<String, Counters>,
}

impl StatsSnapshot {
    pub fn for_actor(&self, name: &str) -> Counters {
        self.employee_stats.get(name).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_has_the_flat_wire_shape() {
        let mut overall = Counters::default();
        overall.increment(StatKey::EmailsReceived);
        let mut ann = Counters::default();
        ann.increment(StatKey::PostsMade);

        let snapshot = StatsSnapshot {
            overall,
            employee_stats: BTreeMap::from([("Ann".to_string(), ann)]),
        };

        let v = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(v["emailsReceived"], 1);
        assert_eq!(v["errors"], 0);
        assert_eq!(v["employeeStats"]["Ann"]["postsMade"], 1);
    }
}

//! RuntimeStats - プロセス内カウンタ（再起動で消える）

use std::sync::{Mutex, PoisonError};

use crate::domain::stats::{Scope, StatKey, StatsSnapshot};
use crate::ports::StatsSink;

#[derive(Default)]
pub struct RuntimeStats {
    inner: Mutex<StatsSnapshot>,
}

impl RuntimeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StatsSink for RuntimeStats {
    fn increment_overall(&self, key: StatKey) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .overall
            .increment(key);
    }

    fn increment_for_actor(&self, actor_name: &str, key: StatKey, scope: Scope) {
        let mut stats = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        stats
            .employee_stats
            .entry(actor_name.to_string())
            .or_default()
            .increment(key);
        if scope == Scope::ActorAndOverall {
            stats.overall.increment(key);
        }
    }
}

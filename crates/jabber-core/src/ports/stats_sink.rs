//! StatsSink port - カウンタの送信先

use crate::domain::stats::{Scope, StatKey};

/// Receives increment signals. Counters never go down.
pub trait StatsSink: Send + Sync {
    fn increment_overall(&self, key: StatKey);

    fn increment_for_actor(&self, actor_name: &str, key: StatKey, scope: Scope);
}

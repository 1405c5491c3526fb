//! RateLimiter port - プロバイダ呼び出しの流量制御

/// Non-blocking admission gate shared by every job in the process.
pub trait RateLimiter: Send + Sync {
    /// Take `tokens` if available. Never waits.
    fn try_acquire_n(&self, tokens: u32) -> bool;

    fn try_acquire(&self) -> bool {
        self.try_acquire_n(1)
    }
}

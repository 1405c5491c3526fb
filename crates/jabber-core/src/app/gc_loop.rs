//! GcLoop - 期限切れ blob の回収
//!
//! enqueue されたまま消費されなかった job（rate limit、shutdown、unknown actor）の
//! blob はここで消える。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::ports::BlobStore;

pub struct GcLoop {
    blobs: Arc<dyn BlobStore>,
    interval: Duration,
}

impl GcLoop {
    pub fn new(blobs: Arc<dyn BlobStore>, interval: Duration) -> Self {
        Self { blobs, interval }
    }

    pub async fn run_once(&self) -> usize {
        let reaped = self.blobs.reap_expired().await;
        if reaped > 0 {
            tracing::info!(reaped, "expired blobs removed");
        }
        reaped
    }

    /// Sweep every `interval` until `shutdown` flips to true or its sender drops.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 最初の tick は即時に返るので読み捨てる
        ticker.tick().await;

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.run_once().await;
                }
            }
        }
        tracing::debug!("blob gc stopped");
    }
}

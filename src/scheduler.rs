//! Periodic sweep of idle sessions and stale captures

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::{OutputCache, SessionCache};

/// What a single sweep removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions_closed: usize,
    pub outputs_evicted: usize,
}

struct Running {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Runs [`sweep`] on a fixed interval in a background task.
pub struct CleanupScheduler {
    sessions: Arc<SessionCache>,
    outputs: Arc<OutputCache>,
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl CleanupScheduler {
    pub fn new(sessions: Arc<SessionCache>, outputs: Arc<OutputCache>, interval: Duration) -> Self {
        Self {
            sessions,
            outputs,
            interval,
            running: Mutex::new(None),
        }
    }

    /// Start sweeping. A timer that is already running is cancelled and
    /// replaced. Must be called from within a tokio runtime.
    pub fn start(&self) {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let sessions = self.sessions.clone();
        let outputs = self.outputs.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        sweep(&sessions, &outputs).await;
                    }
                }
            }
        });

        if let Some(previous) = self.running.lock().replace(Running { stop_tx, handle }) {
            previous.handle.abort();
            debug!("Restarted cache cleanup interval");
        }
        info!("Cache cleanup interval started ({:?})", period);
    }

    /// Stop sweeping, letting an in-progress sweep finish. No-op when not running.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        let _ = running.stop_tx.send(());
        if let Err(e) = running.handle.await {
            if !e.is_cancelled() {
                warn!("Cache cleanup task ended abnormally: {}", e);
            }
        }
        info!("Cache cleanup interval stopped");
    }

    /// Cancel the sweep task without waiting for it.
    pub fn abort(&self) {
        if let Some(running) = self.running.lock().take() {
            running.handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Run one sweep immediately.
    pub async fn sweep_now(&self) -> SweepReport {
        sweep(&self.sessions, &self.outputs).await
    }
}

impl Drop for CleanupScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.handle.abort();
        }
    }
}

/// Close idle sessions and drop stale captures.
pub async fn sweep(sessions: &SessionCache, outputs: &OutputCache) -> SweepReport {
    let report = SweepReport {
        sessions_closed: sessions.evict_idle().await,
        outputs_evicted: outputs.evict_stale(),
    };
    if report != SweepReport::default() {
        info!(
            "Cache sweep closed {} sessions and evicted {} screenshots",
            report.sessions_closed, report.outputs_evicted
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeEngine;
    use crate::RenderEngine;

    fn caches() -> (Arc<SessionCache>, Arc<OutputCache>) {
        (
            Arc::new(SessionCache::new(Duration::from_secs(300))),
            Arc::new(OutputCache::new(Duration::from_secs(3600))),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_evict_idle_sessions() {
        let engine = FakeEngine::new();
        let (sessions, outputs) = caches();
        sessions.put("https://a.test", engine.open_session().await.unwrap());
        let scheduler = CleanupScheduler::new(sessions.clone(), outputs, Duration::from_secs(60));
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert!(sessions.contains("https://a.test"));

        tokio::time::sleep(Duration::from_secs(62)).await;
        assert!(!sessions.contains("https://a.test"));
        assert!(engine.last_session().unwrap().is_closed());

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_stop_are_idempotent() {
        let (sessions, outputs) = caches();
        let scheduler = CleanupScheduler::new(sessions, outputs, Duration::from_secs(60));

        scheduler.stop().await;
        assert!(!scheduler.is_running());

        scheduler.start();
        scheduler.start();
        assert!(scheduler.is_running());

        scheduler.stop().await;
        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_drops_stale_outputs() {
        let (sessions, outputs) = caches();
        outputs.put("k", Arc::from(&b"png"[..]));
        let scheduler = CleanupScheduler::new(sessions, outputs.clone(), Duration::from_secs(60));

        assert_eq!(scheduler.sweep_now().await, SweepReport::default());
        tokio::time::advance(Duration::from_secs(3601)).await;
        let report = scheduler.sweep_now().await;
        assert_eq!(report.outputs_evicted, 1);
        assert!(outputs.is_empty());
    }
}

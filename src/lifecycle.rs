//! Service startup and graceful shutdown

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::{error, info};

use crate::session_cache::close_session;
use crate::{
    CapturePipeline, CaptureRequest, CleanupScheduler, EngineHandle, EngineLauncher, ImageBytes, OutputCache,
    Result, ServiceConfig, SessionCache,
};

const ENGINE_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// The assembled service: engine handle, both caches, the cleanup scheduler
/// and the capture pipeline wired over them.
pub struct ScreenshotService {
    config: ServiceConfig,
    engine: Arc<EngineHandle>,
    sessions: Arc<SessionCache>,
    outputs: Arc<OutputCache>,
    scheduler: CleanupScheduler,
    pipeline: CapturePipeline,
}

impl ScreenshotService {
    pub fn new(config: ServiceConfig, launcher: Arc<dyn EngineLauncher>) -> Self {
        let engine = Arc::new(EngineHandle::new(launcher, config.engine.clone()));
        let sessions = Arc::new(SessionCache::new(config.cache.session_ttl));
        let outputs = Arc::new(OutputCache::new(config.cache.output_ttl));
        let scheduler = CleanupScheduler::new(sessions.clone(), outputs.clone(), config.cache.sweep_interval);
        let pipeline = CapturePipeline::new(
            engine.clone(),
            sessions.clone(),
            outputs.clone(),
            Duration::from_millis(config.engine.timeout_ms),
            config.scroll.clone(),
        );

        Self {
            config,
            engine,
            sessions,
            outputs,
            scheduler,
            pipeline,
        }
    }

    /// Launch the engine, then start the cleanup scheduler.
    ///
    /// Must succeed before requests are accepted; a launch failure is returned
    /// as-is and nothing is started.
    pub async fn initialize(&self) -> Result<()> {
        self.engine.acquire().await?;
        self.scheduler.start();
        Ok(())
    }

    pub async fn capture(&self, request: &CaptureRequest) -> Result<ImageBytes> {
        self.pipeline.capture(request).await
    }

    /// Stop the scheduler, close every cached session, clear both caches and
    /// close the engine. Safe to call twice.
    ///
    /// Session teardown is bounded by `shutdown_timeout`. The engine is closed
    /// afterwards in every case, under its own bound.
    pub async fn shutdown(&self) {
        let release_sessions = async {
            self.scheduler.stop().await;

            let sessions = self.sessions.drain();
            if !sessions.is_empty() {
                info!("Closing {} cached sessions", sessions.len());
            }
            join_all(
                sessions
                    .iter()
                    .map(|(url, session)| close_session(url, &**session)),
            )
            .await;
        };

        if tokio::time::timeout(self.config.shutdown_timeout, release_sessions)
            .await
            .is_err()
        {
            error!(
                "Sessions did not close within {:?}, abandoning them",
                self.config.shutdown_timeout
            );
            self.scheduler.abort();
            self.sessions.drain();
        }
        self.outputs.clear();

        if tokio::time::timeout(ENGINE_CLOSE_TIMEOUT, self.engine.close())
            .await
            .is_err()
        {
            error!("Rendering engine did not close within {:?}", ENGINE_CLOSE_TIMEOUT);
        }
        info!("Screenshot service shut down");
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionCache {
        &self.sessions
    }

    pub fn outputs(&self) -> &OutputCache {
        &self.outputs
    }

    pub fn scheduler(&self) -> &CleanupScheduler {
        &self.scheduler
    }

    pub async fn is_ready(&self) -> bool {
        self.engine.is_live().await
    }
}

/// Resolve when the process receives Ctrl-C or (on unix) SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT signal received: shutting down"),
        _ = terminate => info!("SIGTERM signal received: shutting down"),
    }
}

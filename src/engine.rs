//! Ownership of the single long-lived rendering engine

use std::sync::Arc;

use log::{info, warn};
use tokio::sync::Mutex;

use crate::{EngineConfig, EngineLauncher, Error, RenderEngine, Result};

enum EngineState {
    /// Not launched yet
    Idle,
    Live(Arc<dyn RenderEngine>),
    /// Torn down; never relaunched
    Closed,
}

/// Holds the process-wide engine instance.
///
/// At most one engine is live at a time. Concurrent `acquire` calls wait on
/// the same launch instead of starting a second browser.
pub struct EngineHandle {
    launcher: Arc<dyn EngineLauncher>,
    config: EngineConfig,
    state: Mutex<EngineState>,
}

impl EngineHandle {
    pub fn new(launcher: Arc<dyn EngineLauncher>, config: EngineConfig) -> Self {
        Self {
            launcher,
            config,
            state: Mutex::new(EngineState::Idle),
        }
    }

    /// Return the live engine, launching it on first use.
    ///
    /// Launch failures propagate; the handle stays idle so a later call may
    /// retry. After `close` this returns [`Error::EngineUnavailable`].
    pub async fn acquire(&self) -> Result<Arc<dyn RenderEngine>> {
        let mut state = self.state.lock().await;
        match &*state {
            EngineState::Live(engine) => Ok(engine.clone()),
            EngineState::Closed => Err(Error::EngineUnavailable),
            EngineState::Idle => {
                let engine = self.launcher.launch(&self.config).await?;
                info!("Rendering engine launched");
                *state = EngineState::Live(engine.clone());
                Ok(engine)
            }
        }
    }

    /// Return the live engine without launching one.
    pub async fn get(&self) -> Result<Arc<dyn RenderEngine>> {
        match &*self.state.lock().await {
            EngineState::Live(engine) => Ok(engine.clone()),
            _ => Err(Error::EngineUnavailable),
        }
    }

    pub async fn is_live(&self) -> bool {
        matches!(&*self.state.lock().await, EngineState::Live(_))
    }

    /// Shut the engine down. Safe to call repeatedly.
    pub async fn close(&self) {
        let previous = {
            let mut state = self.state.lock().await;
            std::mem::replace(&mut *state, EngineState::Closed)
        };
        if let EngineState::Live(engine) = previous {
            info!("Closing rendering engine");
            if let Err(e) = engine.close().await {
                warn!("Error closing rendering engine: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeEngine, FakeLauncher};

    #[tokio::test]
    async fn acquire_launches_once() {
        let engine = FakeEngine::new();
        let launcher = FakeLauncher::new(engine.clone());
        let handle = EngineHandle::new(Arc::new(launcher.clone()), EngineConfig::default());

        assert!(matches!(handle.get().await, Err(Error::EngineUnavailable)));
        handle.acquire().await.unwrap();
        handle.acquire().await.unwrap();
        handle.get().await.unwrap();
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test]
    async fn close_is_reentrant_and_final() {
        let engine = FakeEngine::new();
        let handle = EngineHandle::new(Arc::new(FakeLauncher::new(engine.clone())), EngineConfig::default());
        handle.acquire().await.unwrap();

        handle.close().await;
        handle.close().await;
        assert_eq!(engine.counts().engine_closes, 1);
        assert!(!handle.is_live().await);
        assert!(matches!(handle.acquire().await, Err(Error::EngineUnavailable)));
    }

    #[tokio::test]
    async fn launch_failure_propagates() {
        let engine = FakeEngine::new();
        let launcher = FakeLauncher::new(engine);
        launcher.fail_launch("no browser binary");
        let handle = EngineHandle::new(Arc::new(launcher), EngineConfig::default());

        let err = handle.acquire().await.err().expect("launch should fail");
        assert!(matches!(err, Error::InitializationError(_)));
        assert!(!handle.is_live().await);
    }
}

//! Async engine over the blocking CDP backend.
//!
//! The browser is launched on a dedicated thread, and every session gets its
//! own worker thread that owns the tab and executes commands sent from async
//! tasks. Commands on one tab run in order; different tabs never wait on each
//! other.

use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;

use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::cdp::{CdpBrowser, CdpTab};
use crate::{DeviceProfile, EngineConfig, EngineLauncher, Error, RenderEngine, RenderSession, Result, Viewport};

enum Command {
    Navigate(String, oneshot::Sender<Result<()>>),
    Emulate(&'static DeviceProfile, oneshot::Sender<Result<()>>),
    SetViewport(Viewport, oneshot::Sender<Result<()>>),
    Eval(String, oneshot::Sender<Result<serde_json::Value>>),
    Capture(bool, oneshot::Sender<Result<Vec<u8>>>),
    Close(oneshot::Sender<Result<()>>),
}

/// Launches headless Chrome engines.
#[derive(Debug, Clone, Copy, Default)]
pub struct CdpLauncher;

#[async_trait]
impl EngineLauncher for CdpLauncher {
    async fn launch(&self, config: &EngineConfig) -> Result<Arc<dyn RenderEngine>> {
        let config = config.clone();
        let (init_tx, init_rx) = oneshot::channel();

        thread::spawn(move || {
            let _ = init_tx.send(CdpBrowser::launch(config));
        });

        let browser = init_rx
            .await
            .map_err(|e| Error::InitializationError(format!("Launch thread canceled: {}", e)))??;

        Ok(Arc::new(CdpEngine {
            browser: Mutex::new(Some(Arc::new(browser))),
        }))
    }
}

/// A running Chrome instance
pub struct CdpEngine {
    browser: Mutex<Option<Arc<CdpBrowser>>>,
}

#[async_trait]
impl RenderEngine for CdpEngine {
    async fn open_session(&self) -> Result<Arc<dyn RenderSession>> {
        let browser = self.browser.lock().clone().ok_or(Error::EngineUnavailable)?;

        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx) = oneshot::channel();

        thread::spawn(move || {
            let tab = match browser.new_tab() {
                Ok(tab) => tab,
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };
            // Release the browser so closing the engine is not held up by idle workers
            drop(browser);
            let _ = init_tx.send(Ok(()));
            run_tab(tab, cmd_rx);
        });

        init_rx
            .await
            .map_err(|e| Error::Other(format!("Session worker init canceled: {}", e)))??;

        Ok(Arc::new(CdpSession { cmd_tx }))
    }

    async fn close(&self) -> Result<()> {
        let Some(browser) = self.browser.lock().take() else {
            return Ok(());
        };
        // Dropping the last handle terminates the browser process; do it off
        // the async runtime since it waits for the child to exit.
        tokio::task::spawn_blocking(move || drop(browser))
            .await
            .map_err(|e| Error::Other(format!("Browser shutdown failed: {}", e)))
    }
}

fn run_tab(tab: CdpTab, cmd_rx: mpsc::Receiver<Command>) {
    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            Command::Navigate(url, resp) => {
                let _ = resp.send(tab.navigate(&url));
            }
            Command::Emulate(device, resp) => {
                let _ = resp.send(tab.emulate(device));
            }
            Command::SetViewport(viewport, resp) => {
                let _ = resp.send(tab.set_viewport(viewport));
            }
            Command::Eval(script, resp) => {
                let _ = resp.send(tab.evaluate(&script));
            }
            Command::Capture(full_page, resp) => {
                let _ = resp.send(tab.capture(full_page));
            }
            Command::Close(resp) => {
                let _ = resp.send(tab.close());
                return;
            }
        }
    }
    // Every sender dropped without an explicit close
    if let Err(e) = tab.close() {
        debug!("Closing orphaned tab failed: {}", e);
    }
}

/// Async handle to one tab's worker thread
pub struct CdpSession {
    cmd_tx: Sender<Command>,
}

impl CdpSession {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<Result<T>>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(tx))
            .map_err(|_| Error::Other("Session is closed".into()))?;
        rx.await
            .map_err(|e| Error::Other(format!("Session worker stopped: {}", e)))?
    }
}

#[async_trait]
impl RenderSession for CdpSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        let url = url.to_string();
        self.request(|tx| Command::Navigate(url, tx)).await
    }

    async fn emulate(&self, device: &DeviceProfile) -> Result<()> {
        // Profiles handed to the worker must outlive it; resolve the static entry
        let device = DeviceProfile::lookup(device.name)
            .ok_or_else(|| Error::ConfigError(format!("Unknown device: {}", device.name)))?;
        self.request(|tx| Command::Emulate(device, tx)).await
    }

    async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        self.request(|tx| Command::SetViewport(viewport, tx)).await
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let script = script.to_string();
        self.request(|tx| Command::Eval(script, tx)).await
    }

    async fn capture(&self, full_page: bool) -> Result<Vec<u8>> {
        self.request(|tx| Command::Capture(full_page, tx)).await
    }

    async fn close(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Close(tx)).is_err() {
            // Worker already gone
            return Ok(());
        }
        match rx.await {
            Ok(result) => result,
            Err(_) => {
                warn!("Session worker exited before acknowledging close");
                Ok(())
            }
        }
    }
}

//! In-memory engine for tests and demos
//!
//! `FakeEngine` counts every call that would cross into a real browser, and
//! can be told to fail navigations, captures or closes. Pages follow a simple
//! scroll model so the lazy-load pass can be exercised without a browser.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::{DeviceProfile, EngineConfig, EngineLauncher, Error, RenderEngine, RenderSession, Result, Viewport};

/// Snapshot of the engine call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FakeCounts {
    pub sessions_opened: usize,
    pub navigations: usize,
    pub emulations: usize,
    pub viewports: usize,
    pub evaluations: usize,
    pub captures: usize,
    pub session_closes: usize,
    pub engine_closes: usize,
}

impl FakeCounts {
    /// Total number of calls made into the engine
    pub fn engine_calls(&self) -> usize {
        self.sessions_opened
            + self.navigations
            + self.emulations
            + self.viewports
            + self.evaluations
            + self.captures
            + self.session_closes
            + self.engine_closes
    }
}

#[derive(Default)]
struct Behavior {
    navigation_failures: HashMap<String, String>,
    navigation_delay: Option<Duration>,
    failing_captures: usize,
    fail_session_close: bool,
    page_height: f64,
    scroll_locked: bool,
    network_busy: bool,
}

struct FakeState {
    counts: Mutex<FakeCounts>,
    behavior: Mutex<Behavior>,
    sessions: Mutex<Vec<Arc<FakeSession>>>,
    closed: AtomicBool,
}

/// A scriptable stand-in for a browser engine
#[derive(Clone)]
pub struct FakeEngine {
    state: Arc<FakeState>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        let behavior = Behavior {
            page_height: 3000.0,
            ..Default::default()
        };
        FakeEngine {
            state: Arc::new(FakeState {
                counts: Mutex::new(FakeCounts::default()),
                behavior: Mutex::new(behavior),
                sessions: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn counts(&self) -> FakeCounts {
        *self.state.counts.lock()
    }

    /// Every session opened so far, oldest first
    pub fn sessions(&self) -> Vec<Arc<FakeSession>> {
        self.state.sessions.lock().clone()
    }

    pub fn last_session(&self) -> Option<Arc<FakeSession>> {
        self.state.sessions.lock().last().cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Make navigations to `url` fail with an engine message such as
    /// `net::ERR_NAME_NOT_RESOLVED`.
    pub fn fail_navigation(&self, url: &str, message: &str) {
        self.state
            .behavior
            .lock()
            .navigation_failures
            .insert(url.to_string(), message.to_string());
    }

    pub fn clear_navigation_failures(&self) {
        self.state.behavior.lock().navigation_failures.clear();
    }

    pub fn set_navigation_delay(&self, delay: Option<Duration>) {
        self.state.behavior.lock().navigation_delay = delay;
    }

    /// Fail the next `n` capture calls
    pub fn fail_next_captures(&self, n: usize) {
        self.state.behavior.lock().failing_captures = n;
    }

    pub fn fail_session_close(&self, fail: bool) {
        self.state.behavior.lock().fail_session_close = fail;
    }

    pub fn set_page_height(&self, height: f64) {
        self.state.behavior.lock().page_height = height;
    }

    /// When locked, scrolling never moves the page
    pub fn set_scroll_locked(&self, locked: bool) {
        self.state.behavior.lock().scroll_locked = locked;
    }

    /// When busy, every network probe observes a new request
    pub fn set_network_busy(&self, busy: bool) {
        self.state.behavior.lock().network_busy = busy;
    }

    fn bump(&self, f: impl FnOnce(&mut FakeCounts)) {
        f(&mut self.state.counts.lock());
    }
}

#[async_trait]
impl RenderEngine for FakeEngine {
    async fn open_session(&self) -> Result<Arc<dyn RenderSession>> {
        if self.is_closed() {
            return Err(Error::Other("engine closed".into()));
        }
        self.bump(|c| c.sessions_opened += 1);
        let session = Arc::new(FakeSession {
            engine: self.clone(),
            url: Mutex::new(None),
            viewport: Mutex::new(Viewport {
                width: 800,
                height: 600,
            }),
            device: Mutex::new(None),
            scroll_y: Mutex::new(0.0),
            resources: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        });
        self.state.sessions.lock().push(session.clone());
        Ok(session)
    }

    async fn close(&self) -> Result<()> {
        if self.state.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.bump(|c| c.engine_closes += 1);
        for session in self.sessions() {
            session.closed.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// A session opened from a [`FakeEngine`]
pub struct FakeSession {
    engine: FakeEngine,
    url: Mutex<Option<String>>,
    viewport: Mutex<Viewport>,
    device: Mutex<Option<&'static str>>,
    scroll_y: Mutex<f64>,
    resources: AtomicUsize,
    closed: AtomicBool,
}

impl FakeSession {
    pub fn url(&self) -> Option<String> {
        self.url.lock().clone()
    }

    /// Effective viewport after the last emulation or viewport call
    pub fn viewport(&self) -> Viewport {
        *self.viewport.lock()
    }

    /// Name of the emulated device, if any
    pub fn device(&self) -> Option<&'static str> {
        *self.device.lock()
    }

    pub fn scroll_y(&self) -> f64 {
        *self.scroll_y.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(Error::Other("session closed".into()))
        } else {
            Ok(())
        }
    }

    fn scroll_by(&self, dy: f64) {
        let behavior = self.engine.state.behavior.lock();
        if behavior.scroll_locked {
            return;
        }
        let max = (behavior.page_height - self.viewport().height as f64).max(0.0);
        let mut y = self.scroll_y.lock();
        *y = (*y + dy).min(max);
    }

    fn metrics(&self) -> Value {
        let page_height = self.engine.state.behavior.lock().page_height;
        json!({
            "scrollY": self.scroll_y(),
            "innerHeight": self.viewport().height,
            "pageHeight": page_height,
        })
    }
}

fn parse_scroll_step(script: &str) -> Option<f64> {
    let rest = script.split("scrollBy(0,").nth(1)?;
    rest.split(')').next()?.trim().parse().ok()
}

#[async_trait]
impl RenderSession for FakeSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.ensure_open()?;
        self.engine.bump(|c| c.navigations += 1);
        let (failure, delay) = {
            let behavior = self.engine.state.behavior.lock();
            (behavior.navigation_failures.get(url).cloned(), behavior.navigation_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = failure {
            return Err(Error::from_navigation_failure(url, EngineConfig::default().timeout_ms, &message));
        }
        *self.url.lock() = Some(url.to_string());
        *self.scroll_y.lock() = 0.0;
        Ok(())
    }

    async fn emulate(&self, device: &DeviceProfile) -> Result<()> {
        self.ensure_open()?;
        self.engine.bump(|c| c.emulations += 1);
        *self.viewport.lock() = device.viewport();
        *self.device.lock() = Some(device.name);
        Ok(())
    }

    async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        self.ensure_open()?;
        self.engine.bump(|c| c.viewports += 1);
        *self.viewport.lock() = viewport;
        *self.device.lock() = None;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        self.ensure_open()?;
        self.engine.bump(|c| c.evaluations += 1);
        if let Some(dy) = parse_scroll_step(script) {
            self.scroll_by(dy);
            Ok(Value::Bool(true))
        } else if script.contains("scrollTo") {
            *self.scroll_y.lock() = 0.0;
            Ok(Value::Bool(true))
        } else if script.contains("getEntriesByType") {
            let busy = self.engine.state.behavior.lock().network_busy;
            let count = if busy {
                self.resources.fetch_add(1, Ordering::SeqCst) + 1
            } else {
                self.resources.load(Ordering::SeqCst)
            };
            Ok(json!(count))
        } else if script.contains("scrollY") {
            Ok(self.metrics())
        } else {
            Ok(Value::Null)
        }
    }

    async fn capture(&self, full_page: bool) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let n = {
            let mut counts = self.engine.state.counts.lock();
            counts.captures += 1;
            counts.captures
        };
        {
            let mut behavior = self.engine.state.behavior.lock();
            if behavior.failing_captures > 0 {
                behavior.failing_captures -= 1;
                return Err(Error::RenderError("capture failed".into()));
            }
        }
        let viewport = self.viewport();
        let png = format!(
            "PNG|{}|{}x{}|{}|full={}|#{}",
            self.url().unwrap_or_default(),
            viewport.width,
            viewport.height,
            self.device().unwrap_or("none"),
            full_page,
            n
        );
        Ok(png.into_bytes())
    }

    async fn close(&self) -> Result<()> {
        self.engine.bump(|c| c.session_closes += 1);
        self.closed.store(true, Ordering::SeqCst);
        if self.engine.state.behavior.lock().fail_session_close {
            return Err(Error::Other("close failed".into()));
        }
        Ok(())
    }
}

/// Launcher that hands out a shared [`FakeEngine`]
#[derive(Clone)]
pub struct FakeLauncher {
    engine: FakeEngine,
    launches: Arc<AtomicUsize>,
    launch_failure: Arc<Mutex<Option<String>>>,
}

impl FakeLauncher {
    pub fn new(engine: FakeEngine) -> Self {
        Self {
            engine,
            launches: Arc::new(AtomicUsize::new(0)),
            launch_failure: Arc::new(Mutex::new(None)),
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn fail_launch(&self, reason: &str) {
        *self.launch_failure.lock() = Some(reason.to_string());
    }
}

#[async_trait]
impl EngineLauncher for FakeLauncher {
    async fn launch(&self, _config: &EngineConfig) -> Result<Arc<dyn RenderEngine>> {
        if let Some(reason) = self.launch_failure.lock().clone() {
            return Err(Error::InitializationError(reason));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.engine.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scroll_step_parses_from_script() {
        assert_eq!(parse_scroll_step("window.scrollBy(0, 250); true"), Some(250.0));
        assert_eq!(parse_scroll_step("window.scrollTo({ top: 0 }); true"), None);
    }

    #[tokio::test]
    async fn closed_sessions_reject_calls() {
        let engine = FakeEngine::new();
        let session = engine.open_session().await.unwrap();
        session.close().await.unwrap();
        assert!(session.navigate("https://a.test").await.is_err());
        assert!(session.capture(false).await.is_err());
    }

    #[tokio::test]
    async fn closing_engine_closes_sessions() {
        let engine = FakeEngine::new();
        engine.open_session().await.unwrap();
        engine.close().await.unwrap();
        engine.close().await.unwrap();
        assert!(engine.last_session().unwrap().is_closed());
        assert_eq!(engine.counts().engine_closes, 1);
        assert!(engine.open_session().await.is_err());
    }
}

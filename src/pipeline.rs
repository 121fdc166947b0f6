//! The capture pipeline: output cache, session reuse, configuration,
//! lazy-load scrolling and raster capture.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::OwnedMutexGuard;

use crate::lazy_scroll;
use crate::session_cache::{close_session, SessionLock};
use crate::{
    DeviceProfile, EngineHandle, Error, ImageBytes, OutputCache, RenderSession, Result, ScrollConfig,
    SessionCache, Viewport,
};

/// Parameters of a single capture
///
/// When `device` is set the explicit width/height are ignored; an unknown
/// device falls back to the default viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub full_page: bool,
    pub device: Option<String>,
}

impl CaptureRequest {
    /// A viewport capture of `url` at the default 1920x1080 size.
    pub fn new(url: impl Into<String>) -> Self {
        let viewport = Viewport::default();
        Self {
            url: url.into(),
            width: viewport.width,
            height: viewport.height,
            full_page: false,
            device: None,
        }
    }

    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn full_page(mut self, full_page: bool) -> Self {
        self.full_page = full_page;
        self
    }

    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Output cache key: the five capture-affecting fields joined in fixed
    /// order, with an absent device written as `null`. No normalization.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}-{}-{}-{}-{}",
            self.url,
            self.width,
            self.height,
            self.full_page,
            self.device.as_deref().unwrap_or("null")
        )
    }
}

/// Orchestrates a capture over injected caches and engine handle.
pub struct CapturePipeline {
    engine: Arc<EngineHandle>,
    sessions: Arc<SessionCache>,
    outputs: Arc<OutputCache>,
    navigation_timeout: Duration,
    scroll: ScrollConfig,
}

impl CapturePipeline {
    pub fn new(
        engine: Arc<EngineHandle>,
        sessions: Arc<SessionCache>,
        outputs: Arc<OutputCache>,
        navigation_timeout: Duration,
        scroll: ScrollConfig,
    ) -> Self {
        Self {
            engine,
            sessions,
            outputs,
            navigation_timeout,
            scroll,
        }
    }

    /// Produce PNG bytes for `request`, serving from cache when fresh.
    ///
    /// A session that fails after it has been cached is evicted and closed
    /// before the original error is returned.
    pub async fn capture(&self, request: &CaptureRequest) -> Result<ImageBytes> {
        let fingerprint = request.fingerprint();
        if let Some(bytes) = self.outputs.get(&fingerprint) {
            info!("Serving cached screenshot for: {}", fingerprint);
            return Ok(bytes);
        }

        // Requests for one URL share a session; the guard keeps another
        // request from reconfiguring it until this capture is taken.
        let (session, _guard) = self.lease_session(&request.url).await?;
        if let Some(bytes) = self.outputs.get(&fingerprint) {
            info!("Serving screenshot cached while waiting for: {}", fingerprint);
            return Ok(bytes);
        }

        match self.render(&*session, request).await {
            Ok(png) => {
                let bytes: ImageBytes = Arc::from(png);
                self.outputs.put(&fingerprint, bytes.clone());
                info!("Screenshot generated and cached for: {}", fingerprint);
                Ok(bytes)
            }
            Err(err) => {
                warn!("Capture failed for {}: {}", request.url, err);
                if self.sessions.remove_if_same(&request.url, &session) {
                    info!("Discarding session for {} after failure", request.url);
                }
                close_session(&request.url, &*session).await;
                Err(err)
            }
        }
    }

    /// Take exclusive use of the cached session for `url`, opening a new one
    /// when none is cached or the cached one was discarded while waiting.
    async fn lease_session(&self, url: &str) -> Result<(Arc<dyn RenderSession>, OwnedMutexGuard<()>)> {
        if let Some((session, lock)) = self.sessions.checkout(url) {
            let guard = lock.lock_owned().await;
            if self.sessions.is_current(url, &session) {
                info!("Using cached session for: {}", url);
                return Ok((session, guard));
            }
            debug!("Cached session for {} was discarded while waiting for it", url);
        }
        self.open_session(url).await
    }

    /// Open a session, navigate it and cache it. A session that fails to
    /// navigate is closed and never cached. The session is cached already
    /// locked by the caller.
    async fn open_session(&self, url: &str) -> Result<(Arc<dyn RenderSession>, OwnedMutexGuard<()>)> {
        let engine = self.engine.get().await?;
        info!("Creating new session and navigating to: {}", url);
        let session = engine.open_session().await?;

        let navigated = match tokio::time::timeout(self.navigation_timeout, session.navigate(url)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(self.navigation_timeout.as_millis() as u64)),
        };
        if let Err(err) = navigated {
            close_session(url, &*session).await;
            return Err(err);
        }

        let lock = SessionLock::default();
        let guard = lock.clone().lock_owned().await;
        if let Some(displaced) = self.sessions.put_with_lock(url, session.clone(), lock) {
            if !Arc::ptr_eq(&displaced, &session) {
                debug!("Replacing concurrently created session for: {}", url);
                close_session(url, &*displaced).await;
            }
        }
        Ok((session, guard))
    }

    async fn render(&self, session: &dyn RenderSession, request: &CaptureRequest) -> Result<Vec<u8>> {
        self.configure(session, request).await?;

        if request.full_page {
            debug!("Scrolling {} to load lazy content before full page capture", request.url);
            lazy_scroll::scroll_to_bottom(session, &self.scroll).await?;
        }

        session.capture(request.full_page).await
    }

    /// Apply device emulation or explicit dimensions. Runs for reused
    /// sessions too, since each request may ask for a different viewport.
    async fn configure(&self, session: &dyn RenderSession, request: &CaptureRequest) -> Result<()> {
        if let Some(name) = request.device.as_deref() {
            match DeviceProfile::lookup(name) {
                Some(device) => return session.emulate(device).await,
                None => {
                    warn!("Device \"{}\" is not a known device, using the default viewport", name);
                    return session.set_viewport(Viewport::default()).await;
                }
            }
        }

        session
            .set_viewport(Viewport {
                width: request.width,
                height: request.height,
            })
            .await
    }
}

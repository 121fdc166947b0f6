//! pagesnap
//!
//! A screenshot service that renders web pages in a long-lived headless
//! browser and returns PNG captures. Rendering itself is delegated to the
//! engine; this crate owns what sits in front of it:
//!
//! - **Session reuse**: navigated sessions are cached per URL and reconfigured
//!   per request instead of reloading the page
//! - **Output caching**: captures are cached under a fingerprint of every
//!   capture-affecting parameter
//! - **Time-based eviction**: a background sweep closes idle sessions and
//!   drops stale captures
//! - **Lazy-load scrolling**: full-page captures scroll the page first so
//!   deferred content materializes
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pagesnap::{CaptureRequest, ScreenshotService, ServiceConfig};
//!
//! # async fn run(launcher: Arc<dyn pagesnap::EngineLauncher>) -> pagesnap::Result<()> {
//! let service = ScreenshotService::new(ServiceConfig::default(), launcher);
//! service.initialize().await?;
//!
//! let request = CaptureRequest::new("https://example.com").viewport(800, 600);
//! let png = service.capture(&request).await?;
//! println!("{} bytes", png.len());
//!
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub mod error;
pub use error::{Error, ErrorKind, Result};

pub mod devices;
pub use devices::DeviceProfile;

pub mod engine;
pub use engine::EngineHandle;

pub mod session_cache;
pub use session_cache::SessionCache;

pub mod output_cache;
pub use output_cache::{ImageBytes, OutputCache};

pub mod lazy_scroll;

pub mod pipeline;
pub use pipeline::{CapturePipeline, CaptureRequest};

pub mod scheduler;
pub use scheduler::CleanupScheduler;

pub mod lifecycle;
pub use lifecycle::ScreenshotService;

pub mod server;

// In-memory engine for tests and demos
pub mod fake;

// Chrome DevTools Protocol backend
#[cfg(feature = "cdp")]
pub mod cdp;

// Async adapter that drives the blocking CDP backend from worker threads
#[cfg(feature = "cdp")]
pub mod async_api;

#[cfg(feature = "cdp")]
pub use async_api::CdpLauncher;

/// Hardened launch flags for running the browser inside containers.
pub const DEFAULT_LAUNCH_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--no-first-run",
    "--no-zygote",
    "--single-process",
    "--disable-gpu",
];

/// Configuration for the rendering engine
///
/// The defaults match the request defaults of the HTTP surface: a 1920x1080
/// viewport and a 30 second navigation bound.
///
/// # Examples
///
/// ```
/// let cfg = pagesnap::EngineConfig::default();
/// assert_eq!(cfg.viewport.width, 1920);
/// assert_eq!(cfg.timeout_ms, 30000);
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Default viewport, also used as the launch window size
    pub viewport: Viewport,
    /// Navigation timeout in milliseconds
    pub timeout_ms: u64,
    /// User agent override applied when no device is emulated (browser default when `None`)
    pub user_agent: Option<String>,
    /// Path to the browser binary (auto-detected when `None`)
    pub browser_path: Option<PathBuf>,
    /// Whether to run the browser headless
    pub headless: bool,
    /// Whether to keep the browser sandbox enabled
    pub sandbox: bool,
    /// Extra command line flags passed to the browser
    pub launch_args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            timeout_ms: 30000,
            user_agent: None,
            browser_path: None,
            headless: true,
            sandbox: false,
            launch_args: DEFAULT_LAUNCH_ARGS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Time-based eviction policy for both caches
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Idle time after which a cached session is closed
    pub session_ttl: Duration,
    /// Age after which a cached capture is stale
    pub output_ttl: Duration,
    /// Period of the cleanup sweep
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(5 * 60),
            output_ttl: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Tuning for the lazy-load scroll pass run before full-page captures
#[derive(Debug, Clone)]
pub struct ScrollConfig {
    /// Pixels scrolled per step
    pub step_px: u32,
    /// Pause after each step so deferred content can load
    pub step_delay: Duration,
    /// Upper bound on steps for pages that keep growing
    pub max_steps: u32,
    /// Pause at the bottom before scrolling back to the top
    pub settle_delay: Duration,
    /// Quiet period with no new network activity that counts as idle
    pub idle_window: Duration,
    /// Cap on the total idle wait
    pub idle_timeout: Duration,
    /// How often network activity is sampled while waiting for idle
    pub idle_poll: Duration,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            step_px: 250,
            step_delay: Duration::from_millis(100),
            max_steps: 500,
            settle_delay: Duration::from_millis(1000),
            idle_window: Duration::from_millis(500),
            idle_timeout: Duration::from_secs(5),
            idle_poll: Duration::from_millis(100),
        }
    }
}

/// Top-level service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub engine: EngineConfig,
    pub cache: CacheConfig,
    pub scroll: ScrollConfig,
    /// Upper bound on the whole shutdown sequence
    pub shutdown_timeout: Duration,
    /// How long the HTTP boundary waits for a capture before giving up
    pub request_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            cache: CacheConfig::default(),
            scroll: ScrollConfig::default(),
            shutdown_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// A navigated, reusable rendering context bound to one URL.
///
/// Every call crosses into the engine and may suspend. `close` must be safe
/// to call more than once.
#[async_trait]
pub trait RenderSession: Send + Sync {
    /// Navigate to `url` and wait for the load-complete signal
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Apply a named device profile (metrics, touch, user agent)
    async fn emulate(&self, device: &DeviceProfile) -> Result<()>;

    /// Set explicit viewport dimensions and drop any device emulation
    async fn set_viewport(&self, viewport: Viewport) -> Result<()>;

    /// Evaluate a script in the page, awaiting promises, and return its JSON value
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Capture the viewport (or the whole scrollable page) as PNG bytes
    async fn capture(&self, full_page: bool) -> Result<Vec<u8>>;

    /// Release the underlying engine resource
    async fn close(&self) -> Result<()>;
}

/// A live rendering engine that owns every session opened from it.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Open a fresh, un-navigated session
    async fn open_session(&self) -> Result<Arc<dyn RenderSession>>;

    /// Shut down the engine and all of its sessions (no-op if already closed)
    async fn close(&self) -> Result<()>;
}

/// Starts engine instances. The service launches at most one at a time.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self, config: &EngineConfig) -> Result<Arc<dyn RenderEngine>>;
}

//! Chrome DevTools Protocol backend (blocking)
//!
//! Wraps the `headless_chrome` crate. Everything here blocks the calling
//! thread; [`crate::async_api`] drives it from worker threads.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::{Emulation, Page};
use headless_chrome::{Browser, LaunchOptions};
use log::debug;
use parking_lot::Mutex;
use serde::Deserialize;

use crate::{DeviceProfile, EngineConfig, Error, Result, Viewport};

// Keep the long-lived browser from being reaped by the driver's idle watchdog.
const BROWSER_IDLE_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

const CONTENT_SIZE_SCRIPT: &str = r#"(function() {
    const el = document.documentElement;
    const body = document.body;
    return {
        width: Math.max(el.scrollWidth, body ? body.scrollWidth : 0),
        height: Math.max(el.scrollHeight, body ? body.scrollHeight : 0)
    };
})()"#;

#[derive(Debug, Deserialize)]
struct ContentSize {
    width: f64,
    height: f64,
}

/// Current emulated screen of a tab
#[derive(Debug, Clone, Copy)]
struct Metrics {
    width: u32,
    height: u32,
    device_scale_factor: f64,
    mobile: bool,
}

fn metrics_override(m: &Metrics) -> Emulation::SetDeviceMetricsOverride {
    Emulation::SetDeviceMetricsOverride {
        width: m.width,
        height: m.height,
        device_scale_factor: m.device_scale_factor,
        mobile: m.mobile,
        scale: None,
        screen_width: None,
        screen_height: None,
        position_x: None,
        position_y: None,
        dont_set_visible_size: None,
        screen_orientation: None,
        viewport: None,
        display_feature: None,
        device_posture: None,
    }
}

/// A launched headless Chrome process
pub struct CdpBrowser {
    browser: Browser,
    config: EngineConfig,
    default_user_agent: String,
}

impl CdpBrowser {
    pub fn launch(config: EngineConfig) -> Result<Self> {
        let args: Vec<&OsStr> = config.launch_args.iter().map(OsStr::new).collect();
        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(config.sandbox)
            .path(config.browser_path.clone())
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .idle_browser_timeout(BROWSER_IDLE_TIMEOUT)
            .args(args)
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))?;

        let default_user_agent = browser
            .get_version()
            .map_err(|e| Error::InitializationError(format!("Failed to query browser version: {}", e)))?
            .user_agent;

        Ok(Self {
            browser,
            config,
            default_user_agent,
        })
    }

    /// Open a blank tab
    pub fn new_tab(&self) -> Result<CdpTab> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| Error::CdpError(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(Duration::from_millis(self.config.timeout_ms));

        Ok(CdpTab {
            tab,
            timeout_ms: self.config.timeout_ms,
            user_agent: self
                .config
                .user_agent
                .clone()
                .unwrap_or_else(|| self.default_user_agent.clone()),
            metrics: Mutex::new(Metrics {
                width: self.config.viewport.width,
                height: self.config.viewport.height,
                device_scale_factor: 1.0,
                mobile: false,
            }),
        })
    }
}

/// One browser tab
pub struct CdpTab {
    tab: Arc<Tab>,
    timeout_ms: u64,
    user_agent: String,
    metrics: Mutex<Metrics>,
}

impl CdpTab {
    pub fn navigate(&self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| Error::from_navigation_failure(url, self.timeout_ms, &e.to_string()))?;
        Ok(())
    }

    pub fn emulate(&self, device: &DeviceProfile) -> Result<()> {
        let metrics = Metrics {
            width: device.width,
            height: device.height,
            device_scale_factor: device.device_scale_factor,
            mobile: device.mobile,
        };
        self.apply_metrics(metrics)?;
        self.set_touch(device.touch)?;
        self.tab
            .set_user_agent(device.user_agent, None, None)
            .map_err(|e| Error::CdpError(format!("Failed to set user agent: {}", e)))?;
        Ok(())
    }

    pub fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        self.apply_metrics(Metrics {
            width: viewport.width,
            height: viewport.height,
            device_scale_factor: 1.0,
            mobile: false,
        })?;
        self.set_touch(false)?;
        self.tab
            .set_user_agent(&self.user_agent, None, None)
            .map_err(|e| Error::CdpError(format!("Failed to reset user agent: {}", e)))?;
        Ok(())
    }

    pub fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .tab
            .evaluate(script, true)
            .map_err(|e| Error::ScriptError(format!("Evaluation failed: {}", e)))?;
        Ok(result.value.unwrap_or(serde_json::Value::Null))
    }

    /// Capture PNG bytes. A full-page capture temporarily grows the emulated
    /// screen to the document's scroll height.
    pub fn capture(&self, full_page: bool) -> Result<Vec<u8>> {
        if !full_page {
            return self.screenshot();
        }

        let size: ContentSize = serde_json::from_value(self.evaluate(CONTENT_SIZE_SCRIPT)?)?;
        let original = *self.metrics.lock();
        let expanded = Metrics {
            width: original.width.max(size.width.ceil() as u32),
            height: original.height.max(size.height.ceil() as u32),
            ..original
        };
        debug!("Full page capture at {}x{}", expanded.width, expanded.height);

        self.apply_metrics(expanded)?;
        let shot = self.screenshot();
        let restored = self.apply_metrics(original);
        let png = shot?;
        restored?;
        Ok(png)
    }

    pub fn close(&self) -> Result<()> {
        self.tab
            .close(false)
            .map_err(|e| Error::CdpError(format!("Failed to close tab: {}", e)))?;
        Ok(())
    }

    fn screenshot(&self) -> Result<Vec<u8>> {
        self.tab
            .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| Error::RenderError(format!("Screenshot failed: {}", e)))
    }

    fn apply_metrics(&self, metrics: Metrics) -> Result<()> {
        self.tab
            .call_method(metrics_override(&metrics))
            .map_err(|e| Error::CdpError(format!("Failed to set device metrics: {}", e)))?;
        *self.metrics.lock() = metrics;
        Ok(())
    }

    fn set_touch(&self, enabled: bool) -> Result<()> {
        self.tab
            .call_method(Emulation::SetTouchEmulationEnabled {
                enabled,
                max_touch_points: None,
            })
            .map_err(|e| Error::CdpError(format!("Failed to set touch emulation: {}", e)))?;
        Ok(())
    }
}

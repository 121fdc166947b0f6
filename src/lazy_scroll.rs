//! Lazy-load scroll pass for full-page captures
//!
//! Pages that defer below-the-fold content only fetch it once it scrolls into
//! view. Before a full-page capture the page is stepped down to the bottom,
//! returned to the top, and given a short quiet period for the last requests
//! to settle.

use log::{debug, warn};
use serde::Deserialize;
use tokio::time::{sleep, Instant};

use crate::{RenderSession, Result, ScrollConfig};

const READ_METRICS_SCRIPT: &str = r#"(function() {
    return {
        scrollY: window.scrollY,
        innerHeight: window.innerHeight,
        pageHeight: Math.max(document.body ? document.body.scrollHeight : 0, document.documentElement.scrollHeight)
    };
})()"#;

const SCROLL_TO_TOP_SCRIPT: &str = "window.scrollTo({ top: 0 }); true";

const RESOURCE_COUNT_SCRIPT: &str = "performance.getEntriesByType('resource').length";

fn scroll_step_script(step_px: u32) -> String {
    format!("window.scrollBy(0, {}); true", step_px)
}

/// Scroll position reported by the page after a step
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollMetrics {
    pub scroll_y: f64,
    pub inner_height: f64,
    pub page_height: f64,
}

impl ScrollMetrics {
    pub fn at_bottom(&self) -> bool {
        self.inner_height + self.scroll_y >= self.page_height
    }
}

/// Why the scroll loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollStop {
    /// The viewport's bottom edge reached the page height
    Bottom,
    /// The offset did not advance between two steps
    Stuck,
    /// Gave up after `max_steps`
    StepLimit,
}

/// Summary of a completed scroll pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollOutcome {
    pub steps: u32,
    pub stop: ScrollStop,
    /// Whether the post-scroll network idle window was observed before the cap
    pub network_idle: bool,
}

async fn read_metrics(session: &dyn RenderSession) -> Result<ScrollMetrics> {
    let value = session.evaluate(READ_METRICS_SCRIPT).await?;
    Ok(serde_json::from_value(value)?)
}

/// Step the page to the bottom, then back to the top, then wait for the
/// network to go quiet.
///
/// Errors from the scroll steps propagate. The idle wait never fails: a page
/// with perpetual background traffic simply uses up `idle_timeout`.
pub async fn scroll_to_bottom(session: &dyn RenderSession, config: &ScrollConfig) -> Result<ScrollOutcome> {
    let step_script = scroll_step_script(config.step_px);
    let mut previous = read_metrics(session).await?.scroll_y;
    let mut steps = 0;

    let stop = loop {
        session.evaluate(&step_script).await?;
        steps += 1;
        sleep(config.step_delay).await;

        let metrics = read_metrics(session).await?;
        if metrics.at_bottom() {
            break ScrollStop::Bottom;
        }
        if metrics.scroll_y == previous {
            break ScrollStop::Stuck;
        }
        if steps >= config.max_steps {
            break ScrollStop::StepLimit;
        }
        previous = metrics.scroll_y;
    };
    debug!("Scroll pass stopped after {} steps ({:?})", steps, stop);

    sleep(config.settle_delay).await;
    session.evaluate(SCROLL_TO_TOP_SCRIPT).await?;

    let network_idle = wait_for_network_idle(session, config).await;
    if !network_idle {
        warn!("Post-scroll network idle wait timed out or failed, continuing anyway");
    }

    Ok(ScrollOutcome {
        steps,
        stop,
        network_idle,
    })
}

/// Wait until no new resource requests have started for `idle_window`,
/// giving up after `idle_timeout`. Returns whether idle was reached.
pub async fn wait_for_network_idle(session: &dyn RenderSession, config: &ScrollConfig) -> bool {
    let started = Instant::now();
    let mut last_count: Option<u64> = None;
    let mut quiet_since = Instant::now();

    loop {
        let count = match session.evaluate(RESOURCE_COUNT_SCRIPT).await {
            Ok(value) => value.as_u64(),
            Err(e) => {
                debug!("Network activity probe failed: {}", e);
                return false;
            }
        };
        let Some(count) = count else {
            return false;
        };

        let now = Instant::now();
        if last_count != Some(count) {
            last_count = Some(count);
            quiet_since = now;
        } else if now.duration_since(quiet_since) >= config.idle_window {
            return true;
        }

        if now.duration_since(started) >= config.idle_timeout {
            return false;
        }
        sleep(config.idle_poll).await;
    }
}

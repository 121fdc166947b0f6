//! HTTP surface over the screenshot service

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::error;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::{CaptureRequest, Error, ErrorKind, ScreenshotService, Viewport};

/// Raw query string of `GET /screenshot`. Everything arrives as text and is
/// parsed leniently: unparseable numbers fall back to the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotQuery {
    pub url: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub full_page: Option<String>,
    pub selected_device: Option<String>,
    /// Accepted for compatibility; not part of the capture parameters
    pub scale_factor: Option<String>,
}

impl ScreenshotQuery {
    /// Build the capture request, or `None` when `url` is missing.
    pub fn into_request(self) -> Option<CaptureRequest> {
        let url = self.url.filter(|u| !u.trim().is_empty())?;
        let defaults = Viewport::default();
        let request = CaptureRequest::new(url)
            .viewport(
                parse_dimension(self.width.as_deref()).unwrap_or(defaults.width),
                parse_dimension(self.height.as_deref()).unwrap_or(defaults.height),
            )
            .full_page(self.full_page.as_deref() == Some("true"));

        Some(match self.selected_device.filter(|d| !d.is_empty()) {
            Some(device) => request.device(device),
            None => request,
        })
    }
}

fn parse_dimension(raw: Option<&str>) -> Option<u32> {
    raw?.trim().parse::<u32>().ok().filter(|v| *v > 0)
}

/// HTTP status for an error surfaced by the pipeline.
pub fn status_for(err: &Error) -> StatusCode {
    match err.kind() {
        ErrorKind::NavigationTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::UnreachableTarget => StatusCode::BAD_REQUEST,
        ErrorKind::EngineUnavailable | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_message(err: &Error, url: &str) -> String {
    match err.kind() {
        ErrorKind::NavigationTimeout => format!(
            "Navigation timed out for {}. It might be a slow or unresponsive website.",
            url
        ),
        ErrorKind::UnreachableTarget => format!("Invalid or unreachable URL: {}. Please check the URL.", url),
        _ => "Failed to take screenshot due to an internal server error.".to_string(),
    }
}

fn json_error(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Build the router: `GET /` and `GET /screenshot`, with permissive CORS.
pub fn router(service: Arc<ScreenshotService>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/screenshot", get(screenshot))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

async fn index() -> &'static str {
    "Welcome to Screenshot API Tool!"
}

async fn screenshot(State(service): State<Arc<ScreenshotService>>, Query(query): Query<ScreenshotQuery>) -> Response {
    let Some(request) = query.into_request() else {
        return json_error(StatusCode::BAD_REQUEST, "URL query parameter is required.".to_string());
    };

    // The capture runs detached: if we stop waiting, it still completes and
    // fills the caches for the next request.
    let url = request.url.clone();
    let timeout = service.config().request_timeout;
    let task = tokio::spawn(async move { service.capture(&request).await });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(png))) => ([(header::CONTENT_TYPE, "image/png")], png.to_vec()).into_response(),
        Ok(Ok(Err(err))) => {
            error!("API Error for {}: {}", url, err);
            json_error(status_for(&err), error_message(&err, &url))
        }
        Ok(Err(join_err)) => {
            error!("Capture task for {} failed: {}", url, join_err);
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to take screenshot due to an internal server error.".to_string(),
            )
        }
        Err(_) => {
            error!("Gave up waiting for capture of {} after {:?}", url, timeout);
            json_error(
                StatusCode::GATEWAY_TIMEOUT,
                format!("Timed out waiting for a screenshot of {}.", url),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> ScreenshotQuery {
        let mut q = ScreenshotQuery::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "url" => q.url = v,
                "width" => q.width = v,
                "height" => q.height = v,
                "fullPage" => q.full_page = v,
                "selectedDevice" => q.selected_device = v,
                "scaleFactor" => q.scale_factor = v,
                _ => {}
            }
        }
        q
    }

    #[test]
    fn missing_url_yields_no_request() {
        assert!(query(&[]).into_request().is_none());
        assert!(query(&[("url", "  ")]).into_request().is_none());
    }

    #[test]
    fn defaults_apply_for_absent_or_bad_dimensions() {
        let req = query(&[("url", "https://a.test"), ("width", "abc")]).into_request().unwrap();
        assert_eq!((req.width, req.height), (1920, 1080));
        assert!(!req.full_page);
        assert!(req.device.is_none());
    }

    #[test]
    fn full_page_requires_literal_true_and_empty_device_is_absent() {
        let req = query(&[
            ("url", "https://a.test"),
            ("width", "800"),
            ("height", "600"),
            ("fullPage", "TRUE"),
            ("selectedDevice", ""),
            ("scaleFactor", "2"),
        ])
        .into_request()
        .unwrap();
        assert_eq!(req.fingerprint(), "https://a.test-800-600-false-null");
    }

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(status_for(&Error::Timeout(30000)), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(&Error::Unreachable("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&Error::EngineUnavailable), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_for(&Error::RenderError("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

//! Capture pipeline behaviour against the in-memory engine

use std::sync::Arc;
use std::time::Duration;

use pagesnap::fake::{FakeEngine, FakeLauncher};
use pagesnap::{CaptureRequest, Error, ErrorKind, ScreenshotService, ServiceConfig, Viewport};

async fn started_service() -> (Arc<ScreenshotService>, FakeEngine) {
    let engine = FakeEngine::new();
    let launcher = FakeLauncher::new(engine.clone());
    let service = Arc::new(ScreenshotService::new(ServiceConfig::default(), Arc::new(launcher)));
    service.initialize().await.expect("initialize");
    (service, engine)
}

#[tokio::test(start_paused = true)]
async fn identical_requests_are_served_from_cache() {
    let (service, engine) = started_service().await;
    let req = CaptureRequest::new("https://example.com").viewport(800, 600);
    assert_eq!(req.fingerprint(), "https://example.com-800-600-false-null");

    let first = service.capture(&req).await.unwrap();
    let counts = engine.counts();
    assert_eq!(counts.sessions_opened, 1);
    assert_eq!(counts.navigations, 1);
    assert_eq!(counts.captures, 1);
    assert!(service.sessions().contains("https://example.com"));

    tokio::time::advance(Duration::from_secs(2 * 60)).await;
    let second = service.capture(&req).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(engine.counts().engine_calls(), counts.engine_calls());

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn stale_output_triggers_a_fresh_capture() {
    let (service, engine) = started_service().await;
    let req = CaptureRequest::new("https://example.com").viewport(800, 600);

    let first = service.capture(&req).await.unwrap();
    // Keep the session alive while the output ages out
    for _ in 0..15 {
        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        service.sessions().get("https://example.com");
    }
    let second = service.capture(&req).await.unwrap();

    assert_ne!(first, second);
    assert_eq!(engine.counts().captures, 2);
    assert_eq!(engine.counts().navigations, 1);

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn session_is_reused_with_the_new_viewport() {
    let (service, engine) = started_service().await;

    service
        .capture(&CaptureRequest::new("https://a.test").viewport(1024, 768))
        .await
        .unwrap();
    service
        .capture(&CaptureRequest::new("https://a.test").viewport(375, 667))
        .await
        .unwrap();

    let counts = engine.counts();
    assert_eq!(counts.sessions_opened, 1);
    assert_eq!(counts.navigations, 1);
    assert_eq!(counts.viewports, 2);
    let session = engine.last_session().unwrap();
    assert_eq!(session.viewport(), Viewport { width: 375, height: 667 });

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn idle_session_is_swept_and_renavigated() {
    let (service, engine) = started_service().await;

    service
        .capture(&CaptureRequest::new("https://a.test").viewport(800, 600))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(6 * 60 + 1)).await;

    assert!(!service.sessions().contains("https://a.test"));
    assert!(engine.sessions()[0].is_closed());

    service
        .capture(&CaptureRequest::new("https://a.test").viewport(640, 480))
        .await
        .unwrap();
    assert_eq!(engine.counts().sessions_opened, 2);
    assert_eq!(engine.counts().navigations, 2);

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unknown_device_falls_back_to_viewport() {
    let (service, engine) = started_service().await;
    let req = CaptureRequest::new("https://a.test").device("unknown-device-xyz");

    let png = service.capture(&req).await.expect("capture should not fail");
    assert!(!png.is_empty());

    let session = engine.last_session().unwrap();
    assert_eq!(session.device(), None);
    assert_eq!(session.viewport(), Viewport::default());
    assert_eq!(engine.counts().emulations, 0);

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unknown_device_ignores_explicit_dimensions() {
    let (service, engine) = started_service().await;
    let req = CaptureRequest::new("https://a.test")
        .viewport(1280, 720)
        .device("unknown-device-xyz");

    service.capture(&req).await.unwrap();

    assert_eq!(engine.last_session().unwrap().viewport(), Viewport::default());
    assert!(service
        .outputs()
        .get("https://a.test-1280-720-false-unknown-device-xyz")
        .is_some());

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn concurrent_captures_of_one_url_keep_their_viewports() {
    let (service, engine) = started_service().await;
    service
        .capture(&CaptureRequest::new("https://a.test").viewport(800, 600))
        .await
        .unwrap();

    let desktop = CaptureRequest::new("https://a.test").viewport(800, 600).full_page(true);
    let phone = CaptureRequest::new("https://a.test").viewport(375, 667).full_page(true);
    let (desktop_png, phone_png) = tokio::join!(service.capture(&desktop), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        service.capture(&phone).await
    });

    let desktop_png = String::from_utf8_lossy(&desktop_png.unwrap()).into_owned();
    let phone_png = String::from_utf8_lossy(&phone_png.unwrap()).into_owned();
    assert!(desktop_png.starts_with("PNG|https://a.test|800x600|"), "{}", desktop_png);
    assert!(phone_png.starts_with("PNG|https://a.test|375x667|"), "{}", phone_png);

    let cached = service.outputs().get(&desktop.fingerprint()).unwrap();
    assert!(String::from_utf8_lossy(&cached).contains("|800x600|"));
    assert_eq!(engine.counts().sessions_opened, 1);

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn waiting_request_reuses_output_rendered_meanwhile() {
    let (service, engine) = started_service().await;
    service
        .capture(&CaptureRequest::new("https://a.test").viewport(800, 600))
        .await
        .unwrap();

    let req = CaptureRequest::new("https://a.test").viewport(640, 480).full_page(true);
    let (first, second) = tokio::join!(service.capture(&req), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        service.capture(&req).await
    });

    assert_eq!(first.unwrap(), second.unwrap());
    assert_eq!(engine.counts().captures, 2);

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn device_overrides_explicit_dimensions() {
    let (service, engine) = started_service().await;
    let req = CaptureRequest::new("https://a.test").viewport(1280, 720).device("iPhone X");

    service.capture(&req).await.unwrap();

    let session = engine.last_session().unwrap();
    assert_eq!(session.device(), Some("iPhone X"));
    assert_eq!(session.viewport(), Viewport { width: 375, height: 812 });
    assert_eq!(engine.counts().viewports, 0);

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_reused_session_is_evicted() {
    let (service, engine) = started_service().await;
    service
        .capture(&CaptureRequest::new("https://a.test").viewport(800, 600))
        .await
        .unwrap();

    engine.fail_next_captures(1);
    let err = service
        .capture(&CaptureRequest::new("https://a.test").viewport(640, 480))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RenderError(_)));
    assert!(!service.sessions().contains("https://a.test"));
    assert!(engine.sessions()[0].is_closed());

    service
        .capture(&CaptureRequest::new("https://a.test").viewport(640, 480))
        .await
        .unwrap();
    assert_eq!(engine.counts().navigations, 2);
    assert!(!engine.sessions()[1].is_closed());

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unreachable_target_is_not_cached() {
    let (service, engine) = started_service().await;
    engine.fail_navigation("https://nope.invalid", "net::ERR_NAME_NOT_RESOLVED");

    let err = service
        .capture(&CaptureRequest::new("https://nope.invalid"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnreachableTarget);
    assert!(service.sessions().is_empty());
    assert!(service.outputs().is_empty());
    assert!(engine.last_session().unwrap().is_closed());

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn slow_navigation_times_out() {
    let engine = FakeEngine::new();
    let mut config = ServiceConfig::default();
    config.engine.timeout_ms = 1000;
    let service = ScreenshotService::new(config, Arc::new(FakeLauncher::new(engine.clone())));
    service.initialize().await.unwrap();
    engine.set_navigation_delay(Some(Duration::from_secs(5)));

    let err = service
        .capture(&CaptureRequest::new("https://slow.test"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout(1000)));
    assert!(service.sessions().is_empty());

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn full_page_capture_scrolls_first() {
    let (service, engine) = started_service().await;
    engine.set_page_height(2000.0);

    let png = service
        .capture(&CaptureRequest::new("https://long.test").viewport(800, 600).full_page(true))
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&png).contains("full=true"));

    let session = engine.last_session().unwrap();
    // scrolled back to the top before capturing
    assert_eq!(session.scroll_y(), 0.0);
    assert!(engine.counts().evaluations > 0);

    service.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn capture_before_initialize_reports_engine_unavailable() {
    let engine = FakeEngine::new();
    let service = ScreenshotService::new(ServiceConfig::default(), Arc::new(FakeLauncher::new(engine.clone())));

    let err = service
        .capture(&CaptureRequest::new("https://a.test"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EngineUnavailable));
    assert_eq!(engine.counts().engine_calls(), 0);
}

//! Capture a page with a local Chrome and write it to disk
//!
//! `cargo run --example cdp_capture --features cdp -- https://example.com`

use std::sync::Arc;

use pagesnap::{CaptureRequest, CdpLauncher, ScreenshotService, ServiceConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let url = std::env::args().nth(1).unwrap_or_else(|| "https://example.com".to_string());
    let request = CaptureRequest::new(&url).viewport(1280, 720).full_page(true);

    println!("Launching browser...");
    let service = ScreenshotService::new(ServiceConfig::default(), Arc::new(CdpLauncher));
    service.initialize().await?;

    println!("Capturing {} ({})", url, request.fingerprint());
    let result = service.capture(&request).await;
    service.shutdown().await;

    let png = result?;
    std::fs::write("screenshot.png", &png[..])?;
    println!("Screenshot saved to: screenshot.png ({} bytes)", png.len());

    Ok(())
}

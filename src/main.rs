use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::{error, info};

use pagesnap::lifecycle::shutdown_signal;
use pagesnap::{server, CdpLauncher, ScreenshotService, ServiceConfig};

/// Screenshot API backed by a shared headless Chrome
#[derive(Debug, Parser)]
#[command(name = "pagesnap", version, about)]
struct Cli {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Browser binary (auto-detected when omitted)
    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<PathBuf>,

    /// Navigation timeout in milliseconds
    #[arg(long, env = "PAGESNAP_NAVIGATION_TIMEOUT_MS", default_value_t = 30000)]
    navigation_timeout_ms: u64,

    /// Close cached sessions idle for this many seconds
    #[arg(long, env = "PAGESNAP_SESSION_TTL_SECS", default_value_t = 300)]
    session_ttl_secs: u64,

    /// Treat cached screenshots older than this many seconds as stale
    #[arg(long, env = "PAGESNAP_OUTPUT_TTL_SECS", default_value_t = 3600)]
    output_ttl_secs: u64,

    /// Seconds between cache sweeps
    #[arg(long, env = "PAGESNAP_SWEEP_INTERVAL_SECS", default_value_t = 60)]
    sweep_interval_secs: u64,

    /// Seconds a request waits for its screenshot before giving up
    #[arg(long, env = "PAGESNAP_REQUEST_TIMEOUT_SECS", default_value_t = 120)]
    request_timeout_secs: u64,

    /// Keep the browser sandbox enabled
    #[arg(long, env = "PAGESNAP_SANDBOX")]
    sandbox: bool,
}

impl Cli {
    fn service_config(&self) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.engine.browser_path = self.chrome_path.clone();
        config.engine.timeout_ms = self.navigation_timeout_ms;
        config.engine.sandbox = self.sandbox;
        if self.sandbox {
            config
                .engine
                .launch_args
                .retain(|arg| arg != "--no-sandbox" && arg != "--disable-setuid-sandbox");
        }
        config.cache.session_ttl = Duration::from_secs(self.session_ttl_secs);
        config.cache.output_ttl = Duration::from_secs(self.output_ttl_secs);
        config.cache.sweep_interval = Duration::from_secs(self.sweep_interval_secs);
        config.request_timeout = Duration::from_secs(self.request_timeout_secs);
        config
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()).await {
        error!("Server failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cli.host, cli.port))?;

    let service = Arc::new(ScreenshotService::new(cli.service_config(), Arc::new(CdpLauncher)));
    service
        .initialize()
        .await
        .context("failed to launch the rendering engine")?;

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            service.shutdown().await;
            return Err(e).with_context(|| format!("failed to bind {}", addr));
        }
    };
    info!("Screenshot API service listening at http://{}", addr);
    info!("Example usage: http://{}/screenshot?url=https://www.google.com", addr);
    info!("Example full page: http://{}/screenshot?url=https://www.example.com&fullPage=true", addr);

    let served = axum::serve(listener, server::router(service.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    service.shutdown().await;
    served.context("server error")
}

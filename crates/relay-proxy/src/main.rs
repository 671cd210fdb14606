//! relay-proxy: same-origin reverse proxy that relays browser requests under a
//! fixed mount path to the SAML / password-login backend.

mod config;
mod proxy;
mod server;

use std::time::Duration;

use config::ProxyConfig;
use proxy::forward::Forwarder;
use server::AppState;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let flag = |name: &str| {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1).cloned())
    };

    let config_path = flag("--config")
        .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
        .or_else(|| std::env::var("RELAY_PROXY_CONFIG").ok())
        .unwrap_or_else(|| "relay-proxy.toml".to_string());

    let mut config = ProxyConfig::load(&config_path)?;

    // CLI flags take precedence over TOML and env vars
    if let Some(url) = flag("--backend-url") {
        config.backend.base_url = url;
    }
    if let Some(addr) = flag("--listen") {
        config.server.listen_address = addr;
    }

    // The tonic OTLP exporter needs a reactor, so build the runtime first
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let tracing_guard = relay_tracing::init_tracing(&config.tracing);

        tracing::info!(
            config_path = %config_path,
            listen_address = %config.server.listen_address,
            mount_path = %config.server.mount_path,
            backend = %config.backend.base_url,
            otlp = tracing_guard.exporting(),
            "Starting relay-proxy"
        );

        run(config).await
    })
}

async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    let origin = config.backend.origin()?;
    let forwarder = Forwarder::new(origin, Duration::from_secs(config.backend.timeout_secs))?;

    server::run(AppState { config, forwarder }).await
}

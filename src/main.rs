use anyhow::Context;
use coinact::core::config::ProxyConfig;
use coinact::exchanges::zaif::ZaifRest;
use coinact::proxy::{DepthFetcher, DepthHub, DepthServer};
use std::sync::Arc;
use tracing::info;

const CONFIG_PREFIX: &str = "COINACT_PROXY";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = ProxyConfig::from_env_file(CONFIG_PREFIX)
        .with_context(|| format!("can not load {}_* configuration", CONFIG_PREFIX))?;
    if config.currency_pairs.is_empty() {
        anyhow::bail!("{}_CURRENCY_PAIRS is empty", CONFIG_PREFIX);
    }

    let hub = DepthHub::new(&config.currency_pairs);
    let server = Arc::new(DepthServer::bind(&config.listen_addr, hub.clone()).await?);
    let rest = Arc::new(ZaifRest::new(&config.connector_config()));
    let fetcher = Arc::new(DepthFetcher::new(rest, hub, &config));

    let server_task = tokio::spawn({
        let server = server.clone();
        async move { server.run().await }
    });
    let fetcher_task = tokio::spawn({
        let fetcher = fetcher.clone();
        async move { fetcher.run().await }
    });

    tokio::signal::ctrl_c()
        .await
        .context("can not wait for the shutdown signal")?;
    info!("shutting down");

    fetcher.stop();
    server.stop();
    fetcher_task.await?;
    server_task.await?;
    Ok(())
}

use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use watchcluster::config::Config;
use watchcluster::notifier::{NotifierConfig, WebhookNotifier};
use watchcluster::reconciler::Reconciler;
use watchcluster::registry::RegistryGateway;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(
        pod_name = config.pod_name.as_deref().unwrap_or("unknown"),
        pod_namespace = config.pod_namespace.as_deref().unwrap_or("unknown"),
        "starting watchcluster"
    );

    let client = kube::Client::try_default().await?;
    let gateway = RegistryGateway::new();
    let notifier = Arc::new(WebhookNotifier::new(NotifierConfig::from_env()));
    let reconciler = Reconciler::new(client, gateway, notifier);

    let metrics_addr = config.metrics_addr;
    let metrics_task = tokio::spawn(async move {
        if let Err(err) = watchcluster::metrics::start_metrics_server(metrics_addr).await {
            tracing::error!(%err, "metrics server exited");
        }
    });

    let reconciler_task = tokio::spawn({
        let reconciler = Arc::clone(&reconciler);
        async move { reconciler.run().await }
    });

    tokio::select! {
        _ = metrics_task => {
            tracing::warn!("metrics server task exited");
        }
        _ = reconciler_task => {
            tracing::warn!("reconciler task exited");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    reconciler.shutdown().await;
    Ok(())
}

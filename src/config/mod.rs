//! Process-environment configuration for the ambient concerns this crate
//! owns directly: log filtering and the metrics server bind address.
//! Workload-level behavior (annotations, §6) is read per-workload by the
//! reconciler, not here.

use std::net::SocketAddr;

const DEFAULT_LOG_FILTER: &str = "watchcluster=info,kube=info";
const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9090";

#[derive(Debug, Clone)]
pub struct Config {
    pub log_filter: String,
    pub metrics_addr: SocketAddr,
    /// Downward-API identity of the running controller pod, logged at startup
    /// for correlating webhook events/audit annotations back to the instance
    /// that made them. Not read anywhere else in the core (spec.md §6).
    pub pod_name: Option<String>,
    pub pod_namespace: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let log_filter = std::env::var("WATCHCLUSTER_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());

        let metrics_addr = std::env::var("WATCHCLUSTER_METRICS_ADDR")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| DEFAULT_METRICS_ADDR.parse().expect("default metrics addr parses"));

        let pod_name = std::env::var("POD_NAME").ok();
        let pod_namespace = std::env::var("POD_NAMESPACE").ok();

        Self { log_filter, metrics_addr, pod_name, pod_namespace }
    }
}

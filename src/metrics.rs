use std::net::SocketAddr;
use tracing::{info, warn};

/// Installs the Prometheus exporter. Port comes from `GIGMAP_METRICS_PORT`
/// when set.
pub fn init_metrics() {
    let port: u16 = std::env::var("GIGMAP_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9898);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => {
            info!(
                "Prometheus exporter installed and listening on http://{}/metrics",
                addr
            );
        }
        Err(e) => {
            warn!(
                "Prometheus exporter install failed (possibly already installed): {}",
                e
            );
        }
    }
}

use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Port of the Prometheus scrape endpoint.
const METRICS_PORT: u16 = 9000;

/// Installs the global metrics recorder and starts the scrape endpoint on `[::]:9000/metrics`.
///
/// Every metric carries an `index` global label so several indexers can share one Prometheus.
pub fn init_metrics(index_name: &str) -> Result<(), BuildError> {
    exporter(index_name).install()
}

fn exporter(index_name: &str) -> PrometheusBuilder {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::new(
            IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            METRICS_PORT,
        ))
        .add_global_label("index", index_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_carry_the_index_label() {
        let recorder = exporter("releases_rt").build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("indexer_test_events_total").increment(2);
        });

        let rendered = handle.render();
        assert!(rendered.contains(r#"indexer_test_events_total{index="releases_rt"} 2"#));
    }
}

use chrono::Duration;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::models::scan::ScanEvent;
use crate::observability::metrics::Metrics;
use crate::store::Store;

pub struct AppState {
    pub store: Store,
    pub scan_events_tx: broadcast::Sender<ScanEvent>,
    pub metrics: Metrics,
    pub sla: Duration,
    pub tracking_prefix: String,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let (scan_events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);

        Self {
            store: Store::new(),
            scan_events_tx,
            metrics: Metrics::new(),
            sla: Duration::hours(config.sla_hours),
            tracking_prefix: config.tracking_prefix.to_ascii_uppercase(),
        }
    }
}

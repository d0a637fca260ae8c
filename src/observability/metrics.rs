use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub parcel_transitions_total: IntCounterVec,
    pub pickup_accepts_total: IntCounterVec,
    pub parcels_created_total: IntCounter,
    pub deliveries_total: IntCounterVec,
    pub route_start_latency_seconds: Histogram,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let parcel_transitions_total = IntCounterVec::new(
            Opts::new(
                "parcel_transitions_total",
                "Parcel lifecycle actions by action and outcome",
            ),
            &["action", "outcome"],
        )
        .expect("valid parcel_transitions_total metric");

        let pickup_accepts_total = IntCounterVec::new(
            Opts::new("pickup_accepts_total", "Pickup acceptance attempts by outcome"),
            &["outcome"],
        )
        .expect("valid pickup_accepts_total metric");

        let parcels_created_total =
            IntCounter::new("parcels_created_total", "Parcels materialized from pickups")
                .expect("valid parcels_created_total metric");

        let deliveries_total = IntCounterVec::new(
            Opts::new("deliveries_total", "Delivery finalizations by outcome"),
            &["outcome"],
        )
        .expect("valid deliveries_total metric");

        let route_start_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "route_start_latency_seconds",
            "Latency of starting a route including its parcel transitions",
        ))
        .expect("valid route_start_latency_seconds metric");

        registry
            .register(Box::new(parcel_transitions_total.clone()))
            .expect("register parcel_transitions_total");
        registry
            .register(Box::new(pickup_accepts_total.clone()))
            .expect("register pickup_accepts_total");
        registry
            .register(Box::new(parcels_created_total.clone()))
            .expect("register parcels_created_total");
        registry
            .register(Box::new(deliveries_total.clone()))
            .expect("register deliveries_total");
        registry
            .register(Box::new(route_start_latency_seconds.clone()))
            .expect("register route_start_latency_seconds");

        Self {
            registry,
            parcel_transitions_total,
            pickup_accepts_total,
            parcels_created_total,
            deliveries_total,
            route_start_latency_seconds,
        }
    }

    pub fn record_transition(&self, action: &str, ok: bool) {
        self.parcel_transitions_total
            .with_label_values(&[action, outcome(ok)])
            .inc();
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

pub fn outcome(ok: bool) -> &'static str {
    if ok { "success" } else { "error" }
}

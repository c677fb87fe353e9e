use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub active_deliveries: IntGauge,
    pub assignment_latency_seconds: HistogramVec,
    pub location_pings_total: IntCounterVec,
    pub tracking_lookups_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new(
                "transitions_total",
                "Status transitions by target status and outcome",
            ),
            &["target", "outcome"],
        )
        .expect("valid transitions_total metric");

        let active_deliveries = IntGauge::new(
            "active_deliveries",
            "Current number of deliveries in a non-terminal status",
        )
        .expect("valid active_deliveries metric");

        let assignment_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "assignment_latency_seconds",
                "Latency of driver selection and assignment in seconds",
            ),
            &["outcome"],
        )
        .expect("valid assignment_latency_seconds metric");

        let location_pings_total = IntCounterVec::new(
            Opts::new(
                "location_pings_total",
                "Driver location reports by outcome (accepted or stale)",
            ),
            &["outcome"],
        )
        .expect("valid location_pings_total metric");

        let tracking_lookups_total = IntCounterVec::new(
            Opts::new(
                "tracking_lookups_total",
                "Public tracking lookups by outcome (hit or miss)",
            ),
            &["outcome"],
        )
        .expect("valid tracking_lookups_total metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(active_deliveries.clone()))
            .expect("register active_deliveries");
        registry
            .register(Box::new(assignment_latency_seconds.clone()))
            .expect("register assignment_latency_seconds");
        registry
            .register(Box::new(location_pings_total.clone()))
            .expect("register location_pings_total");
        registry
            .register(Box::new(tracking_lookups_total.clone()))
            .expect("register tracking_lookups_total");

        Self {
            registry,
            transitions_total,
            active_deliveries,
            assignment_latency_seconds,
            location_pings_total,
            tracking_lookups_total,
        }
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

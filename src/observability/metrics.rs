use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub rides_posted_total: IntCounter,
    pub accept_outcomes_total: IntCounterVec,
    pub provider_latency_seconds: HistogramVec,
    pub drivers_available: IntGauge,
    pub active_rides: IntGauge,
    pub messages_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let rides_posted_total =
            IntCounter::new("rides_posted_total", "Total rides posted to the dispatcher")
                .expect("valid rides_posted_total metric");

        let accept_outcomes_total = IntCounterVec::new(
            Opts::new("accept_outcomes_total", "Driver accept attempts by outcome"),
            &["outcome"],
        )
        .expect("valid accept_outcomes_total metric");

        let provider_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "provider_latency_seconds",
                "Latency of geocoding and routing calls in seconds",
            ),
            &["call", "outcome"],
        )
        .expect("valid provider_latency_seconds metric");

        let drivers_available =
            IntGauge::new("drivers_available", "Drivers currently available for dispatch")
                .expect("valid drivers_available metric");

        let active_rides = IntGauge::new("active_rides", "Rides in a non-terminal state")
            .expect("valid active_rides metric");

        let messages_total = IntCounterVec::new(
            Opts::new("messages_total", "Conversation operations by kind"),
            &["op"],
        )
        .expect("valid messages_total metric");

        registry
            .register(Box::new(rides_posted_total.clone()))
            .expect("register rides_posted_total");
        registry
            .register(Box::new(accept_outcomes_total.clone()))
            .expect("register accept_outcomes_total");
        registry
            .register(Box::new(provider_latency_seconds.clone()))
            .expect("register provider_latency_seconds");
        registry
            .register(Box::new(drivers_available.clone()))
            .expect("register drivers_available");
        registry
            .register(Box::new(active_rides.clone()))
            .expect("register active_rides");
        registry
            .register(Box::new(messages_total.clone()))
            .expect("register messages_total");

        Self {
            registry,
            rides_posted_total,
            accept_outcomes_total,
            provider_latency_seconds,
            drivers_available,
            active_rides,
            messages_total,
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

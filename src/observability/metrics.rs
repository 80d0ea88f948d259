use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub accepts_total: IntCounterVec,
    pub online_drivers: IntGauge,
    pub accept_latency_seconds: HistogramVec,
    pub events_pushed_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let accepts_total = IntCounterVec::new(
            Opts::new("accepts_total", "Total ride accept attempts by outcome"),
            &["outcome"],
        )
        .expect("valid accepts_total metric");

        let online_drivers = IntGauge::new("online_drivers", "Current number of online drivers")
            .expect("valid online_drivers metric");

        let accept_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "accept_latency_seconds",
                "Latency of accept processing in seconds",
            ),
            &["outcome"],
        )
        .expect("valid accept_latency_seconds metric");

        let events_pushed_total = IntCounterVec::new(
            Opts::new("events_pushed_total", "Total events pushed to drivers by kind"),
            &["event"],
        )
        .expect("valid events_pushed_total metric");

        registry
            .register(Box::new(accepts_total.clone()))
            .expect("register accepts_total");
        registry
            .register(Box::new(online_drivers.clone()))
            .expect("register online_drivers");
        registry
            .register(Box::new(accept_latency_seconds.clone()))
            .expect("register accept_latency_seconds");
        registry
            .register(Box::new(events_pushed_total.clone()))
            .expect("register events_pushed_total");

        Self {
            registry,
            accepts_total,
            online_drivers,
            accept_latency_seconds,
            events_pushed_total,
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

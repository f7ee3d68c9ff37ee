//! Prometheus metrics for streaming sessions
//!
//! Every series is labelled by broker and pipeline kind.

use mdstream_metadata::Pipeline;
use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter_vec, register_int_gauge_vec, Encoder, IntCounterVec, IntGaugeVec,
    TextEncoder,
};

const LABEL_BROKER: &str = "broker";
const LABEL_PIPELINE: &str = "pipeline";

static RECORDS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mdstream_records_total",
        "New records extracted and handed to the consumer",
        &[LABEL_BROKER, LABEL_PIPELINE]
    )
    .expect("Failed to register records_total metric")
});

static TICKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mdstream_ticks_total",
        "Diff-extract ticks executed",
        &[LABEL_BROKER, LABEL_PIPELINE]
    )
    .expect("Failed to register ticks_total metric")
});

static TICK_OVERRUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mdstream_tick_overruns_total",
        "Ticks that ran close to or past their period",
        &[LABEL_BROKER, LABEL_PIPELINE]
    )
    .expect("Failed to register tick_overruns_total metric")
});

static SUBSCRIBE_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mdstream_subscribe_failures_total",
        "Batch subscription requests that failed",
        &[LABEL_BROKER, LABEL_PIPELINE]
    )
    .expect("Failed to register subscribe_failures_total metric")
});

static CONSUMER_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mdstream_consumer_failures_total",
        "Batches the downstream consumer failed to accept",
        &[LABEL_BROKER, LABEL_PIPELINE]
    )
    .expect("Failed to register consumer_failures_total metric")
});

static SESSION_RUNNING: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "mdstream_session_running",
        "Session state (1=running, 0=not running)",
        &[LABEL_BROKER, LABEL_PIPELINE]
    )
    .expect("Failed to register session_running metric")
});

static SYMBOLS_SUBSCRIBED: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "mdstream_symbols_subscribed",
        "Symbols in the session universe",
        &[LABEL_BROKER, LABEL_PIPELINE]
    )
    .expect("Failed to register symbols_subscribed metric")
});

/// Handle for recording metrics of one session
#[derive(Clone)]
pub struct SessionMetrics {
    broker: String,
    pipeline: &'static str,
}

impl SessionMetrics {
    pub fn new(broker: impl Into<String>, pipeline: Pipeline) -> Self {
        Self {
            broker: broker.into(),
            pipeline: pipeline.as_str(),
        }
    }

    fn labels(&self) -> [&str; 2] {
        [&self.broker, self.pipeline]
    }

    pub fn add_records(&self, count: usize) {
        RECORDS_TOTAL
            .with_label_values(&self.labels())
            .inc_by(count as u64);
    }

    pub fn inc_tick(&self) {
        TICKS_TOTAL.with_label_values(&self.labels()).inc();
    }

    pub fn inc_tick_overrun(&self) {
        TICK_OVERRUNS_TOTAL.with_label_values(&self.labels()).inc();
    }

    pub fn inc_subscribe_failure(&self) {
        SUBSCRIBE_FAILURES_TOTAL.with_label_values(&self.labels()).inc();
    }

    pub fn inc_consumer_failure(&self) {
        CONSUMER_FAILURES_TOTAL.with_label_values(&self.labels()).inc();
    }

    pub fn set_running(&self, running: bool) {
        SESSION_RUNNING
            .with_label_values(&self.labels())
            .set(i64::from(running));
    }

    pub fn set_symbols(&self, count: usize) {
        SYMBOLS_SUBSCRIBED
            .with_label_values(&self.labels())
            .set(count as i64);
    }

    pub fn records(&self) -> u64 {
        RECORDS_TOTAL.with_label_values(&self.labels()).get()
    }

    pub fn ticks(&self) -> u64 {
        TICKS_TOTAL.with_label_values(&self.labels()).get()
    }

    pub fn tick_overruns(&self) -> u64 {
        TICK_OVERRUNS_TOTAL.with_label_values(&self.labels()).get()
    }

    pub fn subscribe_failures(&self) -> u64 {
        SUBSCRIBE_FAILURES_TOTAL.with_label_values(&self.labels()).get()
    }

    pub fn consumer_failures(&self) -> u64 {
        CONSUMER_FAILURES_TOTAL.with_label_values(&self.labels()).get()
    }
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e))
    })
}

use std::sync::atomic::{AtomicU64, Ordering};

use lazy_static::lazy_static;
use prometheus::{core::Collector, IntCounter, IntCounterVec, Registry};
use tracing::error;
use workflow_core_types::ActionKind;

#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureMetricsSnapshot {
    pub captured: u64,
    pub malformed: u64,
    pub dropped: u64,
}

static CAPTURED: AtomicU64 = AtomicU64::new(0);
static MALFORMED: AtomicU64 = AtomicU64::new(0);
static DROPPED: AtomicU64 = AtomicU64::new(0);

lazy_static! {
    static ref CAPTURED_ACTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new(
            "workflow_captured_actions_total",
            "Actions appended to the recording buffer"
        ),
        &["kind"]
    )
    .unwrap();
    static ref MALFORMED_LINES_TOTAL: IntCounter = IntCounter::new(
        "workflow_capture_malformed_lines_total",
        "Tagged console lines that failed to decode"
    )
    .unwrap();
    static ref DROPPED_LINES_TOTAL: IntCounter = IntCounter::new(
        "workflow_capture_dropped_lines_total",
        "Console events lost before reaching the capture transport"
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register capture metric");
        }
    }
}

pub fn register_metrics(registry: &Registry) {
    register(registry, CAPTURED_ACTIONS_TOTAL.clone());
    register(registry, MALFORMED_LINES_TOTAL.clone());
    register(registry, DROPPED_LINES_TOTAL.clone());
}

pub fn record_captured(kind: ActionKind) {
    CAPTURED.fetch_add(1, Ordering::Relaxed);
    CAPTURED_ACTIONS_TOTAL
        .with_label_values(&[kind.as_str()])
        .inc();
}

pub fn record_malformed() {
    MALFORMED.fetch_add(1, Ordering::Relaxed);
    MALFORMED_LINES_TOTAL.inc();
}

pub fn record_dropped(count: u64) {
    DROPPED.fetch_add(count, Ordering::Relaxed);
    DROPPED_LINES_TOTAL.inc_by(count);
}

pub fn snapshot() -> CaptureMetricsSnapshot {
    CaptureMetricsSnapshot {
        captured: CAPTURED.load(Ordering::Relaxed),
        malformed: MALFORMED.load(Ordering::Relaxed),
        dropped: DROPPED.load(Ordering::Relaxed),
    }
}

/// Prometheus metrics for social state mutations
use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};

static GRAPH_WRITES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "social_graph_writes_total",
        "Edge writes issued by the graph coordinator",
        &["relation", "path", "result"]
    )
    .expect("Failed to register graph writes metric")
});

static GRAPH_FALLBACKS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "social_graph_path_fallbacks_total",
        "Writes that fell back from one persistence path to the other",
        &["relation", "from", "to"]
    )
    .expect("Failed to register graph fallback metric")
});

static GRAPH_PARTIAL_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "social_graph_partial_failures_total",
        "Legacy dual writes where only the first row was written",
        &["relation"]
    )
    .expect("Failed to register partial failure metric")
});

static OPTIMISTIC_ROLLBACKS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "social_optimistic_rollbacks_total",
        "Optimistic local mutations rolled back after a remote failure",
        &["mutation", "error"]
    )
    .expect("Failed to register rollback metric")
});

static COMMENT_RESYNCS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "social_comment_resyncs_total",
        "Full comment list reloads triggered by failed mutations",
        &["reason", "result"]
    )
    .expect("Failed to register comment resync metric")
});

pub struct GraphMetrics;

impl GraphMetrics {
    pub fn record_write(relation: &str, path: &str, result: &str) {
        GRAPH_WRITES.with_label_values(&[relation, path, result]).inc();
    }

    pub fn record_fallback(relation: &str, from: &str, to: &str) {
        GRAPH_FALLBACKS.with_label_values(&[relation, from, to]).inc();
    }

    pub fn record_partial_failure(relation: &str) {
        GRAPH_PARTIAL_FAILURES.with_label_values(&[relation]).inc();
    }
}

pub struct MutationMetrics;

impl MutationMetrics {
    pub fn record_rollback(mutation: &str, error: &str) {
        OPTIMISTIC_ROLLBACKS
            .with_label_values(&[mutation, error])
            .inc();
    }

    pub fn record_resync(reason: &str, result: &str) {
        COMMENT_RESYNCS.with_label_values(&[reason, result]).inc();
    }
}

//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Counters only: rows written per table, storage calls, reconciliation runs
//!   per child kind, and rejected formulas per reason.

use std::sync::Arc;

use prometheus::{IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Storage primitive a metric refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    /// Row insert.
    Insert,
    /// Sparse row update.
    Update,
    /// Row delete.
    Delete,
}

impl WriteOp {
    /// Label value used in metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Prometheus-backed metrics registry shared across the engine.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    rows_written_total: IntCounterVec,
    store_calls_total: IntCounterVec,
    reconcile_runs_total: IntCounterVec,
    formula_rejections_total: IntCounterVec,
}

/// Point-in-time view of storage call counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Insert calls issued.
    pub insert_calls: u64,
    /// Update calls issued.
    pub update_calls: u64,
    /// Delete calls issued.
    pub delete_calls: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let rows_written_total = register(
            &registry,
            "rowsync_rows_written_total",
            "Rows written by table and operation",
            &["table", "op"],
        )?;
        let store_calls_total = register(
            &registry,
            "rowsync_store_calls_total",
            "Storage primitive calls by operation",
            &["op"],
        )?;
        let reconcile_runs_total = register(
            &registry,
            "rowsync_reconcile_runs_total",
            "Reconciliation runs by child kind",
            &["kind"],
        )?;
        let formula_rejections_total = register(
            &registry,
            "rowsync_formula_rejections_total",
            "Filters rejected before any write, by reason",
            &["reason"],
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                rows_written_total,
                store_calls_total,
                reconcile_runs_total,
                formula_rejections_total,
            }),
        })
    }

    /// Record one storage call that wrote `rows` rows to `table`.
    pub fn record_write(&self, table: &str, op: WriteOp, rows: usize) {
        self.inner
            .store_calls_total
            .with_label_values(&[op.as_str()])
            .inc();
        self.inner
            .rows_written_total
            .with_label_values(&[table, op.as_str()])
            .inc_by(u64::try_from(rows).unwrap_or(u64::MAX));
    }

    /// Increment the run counter for a child kind.
    pub fn inc_reconcile_run(&self, kind: &str) {
        self.inner
            .reconcile_runs_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Increment the rejected formula counter.
    pub fn inc_formula_rejection(&self, reason: &str) {
        self.inner
            .formula_rejections_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Rows written to `table` by `op` so far.
    #[must_use]
    pub fn rows_written(&self, table: &str, op: WriteOp) -> u64 {
        self.inner
            .rows_written_total
            .with_label_values(&[table, op.as_str()])
            .get()
    }

    /// Runs recorded for a child kind.
    #[must_use]
    pub fn reconcile_runs(&self, kind: &str) -> u64 {
        self.inner
            .reconcile_runs_total
            .with_label_values(&[kind])
            .get()
    }

    /// Rejections recorded for a reason.
    #[must_use]
    pub fn formula_rejections(&self, reason: &str) -> u64 {
        self.inner
            .formula_rejections_total
            .with_label_values(&[reason])
            .get()
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if a gathered family cannot be encoded.
    pub fn render(&self) -> Result<String> {
        let mut rendered = String::new();
        TextEncoder::new()
            .encode_utf8(&self.inner.registry.gather(), &mut rendered)
            .map_err(|source| TelemetryError::Render { source })?;
        Ok(rendered)
    }

    /// Take a point-in-time snapshot of the storage call counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let calls = |op: WriteOp| {
            self.inner
                .store_calls_total
                .with_label_values(&[op.as_str()])
                .get()
        };
        MetricsSnapshot {
            insert_calls: calls(WriteOp::Insert),
            update_calls: calls(WriteOp::Update),
            delete_calls: calls(WriteOp::Delete),
        }
    }
}

fn register(
    registry: &Registry,
    name: &'static str,
    help: &str,
    labels: &[&str],
) -> Result<IntCounterVec> {
    let counter = IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::CounterFamily { family: name, source })?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|source| TelemetryError::CounterFamily { family: name, source })?;
    Ok(counter)
}

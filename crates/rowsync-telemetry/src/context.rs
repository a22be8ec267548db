//! Spans wrapping reconciliation runs.
//!
//! # Design
//! - One `reconcile` span per engine entry point; nested levels log inside it.
//! - Write totals are recorded on the span once the run finishes.

use tracing::Span;

/// Span covering one run over `groups` parents of the collection `kind`.
#[must_use]
pub fn run_span(kind: &str, groups: usize) -> Span {
    tracing::info_span!(
        "reconcile",
        kind = %kind,
        groups,
        written = tracing::field::Empty
    )
}

/// Record the number of rows a run wrote on its span.
pub fn record_written(span: &Span, rows: usize) {
    span.record("written", rows);
}

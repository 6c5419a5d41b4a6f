use super::TraceId;
use tracing::{Level, Span};

/// Create a root span for a request / refresh job
pub fn root_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::span!(Level::INFO, "request", op = name, trace_id = %trace_id)
}

/// Create a child span (inherits trace_id automatically)
pub fn child_span(name: &'static str) -> Span {
    tracing::span!(Level::INFO, "stage", stage = name)
}

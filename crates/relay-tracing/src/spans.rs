//! Span builder helpers for relay-proxy instrumentation.

/// Create the span covering one relayed request.
///
/// Usage: `let span = relay_request_span!(correlation_id, method, path);`
///
/// `target`, `status` and `latency_ms` are recorded once the backend answers.
#[macro_export]
macro_rules! relay_request_span {
    ($correlation_id:expr, $method:expr, $path:expr) => {
        tracing::info_span!(
            "relay_request",
            correlation_id = %$correlation_id,
            method = %$method,
            path = %$path,
            target = tracing::field::Empty,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    };
}

/// Create the span for the outbound call to the backend.
#[macro_export]
macro_rules! backend_call_span {
    ($correlation_id:expr, $target:expr) => {
        tracing::info_span!(
            "backend_call",
            correlation_id = %$correlation_id,
            target = %$target,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    };
}

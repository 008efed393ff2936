//! Per-request log context
//!
//! Every request runs inside a `request` span carrying a correlation id and
//! the request path, so authentication rejections and audit records can be
//! tied back to the request that caused them. The correlation id is taken
//! from `x-request-id` when the caller supplies one, otherwise a UUID is
//! generated, and it is echoed on the response.

use axum::http::Request;
use tower::ServiceBuilder;
use tower::layer::util::{Identity, Stack};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::request_id::{
    MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::{Span, info_span};

/// Span factory for the `request` span
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let correlation_id = request
            .extensions()
            .get::<RequestId>()
            .and_then(|id| id.header_value().to_str().ok())
            .unwrap_or("-");

        info_span!(
            "request",
            correlation_id = %correlation_id,
            method = %request.method(),
            path = %request.uri().path(),
        )
    }
}

/// Layer stack: assign or keep the request id, open the span, echo the id
pub type RequestContextLayer = ServiceBuilder<
    Stack<
        PropagateRequestIdLayer,
        Stack<
            TraceLayer<SharedClassifier<ServerErrorsAsFailures>, RequestSpan>,
            Stack<SetRequestIdLayer<MakeRequestUuid>, Identity>,
        >,
    >,
>;

/// Build the request-context layer stack
pub fn layer() -> RequestContextLayer {
    ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http().make_span_with(RequestSpan))
        .layer(PropagateRequestIdLayer::x_request_id())
}

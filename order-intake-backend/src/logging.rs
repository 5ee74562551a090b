//! Logging things
//!

use std::time::Duration;

use axum::{
    extract::MatchedPath,
    http::{header::CONTENT_LENGTH, Request},
    response::Response,
};
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    trace::{OnRequest, OnResponse, TraceLayer},
};
use tracing::{trace, warn, Span};

/// Route label for requests the router didn't match.
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Default filter when `RUST_LOG` isn't set.
pub fn default_filter(debug: bool) -> &'static str {
    match debug {
        true => "order_intake=debug,order_intake_backend=debug,tower_http=debug",
        false => "order_intake=info,order_intake_backend=info,tower_http=info",
    }
}

/// The route template a request matched, so `/api/v1/order/7` logs as `/api/v1/order/{id}`.
pub(crate) fn route_label<B>(request: &Request<B>) -> &str {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(MatchedPath::as_str)
        .unwrap_or(UNMATCHED_ROUTE)
}

#[derive(Copy, Clone)]
pub(crate) struct OrderSpanner {}

impl<B> tower_http::trace::MakeSpan<B> for OrderSpanner {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        tracing::info_span!(
            "request",
            method = %request.method(),
            route = route_label(request),
            uri = %request.uri(),
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
            bytes = tracing::field::Empty
        )
    }
}

impl<B> OnRequest<B> for OrderSpanner {
    fn on_request(&mut self, _request: &Request<B>, _span: &Span) {
        trace!("request received");
    }
}

impl<B> OnResponse<B> for OrderSpanner {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        span.record("status", response.status().as_u16());
        span.record("latency_ms", latency.as_millis() as u64);
        if let Some(content_length) = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
        {
            span.record("bytes", content_length);
        }
        if response.status().is_server_error() {
            warn!(status = response.status().as_u16(), "request failed");
        } else {
            tracing::event!(tracing::Level::INFO, "response sent");
        }
    }
}

pub(crate) fn logging_layer(
) -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>, OrderSpanner, OrderSpanner, OrderSpanner>
{
    TraceLayer::new_for_http()
        .on_request(OrderSpanner {})
        .make_span_with(OrderSpanner {})
        .on_response(OrderSpanner {})
}

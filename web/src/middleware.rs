//! Request tracking layer.
//!
//! Every request runs inside an `http_request` span carrying its correlation
//! ID, the matched route and, for the request routes, the request kind. The
//! span records the response status once the handler returns, and the ID is
//! echoed in the `X-Correlation-ID` response header so a caller can quote it
//! when reporting a failed claim or review.

use crate::extractors::CorrelationId;
use axum::{
    extract::{MatchedPath, Request},
    http::{HeaderMap, HeaderValue},
    response::Response,
};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::{Instrument, Span, field};
use uuid::Uuid;

/// Header carrying the correlation ID in both directions.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Layer that tags requests with a correlation ID and traces them.
#[must_use]
pub const fn correlation_id_layer() -> CorrelationIdLayer {
    CorrelationIdLayer
}

/// See [`correlation_id_layer`].
#[derive(Clone, Copy, Debug, Default)]
pub struct CorrelationIdLayer;

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = RequestTracking<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestTracking { inner }
    }
}

/// Service produced by [`CorrelationIdLayer`].
#[derive(Clone, Debug)]
pub struct RequestTracking<S> {
    inner: S,
}

/// Correlation ID sent by the caller, if it is a UUID.
pub(crate) fn incoming_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
}

/// `adoption`/`redemption` for `/api/requests/:kind/...` paths.
fn request_kind(path: &str) -> Option<&str> {
    path.strip_prefix("/api/requests/")
        .and_then(|rest| rest.split('/').next())
        .filter(|kind| !kind.is_empty())
}

fn request_span(req: &Request, id: Uuid) -> Span {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| req.uri().path().to_owned(), |m| m.as_str().to_owned());
    tracing::info_span!(
        "http_request",
        correlation_id = %id,
        method = %req.method(),
        route = %route,
        kind = request_kind(req.uri().path()).unwrap_or("-"),
        status = field::Empty,
    )
}

impl<S> Service<Request> for RequestTracking<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let id = incoming_id(req.headers()).unwrap_or_else(Uuid::new_v4);
        req.extensions_mut().insert(CorrelationId(id));

        let span = request_span(&req, id);
        let started = Instant::now();
        let response = self.inner.call(req);

        Box::pin(
            async move {
                let mut response = response.await?;
                let status = response.status();
                Span::current().record("status", status.as_u16());

                let elapsed_ms = started.elapsed().as_millis();
                if status.is_server_error() {
                    tracing::warn!(%status, elapsed_ms, "request failed");
                } else {
                    tracing::debug!(%status, elapsed_ms, "request finished");
                }

                if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
                    response.headers_mut().insert(CORRELATION_ID_HEADER, value);
                }
                Ok(response)
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::StatusCode, routing::get};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route(
                "/api/requests/:kind",
                get(|CorrelationId(id): CorrelationId| async move { id.to_string() }),
            )
            .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .layer(correlation_id_layer())
    }

    async fn send(path: &str, header: Option<&str>) -> (StatusCode, Option<String>, String) {
        let mut builder = axum::http::Request::builder().uri(path);
        if let Some(value) = header {
            builder = builder.header(CORRELATION_ID_HEADER, value);
        }
        let response = app()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let echoed = response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .map(|v| v.to_str().unwrap().to_owned());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, echoed, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn handler_sees_the_echoed_id() {
        let (status, echoed, body) = send("/api/requests/adoption", None).await;
        assert_eq!(status, StatusCode::OK);
        let echoed = echoed.expect("header");
        assert!(Uuid::parse_str(&echoed).is_ok());
        assert_eq!(body, echoed);
    }

    #[tokio::test]
    async fn caller_id_is_kept() {
        let sent = Uuid::new_v4().to_string();
        let (_, echoed, body) = send("/api/requests/redemption", Some(&sent)).await;
        assert_eq!(echoed.as_deref(), Some(sent.as_str()));
        assert_eq!(body, sent);
    }

    #[tokio::test]
    async fn malformed_id_is_replaced() {
        let (_, echoed, _) = send("/api/requests/adoption", Some("claim-42")).await;
        let echoed = echoed.expect("header");
        assert_ne!(echoed, "claim-42");
        assert!(Uuid::parse_str(&echoed).is_ok());
    }

    #[tokio::test]
    async fn failures_still_carry_the_id() {
        let (status, echoed, _) = send("/broken", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(echoed.is_some());
    }

    #[test]
    fn kind_comes_from_request_routes_only() {
        assert_eq!(request_kind("/api/requests/adoption/7/claim"), Some("adoption"));
        assert_eq!(request_kind("/api/requests/redemption"), Some("redemption"));
        assert_eq!(request_kind("/api/strays/3"), None);
        assert_eq!(request_kind("/api/requests/"), None);
    }
}

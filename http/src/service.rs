//! # PipelineService - Tower Service Adapter
//!
//! Runs a pipeline [`Handler`] as a `tower::Service` over `http` requests, so
//! it can be mounted in any tower-compatible server.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use std::convert::Infallible;
use std::task::{Context, Poll};
use strand_core::{Body, BoxFuture, Handler, Request, Response};
use tower::Service;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A tower service driving one pipeline.
///
/// The request body is buffered before the handler runs. An unhandled error
/// that reaches this boundary is logged and, unless the handler already chose
/// a non-2xx status, turns the response into `500 Internal Server Error`.
#[derive(Clone, Debug)]
pub struct PipelineService {
    handler: Handler,
}

impl PipelineService {
    pub fn new(handler: Handler) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }
}

impl From<Handler> for PipelineService {
    fn from(handler: Handler) -> Self {
        Self::new(handler)
    }
}

impl<B> Service<http::Request<B>> for PipelineService
where
    B: http_body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Response = http::Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let handler = self.handler.clone();

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let body = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(err) => {
                    let err: BoxError = err.into();
                    tracing::warn!(error = %err, "Failed to read request body");
                    return Ok(status_only(StatusCode::BAD_REQUEST));
                }
            };

            let mut resp = Response::new();
            if let Err(err) = handler.call(Request::new(parts, body), &mut resp).await {
                if err.is_unhandled() {
                    tracing::error!(error = %err, "Unhandled error reached the HTTP boundary");
                    if resp.is_success() {
                        resp.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                    }
                }
            }
            Ok(into_http_response(resp))
        })
    }
}

/// Write a pipeline [`Response`] out as an `http::Response`.
///
/// An unset status becomes `200 OK`. JSON bodies are serialized here and get
/// `Content-Type: application/json` unless a content type was already set.
pub fn into_http_response(resp: Response) -> http::Response<Full<Bytes>> {
    let status = resp.status();
    let Response { headers, body, .. } = resp;

    let (bytes, is_json) = match body {
        Body::Empty => (Bytes::new(), false),
        Body::Bytes(bytes) => (bytes, false),
        Body::Json(value) => match serde_json::to_vec(&value) {
            Ok(buf) => (Bytes::from(buf), true),
            Err(err) => {
                tracing::error!(error = %err, "Failed to encode JSON response body");
                return status_only(StatusCode::INTERNAL_SERVER_ERROR);
            }
        },
    };

    let mut out = http::Response::new(Full::new(bytes));
    *out.status_mut() = status;
    *out.headers_mut() = headers;
    if is_json && !out.headers().contains_key(CONTENT_TYPE) {
        out.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    out
}

fn status_only(status: StatusCode) -> http::Response<Full<Bytes>> {
    let mut out = http::Response::new(Full::new(Bytes::new()));
    *out.status_mut() = status;
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_core::{Error, Middleware};
    use tower::ServiceExt;

    fn get(uri: &str) -> http::Request<Full<Bytes>> {
        http::Request::builder()
            .uri(uri)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    async fn body_of(resp: http::Response<Full<Bytes>>) -> Bytes {
        resp.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_unset_status_is_ok() {
        let hello = Handler::new(|_req, resp| {
            Box::pin(async move {
                resp.set_bytes("hello");
                Ok(())
            })
        });

        let resp = PipelineService::new(hello).oneshot(get("/")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_of(resp).await, Bytes::from("hello"));
    }

    #[tokio::test]
    async fn test_request_body_is_buffered() {
        let echo = Handler::new(|req, resp| {
            Box::pin(async move {
                resp.set_bytes(req.body().clone());
                Ok(())
            })
        });
        let req = http::Request::builder()
            .method("POST")
            .uri("/echo")
            .body(Full::new(Bytes::from("ping")))
            .unwrap();

        let resp = PipelineService::new(echo).oneshot(req).await.unwrap();

        assert_eq!(body_of(resp).await, Bytes::from("ping"));
    }

    #[tokio::test]
    async fn test_unhandled_error_becomes_500() {
        let failing = Handler::new(|_req, _resp| Box::pin(async { Err(Error::msg("db down")) }));

        let resp = PipelineService::new(failing).oneshot(get("/")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_error_status_already_chosen_is_kept() {
        let not_found = Handler::new(|_req, resp| {
            Box::pin(async move {
                resp.set_status(StatusCode::NOT_FOUND);
                Err(Error::msg("no such order"))
            })
        });

        let resp = PipelineService::new(not_found).oneshot(get("/")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_handled_error_writes_response_as_is() {
        let conflict = Handler::new(|_req, resp| {
            Box::pin(async move {
                resp.set_status(StatusCode::CONFLICT);
                resp.set_bytes("taken");
                Err(Error::Handled)
            })
        });

        let resp = PipelineService::new(conflict).oneshot(get("/")).await.unwrap();

        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(body_of(resp).await, Bytes::from("taken"));
    }

    #[tokio::test]
    async fn test_json_body_and_headers() {
        let stamp = Middleware::from_fn(|req, resp, next| {
            Box::pin(async move {
                resp.insert_header(
                    http::header::SERVER,
                    HeaderValue::from_static("strand"),
                );
                next.call(req, resp).await
            })
        });
        let handler = stamp.apply(Handler::new(|_req, resp| {
            Box::pin(async move {
                resp.set_json(&serde_json::json!({ "id": 7 }))
                    .map_err(|e| Error::Other(e.into()))
            })
        }));

        let resp = PipelineService::new(handler).oneshot(get("/")).await.unwrap();

        assert_eq!(resp.headers()[http::header::SERVER], "strand");
        assert_eq!(resp.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body_of(resp).await, Bytes::from(r#"{"id":7}"#));
    }
}

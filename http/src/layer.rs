//! # PipelineLayer - Middleware around Tower Services
//!
//! Wraps an existing tower service with pipeline middleware. The wrapped
//! service becomes the innermost handler of the pipeline.

use crate::service::{BoxError, PipelineService};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use strand_core::{Body, Error, Handler, Middleware, Response};
use tower::{Layer, Service, ServiceExt};

/// A `tower::Layer` applying a pipeline [`Middleware`] to the service below it.
///
/// The inner service receives the pipeline's request, including its
/// [`RequestContext`](strand_core::RequestContext) in the request extensions.
/// Its status and body replace the pipeline response. Headers the middleware
/// set beforehand are kept unless the inner service sets the same name.
///
/// ```rust,ignore
/// let svc = tower::ServiceBuilder::new()
///     .layer(PipelineLayer::new(with_db(TxConfig::new(pool))))
///     .service(legacy_service);
/// ```
#[derive(Clone, Debug)]
pub struct PipelineLayer {
    middleware: Middleware,
}

impl PipelineLayer {
    pub fn new(middleware: Middleware) -> Self {
        Self { middleware }
    }
}

impl<S, ResBody> Layer<S> for PipelineLayer
where
    S: Service<http::Request<Full<Bytes>>, Response = http::Response<ResBody>>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    ResBody: http_body::Body + Send + 'static,
    ResBody::Data: Send,
    ResBody::Error: Into<BoxError>,
{
    type Service = PipelineService;

    fn layer(&self, inner: S) -> Self::Service {
        PipelineService::new(self.middleware.apply(innermost(inner)))
    }
}

fn innermost<S, ResBody>(inner: S) -> Handler
where
    S: Service<http::Request<Full<Bytes>>, Response = http::Response<ResBody>>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send,
    S::Error: Into<BoxError>,
    ResBody: http_body::Body + Send + 'static,
    ResBody::Data: Send,
    ResBody::Error: Into<BoxError>,
{
    Handler::new(move |req, resp| {
        let inner = inner.clone();
        Box::pin(async move {
            let req = req.into_http().map(Full::new);
            let out = inner
                .oneshot(req)
                .await
                .map_err(|e| boundary_error(e.into()))?;

            let (parts, body) = out.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| boundary_error(e.into()))?
                .to_bytes();

            merge(resp, parts, body);
            Ok(())
        })
    })
}

fn merge(resp: &mut Response, parts: http::response::Parts, body: Bytes) {
    resp.set_status(parts.status);
    for name in parts.headers.keys() {
        resp.headers.remove(name);
    }
    let mut last = None;
    for (name, value) in parts.headers {
        if let Some(name) = name {
            last = Some(name);
        }
        if let Some(name) = &last {
            resp.headers.append(name.clone(), value);
        }
    }
    resp.body = Body::Bytes(body);
}

fn boundary_error(err: BoxError) -> Error {
    Error::Other(anyhow::anyhow!(err))
}

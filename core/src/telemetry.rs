//! # Telemetry: Tracing Middleware
//!
//! Wraps a pipeline in a tracing span and records how it finished.

use crate::error::Error;
use crate::pipeline::Middleware;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// A middleware that opens an `info` span per request and logs the outcome.
pub fn traced(name: impl Into<String>) -> Middleware {
    let name: Arc<str> = Arc::from(name.into());

    Middleware::from_fn(move |req, resp, next| {
        let name = Arc::clone(&name);
        Box::pin(async move {
            let request_id = uuid::Uuid::new_v4().to_string();
            let span = tracing::info_span!(
                "Pipeline",
                strand.pipeline = %name,
                strand.http.method = %req.method(),
                strand.http.path = %req.uri().path(),
                strand.http.request_id = %request_id
            );

            async move {
                tracing::debug!("Entering pipeline");
                let start = Instant::now();

                let result = next.call(req, resp).await;

                let duration = start.elapsed();
                let status = resp.status();
                match &result {
                    Ok(()) => {
                        tracing::info!(%status, ?duration, "Pipeline completed");
                    }
                    Err(Error::Handled) => {
                        tracing::warn!(%status, ?duration, "Pipeline completed with handled error");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, ?duration, "Pipeline failed");
                    }
                }
                result
            }
            .instrument(span)
            .await
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Handler;
    use crate::request::Request;
    use crate::response::Response;

    #[tokio::test]
    async fn test_traced_passes_result_through() {
        let failing = Handler::new(|_req, _resp| Box::pin(async { Err(Error::msg("boom")) }));
        let err = traced("test")
            .apply(failing)
            .call(Request::default(), &mut Response::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");

        let ok = traced("test")
            .apply(Handler::noop())
            .call(Request::default(), &mut Response::new())
            .await;
        assert!(ok.is_ok());
    }
}

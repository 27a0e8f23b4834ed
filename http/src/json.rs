//! # JSON Body Codec
//!
//! [`encoder`] renders the pipeline response as JSON and turns unhandled
//! errors into `{"error": ...}` bodies. [`decoder`] parses the request body
//! into a typed value before calling the wrapped function.

use http::StatusCode;
use http::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::json;
use strand_core::{Body, BoxFuture, Error, Handler, HandlerResult, Middleware, Request, Response};

const APPLICATION_JSON: &str = "application/json";

pub const UNSUPPORTED_MEDIA_TYPE: &str = r#"Unsupported media type: Expected "application/json""#;

/// Middleware producing JSON responses.
///
/// Requests whose `Accept` header excludes JSON get `406 Not Acceptable`
/// without running the handler. An unhandled error from the handler becomes
/// `{"error": "<message>"}`, with status 500 unless the handler already set a
/// non-2xx status, and is reported as [`Error::Handled`] from then on.
pub fn encoder() -> Middleware {
    Middleware::from_fn(|req, resp, next| {
        Box::pin(async move {
            if !accepts_json(&req) {
                resp.set_status(StatusCode::NOT_ACCEPTABLE);
                resp.set_bytes(StatusCode::NOT_ACCEPTABLE.canonical_reason().unwrap_or_default());
                return Err(Error::Handled);
            }

            let result = next.call(req, resp).await;
            resp.insert_header(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));

            match result {
                Err(err) if err.is_unhandled() => {
                    if resp.is_success() {
                        resp.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                    }
                    resp.body = error_body(err.to_string());
                    Err(Error::Handled)
                }
                other => {
                    if resp.body == Body::Empty {
                        resp.body = Body::Json(serde_json::Value::Null);
                    }
                    other
                }
            }
        })
    })
}

/// Builds a handler that decodes the request body as `T` and passes it to `f`.
///
/// Rejects a non-JSON `Content-Type` with 415 and an undecodable body with
/// 400; both are handled errors.
///
/// ```rust,ignore
/// #[derive(Deserialize)]
/// struct NewOrder { sku: String, quantity: u32 }
///
/// let create = json::decoder(|req, resp, order: NewOrder| {
///     Box::pin(async move {
///         let tx = get_tx::<Postgres>(&req).await?;
///         // ...
///         Ok(())
///     })
/// });
/// ```
pub fn decoder<T, F>(f: F) -> Handler
where
    T: DeserializeOwned + Send + 'static,
    F: for<'a> Fn(Request, &'a mut Response, T) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    Handler::new(move |req, resp| {
        if !is_json(&req) {
            resp.set_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
            resp.body = error_body(UNSUPPORTED_MEDIA_TYPE.to_string());
            return handled();
        }
        let decoded = serde_json::from_slice::<T>(req.body());
        match decoded {
            Ok(input) => f(req, resp, input),
            Err(err) => {
                resp.set_status(StatusCode::BAD_REQUEST);
                resp.body = error_body(format!("Malformed request body: {}", err));
                handled()
            }
        }
    })
}

fn handled<'a>() -> BoxFuture<'a, HandlerResult> {
    Box::pin(async { Err(Error::Handled) })
}

fn error_body(message: String) -> Body {
    Body::Json(json!({ "error": message }))
}

// A missing Accept header means any media type is acceptable.
fn accepts_json(req: &Request) -> bool {
    let Some(value) = req.headers().get(ACCEPT) else {
        return true;
    };
    value.to_str().is_ok_and(|accept| {
        accept.split(',').any(|range| {
            matches!(
                media_type(range).as_str(),
                APPLICATION_JSON | "application/*" | "*/*"
            )
        })
    })
}

fn is_json(req: &Request) -> bool {
    req.header_str(CONTENT_TYPE)
        .is_some_and(|ct| media_type(ct) == APPLICATION_JSON)
}

// Media types are case-insensitive; parameters such as `charset` or `q` are dropped.
fn media_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

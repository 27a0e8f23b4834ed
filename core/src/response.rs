use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde::Serialize;

/// Opaque response body. The outer adapter decides how it is written.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Bytes),
    Json(serde_json::Value),
}

/// The response under construction for one request.
///
/// Middleware typically sets headers or a status here; handlers set the
/// body. Nothing is written to the transport until the adapter finalizes it.
#[derive(Debug, Default)]
pub struct Response {
    /// `None` until a handler decides; adapters write `200 OK` when unset.
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub body: Body,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective status code.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// True while no non-2xx status has been set.
    pub fn is_success(&self) -> bool {
        self.status().is_success()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn set_bytes(&mut self, body: impl Into<Bytes>) {
        self.body = Body::Bytes(body.into());
    }

    pub fn set_json<T: Serialize + ?Sized>(&mut self, body: &T) -> Result<(), serde_json::Error> {
        self.body = Body::Json(serde_json::to_value(body)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_to_unset_status() {
        let resp = Response::new();
        assert!(resp.status.is_none());
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.is_success());
        assert_eq!(resp.body, Body::Empty);
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let mut resp = Response::new();
        resp.headers_mut()
            .insert("X-Request-Id", HeaderValue::from_static("abc"));
        assert_eq!(resp.headers().get("x-request-id").unwrap(), "abc");
    }

    #[test]
    fn test_set_json() {
        #[derive(Serialize)]
        struct Greeting {
            message: &'static str,
        }

        let mut resp = Response::new();
        resp.set_json(&Greeting { message: "hi" }).unwrap();
        assert_eq!(resp.body, Body::Json(json!({"message": "hi"})));
    }
}

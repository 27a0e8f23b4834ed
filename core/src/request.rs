use crate::context::{ContextKey, RequestContext};
use crate::error::MissingContextValue;
use crate::scope::CancelScope;
use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, Method, Uri};

/// An inbound request as seen by pipeline handlers.
///
/// The body is fully buffered. Context bindings are added with
/// [`Request::with_context_value`], which consumes the request and returns a
/// derived one.
#[derive(Debug)]
pub struct Request {
    parts: Parts,
    body: Bytes,
    context: RequestContext,
    scope: CancelScope,
}

impl Request {
    pub fn new(parts: Parts, body: Bytes) -> Self {
        Self {
            parts,
            body,
            context: RequestContext::new(),
            scope: CancelScope::new(),
        }
    }

    pub fn from_http(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::new(parts, body)
    }

    /// Convert back into an `http::Request`.
    ///
    /// The context is stored in the request extensions so that services
    /// behind the boundary can still read it.
    pub fn into_http(self) -> http::Request<Bytes> {
        let mut parts = self.parts;
        parts.extensions.insert(self.context);
        http::Request::from_parts(parts, self.body)
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.parts.headers
    }

    /// Header value as a string, if present and valid UTF-8.
    pub fn header_str(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn extensions(&self) -> &http::Extensions {
        &self.parts.extensions
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn scope(&self) -> &CancelScope {
        &self.scope
    }

    pub fn with_scope(mut self, scope: CancelScope) -> Self {
        self.scope = scope;
        self
    }

    /// Derive a request in which `key` resolves to `value`.
    pub fn with_context_value<K: ContextKey>(mut self, key: K, value: K::Value) -> Self {
        self.context = self.context.attach(key, value);
        self
    }

    pub fn context_value<K: ContextKey>(&self, key: &K) -> Result<&K::Value, MissingContextValue> {
        self.context.lookup(key)
    }
}

impl Default for Request {
    fn default() -> Self {
        Self::from_http(http::Request::new(Bytes::new()))
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        Self::from_http(req)
    }
}

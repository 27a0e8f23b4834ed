//! # Pipeline: Handler and Middleware Composition
//!
//! A [`Handler`] processes one request, mutating the [`Response`] in place.
//! A [`Middleware`] wraps a handler to produce another handler.
//!
//! Composition is plain function composition: `f.then(g)` applied to `h`
//! is `f(g(h))`, so `f`'s pre-logic runs first and its post-logic last.

use crate::error::HandlerResult;
use crate::request::Request;
use crate::response::Response;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for boxed futures returned by handlers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type HandlerFn =
    dyn for<'a> Fn(Request, &'a mut Response) -> BoxFuture<'a, HandlerResult> + Send + Sync;

/// A unit of request processing.
///
/// ```rust,ignore
/// let hello = Handler::new(|_req, resp| {
///     Box::pin(async move {
///         resp.set_bytes("hello");
///         Ok(())
///     })
/// });
/// ```
#[derive(Clone)]
pub struct Handler {
    inner: Arc<HandlerFn>,
}

impl Handler {
    pub fn new<F>(f: F) -> Self
    where
        F: for<'a> Fn(Request, &'a mut Response) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// A handler that does nothing and succeeds.
    pub fn noop() -> Self {
        Self::new(|_req, _resp| Box::pin(async { Ok(()) }))
    }

    pub fn call<'a>(&self, req: Request, resp: &'a mut Response) -> BoxFuture<'a, HandlerResult> {
        (self.inner)(req, resp)
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Handler")
    }
}

/// A transform from one [`Handler`] to another.
#[derive(Clone)]
pub struct Middleware {
    wrap: Arc<dyn Fn(Handler) -> Handler + Send + Sync>,
}

impl Middleware {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Handler) -> Handler + Send + Sync + 'static,
    {
        Self { wrap: Arc::new(f) }
    }

    /// Build a middleware from an async function receiving the next handler.
    ///
    /// ```rust,ignore
    /// let stamp = Middleware::from_fn(|req, resp, next| {
    ///     Box::pin(async move {
    ///         let result = next.call(req, resp).await;
    ///         resp.insert_header(SERVER, HeaderValue::from_static("strand"));
    ///         result
    ///     })
    /// });
    /// ```
    pub fn from_fn<F>(f: F) -> Self
    where
        F: for<'a> Fn(Request, &'a mut Response, Handler) -> BoxFuture<'a, HandlerResult>
            + Send
            + Sync
            + 'static,
    {
        let f = Arc::new(f);
        Self::new(move |next: Handler| {
            let f = Arc::clone(&f);
            Handler::new(move |req, resp| (*f)(req, resp, next.clone()))
        })
    }

    /// The pass-through middleware.
    pub fn identity() -> Self {
        Self::new(|h| h)
    }

    pub fn apply(&self, handler: Handler) -> Handler {
        (self.wrap)(handler)
    }

    /// Compose so that `self` wraps outside `inner`.
    pub fn then(self, inner: Middleware) -> Middleware {
        Middleware::new(move |h| self.apply(inner.apply(h)))
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Middleware")
    }
}

/// Chain middlewares left to right. The first element is the outermost.
///
/// An empty chain is the identity middleware.
pub fn chain<I>(middlewares: I) -> Middleware
where
    I: IntoIterator<Item = Middleware>,
{
    middlewares
        .into_iter()
        .fold(Middleware::identity(), Middleware::then)
}

//! # Strand Core
//!
//! Handler/middleware composition and request-scoped context propagation.
//!
//! * [`Handler`]: processes one request, mutating a [`Response`].
//! * [`Middleware`]: wraps a handler; composed with [`Middleware::then`] and [`chain`].
//! * [`RequestContext`]: immutable typed key/value bindings carried by a [`Request`].

pub mod context;
pub mod error;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod scope;
pub mod telemetry;

pub use context::{ContextKey, RequestContext};
pub use error::{Error, HandlerResult, MissingContextValue};
pub use pipeline::{BoxFuture, Handler, Middleware, chain};
pub use request::Request;
pub use response::{Body, Response};
pub use scope::{CancelScope, Interrupted};

pub mod prelude {
    pub use crate::context::{ContextKey, RequestContext};
    pub use crate::error::{Error, HandlerResult, MissingContextValue};
    pub use crate::pipeline::{BoxFuture, Handler, Middleware, chain};
    pub use crate::request::Request;
    pub use crate::response::{Body, Response};
    pub use crate::scope::CancelScope;
    pub use crate::telemetry::traced;
}

//! # Strand HTTP
//!
//! Adapters between Strand pipelines and the `http`/`tower` ecosystem.
//!
//! * [`PipelineService`]: runs a pipeline as a `tower::Service`.
//! * [`PipelineLayer`]: applies pipeline middleware around an existing tower service.
//! * [`json`]: JSON request decoding and response encoding.

pub mod json;
pub mod layer;
pub mod service;

pub use layer::PipelineLayer;
pub use service::{PipelineService, into_http_response};

pub mod prelude {
    pub use crate::json;
    pub use crate::layer::PipelineLayer;
    pub use crate::service::PipelineService;
}

//! Transformation job protocol (worker side)
//!
//! ## Key Components
//!
//! - [`ContentTransformer`] - pluggable transformation capability
//! - [`ProgressCallback`] - the only surface a transformer sees of messaging
//! - [`ProgressReporter`] - per-job status reply emitter
//! - [`TransformerComponent`] - receives requests, runs the transformer,
//!   maps outcomes to replies or dead letters
//! - [`TransformerRegistry`] - named transformer instances
//!
//! ## Reply sequence
//!
//! For a job with a usable reply destination the requester sees one
//! `IN_PROGRESS` reply without a fraction, zero or more `IN_PROGRESS` replies
//! with a fraction, then exactly one `COMPLETE` or `ERROR`. When even the
//! final reply cannot be sent the requester sees nothing further; the outcome
//! is only visible in the dead-letter sink. Message passing without delivery
//! guarantees cannot avoid that case.

mod component;
mod copy;
mod registry;
mod reporter;
mod traits;

pub use component::TransformerComponent;
pub use copy::CopyTransformer;
pub use registry::{RegistryError, TransformerRegistry};
pub use reporter::{ProgressReporter, ReportingError};
pub use traits::{ContentTransformer, ProgressCallback, TransformError};

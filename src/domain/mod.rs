//! Domain layer: models, ports and errors of the supervision engine.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};

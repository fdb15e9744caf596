//! Indication Server
//!
//! HTTP front end for the indication pipeline: configuration bootstrap,
//! JSON logging, the axum router and the store sweeper.

pub mod error;
pub mod logging;
pub mod routes;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ApiError, Result, ServerError};
pub use logging::init_logging;
pub use routes::{router, AppState};
pub use service::{build_service, Service};

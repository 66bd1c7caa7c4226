//! HTTP surface of the vcgate worker.
//!
//! [`ApiHandler`] is the seam between transport and controller;
//! [`ControllerAdapter`] is the stock implementation and [`HttpApi`] mounts
//! it on an axum router.

mod error;
pub use error::ApiError;

mod handler;
pub use handler::{ApiHandler, StatusReport};

mod adapter;
pub use adapter::{ControllerAdapter, MetricsExporter};

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpApi;

#[cfg(feature = "http")]
pub use axum;

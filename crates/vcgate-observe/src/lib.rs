//! Logging setup and supervisor event journal for the vcgate worker.

mod logger;
pub use logger::*;

#[cfg(feature = "subscriber")]
mod subscriber;
#[cfg(feature = "subscriber")]
pub use subscriber::Journal;

//! Domain types shared by the admission controller, the HTTP surface and the worker binary.

mod domain;
pub use domain::*;

mod kind;
pub use kind::*;

//! Runtime: application lifecycle and graceful shutdown.

pub mod lifecycle;

pub use lifecycle::Application;

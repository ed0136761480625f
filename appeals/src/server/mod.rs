//! HTTP server module for the appeals service.
//!
//! This module provides the Axum-based HTTP server with:
//! - Application state management
//! - Health, readiness and metrics endpoints
//! - Router configuration

pub mod health;
pub mod routes;
pub mod state;

pub use health::health_check;
pub use routes::build_router;
pub use state::AppState;

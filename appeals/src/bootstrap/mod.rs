//! Application bootstrap: infrastructure setup and wiring.
//!
//! - [`ResourceManager`]: connects Postgres, the cache backend, push dispatch,
//!   attachment storage and the metrics recorder
//! - [`ApplicationBuilder`]: fluent builder that turns configuration into a
//!   runnable [`crate::runtime::Application`]

pub mod builder;
pub mod resources;

pub use builder::ApplicationBuilder;
pub use resources::ResourceManager;

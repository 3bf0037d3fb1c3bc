//! Keystone Runtime - configuration, logging and bootstrap for Keystone
//! locators.
//!
//! This crate provides:
//! - Layered configuration (`config`): defaults, `keystone.toml` /
//!   `keystone.yaml`, and `KEYSTONE_*` environment variables via figment
//! - Logging setup (`logging`) on `tracing-subscriber` and `tracing-appender`
//! - A tokio executor for the immediate scope (`TokioExecutor`)
//! - `KeystoneRuntime`, which builds the root locator, enables the configured
//!   scopes and owns the locator factory
//!
//! ```rust,ignore
//! use keystone_runtime::KeystoneRuntime;
//!
//! let runtime = KeystoneRuntime::load()?;
//! let locator = runtime.locator();
//! // bind services, look them up...
//! runtime.shutdown();
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, KeystoneConfig, LoggingConfig, Profile};
pub use error::{RuntimeError, RuntimeResult};
pub use executor::TokioExecutor;
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{KeystoneRuntime, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// Logging macros plus the runtime entry points.
pub mod prelude {
    pub use super::{KeystoneConfig, KeystoneRuntime, RuntimeError, RuntimeResult};
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}

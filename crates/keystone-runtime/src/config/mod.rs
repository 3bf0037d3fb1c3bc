//! Configuration for the Keystone runtime.
//!
//! Layered loading through figment, a serde schema, and validation run after
//! extraction.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    ExecutorKind, ImmediateConfig, KeystoneConfig, LocatorConfig, LogFormat, LogLevel, LogOutput, LogRotation,
    LoggingConfig, ScopesConfig, SpanEventConfig,
};
pub use validation::validate_config;

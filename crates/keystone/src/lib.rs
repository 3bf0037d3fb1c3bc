//! # Keystone
//!
//! A hierarchical, scope-aware dependency-injection runtime for Rust.
//!
//! ## Overview
//!
//! Services are described by descriptors and bound into a locator through
//! transactional dynamic configurations. Lookups resolve the best matching
//! descriptor, create its instance in the context of its scope, and inject
//! its dependencies. Locators form a tree: a child sees its parent's
//! services unless they are local-only.
//!
//! ```text
//! ┌──────────────┐    ┌──────────────────┐    ┌──────────────────┐
//! │   Runtime    │───▶│   Root locator   │───▶│  Child locators  │
//! │ config, logs │    │ contexts, hooks  │    │  (see parent)    │
//! └──────────────┘    └──────────────────┘    └──────────────────┘
//! ```
//!
//! - **Core** (`keystone::core`): descriptors, classes, creators,
//!   resolvers, contexts, interception and the locator itself
//! - **Runtime** (`keystone::runtime`): configuration, logging and bootstrap
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use keystone::prelude::*;
//!
//! struct Engine;
//! struct Car {
//!     engine: Arc<Engine>,
//! }
//!
//! fn main() -> RuntimeResult<()> {
//!     let runtime = KeystoneRuntime::load()?;
//!
//!     let mut config = runtime.locator().configuration()?;
//!     config.add_class(
//!         ServiceClass::builder::<Engine>()
//!             .in_scope(scopes::SINGLETON)
//!             .default_constructor(|| Engine)
//!             .build(),
//!     )?;
//!     config.add_class(
//!         ServiceClass::builder::<Car>()
//!             .inject_constructor(vec![InjectionPoint::of::<Engine>()], |args| {
//!                 Ok(Car { engine: args.get::<Engine>(0)? })
//!             })
//!             .build(),
//!     )?;
//!     config.commit()?;
//!
//!     let car = runtime.locator().require_service::<Car>()?;
//!     runtime.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: read `keystone.toml` (default)
//! - `yaml-config`: read `keystone.yaml`
//! - `json-log`: JSON log output

pub use keystone_core as core;
pub use keystone_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use keystone::prelude::*;
/// ```
pub mod prelude {
    pub use std::sync::Arc;

    // Runtime - main entry point
    pub use keystone_runtime::{KeystoneConfig, KeystoneRuntime, RuntimeError, RuntimeResult};

    // Describing and binding services
    pub use keystone_core::prelude::*;
    pub use keystone_core::{DynamicConfiguration, Factory, ServiceHandle};

    // Extension points
    pub use keystone_core::{
        BoxError, ErrorService, InstanceLifecycleListener, InterceptionService, JustInTimeInjectionResolver,
        MethodInterceptor, ValidationService,
    };
}

//! Garage Example
//!
//! Binds two engines and a car into a Keystone runtime and shows how lookups
//! resolve them:
//!
//! - `dyn Engine` resolves to the unnamed V8 singleton
//! - `Car` is per-lookup and gets the singleton injected every time
//! - `Racer` asks for the engine named `electric`
//! - the `Lights` service is immediate and starts on its own
//! - a child locator shadows the V8 with its own engine on equal ranking
//!
//! # Usage
//!
//! ```bash
//! cargo run --package garage -- --config demos/garage/keystone.toml
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use keystone::core::{ServiceLocator, enable_immediate_scope};
use keystone::prelude::*;
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "Keystone garage demo")]
struct Args {
    /// Configuration file; defaults to searching for keystone.toml.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile.
    #[arg(short, long)]
    profile: Option<String>,
}

// ============================================================================
// Services
// ============================================================================

trait Engine: Send + Sync {
    fn describe(&self) -> String;
}

struct V8 {
    cylinders: u8,
}

impl Engine for V8 {
    fn describe(&self) -> String {
        format!("V8 ({} cylinders)", self.cylinders)
    }
}

struct Electric;

impl Engine for Electric {
    fn describe(&self) -> String {
        "electric".to_string()
    }
}

struct Car {
    serial: usize,
    engine: Arc<dyn Engine>,
}

struct Racer {
    engine: Arc<dyn Engine>,
}

struct Lights;

fn as_engine<T: Engine + 'static>(engine: Arc<T>) -> Arc<dyn Engine> {
    engine
}

fn bind_garage(locator: &ServiceLocator) -> Result<()> {
    let serials = Arc::new(AtomicUsize::new(1));

    let mut config = locator.configuration()?;
    config.add_class(
        ServiceClass::builder::<V8>()
            .in_scope(scopes::SINGLETON)
            .contract::<dyn Engine>(as_engine::<V8>)
            .default_constructor(|| V8 { cylinders: 8 })
            .post_construct("warm_up", |v8| {
                info!(cylinders = v8.cylinders, "Engine warmed up");
                Ok(())
            })
            .pre_destroy("cool_down", |_| {
                info!("Engine cooled down");
                Ok(())
            })
            .build(),
    )?;
    config.add_class(
        ServiceClass::builder::<Electric>()
            .in_scope(scopes::SINGLETON)
            .named("electric")
            .contract::<dyn Engine>(as_engine::<Electric>)
            .default_constructor(|| Electric)
            .build(),
    )?;
    config.add_class(
        ServiceClass::builder::<Car>()
            .inject_constructor(vec![InjectionPoint::of::<dyn Engine>()], move |args| {
                Ok(Car {
                    serial: serials.fetch_add(1, Ordering::SeqCst),
                    engine: args.get::<dyn Engine>(0)?,
                })
            })
            .build(),
    )?;
    config.add_class(
        ServiceClass::builder::<Racer>()
            .inject_constructor(vec![InjectionPoint::of::<dyn Engine>().named("electric")], |args| {
                Ok(Racer {
                    engine: args.get::<dyn Engine>(0)?,
                })
            })
            .build(),
    )?;
    config.add_class(
        ServiceClass::builder::<Lights>()
            .in_scope(scopes::IMMEDIATE)
            .default_constructor(|| Lights)
            .post_construct("switch_on", |_| {
                info!("Lights switched on without a lookup");
                Ok(())
            })
            .pre_destroy("switch_off", |_| {
                info!("Lights switched off");
                Ok(())
            })
            .build(),
    )?;
    config.commit()?;
    Ok(())
}

fn bind_showroom(showroom: &ServiceLocator) -> Result<()> {
    let mut config = showroom.configuration()?;
    config.add_class(
        ServiceClass::builder::<V8>()
            .in_scope(scopes::SINGLETON)
            .contract::<dyn Engine>(as_engine::<V8>)
            .default_constructor(|| V8 { cylinders: 12 })
            .build(),
    )?;
    config.commit()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = KeystoneRuntime::builder();
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &args.profile {
        builder = builder.profile(profile);
    }
    let runtime = builder.build()?;
    let locator = runtime.locator().clone();

    // Lights are immediate; make sure the scope exists even without a config file.
    let immediate = match runtime.immediate() {
        Some(controller) => controller.clone(),
        None => enable_immediate_scope(&locator)?,
    };
    bind_garage(&locator)?;

    let waiting = immediate.clone();
    tokio::task::spawn_blocking(move || waiting.wait_until_idle(Duration::from_secs(5))).await?;

    let first = locator.require_service::<Car>()?;
    let second = locator.require_service::<Car>()?;
    info!(
        first = first.serial,
        second = second.serial,
        shared_engine = Arc::ptr_eq(&first.engine, &second.engine),
        engine = %first.engine.describe(),
        "Two cars built"
    );

    let racer = locator.require_service::<Racer>()?;
    info!(engine = %racer.engine.describe(), "Racer built");

    let engines = locator.all_services::<dyn Engine>(&[])?;
    info!(count = engines.len(), "Engines in the garage");

    let showroom = runtime.create_child("showroom")?;
    bind_showroom(&showroom)?;
    let showroom_engine = showroom.require_service::<dyn Engine>()?;
    info!(engine = %showroom_engine.describe(), "Showroom engine");

    runtime.shutdown();
    Ok(())
}

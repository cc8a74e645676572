//! Watch a directory for `app.yaml` changes and report wall-clock jumps.
//!
//! ```text
//! RUST_LOG=hotswap_watch=debug cargo run --example watch_dir -- ./config
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hotswap_watch::prelude::*;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct AppConfig {
    #[serde(default)]
    greeting: String,
    #[serde(default)]
    workers: u32,
}

struct ClockReporter;

#[async_trait]
impl TimeNotifier for ClockReporter {
    async fn notify(&self, at: DateTime<Utc>) -> Result<()> {
        println!("wall clock changed, now {at}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let directory = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let settings = Settings::load(None, Some("HOTSWAP"))?;

    let reloader = ConfigReloader::from_settings(&settings);
    let app = Arc::new(ConfigSlot::new(
        "app.yaml",
        AppConfig {
            greeting: "hello".to_string(),
            workers: 1,
        },
    ));
    let reader = Arc::clone(&app);
    let _handle = app.subscribe(move || {
        let cfg = reader.get();
        println!("app.yaml reloaded: {:?}", cfg);
    });
    let consumer: Arc<dyn ConfigConsumer> = app.clone();
    if let Err(e) = reloader.register(&directory, Arc::downgrade(&consumer)).await {
        if e.is_registration_error() || e.is_not_found() {
            return Err(e);
        }
        eprintln!("initial load of app.yaml failed: {e}");
    }

    let detector = ClockDriftDetector::with_clock(
        Arc::new(hotswap_watch::sources::SystemClock::new()),
        settings.clock,
    );
    let reporter: Arc<dyn TimeNotifier> = Arc::new(ClockReporter);
    detector.add("reporter", Arc::downgrade(&reporter))?;

    println!(
        "watching {} (greeting {:?}, {} workers); ctrl-c to exit",
        directory.display(),
        app.get().greeting,
        app.get().workers
    );
    tokio::signal::ctrl_c().await?;

    detector.shutdown().await;
    reloader.shutdown().await;
    Ok(())
}

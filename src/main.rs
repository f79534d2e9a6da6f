//! Minder - A meeting reminder daemon.
//!
//! Minder polls a remote event store for the upcoming meetings and drives a
//! graduated notification sequence on one or more output devices as the next
//! meeting approaches.
//!
//! # Overview
//!
//! The time left before the next meeting is classified into tiers:
//!
//! | Tier         | Time left          | Tray   | USB light | GPIO LED          | Voice                    |
//! |--------------|--------------------|--------|-----------|-------------------|--------------------------|
//! | Waiting      | more than 5 min    | idle   | off       | off               | silent                   |
//! | Pending      | 5 min or less      | green  | green     | 2 green blinks    | "X starts in N minutes"  |
//! | Almost there | 1 min or less      | yellow | yellow    | 10 red+green blinks | "X starts in less than a minute" |
//! | Starting     | 10 s or less       | red    | red       | red for 5 s       | "X is starting now"      |
//! | Stop         | 2 min after start  | idle   | off       | off               | silent                   |
//!
//! # Configuration
//!
//! Create a `minder.yaml` file next to the executable, or pass its path with
//! `--config`:
//!
//! ```yaml
//! store:
//!   url: "https://data.mongodb-api.com/app/data-abcde/endpoint/data/v1/action"
//!   api_key: "your-api-key"
//!   cluster: "Cluster0"
//!
//! notifiers: [tray, usb, voice]
//!
//! usb_devices:
//!   "239A:80F4": "MeetingMinder"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Override any configuration value using environment variables with the `MINDER_` prefix:
//!
//! ```bash
//! export MINDER_STORE__API_KEY="your-api-key"
//! export MINDER_REFRESH__END_HOUR=20
//! ```
//!
//! # Usage
//!
//! ```bash
//! minder --config minder.yaml
//! ```
//!
//! # Architecture
//!
//! - [`config`] - YAML configuration file structures and loading with environment variable support
//! - [`events`] - Event store client, event cache, poller and next event selection
//! - [`schedule`] - Notification tiers and the tick driven scheduler
//! - [`notifiers`] - Notifier dispatch and the tray, USB, GPIO and voice backends
//! - [`minder`] - Lifecycle wiring the tasks together
//! - [`utils`] - Utility functions for path handling
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (default: `info`)

use clap::Parser;
use env_logger::Env;
use log::{error, info};

use crate::{config::Config, minder::Minder, utils::default_config_path};

mod config;
mod events;
mod minder;
mod notifiers;
mod schedule;
mod utils;

/// Command-line arguments for the minder daemon.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file.
    ///
    /// Defaults to `minder.yaml` in the directory of the executable.
    #[arg(short, long)]
    config: Option<String>,
}

/// Main entry point for the minder daemon.
///
/// 1. **Logging Setup**: `info` level by default, overridden by `RUST_LOG`
/// 2. **Configuration Loading**: reads the YAML file and applies the `MINDER_`
///    environment overrides
/// 3. **Initialization**: fetches the first events and builds the notifiers
/// 4. **Execution**: runs until SIGINT or SIGTERM
///
/// Configuration and initialization errors are logged and end the process
/// without panicking.
#[tokio::main]
async fn main() {
    // Put logger at info level by default
    let env = Env::default().filter_or("RUST_LOG", "info");
    env_logger::init_from_env(env);

    info!("Starting minder {}...", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(default_config_path);

    let config = match Config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load config file {}: {:#}", config_path, e);
            return;
        }
    };

    let minder = match Minder::new(config).await {
        Ok(m) => m,
        Err(e) => {
            error!("Failed to initialize minder: {:#}", e);
            return;
        }
    };
    minder.start().await;
}

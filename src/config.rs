//! Configuration file structures for the minder daemon.
//!
//! This module defines the configuration file format using YAML. Every value
//! can be overridden with an environment variable prefixed by `MINDER_`,
//! nested keys being separated by `__`.
//!
//! # Configuration File Format
//!
//! ```yaml
//! # Event store (MongoDB Data API)
//! store:
//!   url: "https://data.mongodb-api.com/app/data-abcde/endpoint/data/v1/action"
//!   api_key: "secret-api-key"
//!   cluster: "Cluster0"
//!
//! # Business window, the event store is polled strictly between these hours
//! refresh:
//!   start_hour: 6
//!   end_hour: 22
//!
//! # Notifiers to start, among tray, usb, gpio and voice
//! notifiers: [tray, usb]
//!
//! # Supported USB devices, "VID:PID" in hexadecimal -> label
//! usb_devices:
//!   "239A:80F4": "MeetingMinder"
//! ```
//!
//! # Environment Variable Overrides
//!
//! ```bash
//! export MINDER_STORE__API_KEY="secret-from-env"
//! export MINDER_REFRESH__START_HOUR=7
//! ```

use std::{collections::HashMap, path::Path, path::PathBuf};

use anyhow::{bail, ensure};
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::Deserialize;

/// Prefix of the environment variables overriding the configuration file.
const ENV_PREFIX: &str = "MINDER_";

/// Root configuration structure.
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// Event store configuration
    pub store: Store,
    /// Business window of the poller
    #[serde(default)]
    pub refresh: Refresh,
    /// Names of the notifiers to start
    ///
    /// Unknown names are skipped with a warning.
    #[serde(default)]
    pub notifiers: Vec<String>,
    /// Supported USB devices, keyed by `VID:PID` in hexadecimal
    #[serde(default)]
    pub usb_devices: HashMap<String, String>,
    /// GPIO LED configuration
    #[serde(default)]
    pub gpio: Gpio,
    /// Voice configuration
    #[serde(default)]
    pub voice: Voice,
}

/// Event store configuration.
///
/// # YAML Section
///
/// ```yaml
/// store:
///   url: "https://data.mongodb-api.com/app/data-abcde/endpoint/data/v1/action"
///   api_key: "secret-api-key"
///   cluster: "Cluster0"
///   database: "notifications"
///   collection: "events"
/// ```
#[derive(Deserialize, Debug, Clone)]
pub struct Store {
    /// Base URL of the Data API actions.
    ///
    /// A trailing slash is ignored.
    pub url: String,

    /// Data API key, forwarded as is in the `api-key` header.
    pub api_key: String,

    /// Atlas cluster name.
    pub cluster: String,

    /// Database holding the events, `notifications` by default.
    #[serde(default = "default_database")]
    pub database: String,

    /// Collection holding the events, `events` by default.
    #[serde(default = "default_collection")]
    pub collection: String,
}

/// Business window, in local hours.
///
/// The event store is only polled when the local hour is strictly between
/// `start_hour` and `end_hour`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Refresh {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for Refresh {
    fn default() -> Self {
        Refresh {
            start_hour: 6,
            end_hour: 22,
        }
    }
}

/// GPIO LED configuration.
///
/// Pins are BCM numbers of an RGB LED wired active-low.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Gpio {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    /// Root of the sysfs GPIO interface
    pub sysfs_root: PathBuf,
}

impl Default for Gpio {
    fn default() -> Self {
        Gpio {
            red: 2,
            green: 3,
            blue: 4,
            sysfs_root: PathBuf::from("/sys/class/gpio"),
        }
    }
}

/// Voice configuration.
///
/// The utterance is appended as last argument of `program`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Voice {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for Voice {
    fn default() -> Self {
        Voice {
            program: "espeak".to_owned(),
            args: vec![],
        }
    }
}

fn default_database() -> String {
    "notifications".to_owned()
}

fn default_collection() -> String {
    "events".to_owned()
}

impl Config {
    /// Loads the configuration from a YAML file, then applies the
    /// `MINDER_` environment overrides.
    ///
    /// # Errors
    ///
    /// Fails if the file does not exist, cannot be parsed, misses required
    /// values or holds inconsistent values.
    pub fn load(path: &str) -> anyhow::Result<Config> {
        if !Path::new(path).is_file() {
            bail!("configuration file {} not found", path);
        }

        let config: Config = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.store.url.is_empty(), "store url is empty");
        ensure!(
            self.refresh.start_hour < self.refresh.end_hour && self.refresh.end_hour <= 24,
            "invalid refresh window {}-{}",
            self.refresh.start_hour,
            self.refresh.end_hour
        );
        Ok(())
    }
}

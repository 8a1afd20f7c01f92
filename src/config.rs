//! Application configuration.
//!
//! `Config` derives `Deserialize`, so it can be read from whatever source the
//! application already uses (a TOML file, a JSON blob, …). Every field has a
//! default; partial documents are fine.
//!
//! ```rust
//! use switchyard::{App, Config};
//!
//! let app = App::with_config(Config { debug: true, ..Config::default() });
//! assert!(app.config().debug);
//! ```

use std::time::Duration;

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Expose wrapped error causes in error responses. Never enable in
    /// production: causes may contain internal details.
    pub debug: bool,
    /// Maximum number of idle request contexts kept for reuse.
    pub pool_capacity: usize,
    /// How long a graceful shutdown waits for in-flight connections.
    pub shutdown_timeout_secs: u64,
    /// Limit for reading a request body. `0` disables it.
    pub read_timeout_secs: u64,
    /// Limit for producing a response once the request is read. `0`
    /// disables it.
    pub write_timeout_secs: u64,
    /// How long a connection may wait for the next request's headers,
    /// keep-alive idle time included. `0` disables it.
    pub idle_timeout_secs: u64,
}

impl Config {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        enabled(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        enabled(self.write_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        enabled(self.idle_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            pool_capacity: 1024,
            shutdown_timeout_secs: 30,
            read_timeout_secs: 30,
            write_timeout_secs: 30,
            idle_timeout_secs: 120,
        }
    }
}

fn enabled(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

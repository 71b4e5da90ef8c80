//! Configuration using Figment.
//!
//! Configuration is loaded from:
//! 1. a TOML file (default `config/rust-scan.toml`; missing file means defaults)
//! 2. environment variables prefixed with `RUST_SCAN_`, `__` separating
//!    sections (`RUST_SCAN_PLAYBACK__WINDOW=30s`)
//!
//! A session key/value set (`dt=1000&n=2&v=30&p00=rbnb/temp`) can be
//! applied on top with [`ScanConfig::apply_session_pairs`].
//!
//! # Example
//! ```no_run
//! use rust_scan::config::ScanConfig;
//!
//! let config = ScanConfig::load()?;
//! println!("server: {}", config.server.url);
//! # Ok::<(), rust_scan::error::ScanError>(())
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use scan_client::{ClientConfig, DEFAULT_SERVER_URL};
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, ScanError};
use crate::lag::LagConfig;
use crate::logging::{parse_log_level, LoggingConfig};
use crate::playback::SessionConfig;
use crate::scale::ScalingMode;
use crate::scheduler::IdleGuard;

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/rust-scan.toml";

/// Environment prefix.
pub const ENV_PREFIX: &str = "RUST_SCAN_";

/// Most channels a panel holds.
pub const MAX_CHANNELS_PER_PANEL: usize = 10;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Log output
    pub logging: LoggingConfig,
    /// Data server
    pub server: ServerConfig,
    /// Timers and buffers
    pub playback: PlaybackConfig,
    /// Presentation hints
    pub display: DisplayConfig,
    /// Panel layout
    pub panels: Vec<PanelConfig>,
}

/// `[server]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Servlet root
    pub url: String,
    /// TCP/TLS handshake timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Whole-request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let client = ClientConfig::default();
        Self {
            url: DEFAULT_SERVER_URL.to_string(),
            connect_timeout: client.connect_timeout,
            request_timeout: client.request_timeout,
        }
    }
}

impl ServerConfig {
    /// Transport settings for the HTTP client.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            ..ClientConfig::default()
        }
    }
}

/// `[playback]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Primary tick before clamping
    #[serde(with = "humantime_serde")]
    pub update_interval: Duration,
    /// Visible window
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Ticks per lag estimate update
    pub lag_average_ticks: u32,
    /// Idle wait poll interval
    #[serde(with = "humantime_serde")]
    pub idle_poll: Duration,
    /// Idle wait polls before giving up
    pub idle_max_polls: u32,
    /// Points kept per channel
    pub buffer_capacity: usize,
    /// Panels render per completion when update/window is below this
    pub incremental_ratio: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            update_interval: session.update_interval,
            window: session.window,
            lag_average_ticks: session.lag.average_ticks,
            idle_poll: session.idle.poll_interval,
            idle_max_polls: session.idle.max_polls,
            buffer_capacity: session.buffer_capacity,
            incremental_ratio: session.incremental_ratio,
        }
    }
}

/// `[display]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Panel grid columns
    pub columns: usize,
    /// Fill under lines
    pub fill: bool,
    /// Interpolate lines
    pub smooth: bool,
    /// Default panel scaling
    pub scaling: ScalingMode,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            columns: 1,
            fill: false,
            smooth: false,
            scaling: ScalingMode::Standard,
        }
    }
}

/// One `[[panels]]` entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Channel paths in slot order
    pub channels: Vec<String>,
}

impl ScanConfig {
    /// Load from the default file and the environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from `path` and the environment.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the session cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        parse_log_level(&self.logging.level)?;

        if self.playback.update_interval.is_zero() {
            return Err(invalid("playback.update_interval must be positive"));
        }
        if self.playback.window.is_zero() {
            return Err(invalid("playback.window must be positive"));
        }
        if self.playback.lag_average_ticks == 0 {
            return Err(invalid("playback.lag_average_ticks must be at least 1"));
        }
        if self.playback.idle_max_polls == 0 {
            return Err(invalid("playback.idle_max_polls must be at least 1"));
        }

        for (i, panel) in self.panels.iter().enumerate() {
            if panel.channels.len() > MAX_CHANNELS_PER_PANEL {
                return Err(invalid(&format!(
                    "panel {i} has {} channels, at most {MAX_CHANNELS_PER_PANEL} allowed",
                    panel.channels.len()
                )));
            }
            let mut seen = HashSet::new();
            for channel in &panel.channels {
                if !seen.insert(channel) {
                    return Err(invalid(&format!("panel {i} lists '{channel}' twice")));
                }
            }
        }
        Ok(())
    }

    /// Session tuning derived from `[playback]` and `[display]`.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        let p = &self.playback;
        SessionConfig {
            update_interval: p.update_interval,
            window: p.window,
            lag: LagConfig {
                average_ticks: p.lag_average_ticks,
                ..LagConfig::default()
            },
            idle: IdleGuard {
                poll_interval: p.idle_poll,
                max_polls: p.idle_max_polls,
            },
            buffer_capacity: p.buffer_capacity,
            incremental_ratio: p.incremental_ratio,
            scaling: self.display.scaling,
        }
    }

    /// Apply a persisted session key/value set (`k=v&k=v`, URL-encoded).
    ///
    /// Keys: `dt` update interval (ms), `n` panel count, `c` columns, `f`
    /// fill, `s` smooth, `v` window (s), `sc` scaling letter and
    /// `p<panel><slot>` channel assignments. Unknown keys are ignored.
    pub fn apply_session_pairs(&mut self, pairs: &str) -> AppResult<()> {
        let mut assignments: BTreeMap<(usize, usize), String> = BTreeMap::new();
        let mut panel_count = None;

        for (key, value) in url::form_urlencoded::parse(pairs.trim_start_matches('?').as_bytes()) {
            match key.as_ref() {
                "dt" => {
                    let ms: u64 = parse_number(&key, &value)?;
                    self.playback.update_interval = Duration::from_millis(ms);
                }
                "n" => panel_count = Some(parse_number::<usize>(&key, &value)?),
                "c" => self.display.columns = parse_number(&key, &value)?,
                "f" => self.display.fill = value == "true",
                "s" => self.display.smooth = value == "true",
                "v" => {
                    let secs: f64 = parse_number(&key, &value)?;
                    if !secs.is_finite() || secs <= 0.0 {
                        return Err(invalid(&format!("v={value} is not a positive duration")));
                    }
                    self.playback.window = Duration::from_secs_f64(secs);
                }
                "sc" => {
                    self.display.scaling =
                        ScalingMode::from_letter(value.chars().next().unwrap_or('s'));
                }
                k if k.starts_with('p') && k.len() >= 3 && k.is_ascii() => {
                    let (panel, slot) = k[1..].split_at(k.len() - 2);
                    match (panel.parse::<usize>(), slot.parse::<usize>()) {
                        (Ok(panel), Ok(slot)) if !value.is_empty() && value != "null" => {
                            assignments.insert((panel, slot), value.into_owned());
                        }
                        (Ok(_), Ok(_)) => {}
                        _ => tracing::debug!(key = k, "ignoring session key"),
                    }
                }
                other => tracing::debug!(key = other, "ignoring session key"),
            }
        }

        if panel_count.is_some() || !assignments.is_empty() {
            let needed = assignments.keys().map(|(p, _)| p + 1).max().unwrap_or(0);
            let count = panel_count.unwrap_or(0).max(needed);
            let mut panels = vec![PanelConfig::default(); count];
            for ((panel, _), channel) in assignments {
                panels[panel].channels.push(channel);
            }
            self.panels = panels;
        }
        self.validate()
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self).map_err(|e| invalid(&format!("cannot render config: {e}")))
    }
}

fn invalid(msg: &str) -> ScanError {
    ScanError::Configuration(msg.to_string())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> AppResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(&format!("{key}={value} is not a number")))
}

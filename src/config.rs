//! Relay configuration.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `TELEMHUB_*` environment variables (nested keys separated by `__`, e.g.
//! `TELEMHUB_HUB__HISTORY_CAPACITY=500`), then command-line flags.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use telemhub_core::{category, HubConfig, PayloadFormat};

use crate::duration::parse_duration;

/// Prefix of environment variables read by [`RelayConfig::load`].
pub const ENV_PREFIX: &str = "TELEMHUB";

/// Where events come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Built-in random-walk flight simulator.
    Simulator,
    /// Newline-delimited JSON events on standard input.
    Stdin,
    /// Newline-delimited JSON events from a TCP server.
    Connect,
}

/// Downstream sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    None,
    File,
    Tcp,
    Http,
    Nats,
}

/// Downstream payload encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    Json,
    Cbor,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub kind: SourceKind,
    /// Simulator tick.
    pub tick: String,
    /// Upstream address for [`SourceKind::Connect`].
    pub connect: Option<String>,
    /// Fixed simulator seed, for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            kind: SourceKind::Simulator,
            tick: "500ms".to_string(),
            connect: None,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    pub history_capacity: usize,
    pub broadcast_interval: String,
    pub publish_interval: String,
    pub publish_queue: usize,
    pub publish_timeout: String,
    pub listener_buffer: usize,
    pub greet_listeners: bool,
}

impl Default for HubSettings {
    fn default() -> Self {
        let defaults = HubConfig::default();
        Self {
            history_capacity: defaults.history_capacity,
            broadcast_interval: "500ms".to_string(),
            publish_interval: "0".to_string(),
            publish_queue: defaults.publish_queue,
            publish_timeout: "10s".to_string(),
            listener_buffer: defaults.listener_buffer,
            greet_listeners: defaults.greet_listeners,
        }
    }
}

/// `None` for a blank address, which disables the endpoint.
fn listen_address(listen: &str) -> Option<&str> {
    let addr = listen.trim();
    (!addr.is_empty()).then_some(addr)
}

/// A listening socket; an empty address disables it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ListenSettings {
    pub listen: String,
}

impl ListenSettings {
    pub fn address(&self) -> Option<&str> {
        listen_address(&self.listen)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub listen: String,
    /// Events returned by `/api/v1/history` without `?limit=`.
    pub default_history_limit: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8000".to_string(),
            default_history_limit: 100,
        }
    }
}

impl QuerySettings {
    pub fn address(&self) -> Option<&str> {
        listen_address(&self.listen)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    pub kind: SinkKind,
    /// Path (file), `host:port` (tcp), URL (http, nats).
    pub target: Option<String>,
    pub format: FormatKind,
    /// `droneId` of flat payloads.
    pub source_id: String,
    /// Categories merged into flat payloads.
    pub categories: Vec<String>,
    /// Bearer token for the HTTP sink.
    pub token: Option<String>,
    /// NATS subject.
    pub subject: String,
    /// Wait for JetStream acknowledgments.
    pub jetstream: bool,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            kind: SinkKind::None,
            target: None,
            format: FormatKind::Json,
            source_id: "drone123".to_string(),
            categories: vec![
                category::POSITION.to_string(),
                category::ATTITUDE.to_string(),
                category::BATTERY.to_string(),
            ],
            token: None,
            subject: "telemetry".to_string(),
            jetstream: false,
        }
    }
}

impl SinkSettings {
    pub fn payload_format(&self) -> PayloadFormat {
        match self.format {
            FormatKind::Json => PayloadFormat::Json,
            FormatKind::Cbor => PayloadFormat::Cbor,
            FormatKind::Flat => PayloadFormat::Flat {
                source_id: self.source_id.clone(),
                categories: self.categories.clone(),
            },
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub log_level: String,
    pub source: SourceSettings,
    pub hub: HubSettings,
    pub push: ListenSettings,
    pub query: QuerySettings,
    pub sink: SinkSettings,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            source: SourceSettings::default(),
            hub: HubSettings::default(),
            push: ListenSettings {
                listen: "127.0.0.1:8001".to_string(),
            },
            query: QuerySettings::default(),
            sink: SinkSettings::default(),
        }
    }
}

impl Default for ListenSettings {
    fn default() -> Self {
        RelayConfig::default().push
    }
}

impl RelayConfig {
    /// Load defaults, the optional file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load), reading variables from `env` instead of the
    /// process environment when given.
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("sink.categories")
                    .source(env),
            )
            .build()
            .context("failed to read configuration")?;

        config
            .try_deserialize()
            .context("invalid configuration")
    }

    /// Apply command-line flags on top of the loaded settings.
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(level) = &overrides.log_level {
            self.log_level = level.clone();
        }
        if let Some(kind) = overrides.source {
            self.source.kind = kind;
        }
        if let Some(addr) = &overrides.connect {
            self.source.connect = Some(addr.clone());
            if overrides.source.is_none() {
                self.source.kind = SourceKind::Connect;
            }
        }
        if let Some(tick) = &overrides.tick {
            self.source.tick = tick.clone();
        }
        if let Some(seed) = overrides.seed {
            self.source.seed = Some(seed);
        }
        if let Some(capacity) = overrides.history {
            self.hub.history_capacity = capacity;
        }
        if let Some(interval) = &overrides.broadcast_interval {
            self.hub.broadcast_interval = interval.clone();
        }
        if let Some(interval) = &overrides.publish_interval {
            self.hub.publish_interval = interval.clone();
        }
        if let Some(addr) = &overrides.push_listen {
            self.push.listen = addr.clone();
        }
        if let Some(addr) = &overrides.query_listen {
            self.query.listen = addr.clone();
        }
        if let Some(kind) = overrides.sink {
            self.sink.kind = kind;
        }
        if let Some(target) = &overrides.sink_target {
            self.sink.target = Some(target.clone());
        }
        if let Some(format) = overrides.format {
            self.sink.format = format;
        }
    }

    pub fn tick(&self) -> Result<Duration> {
        let tick = parse_duration(&self.source.tick).context("source.tick")?;
        if tick.is_zero() {
            bail!("source.tick must be greater than zero");
        }
        Ok(tick)
    }

    /// Translate into the core's configuration, parsing durations.
    pub fn to_hub_config(&self) -> Result<HubConfig> {
        let hub = &self.hub;
        let config = HubConfig {
            history_capacity: hub.history_capacity,
            broadcast_interval: parse_duration(&hub.broadcast_interval)
                .context("hub.broadcast_interval")?,
            publish_interval: parse_duration(&hub.publish_interval)
                .context("hub.publish_interval")?,
            publish_queue: hub.publish_queue,
            publish_timeout: parse_duration(&hub.publish_timeout).context("hub.publish_timeout")?,
            payload_format: self.sink.payload_format(),
            listener_buffer: hub.listener_buffer,
            greet_listeners: hub.greet_listeners,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Command-line flags that override file and environment settings.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct Overrides {
    /// Log filter, e.g. "info" or "telemhub_core=debug"
    #[arg(long)]
    pub log_level: Option<String>,

    /// Event source
    #[arg(long, value_enum)]
    pub source: Option<SourceKind>,

    /// Read NDJSON events from this TCP address (implies --source connect)
    #[arg(long)]
    pub connect: Option<String>,

    /// Simulator tick (e.g. "500ms")
    #[arg(long)]
    pub tick: Option<String>,

    /// Simulator seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Events kept in history
    #[arg(long)]
    pub history: Option<usize>,

    /// Minimum time between broadcasts (e.g. "500ms")
    #[arg(long)]
    pub broadcast_interval: Option<String>,

    /// Minimum time between downstream publishes ("0" for every update)
    #[arg(long)]
    pub publish_interval: Option<String>,

    /// Push subscription listen address (empty to disable)
    #[arg(long)]
    pub push_listen: Option<String>,

    /// HTTP query listen address (empty to disable)
    #[arg(long)]
    pub query_listen: Option<String>,

    /// Downstream sink
    #[arg(long, value_enum)]
    pub sink: Option<SinkKind>,

    /// Sink target: file path, host:port or URL
    #[arg(long)]
    pub sink_target: Option<String>,

    /// Downstream payload format
    #[arg(long, value_enum)]
    pub format: Option<FormatKind>,
}

/// Default location of the config file, if present in the working directory.
pub fn default_config_path() -> Option<PathBuf> {
    let path = PathBuf::from("telemhub.toml");
    path.exists().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn defaults_match_hub_defaults() {
        let config = RelayConfig::load_with_env(None, env(&[])).unwrap();
        assert_eq!(config, RelayConfig::default());

        let hub = config.to_hub_config().unwrap();
        assert_eq!(hub, HubConfig::default());
        assert_eq!(config.tick().unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
log_level = "debug"

[hub]
history_capacity = 500
broadcast_interval = "250ms"

[sink]
kind = "file"
target = "out.ndjson"
format = "flat"
source_id = "uav-7"
"#
        )
        .unwrap();

        let config = RelayConfig::load_with_env(Some(&path), env(&[])).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.hub.history_capacity, 500);
        assert_eq!(config.sink.kind, SinkKind::File);
        assert_eq!(config.sink.target.as_deref(), Some("out.ndjson"));

        let hub = config.to_hub_config().unwrap();
        assert_eq!(hub.broadcast_interval, Duration::from_millis(250));
        assert_eq!(hub.publish_timeout, Duration::from_secs(10));
        assert!(matches!(
            hub.payload_format,
            PayloadFormat::Flat { ref source_id, .. } if source_id == "uav-7"
        ));
    }

    #[test]
    fn environment_overrides_file() {
        let config = RelayConfig::load_with_env(
            None,
            env(&[
                ("TELEMHUB_HUB__HISTORY_CAPACITY", "42"),
                ("TELEMHUB_SOURCE__KIND", "stdin"),
                ("TELEMHUB_QUERY__LISTEN", "0.0.0.0:9000"),
            ]),
        )
        .unwrap();

        assert_eq!(config.hub.history_capacity, 42);
        assert_eq!(config.source.kind, SourceKind::Stdin);
        assert_eq!(config.query.address(), Some("0.0.0.0:9000"));
    }

    #[test]
    fn cli_overrides_win() {
        let mut config = RelayConfig::default();
        config.apply(&Overrides {
            connect: Some("10.0.0.2:5760".into()),
            broadcast_interval: Some("1s".into()),
            push_listen: Some(String::new()),
            ..Default::default()
        });

        assert_eq!(config.source.kind, SourceKind::Connect);
        assert_eq!(config.source.connect.as_deref(), Some("10.0.0.2:5760"));
        assert_eq!(config.push.address(), None);
        assert_eq!(
            config.to_hub_config().unwrap().broadcast_interval,
            Duration::from_secs(1)
        );
    }

    #[test]
    fn bad_duration_is_reported() {
        let mut config = RelayConfig::default();
        config.hub.broadcast_interval = "often".into();

        let err = config.to_hub_config().unwrap_err();
        assert!(format!("{:#}", err).contains("hub.broadcast_interval"));
    }

    #[test]
    fn zero_tick_is_rejected() {
        let mut config = RelayConfig::default();
        for tick in ["0", "0ms", " 0s "] {
            config.source.tick = tick.into();
            let err = config.tick().unwrap_err();
            assert!(err.to_string().contains("source.tick"), "{}", err);
        }

        config.source.tick = "20ms".into();
        assert_eq!(config.tick().unwrap(), Duration::from_millis(20));
    }

    #[test]
    fn blank_listen_address_disables_endpoint() {
        let mut config = RelayConfig::default();
        config.query.listen = "  ".into();
        config.push.listen = " 127.0.0.1:9001 ".into();

        assert_eq!(config.query.address(), None);
        assert_eq!(config.push.address(), Some("127.0.0.1:9001"));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut config = RelayConfig::default();
        config.hub.history_capacity = 0;
        assert!(config.to_hub_config().is_err());
    }
}

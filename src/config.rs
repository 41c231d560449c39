use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use validator::Validate;

use crate::{cli::Cli, error::ValidationError};

/// Settings file read from the working directory, if present.
pub const SETTINGS_FILE: &str = "locustrc.toml";

/// Launcher settings that are not part of the run itself: file, then `LOCUST__*` env.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    pub web: WebSettings,
    pub stats: StatsSettings,
    pub log: LogSettings,
    #[serde(default)]
    pub search_path: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSettings {
    pub host: String,
    pub port: u16,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8089,
        }
    }
}

impl WebSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSettings {
    pub interval_secs: u64,
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self { interval_secs: 2 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default)]
    pub format: LogFormat,
}

impl Settings {
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment(Path::new(SETTINGS_FILE)).extract()
    }

    pub fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("LOCUST__").split("__"))
    }
}

/// Distributed role of this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    Standalone,
    Master,
    Slave,
}

impl Topology {
    pub fn from_flags(master: bool, slave: bool) -> Result<Self, ValidationError> {
        match (master, slave) {
            (true, true) => Err(ValidationError::ConflictingTopology),
            (true, false) => Ok(Topology::Master),
            (false, true) => Ok(Topology::Slave),
            (false, false) => Ok(Topology::Standalone),
        }
    }
}

/// Broker shared by master and slaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoordinationEndpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for CoordinationEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayOptions {
    pub no_web: bool,
    pub print_stats: bool,
    pub list: bool,
    pub shortlist: bool,
    pub version: bool,
}

/// Validated, immutable input of one launch.
#[derive(Debug, Clone, Validate)]
pub struct LaunchConfig {
    pub hosts: Vec<String>,
    pub locustfile: String,
    pub scenario: Option<String>,
    #[validate(range(min = 1))]
    pub num_clients: u32,
    #[validate(range(min = 1))]
    pub hatch_rate: u32,
    pub topology: Topology,
    pub endpoint: CoordinationEndpoint,
    pub display: DisplayOptions,
    pub web: WebSettings,
    pub stats_interval: Duration,
    pub search_path: Vec<PathBuf>,
}

impl LaunchConfig {
    pub fn from_cli(cli: Cli, settings: &Settings) -> Result<Self, ValidationError> {
        let topology = Topology::from_flags(cli.master, cli.slave)?;

        let mut web = settings.web.clone();
        if let Some(host) = cli.web_host {
            web.host = host;
        }
        if let Some(port) = cli.web_port {
            web.port = port;
        }

        Ok(Self {
            hosts: cli
                .hosts
                .into_iter()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect(),
            locustfile: cli.locustfile,
            scenario: cli.locust,
            num_clients: cli.num_clients,
            hatch_rate: cli.hatch_rate,
            topology,
            endpoint: CoordinationEndpoint {
                host: cli.redis_host,
                port: cli.redis_port,
            },
            display: DisplayOptions {
                no_web: cli.no_web,
                print_stats: cli.print_stats,
                list: cli.list,
                shortlist: cli.shortlist,
                version: cli.version,
            },
            web,
            stats_interval: Duration::from_secs(settings.stats.interval_secs.max(1)),
            search_path: settings.search_path.clone(),
        })
    }

    /// Count checks that only matter when a run is actually started.
    pub fn validate_run(&self) -> Result<(), ValidationError> {
        let Err(errors) = self.validate() else {
            return Ok(());
        };
        let failed = |field: &str| errors.field_errors().keys().any(|k| k.to_string() == field);
        let flag = if failed("num_clients") {
            "--clients"
        } else {
            "--hatch-rate"
        };
        Err(ValidationError::BelowMinimum { flag })
    }

    /// The monitor only makes sense where hatching can be driven from.
    pub fn web_enabled(&self) -> bool {
        !self.display.no_web && self.topology != Topology::Slave
    }

    pub fn stats_printer_enabled(&self) -> bool {
        self.topology == Topology::Standalone && (self.display.print_stats || self.display.no_web)
    }
}

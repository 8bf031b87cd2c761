//! Server configuration: defaults, then an optional YAML file, then CLI flags
//! and environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;

use crate::error::Error;

const DEFAULT_LISTEN: &str = "127.0.0.1:3000";
const DEFAULT_CACHE_DIR: &str = "./cache";
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Parser)]
#[command(name = "tile_keeper", version, about = "Disk-cached vector tile server for PostGIS")]
pub struct CliArgs {
    /// Path to a YAML configuration file.
    #[arg(long = "config", env = "TILE_KEEPER_CONFIG", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long, env = "TILE_KEEPER_LISTEN", value_name = "ADDR")]
    pub listen: Option<SocketAddr>,

    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL", value_name = "URL")]
    pub database_url: Option<String>,

    /// Size of the database connection pool.
    #[arg(long, value_name = "COUNT")]
    pub max_connections: Option<u32>,

    /// Directory holding cached tiles.
    #[arg(long, env = "TILE_KEEPER_CACHE_DIR", value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Base log level (trace|debug|info|warn|error).
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(long)]
    pub log_json: bool,
}

/// The YAML file as written, before defaults are applied.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawSettings {
    listen: Option<SocketAddr>,
    cache_dir: Option<PathBuf>,
    database: RawDatabase,
    log: RawLog,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawDatabase {
    url: Option<String>,
    max_connections: Option<u32>,
    acquire_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawLog {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub listen: SocketAddr,
    pub cache_dir: PathBuf,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct LoggingConfig {
    pub level: LevelFilter,
    pub format: LogFormat,
}

impl RawSettings {
    fn from_yaml(data: &str) -> Result<RawSettings, Error> {
        // An empty file parses as null
        if data.trim().is_empty() {
            return Ok(RawSettings::default());
        }
        Ok(serde_yaml::from_str(data)?)
    }

    fn apply_cli(&mut self, args: &CliArgs) {
        if args.listen.is_some() {
            self.listen = args.listen;
        }
        if args.cache_dir.is_some() {
            self.cache_dir = args.cache_dir.clone();
        }
        if args.database_url.is_some() {
            self.database.url = args.database_url.clone();
        }
        if args.max_connections.is_some() {
            self.database.max_connections = args.max_connections;
        }
        if args.log_level.is_some() {
            self.log.level = args.log_level.clone();
        }
        if args.log_json {
            self.log.format = Some(LogFormat::Json);
        }
    }
}

impl Settings {
    /// Parses the process arguments and loads the settings they point at.
    pub fn load() -> Result<Settings, Error> {
        let args = CliArgs::parse();
        let file = match &args.config_file {
            Some(path) => Some(std::fs::read_to_string(path).map_err(|err| {
                Error::InvalidConfig(format!("unable to read {}: {}", path.display(), err))
            })?),
            None => None,
        };

        Settings::from_sources(file.as_deref(), &args)
    }

    /// Merges an optional YAML document with CLI arguments.
    pub fn from_sources(yaml: Option<&str>, args: &CliArgs) -> Result<Settings, Error> {
        let mut raw = match yaml {
            Some(data) => RawSettings::from_yaml(data)?,
            None => RawSettings::default(),
        };
        raw.apply_cli(args);

        Settings::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> Result<Settings, Error> {
        let listen = match raw.listen {
            Some(listen) => listen,
            None => DEFAULT_LISTEN
                .parse()
                .map_err(|_| Error::InvalidConfig(format!("bad default address {}", DEFAULT_LISTEN)))?,
        };

        let url = raw
            .database
            .url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| Error::InvalidConfig(String::from("a database URL is required")))?;

        let max_connections = raw.database.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS);
        if max_connections == 0 {
            return Err(Error::InvalidConfig(String::from(
                "max_connections must be at least 1",
            )));
        }

        let level = match raw.log.level {
            Some(level) => level
                .parse::<LevelFilter>()
                .map_err(|_| Error::InvalidConfig(format!("unknown log level {:?}", level)))?,
            None => LevelFilter::INFO,
        };

        Ok(Settings {
            listen,
            cache_dir: raw.cache_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR)),
            database: DatabaseConfig {
                url,
                max_connections,
                acquire_timeout_secs: raw
                    .database
                    .acquire_timeout_secs
                    .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            },
            logging: LoggingConfig {
                level,
                format: raw.log.format.unwrap_or_default(),
            },
        })
    }
}

//! TOML configuration for [`Engine::connect`](crate::Engine::connect).
//!
//! ```toml
//! [db]
//! type = "embedded"      # embedded | document | relational | mongodb
//! loglevel = "warn"      # silent | error | warn | info | debug, or 1..=4
//! log = "logs/db.log"
//!
//! [embedded]
//! file_path = "data/app.sqlite"
//! conn_max_lifetime = "30m"
//! ```
//!
//! The section names used by older deployments (`[mysql]`, `[mongodb]`, `[sqlite]`) are accepted
//! as aliases.

use crate::{Deserialize, Error, Result, Serialize, utils::try_read_file};
use derive_more::Display;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::level_filters::LevelFilter;

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DBConfig {
    pub db: DbSection,
    #[serde(alias = "mysql")]
    pub relational: Option<RelationalConfig>,
    #[serde(alias = "mongodb")]
    pub document: Option<DocumentConfig>,
    #[serde(alias = "sqlite")]
    pub embedded: Option<EmbeddedConfig>,
}

impl DBConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        return toml::from_str(source).map_err(|e| Error::ConfigInvalid {
            path: String::from("<inline>"),
            reason: e.to_string(),
        });
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let invalid = |reason: String| Error::ConfigInvalid {
            path: path.display().to_string(),
            reason,
        };

        let bytes = try_read_file(path).map_err(|e| invalid(e.to_string()))?;
        let source = String::from_utf8(bytes).map_err(|e| invalid(e.to_string()))?;

        return toml::from_str(&source).map_err(|e| invalid(e.to_string()));
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DbSection {
    pub r#type: BackendType,
    #[serde(flatten)]
    pub log: LogConfig,
    pub auto_create_table: bool,
}

#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    #[default]
    #[display("embedded")]
    #[serde(alias = "sqlite")]
    Embedded,
    #[display("document")]
    Document,
    #[display("relational")]
    #[serde(alias = "mysql")]
    Relational,
    #[display("mongodb")]
    Mongodb,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log file, appended to; stdout when absent
    pub log: Option<PathBuf>,
    pub loglevel: LogLevel,
}

#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(try_from = "LogLevelRepr", into = "String")]
pub enum LogLevel {
    #[display("silent")]
    Silent,
    #[display("error")]
    Error,
    #[default]
    #[display("warn")]
    Warn,
    #[display("info")]
    Info,
    #[display("debug")]
    Debug,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LogLevelRepr {
    Level(i64),
    Name(String),
}

impl TryFrom<LogLevelRepr> for LogLevel {
    type Error = String;

    fn try_from(repr: LogLevelRepr) -> core::result::Result<Self, String> {
        return match repr {
            LogLevelRepr::Level(1) => Ok(Self::Silent),
            LogLevelRepr::Level(2) => Ok(Self::Error),
            LogLevelRepr::Level(3) => Ok(Self::Warn),
            LogLevelRepr::Level(4) => Ok(Self::Info),
            LogLevelRepr::Level(level) => Err(format!("unknown log level [{level}], expected 1..=4")),
            LogLevelRepr::Name(name) => match name.to_ascii_lowercase().as_str() {
                "" | "warn" | "warning" => Ok(Self::Warn),
                "silent" | "off" => Ok(Self::Silent),
                "error" => Ok(Self::Error),
                "info" => Ok(Self::Info),
                "debug" => Ok(Self::Debug),
                other => Err(format!("unknown log level [{other}]")),
            },
        };
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self { level.to_string() }
}

impl LogLevel {
    pub fn level_filter(&self) -> LevelFilter {
        return match self {
            Self::Silent => LevelFilter::OFF,
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
        };
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RelationalConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub charset: String,
    pub max_idle_conns: Option<u32>,
    pub max_open_conns: Option<u32>,
    pub conn_max_lifetime: Option<String>,
    pub auto_create_table: bool,
}

impl Default for RelationalConfig {
    fn default() -> Self {
        return Self {
            host: String::from("127.0.0.1"),
            port: 3306,
            user: String::new(),
            password: String::new(),
            database: String::new(),
            charset: String::from("utf8mb4"),
            max_idle_conns: None,
            max_open_conns: None,
            conn_max_lifetime: None,
            auto_create_table: false,
        };
    }
}

impl RelationalConfig {
    /// Connection string in the `user:password@tcp(host:port)/database` form.
    pub fn dsn(&self) -> String {
        return format!(
            "{}:{}@tcp({}:{})/{}?charset={}&parseTime=True&loc=Local",
            self.user, self.password, self.host, self.port, self.database, self.charset
        );
    }

    pub fn conn_max_lifetime(&self) -> Result<Option<Duration>> {
        return self
            .conn_max_lifetime
            .as_deref()
            .map(parse_duration)
            .transpose();
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// `memory://` or `file://<dir>` (a bare path means a directory)
    pub uri: String,
    pub database: String,
    pub proxy: Option<String>,
    pub option_pool_size: Option<u64>,
    pub w: Option<i64>,
    pub readmode: Option<String>,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        return Self {
            uri: String::from("memory://"),
            database: String::new(),
            proxy: None,
            option_pool_size: None,
            w: None,
            readmode: None,
        };
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadMode {
    Primary,
    Nearest,
}

impl DocumentConfig {
    pub fn pool_size(&self) -> u64 { self.option_pool_size.unwrap_or(150) }

    pub fn min_pool_size(&self) -> u64 { self.pool_size() / 10 }

    pub fn write_concern(&self) -> i64 { self.w.unwrap_or(1) }

    pub fn read_mode(&self) -> ReadMode {
        return match self.readmode.as_deref() {
            Some("master") | Some("primary") => ReadMode::Primary,
            _ => ReadMode::Nearest,
        };
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EmbeddedConfig {
    /// Database file, `:memory:` for a private in-memory database
    pub file_path: String,
    pub max_idle_conns: Option<u32>,
    pub max_open_conns: Option<u32>,
    pub conn_max_lifetime: Option<String>,
    /// How long a statement waits on a locked database
    pub busy_timeout: Option<String>,
}

impl Default for EmbeddedConfig {
    fn default() -> Self {
        return Self {
            file_path: String::from(":memory:"),
            max_idle_conns: None,
            max_open_conns: None,
            conn_max_lifetime: None,
            busy_timeout: None,
        };
    }
}

impl EmbeddedConfig {
    pub fn max_idle_conns(&self) -> u32 { self.max_idle_conns.unwrap_or(10) }

    pub fn max_open_conns(&self) -> u32 { self.max_open_conns.unwrap_or(100) }

    pub fn conn_max_lifetime(&self) -> Result<Duration> {
        return match &self.conn_max_lifetime {
            Some(lifetime) => parse_duration(lifetime),
            None => Ok(Duration::from_secs(30 * 60)),
        };
    }

    pub fn busy_timeout(&self) -> Result<Duration> {
        return match &self.busy_timeout {
            Some(timeout) => parse_duration(timeout),
            None => Ok(Duration::from_secs(5)),
        };
    }
}

/// Parses `"1h30m"`, `"45s"`, `"250ms"`; a bare number means seconds.
pub fn parse_duration(source: &str) -> Result<Duration> {
    let invalid = |reason: &str| Error::ConfigInvalid {
        path: String::from("<duration>"),
        reason: format!("[{source}] {reason}"),
    };

    let source = source.trim();
    if source.is_empty() {
        return Err(invalid("is empty"));
    }
    if let Ok(seconds) = source.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    let mut total = Duration::ZERO;
    let mut rest = source;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(invalid("expected a number"));
        }
        let amount = rest[..digits]
            .parse::<u64>()
            .map_err(|_| invalid("has an out of range number"))?;
        rest = &rest[digits..];

        let unit = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let step = match &rest[..unit] {
            "ms" => Duration::from_millis(amount),
            "s" => Duration::from_secs(amount),
            "m" => Duration::from_secs(amount * 60),
            "h" => Duration::from_secs(amount * 60 * 60),
            "d" => Duration::from_secs(amount * 24 * 60 * 60),
            _ => return Err(invalid("has an unknown unit, expected ms, s, m, h or d")),
        };
        total += step;
        rest = &rest[unit..];
    }

    return Ok(total);
}

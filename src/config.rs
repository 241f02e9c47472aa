// src/config.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::core::catalog;
use crate::core::executor::ExecutorSettings;
use crate::logging;

pub const ENV_CONFIG: &str = "SCANRELAY_CONFIG";
pub const ENV_DATA_DIR: &str = "SCANRELAY_DATA_DIR";
pub const ENV_REPORTS_DIR: &str = "SCANRELAY_REPORTS_DIR";
pub const ENV_TOOL_TIMEOUT_SECS: &str = "SCANRELAY_TOOL_TIMEOUT_SECS";
pub const ENV_WORKERS: &str = "SCANRELAY_WORKERS";
pub const ENV_NOTIFY_RECIPIENT: &str = "SCANRELAY_NOTIFY_RECIPIENT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("{0}")]
    Invalid(String),
}

/// Fully resolved, immutable configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub database: PathBuf,
    pub tool_timeout: Duration,
    pub report_title: String,
    /// Tools used when a submission names none.
    pub default_tools: Vec<String>,
    pub executor: ExecutorSettings,
    /// Also write `{id}_report.html` and use it as the report location.
    pub render_html: bool,
    pub notify: NotifyConfig,
    /// The file the configuration was read from, if any.
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NotifyConfig {
    /// Outbox for spooled notifications; notifications are disabled when unset.
    pub outbox_dir: Option<PathBuf>,
    pub sender: Option<String>,
    pub default_recipient: Option<String>,
}

impl Config {
    /// Defaults rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            reports_dir: data_dir.join("reports"),
            database: data_dir.join("scanrelay.db"),
            data_dir,
            tool_timeout: crate::core::scanner::DEFAULT_TOOL_TIMEOUT,
            report_title: "Scan Report".to_string(),
            default_tools: catalog::default_tool_names(),
            executor: ExecutorSettings::default(),
            render_html: true,
            notify: NotifyConfig::default(),
            config_path: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::with_data_dir(logging::get_data_dir())
    }
}

// --- Raw TOML ---

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    paths: Option<RawPaths>,
    scan: Option<RawScan>,
    executor: Option<RawExecutor>,
    render: Option<RawRender>,
    notify: Option<RawNotify>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPaths {
    data_dir: Option<PathBuf>,
    reports_dir: Option<PathBuf>,
    database: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawScan {
    tool_timeout_secs: Option<u64>,
    report_title: Option<String>,
    tools: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawExecutor {
    workers: Option<usize>,
    queue_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRender {
    enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNotify {
    outbox_dir: Option<PathBuf>,
    sender: Option<String>,
    default_recipient: Option<String>,
}

pub fn default_config_path() -> PathBuf {
    logging::get_config_dir().join("config.toml")
}

/// Loads the configuration.
///
/// Precedence, lowest first: built-in defaults, the TOML file (`config_path`,
/// else `$SCANRELAY_CONFIG`, else the default location; a missing default file is
/// fine), environment overrides, then `data_dir_override`.
pub fn load(config_path: Option<&Path>, data_dir_override: Option<&Path>) -> Result<Config, ConfigError> {
    let explicit = config_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(ENV_CONFIG).map(PathBuf::from));
    let path = explicit.clone().unwrap_or_else(default_config_path);

    let raw = if path.exists() || explicit.is_some() {
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Some(parse(&text, &path)?)
    } else {
        None
    };

    let env: Vec<(String, String)> = std::env::vars().collect();
    let mut cfg = resolve(raw, &env, data_dir_override)?;
    if cfg.config_path.is_none() && path.exists() {
        cfg.config_path = Some(path);
    }
    validate(&cfg)?;
    Ok(cfg)
}

fn parse(text: &str, path: &Path) -> Result<RawConfig, ConfigError> {
    toml::from_str(text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn env_value<'a>(env: &'a [(String, String)], key: &str) -> Option<&'a str> {
    env.iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
}

fn parse_env<T: std::str::FromStr>(env: &[(String, String)], key: &'static str) -> Result<Option<T>, ConfigError> {
    env_value(env, key)
        .map(|v| {
            v.parse::<T>().map_err(|_| ConfigError::InvalidEnv {
                key,
                value: v.to_string(),
            })
        })
        .transpose()
}

fn resolve(
    raw: Option<RawConfig>,
    env: &[(String, String)],
    data_dir_override: Option<&Path>,
) -> Result<Config, ConfigError> {
    let raw = raw.unwrap_or_default();
    let paths = raw.paths;

    let data_dir = data_dir_override
        .map(Path::to_path_buf)
        .or_else(|| env_value(env, ENV_DATA_DIR).map(PathBuf::from))
        .or_else(|| paths.as_ref().and_then(|p| p.data_dir.clone()));
    let mut cfg = match data_dir {
        Some(dir) => Config::with_data_dir(dir),
        None => Config::default(),
    };

    if let Some(paths) = paths {
        if let Some(reports_dir) = paths.reports_dir {
            cfg.reports_dir = reports_dir;
        }
        if let Some(database) = paths.database {
            cfg.database = database;
        }
    }
    if let Some(scan) = raw.scan {
        if let Some(secs) = scan.tool_timeout_secs {
            cfg.tool_timeout = Duration::from_secs(secs);
        }
        if let Some(title) = scan.report_title {
            cfg.report_title = title;
        }
        if let Some(tools) = scan.tools {
            cfg.default_tools = tools;
        }
    }
    if let Some(executor) = raw.executor {
        if let Some(workers) = executor.workers {
            cfg.executor.workers = workers;
        }
        if let Some(capacity) = executor.queue_capacity {
            cfg.executor.queue_capacity = capacity;
        }
    }
    if let Some(enabled) = raw.render.and_then(|r| r.enabled) {
        cfg.render_html = enabled;
    }
    if let Some(notify) = raw.notify {
        cfg.notify = NotifyConfig {
            outbox_dir: notify.outbox_dir,
            sender: notify.sender,
            default_recipient: notify.default_recipient,
        };
    }

    if let Some(reports_dir) = env_value(env, ENV_REPORTS_DIR) {
        cfg.reports_dir = PathBuf::from(reports_dir);
    }
    if let Some(secs) = parse_env::<u64>(env, ENV_TOOL_TIMEOUT_SECS)? {
        cfg.tool_timeout = Duration::from_secs(secs);
    }
    if let Some(workers) = parse_env::<usize>(env, ENV_WORKERS)? {
        cfg.executor.workers = workers;
    }
    if let Some(recipient) = env_value(env, ENV_NOTIFY_RECIPIENT) {
        cfg.notify.default_recipient = Some(recipient.to_string());
    }

    Ok(cfg)
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.executor.workers == 0 {
        return Err(ConfigError::Invalid("executor.workers must be at least 1".into()));
    }
    if cfg.executor.queue_capacity == 0 {
        return Err(ConfigError::Invalid("executor.queue_capacity must be at least 1".into()));
    }
    if cfg.tool_timeout < Duration::from_secs(1) {
        return Err(ConfigError::Invalid("scan.tool_timeout_secs must be at least 1".into()));
    }
    Ok(())
}

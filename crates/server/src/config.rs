#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;
use tq_storage::{RedisKvConfig, SweeperConfig, WorkspaceConfig};
use tq_translate::{ClientConfig, DEFAULT_MAX_TOKENS, DEFAULT_MODEL};

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ConfigError {
    MissingValue(&'static str),
    UnknownFlag(String),
    InvalidNumber { name: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingValue(flag) => write!(f, "{flag} requires a value"),
            Self::UnknownFlag(flag) => write!(f, "unknown flag: {flag}"),
            Self::InvalidNumber { name, value } => {
                write!(f, "{name} must be a positive integer (got {value:?})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Clone, Debug)]
pub(crate) struct TranslatorConfig {
    pub(crate) client: ClientConfig,
    pub(crate) model: String,
    pub(crate) max_tokens: u32,
}

#[derive(Clone, Debug)]
pub(crate) struct ServerConfig {
    /// `None` keeps the relational engine in memory.
    pub(crate) db_path: Option<PathBuf>,
    /// `None` selects the in-process key-value store.
    pub(crate) redis: Option<RedisKvConfig>,
    pub(crate) workspace: WorkspaceConfig,
    pub(crate) sweeper: SweeperConfig,
    /// Absent when no API key is configured.
    pub(crate) translator: Option<TranslatorConfig>,
}

impl ServerConfig {
    pub(crate) fn from_process() -> Result<Self, ConfigError> {
        let args = std::env::args().skip(1).collect::<Vec<_>>();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    /// Flags win over environment variables, which win over defaults.
    pub(crate) fn from_sources(
        args: &[String],
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let flags = Flags::parse(args)?;
        let env_var = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let db_path = flags.db.or_else(|| env_var("TQ_DB_PATH")).map(PathBuf::from);
        let redis = flags
            .redis_url
            .or_else(|| env_var("TQ_REDIS_URL"))
            .map(|url| RedisKvConfig {
                url,
                ..RedisKvConfig::default()
            });

        let defaults = WorkspaceConfig::default();
        let workspace = WorkspaceConfig {
            session_ttl: seconds_or("--session-ttl-s", flags.session_ttl_s, defaults.session_ttl)?,
            result_ttl: seconds_or("--result-ttl-s", flags.result_ttl_s, defaults.result_ttl)?,
        };
        let defaults = SweeperConfig::default();
        let sweeper = SweeperConfig {
            interval: seconds_or("--sweep-interval-s", flags.sweep_interval_s, defaults.interval)?,
            idle_threshold: seconds_or(
                "--idle-threshold-s",
                flags.idle_threshold_s,
                defaults.idle_threshold,
            )?,
        };

        let translator = match env_var("TQ_AI_API_KEY") {
            None => None,
            Some(api_key) => {
                let defaults = ClientConfig::default();
                let timeout_secs = match env_var("TQ_AI_TIMEOUT_S") {
                    Some(raw) => positive("TQ_AI_TIMEOUT_S", &raw)?,
                    None => defaults.timeout_secs,
                };
                let max_tokens = match env_var("TQ_AI_MAX_TOKENS") {
                    Some(raw) => u32::try_from(positive("TQ_AI_MAX_TOKENS", &raw)?).map_err(|_| {
                        ConfigError::InvalidNumber {
                            name: "TQ_AI_MAX_TOKENS",
                            value: raw.clone(),
                        }
                    })?,
                    None => DEFAULT_MAX_TOKENS,
                };
                Some(TranslatorConfig {
                    client: ClientConfig {
                        api_key,
                        base_url: env_var("TQ_AI_BASE_URL").unwrap_or(defaults.base_url),
                        timeout_secs,
                    },
                    model: env_var("TQ_AI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                    max_tokens,
                })
            }
        };

        Ok(Self {
            db_path,
            redis,
            workspace,
            sweeper,
            translator,
        })
    }
}

#[derive(Default)]
struct Flags {
    db: Option<String>,
    redis_url: Option<String>,
    session_ttl_s: Option<String>,
    result_ttl_s: Option<String>,
    sweep_interval_s: Option<String>,
    idle_threshold_s: Option<String>,
}

impl Flags {
    fn parse(args: &[String]) -> Result<Self, ConfigError> {
        let mut flags = Self::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            let (flag, slot) = match arg.as_str() {
                "--db" => ("--db", &mut flags.db),
                "--redis-url" => ("--redis-url", &mut flags.redis_url),
                "--session-ttl-s" => ("--session-ttl-s", &mut flags.session_ttl_s),
                "--result-ttl-s" => ("--result-ttl-s", &mut flags.result_ttl_s),
                "--sweep-interval-s" => ("--sweep-interval-s", &mut flags.sweep_interval_s),
                "--idle-threshold-s" => ("--idle-threshold-s", &mut flags.idle_threshold_s),
                other => return Err(ConfigError::UnknownFlag(other.to_string())),
            };
            let Some(value) = iter.next() else {
                return Err(ConfigError::MissingValue(flag));
            };
            *slot = Some(value.clone());
        }
        Ok(flags)
    }
}

fn positive(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::InvalidNumber {
            name,
            value: raw.to_string(),
        }),
    }
}

fn seconds_or(
    name: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match raw {
        Some(raw) => positive(name, &raw).map(Duration::from_secs),
        None => Ok(default),
    }
}

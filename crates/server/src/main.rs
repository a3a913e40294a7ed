#![forbid(unsafe_code)]

mod config;
mod logging;
mod rpc;
mod server;
mod stdio;

use config::{ServerConfig, TranslatorConfig};
use server::Server;
use std::sync::Arc;
use tq_core::{Clock, SystemClock};
use tq_storage::{KvStore, MemoryKv, RedisKv, SqlEngine, Sweeper, Workspaces};
use tq_translate::{AnthropicClient, Translator};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

fn usage() -> &'static str {
    "tq_server: session-scoped table workspaces with query caching (JSON-RPC over stdio)\n\n\
USAGE:\n\
  tq_server [--db PATH] [--redis-url URL] [--session-ttl-s N] [--result-ttl-s N]\n\
            [--sweep-interval-s N] [--idle-threshold-s N]\n\
\n\
FLAGS:\n\
  -h, --help       Print this help and exit\n\
  -V, --version    Print version and exit\n\
\n\
ENVIRONMENT:\n\
  TQ_DB_PATH, TQ_REDIS_URL          Same as --db / --redis-url\n\
  TQ_AI_API_KEY                     Enables natural-language queries\n\
  TQ_AI_BASE_URL, TQ_AI_MODEL       Translation endpoint and model\n\
  TQ_AI_MAX_TOKENS, TQ_AI_TIMEOUT_S Translation limits (default 1000 / 30)\n\
  TQ_LOG                            Log filter, written to stderr (default info)\n"
}

fn version_line() -> String {
    format!("tq_server {SERVER_VERSION}")
}

fn open_kv(
    config: &ServerConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn KvStore>, Box<dyn std::error::Error>> {
    match &config.redis {
        Some(redis) => {
            let kv = RedisKv::open(redis.clone())?;
            if let Err(err) = kv.ping() {
                tracing::warn!(error = %err, "redis not reachable at startup");
            }
            Ok(Arc::new(kv))
        }
        None => Ok(Arc::new(MemoryKv::new(clock))),
    }
}

fn open_translator(config: &TranslatorConfig) -> Result<Translator, Box<dyn std::error::Error>> {
    let client = AnthropicClient::new(config.client.clone())?;
    Ok(Translator::new(
        Arc::new(client),
        config.model.clone(),
        config.max_tokens,
    ))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = std::env::args().collect::<Vec<_>>();
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print!("{}", usage());
        return Ok(());
    }
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-V" | "--version"))
    {
        println!("{}", version_line());
        return Ok(());
    }

    logging::init()?;
    let config = ServerConfig::from_process()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let kv = open_kv(&config, clock.clone())?;
    let sql = match &config.db_path {
        Some(path) => SqlEngine::open(path)?,
        None => SqlEngine::open_in_memory()?,
    };

    let mut workspaces = Workspaces::new(kv, sql, clock.clone(), config.workspace.clone());
    match &config.translator {
        Some(translator) => {
            workspaces = workspaces.with_translator(open_translator(translator)?);
        }
        None => tracing::info!("TQ_AI_API_KEY not set; natural-language queries are disabled"),
    }
    let workspaces = Arc::new(workspaces);

    let sweeper = Sweeper::new(workspaces.clone(), clock, config.sweeper.clone()).spawn()?;
    let db = config
        .db_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| ":memory:".to_string());
    let kv_backend = if config.redis.is_some() { "redis" } else { "memory" };
    tracing::info!(version = SERVER_VERSION, db = %db, kv = kv_backend, "tq_server ready");

    let server = Server::new(workspaces);
    let result = stdio::run_stdio(&server);
    sweeper.stop();
    result
}

#![forbid(unsafe_code)]

use super::{KvStore, ttl_ms};
use crate::KvError;
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::Duration;

const SCAN_BATCH: usize = 500;

#[derive(Clone, Debug)]
pub struct RedisKvConfig {
    pub url: String,
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
    pub max_idle: usize,
}

impl Default for RedisKvConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".to_string(),
            connect_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(30),
            max_idle: 10,
        }
    }
}

/// Synchronous Redis adapter. Connections are checked out of a small idle pool so no lock is held
/// while a command is in flight; a connection that errors is discarded rather than returned.
pub struct RedisKv {
    client: redis::Client,
    config: RedisKvConfig,
    idle: Mutex<Vec<redis::Connection>>,
}

impl RedisKv {
    pub fn open(config: RedisKvConfig) -> Result<Self, KvError> {
        let client = redis::Client::open(config.url.as_str())?;
        Ok(Self {
            client,
            config,
            idle: Mutex::new(Vec::new()),
        })
    }

    fn checkout(&self) -> Result<redis::Connection, KvError> {
        let pooled = self.idle.lock().map_err(|_| KvError::LockPoisoned)?.pop();
        if let Some(conn) = pooled {
            return Ok(conn);
        }
        let conn = self
            .client
            .get_connection_with_timeout(self.config.connect_timeout)?;
        conn.set_read_timeout(Some(self.config.io_timeout))?;
        conn.set_write_timeout(Some(self.config.io_timeout))?;
        Ok(conn)
    }

    fn checkin(&self, conn: redis::Connection) {
        if let Ok(mut idle) = self.idle.lock()
            && idle.len() < self.config.max_idle
        {
            idle.push(conn);
        }
    }

    fn with_conn<T>(
        &self,
        op: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> Result<T, KvError> {
        let mut conn = self.checkout()?;
        match op(&mut conn) {
            Ok(value) => {
                self.checkin(conn);
                Ok(value)
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl KvStore for RedisKv {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.with_conn(|conn| redis::cmd("GET").arg(key).query(conn))
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        self.with_conn(|conn| {
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value);
            if let Some(ttl) = ttl {
                cmd.arg("PX").arg(ttl_ms(ttl));
            }
            cmd.query::<()>(conn)
        })
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        let updated: i64 = self.with_conn(|conn| {
            redis::cmd("PEXPIRE")
                .arg(key)
                .arg(ttl_ms(ttl))
                .query(conn)
        })?;
        Ok(updated == 1)
    }

    fn del(&self, keys: &[String]) -> Result<usize, KvError> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.with_conn(|conn| {
            let mut cmd = redis::cmd("DEL");
            for key in keys {
                cmd.arg(key);
            }
            cmd.query(conn)
        })
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        self.with_conn(|conn| {
            // SCAN may report a key more than once across iterations.
            let mut out = BTreeSet::new();
            let mut cursor: u64 = 0;
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query(conn)?;
                out.extend(batch);
                if next == 0 {
                    break;
                }
                cursor = next;
            }
            Ok(out.into_iter().collect())
        })
    }

    fn set_add(&self, key: &str, member: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        self.with_conn(|conn| {
            let mut pipe = redis::pipe();
            pipe.atomic().cmd("SADD").arg(key).arg(member).ignore();
            if let Some(ttl) = ttl {
                pipe.cmd("PEXPIRE").arg(key).arg(ttl_ms(ttl)).ignore();
            }
            pipe.query::<()>(conn)
        })
    }

    fn set_members(&self, key: &str) -> Result<Vec<String>, KvError> {
        self.with_conn(|conn| redis::cmd("SMEMBERS").arg(key).query(conn))
    }

    fn ping(&self) -> Result<(), KvError> {
        self.with_conn(|conn| redis::cmd("PING").query::<String>(conn))
            .map(|_| ())
    }
}

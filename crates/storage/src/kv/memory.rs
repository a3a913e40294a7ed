#![forbid(unsafe_code)]

use super::{KvStore, ttl_ms};
use crate::KvError;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tq_core::Clock;

#[derive(Debug)]
enum Slot {
    Text(String),
    Set(BTreeSet<String>),
}

#[derive(Debug)]
struct Entry {
    slot: Slot,
    expires_at_ms: Option<i64>,
}

impl Entry {
    fn live_at(&self, now_ms: i64) -> bool {
        self.expires_at_ms.is_none_or(|deadline| deadline > now_ms)
    }
}

/// In-process store with the same observable semantics as the Redis adapter. Expiry is evaluated
/// lazily against the injected clock.
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryKv {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn len(&self) -> Result<usize, KvError> {
        let now = self.clock.now_ms();
        let entries = self.lock()?;
        Ok(entries.values().filter(|e| e.live_at(now)).count())
    }

    pub fn is_empty(&self) -> Result<bool, KvError> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, KvError> {
        self.entries.lock().map_err(|_| KvError::LockPoisoned)
    }

    /// Locks and drops the entry at `key` if it has expired.
    fn lock_fresh(&self, key: &str) -> Result<MutexGuard<'_, HashMap<String, Entry>>, KvError> {
        let now = self.clock.now_ms();
        let mut entries = self.lock()?;
        if entries.get(key).is_some_and(|e| !e.live_at(now)) {
            entries.remove(key);
        }
        Ok(entries)
    }

    fn deadline(&self, ttl: Option<Duration>) -> Option<i64> {
        ttl.map(|ttl| {
            let ms = i64::try_from(ttl_ms(ttl)).unwrap_or(i64::MAX);
            self.clock.now_ms().saturating_add(ms)
        })
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let entries = self.lock_fresh(key)?;
        match entries.get(key) {
            None => Ok(None),
            Some(Entry {
                slot: Slot::Text(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(_) => Err(KvError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        let expires_at_ms = self.deadline(ttl);
        let mut entries = self.lock()?;
        entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Text(value.to_string()),
                expires_at_ms,
            },
        );
        Ok(())
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        let expires_at_ms = self.deadline(Some(ttl));
        let mut entries = self.lock_fresh(key)?;
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at_ms = expires_at_ms;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn del(&self, keys: &[String]) -> Result<usize, KvError> {
        let now = self.clock.now_ms();
        let mut entries = self.lock()?;
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = entries.remove(key)
                && entry.live_at(now)
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>, KvError> {
        let now = self.clock.now_ms();
        let mut entries = self.lock()?;
        entries.retain(|_, entry| entry.live_at(now));
        let mut out = entries
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect::<Vec<_>>();
        out.sort();
        Ok(out)
    }

    fn set_add(&self, key: &str, member: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        let expires_at_ms = self.deadline(ttl);
        let mut entries = self.lock_fresh(key)?;
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            slot: Slot::Set(BTreeSet::new()),
            expires_at_ms: None,
        });
        let Slot::Set(members) = &mut entry.slot else {
            return Err(KvError::WrongType {
                key: key.to_string(),
            });
        };
        members.insert(member.to_string());
        if expires_at_ms.is_some() {
            entry.expires_at_ms = expires_at_ms;
        }
        Ok(())
    }

    fn set_members(&self, key: &str) -> Result<Vec<String>, KvError> {
        let entries = self.lock_fresh(key)?;
        match entries.get(key) {
            None => Ok(Vec::new()),
            Some(Entry {
                slot: Slot::Set(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(KvError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    fn ping(&self) -> Result<(), KvError> {
        self.lock().map(|_| ())
    }
}

/// Redis `KEYS` glob subset: `*`, `?` and `\` escapes.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.chars().collect::<Vec<_>>();
    let text = text.chars().collect::<Vec<_>>();
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, t));
                p += 1;
                continue;
            }
            Some('?') => {
                p += 1;
                t += 1;
                continue;
            }
            Some('\\') if pattern.get(p + 1) == Some(&text[t]) => {
                p += 2;
                t += 1;
                continue;
            }
            Some(ch) if *ch != '\\' && *ch == text[t] => {
                p += 1;
                t += 1;
                continue;
            }
            _ => {}
        }
        match star {
            Some((star_p, star_t)) => {
                p = star_p + 1;
                t = star_t + 1;
                star = Some((star_p, star_t + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|ch| *ch == '*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use tq_core::ManualClock;

    fn store() -> (MemoryKv, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        (MemoryKv::new(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn glob_patterns() {
        assert!(glob_match("session:*", "session:abc"));
        assert!(glob_match("session:*", "session:"));
        assert!(!glob_match("session:*", "schema:abc"));
        assert!(glob_match("cache:*:ws1:*", "cache:query:ws1:ff00"));
        assert!(!glob_match("cache:*:ws1:*", "cache:query:ws10"));
        assert!(glob_match("a?c", "abc"));
        assert!(!glob_match("a?c", "ac"));
        assert!(glob_match("a\\*c", "a*c"));
        assert!(!glob_match("a\\*c", "abc"));
        assert!(glob_match("*", ""));
    }

    #[test]
    fn ttl_expires_against_clock() {
        let (kv, clock) = store();
        kv.set("k", "v", Some(Duration::from_secs(10))).unwrap();
        kv.set("forever", "v", None).unwrap();
        clock.advance_ms(9_999);
        assert_eq!(kv.get("k").unwrap().as_deref(), Some("v"));
        clock.advance_ms(1);
        assert_eq!(kv.get("k").unwrap(), None);
        assert_eq!(kv.get("forever").unwrap().as_deref(), Some("v"));
        assert_eq!(kv.keys("*").unwrap(), vec!["forever".to_string()]);
    }

    #[test]
    fn expire_rearms_existing_keys_only() {
        let (kv, clock) = store();
        kv.set("k", "v", Some(Duration::from_secs(1))).unwrap();
        assert!(kv.expire("k", Duration::from_secs(60)).unwrap());
        assert!(!kv.expire("missing", Duration::from_secs(60)).unwrap());
        clock.advance_ms(30_000);
        assert!(kv.get("k").unwrap().is_some());
    }

    #[test]
    fn sets_and_batched_delete() {
        let (kv, _clock) = store();
        kv.set_add("idx", "a", None).unwrap();
        kv.set_add("idx", "b", None).unwrap();
        kv.set_add("idx", "a", None).unwrap();
        assert_eq!(kv.set_members("idx").unwrap(), vec!["a", "b"]);
        assert!(matches!(kv.get("idx"), Err(KvError::WrongType { .. })));

        kv.set("a", "1", None).unwrap();
        let removed = kv
            .del(&["a".to_string(), "idx".to_string(), "nope".to_string()])
            .unwrap();
        assert_eq!(removed, 2);
        assert!(kv.is_empty().unwrap());
        assert!(kv.set_members("idx").unwrap().is_empty());
    }
}

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;
use tq_core::ManualClock;
use tq_storage::{KvStore, MemoryKv, RedisKv, RedisKvConfig};

fn unique_prefix(test_name: &str) -> String {
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("tqtest_{test_name}_{pid}_{nonce}")
}

fn sorted(mut values: Vec<String>) -> Vec<String> {
    values.sort();
    values
}

/// Behaviour every adapter must share. All keys live under `prefix`.
fn check_contract(kv: &dyn KvStore, prefix: &str) {
    let ttl = Some(Duration::from_secs(60));
    let text = format!("{prefix}:text");
    let other = format!("{prefix}:texu");
    let set = format!("{prefix}:set");
    let missing = format!("{prefix}:missing");

    kv.ping().expect("ping");
    assert_eq!(kv.get(&missing).unwrap(), None);

    kv.set(&text, "one", None).unwrap();
    kv.set(&text, "two", ttl).unwrap();
    assert_eq!(kv.get(&text).unwrap().as_deref(), Some("two"));
    kv.set(&other, "x", ttl).unwrap();

    assert!(kv.expire(&text, Duration::from_secs(120)).unwrap());
    assert!(!kv.expire(&missing, Duration::from_secs(120)).unwrap());

    kv.set_add(&set, "b", ttl).unwrap();
    kv.set_add(&set, "a", ttl).unwrap();
    kv.set_add(&set, "a", ttl).unwrap();
    assert_eq!(sorted(kv.set_members(&set).unwrap()), vec!["a", "b"]);
    assert!(kv.set_members(&missing).unwrap().is_empty());
    assert!(kv.set_members(&text).is_err());

    assert_eq!(
        sorted(kv.keys(&format!("{prefix}:*")).unwrap()),
        vec![set.clone(), text.clone(), other.clone()]
    );
    assert_eq!(
        sorted(kv.keys(&format!("{prefix}:tex?")).unwrap()),
        vec![text.clone(), other.clone()]
    );

    let removed = kv
        .del(&[text.clone(), set.clone(), missing.clone()])
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(kv.get(&text).unwrap(), None);
    assert_eq!(kv.del(&[other]).unwrap(), 1);
    assert!(kv.keys(&format!("{prefix}:*")).unwrap().is_empty());
}

#[test]
fn memory_kv_honours_the_contract() {
    let kv = MemoryKv::new(Arc::new(ManualClock::new(0)));
    check_contract(&kv, &unique_prefix("memory"));
}

#[test]
#[ignore = "requires TQ_TEST_REDIS_URL and a reachable Redis"]
fn redis_kv_honours_the_contract() {
    let url = match std::env::var("TQ_TEST_REDIS_URL") {
        Ok(v) => v,
        Err(_) => {
            eprintln!("skipping redis_kv_honours_the_contract: TQ_TEST_REDIS_URL not set");
            return;
        }
    };
    let kv = RedisKv::open(RedisKvConfig {
        url,
        ..RedisKvConfig::default()
    })
    .expect("open redis");
    if kv.ping().is_err() {
        eprintln!("skipping redis_kv_honours_the_contract: redis not reachable");
        return;
    }
    check_contract(&kv, &unique_prefix("redis"));
}

#[test]
#[ignore = "requires TQ_TEST_REDIS_URL and a reachable Redis"]
fn redis_ttls_are_applied() {
    let Ok(url) = std::env::var("TQ_TEST_REDIS_URL") else {
        eprintln!("skipping redis_ttls_are_applied: TQ_TEST_REDIS_URL not set");
        return;
    };
    let kv = RedisKv::open(RedisKvConfig {
        url,
        ..RedisKvConfig::default()
    })
    .expect("open redis");
    if kv.ping().is_err() {
        eprintln!("skipping redis_ttls_are_applied: redis not reachable");
        return;
    }
    let prefix = unique_prefix("redis_ttl");
    let text = format!("{prefix}:text");
    let set = format!("{prefix}:set");
    kv.set(&text, "v", Some(Duration::from_millis(50))).unwrap();
    kv.set_add(&set, "m", Some(Duration::from_millis(50))).unwrap();
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(kv.get(&text).unwrap(), None);
    assert!(kv.set_members(&set).unwrap().is_empty());
}

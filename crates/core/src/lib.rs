#![forbid(unsafe_code)]

pub mod clock;
pub mod ids;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ids::WorkspaceId;

pub mod kind {
    /// Which input produced a memoized result.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub enum QueryKind {
        Query,
        Natural,
    }

    impl QueryKind {
        pub fn as_str(self) -> &'static str {
            match self {
                QueryKind::Query => "query",
                QueryKind::Natural => "natural",
            }
        }
    }
}

pub mod keys {
    //! Key namespace shared by every component that touches the key-value store.

    use crate::ids::WorkspaceId;
    use crate::kind::QueryKind;

    pub const SESSION_PREFIX: &str = "session:";
    pub const SESSION_PATTERN: &str = "session:*";

    pub fn session_key(id: &WorkspaceId) -> String {
        format!("{SESSION_PREFIX}{}", id.as_str())
    }

    pub fn schema_key(id: &WorkspaceId) -> String {
        format!("schema:{}", id.as_str())
    }

    /// Registry of every result key written for a workspace; invalidation walks this set
    /// instead of scanning the keyspace.
    pub fn index_key(id: &WorkspaceId) -> String {
        format!("index:{}", id.as_str())
    }

    pub fn result_key(kind: QueryKind, id: &WorkspaceId, fingerprint: &str) -> String {
        format!("cache:{}:{}:{fingerprint}", kind.as_str(), id.as_str())
    }

    /// Inverse of [`session_key`]; `None` for foreign keys.
    pub fn id_from_session_key(key: &str) -> Option<&str> {
        key.strip_prefix(SESSION_PREFIX).filter(|rest| !rest.is_empty())
    }
}

pub mod fingerprint {
    use sha2::{Digest as _, Sha256};

    /// Lowercase hex SHA-256 over the exact input bytes. Textually different but equivalent
    /// queries get different fingerprints.
    pub fn fingerprint(text: &str) -> String {
        let digest = Sha256::digest(text.as_bytes());
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::fingerprint::fingerprint;
    use super::keys::*;
    use super::kind::QueryKind;
    use super::WorkspaceId;

    #[test]
    fn key_namespaces() {
        let id = WorkspaceId::try_new("ws1").unwrap();
        assert_eq!(session_key(&id), "session:ws1");
        assert_eq!(schema_key(&id), "schema:ws1");
        assert_eq!(index_key(&id), "index:ws1");
        assert_eq!(
            result_key(QueryKind::Natural, &id, "ab12"),
            "cache:natural:ws1:ab12"
        );
        assert_eq!(id_from_session_key("session:ws1"), Some("ws1"));
        assert_eq!(id_from_session_key("session:"), None);
        assert_eq!(id_from_session_key("schema:ws1"), None);
    }

    #[test]
    fn fingerprint_is_stable_and_order_sensitive() {
        let a = fingerprint("SELECT a, b FROM t");
        assert_eq!(a, fingerprint("SELECT a, b FROM t"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, fingerprint("SELECT b, a FROM t"));
        assert_ne!(a, fingerprint("SELECT a, b FROM t "));
        assert_eq!(
            fingerprint(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}

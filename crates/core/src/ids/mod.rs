#![forbid(unsafe_code)]

use rand::RngCore;
use rand::rngs::OsRng;

const ID_BYTES: usize = 16;
const MAX_ID_LEN: usize = 64;
pub const TABLE_PREFIX: &str = "data_";

/// Opaque workspace token. Restricted to `[A-Za-z0-9_]` so the derived table name is always a
/// plain SQL identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, WorkspaceIdError> {
        let value = value.into();
        validate_workspace_id(&value)?;
        Ok(Self(value))
    }

    /// Draws a fresh id from the OS random source. There is no degraded fallback: if the source
    /// fails, creation fails.
    pub fn generate() -> Result<Self, IdGenerationError> {
        let mut bytes = [0u8; ID_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|err| IdGenerationError(err.to_string()))?;
        Ok(Self(hex_lower(&bytes)))
    }

    pub fn table_name(&self) -> String {
        format!("{TABLE_PREFIX}{}", self.0)
    }
}

impl std::fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkspaceIdError {
    Empty,
    TooLong,
    InvalidChar { ch: char, index: usize },
}

impl WorkspaceIdError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "workspace id must not be empty",
            Self::TooLong => "workspace id is too long",
            Self::InvalidChar { .. } => "workspace id contains an invalid character",
        }
    }
}

impl std::fmt::Display for WorkspaceIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidChar { ch, index } => {
                write!(f, "{} ({ch:?} at {index})", self.message())
            }
            _ => f.write_str(self.message()),
        }
    }
}

impl std::error::Error for WorkspaceIdError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdGenerationError(pub String);

impl std::fmt::Display for IdGenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "random source unavailable: {}", self.0)
    }
}

impl std::error::Error for IdGenerationError {}

fn validate_workspace_id(value: &str) -> Result<(), WorkspaceIdError> {
    if value.is_empty() {
        return Err(WorkspaceIdError::Empty);
    }
    if value.len() > MAX_ID_LEN {
        return Err(WorkspaceIdError::TooLong);
    }
    for (index, ch) in value.chars().enumerate() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            continue;
        }
        return Err(WorkspaceIdError::InvalidChar { ch, index });
    }
    Ok(())
}

fn hex_lower(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

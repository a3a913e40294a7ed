#![forbid(unsafe_code)]

#[derive(Debug)]
pub enum TranslateError {
    /// No credentials; the natural-language path is disabled.
    NotConfigured,
    /// The service could not be reached or the exchange broke off.
    Transport(String),
    /// Non-2xx reply, body kept for diagnostics.
    Status { status: u16, body: String },
    /// The reply did not have the required shape.
    Malformed(String),
}

impl TranslateError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}

impl std::fmt::Display for TranslateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "AI service not configured"),
            Self::Transport(message) => write!(f, "AI service unreachable: {message}"),
            Self::Status { status, body } => {
                write!(f, "API request failed with status {status}: {body}")
            }
            Self::Malformed(message) => write!(f, "failed to parse AI response: {message}"),
        }
    }
}

impl std::error::Error for TranslateError {}

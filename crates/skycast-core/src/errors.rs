/// Errors raised by discovery and responder calls.
/// Local faults abort an operation outright; everything else is a remote
/// condition a later poll may recover from.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ResponderError {
    // Local
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    // Remote
    #[error("{0}")]
    Rejected(String),
    #[error("HTTP error! status: {status}")]
    Status { status: u16, body: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

impl ResponderError {
    /// Faults originating on this side of the wire. Retrying cannot help.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::InvalidRequest(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::Rejected(_) => "rejected",
            Self::Status { .. } => "status",
            Self::Network(_) => "network",
            Self::Decode(_) => "decode",
        }
    }

    /// Classify a non-success HTTP status. The backend reports failures as
    /// `{"error": "..."}`; when present that message becomes the reason.
    pub fn from_status(status: u16, body: String) -> Self {
        match error_message(&body) {
            Some(message) if (400..500).contains(&status) => Self::Rejected(message),
            _ => Self::Status { status, body },
        }
    }
}

/// Extract the `error` field of a JSON error body, if any.
pub fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|e| e.as_str())
        .filter(|e| !e.is_empty())
        .map(str::to_owned)
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    #[error("target address is empty")]
    EmptyTarget,

    #[error("query location is empty")]
    EmptyPayload,

    #[error("invalid poll options: {0}")]
    InvalidOptions(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("request superseded by a newer one")]
    Superseded,

    #[error("orchestration task ended without reporting: {0}")]
    Join(String),
}

use serde::{Deserialize, Serialize};

use crate::ids::AgentAddress;

/// A weather agent returned by the discovery endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub address: AgentAddress,
    pub name: String,
    pub price: f64,
}

/// Query payload carried by a submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherQuery {
    pub location: String,
}

impl WeatherQuery {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }
}

/// Completed weather report.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeatherResult {
    pub location: String,
    pub price: f64,
    pub analysis: String,
}

/// What a single poll of the result endpoint observed.
#[derive(Clone, Debug, PartialEq)]
pub enum PollStatus {
    Pending,
    Completed(WeatherResult),
}

/// The single terminal result of one orchestrated request.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrchestrationOutcome {
    Success { result: WeatherResult },
    Failure { reason: String },
    Timeout,
}

impl OrchestrationOutcome {
    pub fn success(result: WeatherResult) -> Self {
        Self::Success { result }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Failure { .. } => "failure",
            Self::Timeout => "timeout",
        }
    }
}

pub mod errors;
pub mod ids;
pub mod models;
pub mod responder;

pub use errors::ResponderError;
pub use ids::{AgentAddress, SessionId};
pub use models::{AgentDescriptor, OrchestrationOutcome, PollStatus, WeatherQuery, WeatherResult};
pub use responder::{AgentDirectory, Responder};

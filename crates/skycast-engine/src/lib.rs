pub mod desk;
pub mod error;
pub mod orchestrator;

pub use desk::{DeskView, WeatherDesk};
pub use error::OrchestratorError;
pub use orchestrator::{
    OrchestrationHandle, PollOptions, RequestOrchestrator, SessionCanceller, SessionState,
};

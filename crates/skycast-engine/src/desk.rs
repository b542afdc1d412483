//! Weather desk: the location/agents/report state machine behind the
//! front ends, driven by two actions (search agents, get weather).

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use skycast_core::{
    AgentAddress, AgentDescriptor, AgentDirectory, OrchestrationOutcome, Responder, WeatherQuery,
    WeatherResult,
};

use crate::error::OrchestratorError;
use crate::orchestrator::{PollOptions, RequestOrchestrator, SessionCanceller};

pub const MSG_ENTER_LOCATION: &str = "Please enter a location";
pub const MSG_TIMED_OUT: &str = "Request timed out";
pub const MSG_CANCELLED: &str = "Request cancelled";

/// Snapshot of everything a front end renders.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DeskView {
    pub location: String,
    pub agents: Vec<AgentDescriptor>,
    pub weather: Option<WeatherResult>,
    pub loading: bool,
    pub error: Option<String>,
}

pub struct WeatherDesk<D: ?Sized, R: ?Sized> {
    directory: Arc<D>,
    orchestrator: RequestOrchestrator<R>,
    options: PollOptions,
    view: watch::Sender<DeskView>,
}

impl<D, R> WeatherDesk<D, R>
where
    D: AgentDirectory + ?Sized,
    R: Responder + ?Sized + 'static,
{
    pub fn new(directory: Arc<D>, responder: Arc<R>, options: PollOptions) -> Self {
        let (view, _) = watch::channel(DeskView::default());
        Self {
            directory,
            orchestrator: RequestOrchestrator::new(responder),
            options,
            view,
        }
    }

    pub fn options(&self) -> PollOptions {
        self.options
    }

    /// Receive every view change.
    pub fn subscribe(&self) -> watch::Receiver<DeskView> {
        self.view.subscribe()
    }

    pub fn view(&self) -> DeskView {
        self.view.borrow().clone()
    }

    pub fn set_location(&self, location: impl Into<String>) {
        let location = location.into();
        self.view.send_modify(|v| v.location = location);
    }

    /// Cancels the weather request in flight, if any.
    pub fn canceller(&self) -> SessionCanceller {
        self.orchestrator.canceller()
    }

    /// List the available agents for the current location.
    pub async fn search_agents(&self) -> DeskView {
        if self.view.borrow().location.trim().is_empty() {
            self.view
                .send_modify(|v| v.error = Some(MSG_ENTER_LOCATION.to_string()));
            return self.view();
        }

        self.view.send_modify(|v| {
            v.loading = true;
            v.error = None;
            v.agents.clear();
            v.weather = None;
        });

        let result = self.directory.search_agents().await;
        self.view.send_modify(|v| {
            v.loading = false;
            match result {
                Ok(agents) => {
                    info!(count = agents.len(), "agents listed");
                    v.agents = agents;
                }
                Err(e) => {
                    warn!(error = %e, kind = e.error_kind(), "agent search failed");
                    v.error = Some(format!("Failed to fetch weather agents: {e}"));
                }
            }
        });
        self.view()
    }

    /// Ask `agent` for a report on the current location and wait for it.
    pub async fn get_weather(&self, agent: &AgentAddress) -> DeskView {
        let query = WeatherQuery::new(self.view.borrow().location.trim());
        self.view.send_modify(|v| {
            v.loading = true;
            v.error = None;
            v.weather = None;
        });

        let result = self
            .orchestrator
            .submit_and_await(agent, &query, self.options)
            .await;

        // A newer request owns the view now.
        if matches!(result, Err(OrchestratorError::Superseded)) {
            return self.view();
        }

        self.view.send_modify(|v| {
            v.loading = false;
            match result {
                Ok(OrchestrationOutcome::Success { result }) => v.weather = Some(result),
                Ok(OrchestrationOutcome::Timeout) => v.error = Some(MSG_TIMED_OUT.to_string()),
                Ok(OrchestrationOutcome::Failure { reason }) => {
                    v.error = Some(format!("Failed to get weather: {reason}"));
                }
                Err(OrchestratorError::EmptyPayload) => {
                    v.error = Some(MSG_ENTER_LOCATION.to_string());
                }
                Err(OrchestratorError::Cancelled) => v.error = Some(MSG_CANCELLED.to_string()),
                Err(e) => v.error = Some(format!("Failed to get weather: {e}")),
            }
        });
        self.view()
    }
}

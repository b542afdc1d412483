use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use skycast_core::errors::error_message;
use skycast_core::{
    AgentAddress, AgentDescriptor, AgentDirectory, PollStatus, Responder, ResponderError,
    WeatherQuery, WeatherResult,
};
use skycast_settings::ApiSettings;

const SEARCH_PATH: &str = "/api/search-agents";
const SUBMIT_PATH: &str = "/api/get-weather";
const RESULT_PATH: &str = "/api/get-weather-response";

/// Client for the agent backend: discovery, submission and result polling.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    agents: Option<Vec<AgentDescriptor>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody<'a> {
    location: &'a str,
    agent_address: &'a str,
}

impl HttpBackend {
    pub fn new(settings: &ApiSettings) -> Result<Self, ResponderError> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout())
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| ResponderError::InvalidRequest(format!("HTTP client: {e}")))?;
        Ok(Self::with_client(client, &settings.base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and return the body of a 2xx response.
    async fn send(&self, req: RequestBuilder) -> Result<String, ResponderError> {
        let response = req
            .header("accept", "application/json")
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_transport)?;
        debug!(status = status.as_u16(), len = body.len(), "backend response");

        if !status.is_success() {
            return Err(ResponderError::from_status(status.as_u16(), body));
        }
        Ok(body)
    }
}

fn classify_transport(e: reqwest::Error) -> ResponderError {
    if e.is_builder() {
        ResponderError::InvalidRequest(e.to_string())
    } else {
        ResponderError::Network(e.to_string())
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, ResponderError> {
    serde_json::from_str(body).map_err(|e| ResponderError::Decode(e.to_string()))
}

/// Interpret a result-endpoint body. Anything without a non-empty
/// `analysis` is still pending.
pub fn parse_poll_body(body: &str) -> Result<PollStatus, ResponderError> {
    let value: Value = decode(body)?;
    let completed = value
        .get("analysis")
        .and_then(Value::as_str)
        .is_some_and(|a| !a.is_empty());

    if !completed {
        return Ok(PollStatus::Pending);
    }
    serde_json::from_value::<WeatherResult>(value)
        .map(PollStatus::Completed)
        .map_err(|e| ResponderError::Decode(e.to_string()))
}

#[async_trait]
impl AgentDirectory for HttpBackend {
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn search_agents(&self) -> Result<Vec<AgentDescriptor>, ResponderError> {
        let body = self.send(self.client.get(self.url(SEARCH_PATH))).await?;
        let parsed: SearchResponse = decode(&body)?;
        if let Some(error) = parsed.error.filter(|e| !e.is_empty()) {
            return Err(ResponderError::Rejected(error));
        }
        parsed
            .agents
            .ok_or_else(|| ResponderError::Decode("response has no agents list".into()))
    }
}

#[async_trait]
impl Responder for HttpBackend {
    #[instrument(skip(self, payload), fields(target = %target))]
    async fn submit(
        &self,
        target: &AgentAddress,
        payload: &WeatherQuery,
    ) -> Result<(), ResponderError> {
        let body = SubmitBody {
            location: &payload.location,
            agent_address: target.as_str(),
        };
        let body = self
            .send(self.client.post(self.url(SUBMIT_PATH)).json(&body))
            .await?;
        match error_message(&body) {
            Some(reason) => Err(ResponderError::Rejected(reason)),
            None => Ok(()),
        }
    }

    async fn poll_result(&self) -> Result<PollStatus, ResponderError> {
        let body = self.send(self.client.get(self.url(RESULT_PATH))).await?;
        parse_poll_body(&body)
    }
}

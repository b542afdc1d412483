use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use skycast_core::{
    AgentAddress, AgentDescriptor, AgentDirectory, PollStatus, Responder, ResponderError,
    WeatherQuery, WeatherResult,
};

/// Pre-programmed answers for deterministic testing without a backend.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Accepted submission, or a poll that finds nothing yet.
    Ok,
    /// Poll finds a completed result.
    Completed(WeatherResult),
    /// Call fails.
    Error(ResponderError),
    /// Wait a duration, then resolve the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn completed(location: &str, price: f64, analysis: &str) -> Self {
        Self::Completed(WeatherResult {
            location: location.to_string(),
            price,
            analysis: analysis.to_string(),
        })
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Resolve a response, sleeping through any delays.
/// Unrolls nested delays iteratively to avoid recursive async.
async fn resolve(response: MockResponse) -> Result<Option<WeatherResult>, ResponderError> {
    let mut current = response;
    loop {
        match current {
            MockResponse::Ok => return Ok(None),
            MockResponse::Completed(result) => return Ok(Some(result)),
            MockResponse::Error(e) => return Err(e),
            MockResponse::Delay(duration, inner) => {
                tokio::time::sleep(duration).await;
                current = *inner;
            }
        }
    }
}

/// Responder that answers from a script and records every call.
///
/// Polls past the end of the script repeat the last entry, or stay
/// pending when the script is empty.
pub struct MockResponder {
    submit: MockResponse,
    polls: Vec<MockResponse>,
    submissions: Mutex<Vec<(AgentAddress, WeatherQuery)>>,
    poll_times: Mutex<Vec<Instant>>,
    poll_count: AtomicUsize,
}

impl MockResponder {
    pub fn new(polls: Vec<MockResponse>) -> Self {
        Self {
            submit: MockResponse::Ok,
            polls,
            submissions: Mutex::new(Vec::new()),
            poll_times: Mutex::new(Vec::new()),
            poll_count: AtomicUsize::new(0),
        }
    }

    /// Accepts submissions and never completes.
    pub fn pending_forever() -> Self {
        Self::new(Vec::new())
    }

    /// Replace the submission answer.
    pub fn with_submit(mut self, response: MockResponse) -> Self {
        self.submit = response;
        self
    }

    pub fn submit_count(&self) -> usize {
        self.submissions.lock().len()
    }

    pub fn submissions(&self) -> Vec<(AgentAddress, WeatherQuery)> {
        self.submissions.lock().clone()
    }

    pub fn poll_count(&self) -> usize {
        self.poll_count.load(Ordering::SeqCst)
    }

    /// Instants at which each poll started.
    pub fn poll_times(&self) -> Vec<Instant> {
        self.poll_times.lock().clone()
    }

    fn next_poll(&self) -> MockResponse {
        let idx = self.poll_count.fetch_add(1, Ordering::SeqCst);
        self.poll_times.lock().push(Instant::now());
        self.polls
            .get(idx)
            .or_else(|| self.polls.last())
            .cloned()
            .unwrap_or(MockResponse::Ok)
    }
}

#[async_trait]
impl Responder for MockResponder {
    async fn submit(
        &self,
        target: &AgentAddress,
        payload: &WeatherQuery,
    ) -> Result<(), ResponderError> {
        self.submissions
            .lock()
            .push((target.clone(), payload.clone()));
        match resolve(self.submit.clone()).await? {
            None => Ok(()),
            Some(_) => Err(ResponderError::InvalidRequest(
                "MockResponder: submit scripted with a result".into(),
            )),
        }
    }

    async fn poll_result(&self) -> Result<PollStatus, ResponderError> {
        let response = self.next_poll();
        Ok(match resolve(response).await? {
            Some(result) => PollStatus::Completed(result),
            None => PollStatus::Pending,
        })
    }
}

/// Directory returning a fixed answer.
pub struct MockDirectory {
    result: Result<Vec<AgentDescriptor>, ResponderError>,
    call_count: AtomicUsize,
}

impl MockDirectory {
    pub fn new(agents: Vec<AgentDescriptor>) -> Self {
        Self {
            result: Ok(agents),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: ResponderError) -> Self {
        Self {
            result: Err(error),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentDirectory for MockDirectory {
    async fn search_agents(&self) -> Result<Vec<AgentDescriptor>, ResponderError> {
        let _ = self.call_count.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}

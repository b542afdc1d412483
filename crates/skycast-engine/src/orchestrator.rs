//! Submit-then-poll request orchestration.
//!
//! `RequestOrchestrator` drives one request at a time through
//! `Pending → Polling → Terminated`. The submission runs first; once it is
//! accepted a poll ticker and a deadline race inside a single task. Whichever
//! path first claims the session's resolved flag is the only one allowed to
//! report, so a caller sees exactly one of Success, Failure or Timeout, or an
//! error if the session was cancelled or superseded before it resolved.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use skycast_core::{
    AgentAddress, OrchestrationOutcome, PollStatus, Responder, SessionId, WeatherQuery,
};

use crate::error::OrchestratorError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Poll cadence and overall deadline for one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollOptions {
    pub poll_interval: Duration,
    /// Counted from submission acceptance.
    pub timeout: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl PollOptions {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    pub fn from_millis(poll_interval_ms: u64, timeout_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(poll_interval_ms),
            Duration::from_millis(timeout_ms),
        )
    }

    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.poll_interval.is_zero() {
            return Err(OrchestratorError::InvalidOptions(
                "poll interval must be > 0".into(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(OrchestratorError::InvalidOptions("timeout must be > 0".into()));
        }
        if self.timeout < self.poll_interval {
            return Err(OrchestratorError::InvalidOptions(format!(
                "timeout ({:?}) shorter than poll interval ({:?})",
                self.timeout, self.poll_interval
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Polling,
    Terminated,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Pending,
            1 => Self::Polling,
            _ => Self::Terminated,
        }
    }
}

const UNRESOLVED: u8 = 0;
const REPORTED: u8 = 1;
const CANCELLED: u8 = 2;
const SUPERSEDED: u8 = 3;

/// Shared state of one in-flight request.
struct RequestSession {
    id: SessionId,
    state: AtomicU8,
    /// Who claimed the session and why. Written once, by compare-exchange.
    resolution: AtomicU8,
    cancel: CancellationToken,
}

impl RequestSession {
    fn new() -> Self {
        Self {
            id: SessionId::new(),
            state: AtomicU8::new(SessionState::Pending as u8),
            resolution: AtomicU8::new(UNRESOLVED),
            cancel: CancellationToken::new(),
        }
    }

    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_polling(&self) {
        let _ = self.state.compare_exchange(
            SessionState::Pending as u8,
            SessionState::Polling as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Claim the session as `resolution`. Succeeds exactly once per session,
    /// so the winner and its reason become visible together.
    fn try_claim(&self, resolution: u8) -> bool {
        let won = self
            .resolution
            .compare_exchange(UNRESOLVED, resolution, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.state.store(SessionState::Terminated as u8, Ordering::Release);
        }
        won
    }

    /// Claim the right to report an outcome.
    fn try_resolve(&self) -> bool {
        self.try_claim(REPORTED)
    }

    /// Stop the session and suppress its outcome. False if it already resolved.
    fn abort(&self, reason: u8) -> bool {
        let won = self.try_claim(reason);
        self.cancel.cancel();
        won
    }

    fn suppressed_error(&self) -> OrchestratorError {
        match self.resolution.load(Ordering::Acquire) {
            SUPERSEDED => OrchestratorError::Superseded,
            _ => OrchestratorError::Cancelled,
        }
    }
}

type ActiveSlot = Arc<Mutex<Option<Arc<RequestSession>>>>;

/// Clears the active slot and stops the session's timers however the
/// driving future ends, including being dropped mid-flight.
struct ActiveGuard {
    slot: ActiveSlot,
    session: Arc<RequestSession>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.session.cancel.cancel();
        let mut slot = self.slot.lock();
        if slot
            .as_ref()
            .is_some_and(|active| Arc::ptr_eq(active, &self.session))
        {
            *slot = None;
        }
    }
}

/// Cancels whatever request is active on an orchestrator. Cloneable so it
/// can be handed to a signal handler.
#[derive(Clone)]
pub struct SessionCanceller {
    slot: ActiveSlot,
}

impl SessionCanceller {
    /// Returns true if an unresolved session was stopped.
    pub fn cancel(&self) -> bool {
        let active = self.slot.lock().clone();
        match active {
            Some(session) => {
                let stopped = session.abort(CANCELLED);
                if stopped {
                    info!(session_id = %session.id, "request cancelled");
                }
                stopped
            }
            None => false,
        }
    }
}

/// Handle to a request started with [`RequestOrchestrator::start`].
pub struct OrchestrationHandle {
    session: Arc<RequestSession>,
    rx: oneshot::Receiver<Result<OrchestrationOutcome, OrchestratorError>>,
}

impl OrchestrationHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session.id
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Stop the request. Its outcome, if not yet reported, is suppressed.
    pub fn cancel(&self) -> bool {
        self.session.abort(CANCELLED)
    }

    /// Wait for the single result of the request.
    pub async fn outcome(self) -> Result<OrchestrationOutcome, OrchestratorError> {
        self.rx
            .await
            .unwrap_or_else(|e| Err(OrchestratorError::Join(e.to_string())))
    }
}

/// Runs submit-then-poll requests against a [`Responder`], one at a time.
pub struct RequestOrchestrator<R: ?Sized> {
    responder: Arc<R>,
    active: ActiveSlot,
}

impl<R: Responder + ?Sized + 'static> RequestOrchestrator<R> {
    pub fn new(responder: Arc<R>) -> Self {
        Self {
            responder,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Id of the request currently in flight, if any.
    pub fn active_session(&self) -> Option<SessionId> {
        self.active.lock().as_ref().map(|s| s.id.clone())
    }

    pub fn canceller(&self) -> SessionCanceller {
        SessionCanceller {
            slot: Arc::clone(&self.active),
        }
    }

    /// Cancel the request in flight. Returns true if one was stopped.
    pub fn cancel_active(&self) -> bool {
        self.canceller().cancel()
    }

    /// Submit `payload` to `target`, poll for the result, and return the
    /// single outcome. Starting another request on this orchestrator while
    /// this one is in flight makes this call return `Superseded`.
    pub async fn submit_and_await(
        &self,
        target: &AgentAddress,
        payload: &WeatherQuery,
        options: PollOptions,
    ) -> Result<OrchestrationOutcome, OrchestratorError> {
        validate(target, payload, &options)?;
        let guard = self.begin();
        drive(&*self.responder, &guard.session, target, payload, options).await
    }

    /// Like [`submit_and_await`](Self::submit_and_await), but runs on a
    /// spawned task and reports through the returned handle.
    pub fn start(
        &self,
        target: AgentAddress,
        payload: WeatherQuery,
        options: PollOptions,
    ) -> Result<OrchestrationHandle, OrchestratorError> {
        validate(&target, &payload, &options)?;
        let guard = self.begin();
        let session = Arc::clone(&guard.session);
        let responder = Arc::clone(&self.responder);
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let result = drive(&*responder, &guard.session, &target, &payload, options).await;
            drop(guard);
            if tx.send(result).is_err() {
                debug!("outcome receiver dropped");
            }
        });

        Ok(OrchestrationHandle { session, rx })
    }

    /// Register a new session, superseding the previous one.
    fn begin(&self) -> ActiveGuard {
        let session = Arc::new(RequestSession::new());
        let previous = self.active.lock().replace(Arc::clone(&session));
        if let Some(previous) = previous {
            if previous.abort(SUPERSEDED) {
                info!(
                    session_id = %previous.id,
                    superseded_by = %session.id,
                    "request superseded"
                );
            }
        }
        ActiveGuard {
            slot: Arc::clone(&self.active),
            session,
        }
    }
}

fn validate(
    target: &AgentAddress,
    payload: &WeatherQuery,
    options: &PollOptions,
) -> Result<(), OrchestratorError> {
    if target.is_blank() {
        return Err(OrchestratorError::EmptyTarget);
    }
    if payload.location.trim().is_empty() {
        return Err(OrchestratorError::EmptyPayload);
    }
    options.validate()
}

/// Run a session to completion and apply the single-report rule.
async fn drive<R: Responder + ?Sized>(
    responder: &R,
    session: &RequestSession,
    target: &AgentAddress,
    payload: &WeatherQuery,
    options: PollOptions,
) -> Result<OrchestrationOutcome, OrchestratorError> {
    let span = info_span!("orchestrate", session_id = %session.id, target = %target);
    let started = Instant::now();
    let outcome = run_session(responder, session, target, payload, options)
        .instrument(span.clone())
        .await;

    span.in_scope(|| match outcome {
        Some(outcome) if session.try_resolve() => {
            info!(
                outcome = outcome.kind(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "request resolved"
            );
            Ok(outcome)
        }
        _ => {
            let err = session.suppressed_error();
            debug!(error = %err, "outcome suppressed");
            Err(err)
        }
    })
}

/// The state machine proper. `None` means the session was cancelled.
async fn run_session<R: Responder + ?Sized>(
    responder: &R,
    session: &RequestSession,
    target: &AgentAddress,
    payload: &WeatherQuery,
    options: PollOptions,
) -> Option<OrchestrationOutcome> {
    let submitted = tokio::select! {
        biased;
        () = session.cancel.cancelled() => return None,
        r = responder.submit(target, payload) => r,
    };
    if let Err(e) = submitted {
        warn!(error = %e, kind = e.error_kind(), "submission failed");
        return Some(OrchestrationOutcome::failure(e.to_string()));
    }

    session.set_polling();
    let accepted = Instant::now();
    let deadline = tokio::time::sleep_until(accepted + options.timeout);
    tokio::pin!(deadline);
    let mut ticker =
        tokio::time::interval_at(accepted + options.poll_interval, options.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut polls: u32 = 0;

    // The deadline is listed before the ticker: when both are due at the
    // same instant no further poll is issued.
    loop {
        tokio::select! {
            biased;
            () = session.cancel.cancelled() => return None,
            () = &mut deadline => {
                info!(polls, "deadline reached");
                return Some(OrchestrationOutcome::Timeout);
            }
            _ = ticker.tick() => {}
        }

        polls += 1;
        let polled = tokio::select! {
            biased;
            () = session.cancel.cancelled() => return None,
            () = &mut deadline => {
                info!(polls, "deadline reached during poll");
                return Some(OrchestrationOutcome::Timeout);
            }
            r = responder.poll_result() => r,
        };

        match polled {
            Ok(PollStatus::Completed(result)) => {
                debug!(polls, "result available");
                return Some(OrchestrationOutcome::success(result));
            }
            Ok(PollStatus::Pending) => debug!(polls, "result pending"),
            Err(e) if e.is_local() => {
                warn!(polls, error = %e, "poll could not be issued");
                return Some(OrchestrationOutcome::failure(e.to_string()));
            }
            Err(e) => warn!(polls, error = %e, kind = e.error_kind(), "poll failed, retrying"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use skycast_client::{MockResponder, MockResponse};
    use skycast_core::{ResponderError, WeatherResult};

    fn target() -> AgentAddress {
        AgentAddress::from_raw("agent1qweather")
    }

    fn query() -> WeatherQuery {
        WeatherQuery::new("Paris")
    }

    fn paris() -> WeatherResult {
        WeatherResult {
            location: "Paris".into(),
            price: 5.0,
            analysis: "Sunny".into(),
        }
    }

    fn orchestrator(mock: &Arc<MockResponder>) -> RequestOrchestrator<MockResponder> {
        RequestOrchestrator::new(Arc::clone(mock))
    }

    fn secs(n: u64) -> PollOptions {
        PollOptions::from_millis(1_000, n * 1_000)
    }

    // ── options ─────────────────────────────────────────────────────

    #[test]
    fn default_options() {
        let o = PollOptions::default();
        assert_eq!(o.poll_interval, Duration::from_secs(1));
        assert_eq!(o.timeout, Duration::from_secs(30));
        assert!(o.validate().is_ok());
    }

    #[test]
    fn options_validation() {
        assert!(PollOptions::from_millis(0, 1_000).validate().is_err());
        assert!(PollOptions::from_millis(1_000, 0).validate().is_err());
        assert!(PollOptions::from_millis(2_000, 1_000).validate().is_err());
        assert!(PollOptions::from_millis(1_000, 1_000).validate().is_ok());
    }

    #[tokio::test]
    async fn blank_target_rejected_before_any_call() {
        let mock = Arc::new(MockResponder::pending_forever());
        let result = orchestrator(&mock)
            .submit_and_await(&AgentAddress::from_raw(" "), &query(), secs(3))
            .await;
        assert_eq!(result, Err(OrchestratorError::EmptyTarget));
        assert_eq!(mock.submit_count(), 0);
    }

    #[tokio::test]
    async fn blank_location_rejected() {
        let mock = Arc::new(MockResponder::pending_forever());
        let result = orchestrator(&mock)
            .submit_and_await(&target(), &WeatherQuery::new(""), secs(3))
            .await;
        assert_eq!(result, Err(OrchestratorError::EmptyPayload));
        assert_eq!(mock.submit_count(), 0);
    }

    #[tokio::test]
    async fn invalid_options_rejected() {
        let mock = Arc::new(MockResponder::pending_forever());
        let result = orchestrator(&mock)
            .submit_and_await(&target(), &query(), PollOptions::from_millis(5_000, 1_000))
            .await;
        assert_matches!(result, Err(OrchestratorError::InvalidOptions(_)));
    }

    // ── outcomes ────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn success_on_fifth_poll() {
        let mock = Arc::new(MockResponder::new(vec![
            MockResponse::Ok,
            MockResponse::Ok,
            MockResponse::Ok,
            MockResponse::Ok,
            MockResponse::completed("Paris", 5.0, "Sunny"),
        ]));
        let start = Instant::now();
        let outcome = orchestrator(&mock)
            .submit_and_await(&target(), &query(), secs(30))
            .await
            .unwrap();

        assert_eq!(outcome, OrchestrationOutcome::success(paris()));
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert_eq!(mock.poll_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn no_poll_after_success() {
        let mock = Arc::new(MockResponder::new(vec![
            MockResponse::Ok,
            MockResponse::completed("Paris", 5.0, "Sunny"),
            MockResponse::Ok,
        ]));
        let orch = orchestrator(&mock);
        let outcome = orch
            .submit_and_await(&target(), &query(), secs(30))
            .await
            .unwrap();
        assert!(outcome.is_success());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(mock.poll_count(), 2);
        assert!(orch.active_session().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn always_pending_times_out_at_deadline() {
        let mock = Arc::new(MockResponder::pending_forever());
        let start = Instant::now();
        let outcome = orchestrator(&mock)
            .submit_and_await(&target(), &query(), secs(3))
            .await
            .unwrap();

        assert_eq!(outcome, OrchestrationOutcome::Timeout);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        let polls = mock.poll_count();
        assert!((2..=3).contains(&polls), "polls = {polls}");

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(mock.poll_count(), polls, "polled after the deadline");
    }

    #[tokio::test(start_paused = true)]
    async fn polls_never_start_at_or_after_deadline() {
        let mock = Arc::new(MockResponder::pending_forever());
        let start = Instant::now();
        let _ = orchestrator(&mock)
            .submit_and_await(&target(), &query(), secs(3))
            .await
            .unwrap();
        for t in mock.poll_times() {
            assert!(t - start < Duration::from_secs(3));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn submission_failure_never_polls() {
        let mock = Arc::new(
            MockResponder::pending_forever()
                .with_submit(MockResponse::Error(ResponderError::Status {
                    status: 500,
                    body: String::new(),
                })),
        );
        let outcome = orchestrator(&mock)
            .submit_and_await(&target(), &query(), secs(30))
            .await
            .unwrap();

        assert_eq!(outcome, OrchestrationOutcome::failure("HTTP error! status: 500"));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(mock.poll_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_poll_failure_does_not_abort() {
        let mock = Arc::new(MockResponder::new(vec![
            MockResponse::Ok,
            MockResponse::Error(ResponderError::Network("connection reset".into())),
            MockResponse::Error(ResponderError::Status {
                status: 502,
                body: String::new(),
            }),
            MockResponse::completed("Paris", 5.0, "Sunny"),
        ]));
        let outcome = orchestrator(&mock)
            .submit_and_await(&target(), &query(), secs(30))
            .await
            .unwrap();
        assert_eq!(outcome, OrchestrationOutcome::success(paris()));
        assert_eq!(mock.poll_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_poll_failure_ends_in_timeout() {
        let mock = Arc::new(MockResponder::new(vec![MockResponse::Error(
            ResponderError::Network("refused".into()),
        )]));
        let outcome = orchestrator(&mock)
            .submit_and_await(&target(), &query(), secs(5))
            .await
            .unwrap();
        assert_eq!(outcome, OrchestrationOutcome::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn local_poll_fault_is_failure() {
        let mock = Arc::new(MockResponder::new(vec![MockResponse::Error(
            ResponderError::InvalidRequest("bad url".into()),
        )]));
        let outcome = orchestrator(&mock)
            .submit_and_await(&target(), &query(), secs(30))
            .await
            .unwrap();
        assert_matches!(outcome, OrchestrationOutcome::Failure { .. });
        assert_eq!(mock.poll_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_poll_cut_off_by_deadline() {
        let mock = Arc::new(MockResponder::new(vec![MockResponse::delayed(
            Duration::from_secs(10),
            MockResponse::completed("Paris", 5.0, "Sunny"),
        )]));
        let start = Instant::now();
        let outcome = orchestrator(&mock)
            .submit_and_await(&target(), &query(), secs(3))
            .await
            .unwrap();
        assert_eq!(outcome, OrchestrationOutcome::Timeout);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(mock.poll_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_counts_from_acceptance() {
        let mock = Arc::new(
            MockResponder::new(vec![
                MockResponse::Ok,
                MockResponse::completed("Paris", 5.0, "Sunny"),
            ])
            .with_submit(MockResponse::delayed(Duration::from_secs(2), MockResponse::Ok)),
        );
        let start = Instant::now();
        let outcome = orchestrator(&mock)
            .submit_and_await(&target(), &query(), secs(3))
            .await
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn payload_forwarded_to_responder() {
        let mock = Arc::new(MockResponder::new(vec![MockResponse::completed(
            "Oslo", 2.99, "Snow",
        )]));
        let _ = orchestrator(&mock)
            .submit_and_await(&target(), &WeatherQuery::new("Oslo"), secs(3))
            .await
            .unwrap();
        let submissions = mock.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].0, target());
        assert_eq!(submissions[0].1.location, "Oslo");
    }

    // ── handles, cancellation, supersession ─────────────────────────

    #[tokio::test(start_paused = true)]
    async fn handle_reports_outcome() {
        let mock = Arc::new(MockResponder::new(vec![
            MockResponse::Ok,
            MockResponse::completed("Paris", 5.0, "Sunny"),
        ]));
        let orch = orchestrator(&mock);
        let handle = orch.start(target(), query(), secs(30)).unwrap();
        assert!(handle.session_id().as_str().starts_with("req_"));
        assert_eq!(orch.active_session().as_ref(), Some(handle.session_id()));

        let outcome = handle.outcome().await.unwrap();
        assert_eq!(outcome, OrchestrationOutcome::success(paris()));
        assert!(orch.active_session().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn handle_state_transitions() {
        let mock = Arc::new(
            MockResponder::pending_forever()
                .with_submit(MockResponse::delayed(Duration::from_secs(1), MockResponse::Ok)),
        );
        let orch = orchestrator(&mock);
        let handle = orch.start(target(), query(), secs(10)).unwrap();
        assert_eq!(handle.state(), SessionState::Pending);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(handle.state(), SessionState::Polling);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(handle.state(), SessionState::Terminated);
        assert_eq!(handle.outcome().await.unwrap(), OrchestrationOutcome::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_polling_and_suppresses_outcome() {
        let mock = Arc::new(MockResponder::pending_forever());
        let orch = orchestrator(&mock);
        let handle = orch.start(target(), query(), secs(30)).unwrap();

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert!(handle.cancel());
        assert!(!handle.cancel(), "second cancel is a no-op");
        let polls = mock.poll_count();
        assert_eq!(polls, 2);

        assert_eq!(handle.outcome().await, Err(OrchestratorError::Cancelled));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(mock.poll_count(), polls);
        assert!(orch.active_session().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_submission_never_polls() {
        let mock = Arc::new(
            MockResponder::pending_forever()
                .with_submit(MockResponse::delayed(Duration::from_secs(5), MockResponse::Ok)),
        );
        let orch = orchestrator(&mock);
        let handle = orch.start(target(), query(), secs(30)).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(orch.cancel_active());
        assert_eq!(handle.outcome().await, Err(OrchestratorError::Cancelled));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(mock.poll_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_resolution_is_noop() {
        let mock = Arc::new(MockResponder::new(vec![MockResponse::completed(
            "Paris", 5.0, "Sunny",
        )]));
        let orch = orchestrator(&mock);
        let handle = orch.start(target(), query(), secs(30)).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(!handle.cancel());
        assert!(!orch.cancel_active());
        assert!(handle.outcome().await.unwrap().is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn new_request_supersedes_previous() {
        let mock = Arc::new(MockResponder::pending_forever());
        let orch = orchestrator(&mock);
        let first = orch.start(target(), query(), secs(30)).unwrap();
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        let second = orch.start(target(), WeatherQuery::new("Rome"), secs(3)).unwrap();
        assert_eq!(orch.active_session().as_ref(), Some(second.session_id()));

        assert_eq!(first.outcome().await, Err(OrchestratorError::Superseded));
        assert_eq!(second.outcome().await.unwrap(), OrchestrationOutcome::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_future_releases_session() {
        let mock = Arc::new(MockResponder::pending_forever());
        let orch = orchestrator(&mock);
        let result = tokio::time::timeout(
            Duration::from_millis(2_500),
            orch.submit_and_await(&target(), &query(), secs(30)),
        )
        .await;
        assert!(result.is_err());
        assert!(orch.active_session().is_none());

        let polls = mock.poll_count();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(mock.poll_count(), polls);
    }

    #[tokio::test(start_paused = true)]
    async fn canceller_from_another_task() {
        let mock = Arc::new(MockResponder::pending_forever());
        let orch = orchestrator(&mock);
        let canceller = orch.canceller();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            canceller.cancel();
        });

        let result = orch.submit_and_await(&target(), &query(), secs(30)).await;
        assert_eq!(result, Err(OrchestratorError::Cancelled));
    }

    // ── over HTTP ───────────────────────────────────────────────────

    #[tokio::test]
    async fn http_backend_retries_through_server_errors() {
        use skycast_client::HttpBackend;
        use wiremock::matchers::{body_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/get-weather"))
            .and(body_json(serde_json::json!({
                "location": "Paris",
                "agentAddress": "agent1qweather"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": "request_sent"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/get-weather-response"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/get-weather-response"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "waiting"})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/get-weather-response"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "location": "Paris",
                "price": 5,
                "analysis": "Sunny"
            })))
            .mount(&server)
            .await;

        let backend = Arc::new(HttpBackend::with_client(
            reqwest::Client::new(),
            &server.uri(),
        ));
        let outcome = RequestOrchestrator::new(backend)
            .submit_and_await(&target(), &query(), PollOptions::from_millis(20, 5_000))
            .await
            .unwrap();
        assert_eq!(outcome, OrchestrationOutcome::success(paris()));

        let polls = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/api/get-weather-response")
            .count();
        assert_eq!(polls, 3);
    }

    /// Responder whose first poll lets a newer request claim the session
    /// and then still answers with a completed result.
    struct ClaimedDuringPoll {
        session: Arc<RequestSession>,
    }

    #[async_trait]
    impl Responder for ClaimedDuringPoll {
        async fn submit(
            &self,
            _target: &AgentAddress,
            _payload: &WeatherQuery,
        ) -> Result<(), ResponderError> {
            Ok(())
        }

        async fn poll_result(&self) -> Result<PollStatus, ResponderError> {
            assert!(self.session.abort(SUPERSEDED));
            Ok(PollStatus::Completed(paris()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn claim_lost_after_outcome_reports_supersession() {
        let session = Arc::new(RequestSession::new());
        let responder = ClaimedDuringPoll {
            session: Arc::clone(&session),
        };
        let result = drive(&responder, &session, &target(), &query(), secs(30)).await;
        assert_eq!(result, Err(OrchestratorError::Superseded));
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[test]
    fn claim_records_reason_with_the_winner() {
        let session = RequestSession::new();
        assert!(session.abort(SUPERSEDED));
        assert!(!session.try_resolve());
        assert!(!session.abort(CANCELLED));
        assert_eq!(session.suppressed_error(), OrchestratorError::Superseded);

        let session = RequestSession::new();
        assert!(session.try_resolve());
        assert!(!session.abort(SUPERSEDED));
    }

    #[tokio::test(start_paused = true)]
    async fn many_runs_each_resolve_once() {
        let mock = Arc::new(MockResponder::new(vec![MockResponse::completed(
            "Paris", 5.0, "Sunny",
        )]));
        let orch = orchestrator(&mock);
        for _ in 0..10 {
            let outcome = orch.submit_and_await(&target(), &query(), secs(3)).await;
            assert!(outcome.unwrap().is_success());
        }
        assert_eq!(mock.submit_count(), 10);
    }
}

//! Scriptable adapter and gateway doubles for engine tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use callbridge_config::{EngineSettings, RetryConfig};
use callbridge_core::{
    AgentPayload, CallError, CallRequest, CallState, CancelOutcome, ProviderAdapter,
    ProviderKind, ProviderPayload, Result, SessionRef, SynthesisPayload, TelephonyGateway,
};

use crate::router::CallRouter;

/// Settings tuned for fast tests: millisecond backoff, no jitter.
pub(crate) fn test_settings() -> EngineSettings {
    EngineSettings {
        max_concurrency: 4,
        step_timeout_ms: 200,
        workflow_deadline_ms: 5_000,
        retention_secs: 900,
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            backoff_factor: 2.0,
            max_delay_ms: 4,
            jitter: false,
        },
    }
}

pub(crate) fn agent_request() -> CallRequest {
    CallRequest {
        destination_number: "+15551234567".into(),
        payload: ProviderPayload::Agent(AgentPayload {
            agent_id: "agent_1".into(),
            template_context: Default::default(),
        }),
        idempotency_key: None,
    }
}

pub(crate) fn synthesis_request() -> CallRequest {
    CallRequest {
        destination_number: "+15551234567".into(),
        payload: ProviderPayload::Synthesis(SynthesisPayload {
            text: "Your appointment is confirmed.".into(),
            voice_id: "voice_1".into(),
            settings: Default::default(),
        }),
        idempotency_key: None,
    }
}

/// Provider double. `open_session` consumes a script of outcomes; once
/// the script runs dry it succeeds with a fresh session.
pub(crate) struct StubAdapter {
    kind: ProviderKind,
    open_script: Mutex<VecDeque<Result<SessionRef>>>,
    open_delay: Mutex<Option<Duration>>,
    pub open_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    pub closed: Mutex<Vec<String>>,
}

impl StubAdapter {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            open_script: Mutex::new(VecDeque::new()),
            open_delay: Mutex::new(None),
            open_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            closed: Mutex::new(Vec::new()),
        }
    }

    pub fn script_open(&self, outcome: Result<SessionRef>) {
        self.open_script.lock().unwrap().push_back(outcome);
    }

    pub fn fail_open_times(&self, n: usize, make: impl Fn() -> CallError) {
        for _ in 0..n {
            self.script_open(Err(make()));
        }
    }

    pub fn delay_open(&self, delay: Duration) {
        *self.open_delay.lock().unwrap() = Some(delay);
    }

    pub fn session(&self, n: usize) -> SessionRef {
        match self.kind {
            ProviderKind::Agent => SessionRef::Join {
                session_id: format!("sess-{n}"),
                join_url: format!("wss://example.test/join/{n}"),
            },
            ProviderKind::Synthesis => SessionRef::Audio {
                audio_id: format!("aud-{n}"),
                playback_url: format!("https://example.test/audio/{n}"),
            },
        }
    }

    pub fn opened(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn closed_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn closed_ids(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderAdapter for StubAdapter {
    fn name(&self) -> &str {
        "stub"
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn open_session(&self, _payload: &ProviderPayload) -> Result<SessionRef> {
        let n = self.open_calls.fetch_add(1, Ordering::SeqCst) + 1;
        // Copy out before awaiting; the guard must not cross the await.
        let delay = *self.open_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.open_script.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(self.session(n)),
        }
    }

    async fn close_session(&self, session: &SessionRef) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.lock().unwrap().push(session.id().to_string());
        Ok(())
    }
}

/// Gateway double with a scripted placement outcome queue and a fixed
/// cancellation outcome.
pub(crate) struct StubGateway {
    place_script: Mutex<VecDeque<Result<String>>>,
    place_delay: Mutex<Option<Duration>>,
    cancel_outcome: Mutex<CancelOutcome>,
    pub place_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
    pub canceled: Mutex<Vec<String>>,
}

impl StubGateway {
    pub fn new() -> Self {
        Self {
            place_script: Mutex::new(VecDeque::new()),
            place_delay: Mutex::new(None),
            cancel_outcome: Mutex::new(CancelOutcome::Canceled),
            place_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            canceled: Mutex::new(Vec::new()),
        }
    }

    pub fn script_place(&self, outcome: Result<String>) {
        self.place_script.lock().unwrap().push_back(outcome);
    }

    pub fn fail_place_times(&self, n: usize, make: impl Fn() -> CallError) {
        for _ in 0..n {
            self.script_place(Err(make()));
        }
    }

    pub fn delay_place(&self, delay: Duration) {
        *self.place_delay.lock().unwrap() = Some(delay);
    }

    pub fn cancel_returns(&self, outcome: CancelOutcome) {
        *self.cancel_outcome.lock().unwrap() = outcome;
    }

    pub fn placed(&self) -> usize {
        self.place_calls.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn canceled_refs(&self) -> Vec<String> {
        self.canceled.lock().unwrap().clone()
    }
}

#[async_trait]
impl TelephonyGateway for StubGateway {
    fn name(&self) -> &str {
        "stub-gateway"
    }

    async fn place_call(&self, _destination: &str, _session: &SessionRef) -> Result<String> {
        let n = self.place_calls.fetch_add(1, Ordering::SeqCst) + 1;
        // Copy out before awaiting; the guard must not cross the await.
        let delay = *self.place_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.place_script.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(format!("CA{n:04}")),
        }
    }

    async fn cancel_call(&self, telephony_ref: &str) -> Result<CancelOutcome> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.canceled.lock().unwrap().push(telephony_ref.to_string());
        Ok(*self.cancel_outcome.lock().unwrap())
    }
}

/// One router wired to fresh doubles, with the doubles kept reachable
/// for scripting and assertions.
pub(crate) struct Harness {
    pub agent: std::sync::Arc<StubAdapter>,
    pub synthesis: std::sync::Arc<StubAdapter>,
    pub gateway: std::sync::Arc<StubGateway>,
    pub router: CallRouter,
}

pub(crate) fn harness_with(settings: EngineSettings) -> Harness {
    use std::sync::Arc;
    let agent = Arc::new(StubAdapter::new(ProviderKind::Agent));
    let synthesis = Arc::new(StubAdapter::new(ProviderKind::Synthesis));
    let gateway = Arc::new(StubGateway::new());
    let router = CallRouter::new(
        agent.clone(),
        synthesis.clone(),
        gateway.clone(),
        &settings,
    );
    Harness {
        agent,
        synthesis,
        gateway,
        router,
    }
}

pub(crate) fn harness() -> Harness {
    harness_with(test_settings())
}

/// Poll until the call leaves its non-terminal states, or panic after
/// two seconds.
pub(crate) async fn wait_terminal(router: &CallRouter, call_id: &str) -> CallState {
    for _ in 0..400 {
        let state = router.get_status(call_id).unwrap();
        if state.status.is_terminal() {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("call {call_id} never reached a terminal state");
}

/// Poll until the call reports the given status.
pub(crate) async fn wait_status(
    router: &CallRouter,
    call_id: &str,
    status: callbridge_core::CallStatus,
) -> CallState {
    for _ in 0..400 {
        let state = router.get_status(call_id).unwrap();
        if state.status == status {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("call {call_id} never reached {status}");
}

mod tests {
    use super::*;

    fn assert_send<T: Send>(_: T) {}

    // The orchestrator runs these doubles inside spawned tasks, so
    // their futures must stay Send even with a delay configured (no
    // lock guard may be held across the sleep).
    #[test]
    fn stub_futures_are_send() {
        let adapter = StubAdapter::new(ProviderKind::Agent);
        adapter.delay_open(Duration::from_millis(1));
        let request = agent_request();
        assert_send(adapter.open_session(&request.payload));
        assert_send(adapter.close_session(&adapter.session(1)));

        let gateway = StubGateway::new();
        gateway.delay_place(Duration::from_millis(1));
        let session = adapter.session(1);
        assert_send(gateway.place_call("+15551234567", &session));
        assert_send(gateway.cancel_call("CA0001"));
    }
}

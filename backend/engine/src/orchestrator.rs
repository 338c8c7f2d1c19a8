//! The per-call state machine.
//!
//! One `run` invocation drives a single accepted request from
//! `initiated` through session creation and telephony placement,
//! retrying transient failures, compensating on partial failure, and
//! honoring cooperative cancellation. Telephony progress after
//! placement arrives through `apply_status_update`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use callbridge_config::EngineSettings;
use callbridge_core::{
    CallError, CallRequest, CallStatus, CancelOutcome, LegStatus, ProviderAdapter,
    ProviderKind, ProviderPayload, Result, SessionRef, StatusUpdate, TelephonyGateway,
};

use crate::registry::CallRegistry;
use crate::retry::{RetryDecision, RetryPolicy};

pub struct CallOrchestrator {
    registry: Arc<CallRegistry>,
    agent_adapter: Arc<dyn ProviderAdapter>,
    synthesis_adapter: Arc<dyn ProviderAdapter>,
    gateway: Arc<dyn TelephonyGateway>,
    retry: RetryPolicy,
    /// Gate in front of provider work; workflows beyond the limit queue
    /// here rather than fail.
    limiter: Semaphore,
    step_timeout: Duration,
    workflow_deadline: Duration,
}

/// What a status update did to the call.
enum Applied {
    Stale,
    PreTelephony,
    AfterTerminal,
    Progress,
    Transitioned,
}

/// How to act on a cancellation request.
enum CancelAction {
    Reject(CallStatus),
    Flagged,
    CancelLeg(String),
}

impl CallOrchestrator {
    pub fn new(
        registry: Arc<CallRegistry>,
        agent_adapter: Arc<dyn ProviderAdapter>,
        synthesis_adapter: Arc<dyn ProviderAdapter>,
        gateway: Arc<dyn TelephonyGateway>,
        settings: &EngineSettings,
    ) -> Self {
        Self {
            registry,
            agent_adapter,
            synthesis_adapter,
            gateway,
            retry: RetryPolicy::from(&settings.retry),
            limiter: Semaphore::new(settings.max_concurrency.max(1)),
            step_timeout: Duration::from_millis(settings.step_timeout_ms),
            workflow_deadline: Duration::from_millis(settings.workflow_deadline_ms),
        }
    }

    fn adapter_for(&self, kind: ProviderKind) -> &Arc<dyn ProviderAdapter> {
        match kind {
            ProviderKind::Agent => &self.agent_adapter,
            ProviderKind::Synthesis => &self.synthesis_adapter,
        }
    }

    /// Drive one call to telephony placement (or a terminal failure).
    /// Bounded by the workflow deadline; on expiry the call is failed
    /// with a timeout classification and any opened session is closed.
    pub async fn run(&self, call_id: &str, request: &CallRequest) {
        match timeout(self.workflow_deadline, self.establish(call_id, request)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(call_id = %call_id, error = %err, "workflow aborted");
            }
            Err(_) => self.expire(call_id).await,
        }
    }

    async fn establish(&self, call_id: &str, request: &CallRequest) -> Result<()> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| CallError::Internal("concurrency limiter closed".into()))?;

        if self.finish_if_cancel_requested(call_id).await? {
            return Ok(());
        }

        let adapter = self.adapter_for(request.payload.provider());
        let session = match self
            .open_session_with_retry(adapter.as_ref(), &request.payload, call_id)
            .await
        {
            Ok(session) => session,
            Err(err) => {
                self.fail(call_id, CallStatus::SessionFailed, err).await?;
                return Ok(());
            }
        };
        self.registry
            .mutate(call_id, |s| {
                s.session_ref = Some(session.clone());
                if !s.status.is_terminal() {
                    s.transition(CallStatus::SessionCreated);
                }
            })
            .await?;
        info!(call_id = %call_id, session = %session.id(), "session created");

        if self.finish_if_cancel_requested(call_id).await? {
            return Ok(());
        }

        match self
            .place_call_with_retry(&request.destination_number, &session, call_id)
            .await
        {
            Ok(telephony_ref) => {
                let (state, _) = self
                    .registry
                    .mutate(call_id, |s| {
                        s.telephony_ref = Some(telephony_ref.clone());
                        if !s.status.is_terminal() {
                            s.transition(CallStatus::TelephonyRequested);
                        }
                    })
                    .await?;
                info!(call_id = %call_id, telephony_ref = %telephony_ref, "telephony requested");
                // A cancel may have been flagged while placement was in
                // flight; act on it now that the leg exists.
                if state.cancel_requested && !state.status.is_terminal() {
                    self.cancel_leg(call_id, &telephony_ref).await?;
                }
            }
            Err(err) => {
                self.fail(call_id, CallStatus::TelephonyFailed, err).await?;
                self.close_session_once(call_id).await?;
            }
        }
        Ok(())
    }

    async fn open_session_with_retry(
        &self,
        adapter: &dyn ProviderAdapter,
        payload: &ProviderPayload,
        call_id: &str,
    ) -> Result<SessionRef> {
        let mut attempts = 1u32;
        loop {
            let outcome = timeout(self.step_timeout, adapter.open_session(payload)).await;
            let err = match outcome {
                Ok(Ok(session)) => return Ok(session),
                Ok(Err(err)) => err,
                Err(_) => CallError::ProviderUnavailable(format!(
                    "{}: open_session exceeded {}ms",
                    adapter.name(),
                    self.step_timeout.as_millis()
                )),
            };
            match self.retry.decide(&err, attempts) {
                RetryDecision::Retry { delay } => {
                    warn!(
                        call_id = %call_id,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "open_session failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempts += 1;
                }
                RetryDecision::GiveUp => return Err(err),
            }
        }
    }

    async fn place_call_with_retry(
        &self,
        destination: &str,
        session: &SessionRef,
        call_id: &str,
    ) -> Result<String> {
        let mut attempts = 1u32;
        loop {
            let outcome = timeout(self.step_timeout, self.gateway.place_call(destination, session)).await;
            let err = match outcome {
                Ok(Ok(telephony_ref)) => return Ok(telephony_ref),
                Ok(Err(err)) => err,
                Err(_) => CallError::ProviderUnavailable(format!(
                    "{}: place_call exceeded {}ms",
                    self.gateway.name(),
                    self.step_timeout.as_millis()
                )),
            };
            match self.retry.decide(&err, attempts) {
                RetryDecision::Retry { delay } => {
                    warn!(
                        call_id = %call_id,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "place_call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempts += 1;
                }
                RetryDecision::GiveUp => return Err(err),
            }
        }
    }

    /// Record a classified failure and move to the given terminal state.
    /// Calls already terminal (e.g. canceled concurrently) are left be.
    async fn fail(&self, call_id: &str, status: CallStatus, err: CallError) -> Result<()> {
        let failure = err.to_failure();
        let (state, _) = self
            .registry
            .mutate(call_id, |s| {
                if !s.status.is_terminal() {
                    s.failure = Some(failure);
                    s.transition(status);
                }
            })
            .await?;
        warn!(call_id = %call_id, status = %state.status, error = %err, "call failed");
        Ok(())
    }

    /// Workflow deadline elapsed mid-establishment.
    async fn expire(&self, call_id: &str) {
        let timed_out = CallError::Timeout(format!(
            "workflow exceeded {}ms deadline",
            self.workflow_deadline.as_millis()
        ));
        let failure = timed_out.to_failure();
        let result = self
            .registry
            .mutate(call_id, |s| {
                // Placement already succeeded (or the call is terminal):
                // nothing to expire.
                if s.status.is_terminal()
                    || matches!(s.status, CallStatus::TelephonyRequested | CallStatus::Connected)
                {
                    return false;
                }
                let status = if s.session_ref.is_some() {
                    CallStatus::TelephonyFailed
                } else {
                    CallStatus::SessionFailed
                };
                s.failure = Some(failure.clone());
                s.transition(status);
                true
            })
            .await;
        match result {
            Ok((state, true)) => {
                warn!(call_id = %call_id, status = %state.status, "workflow deadline exceeded");
                if let Err(err) = self.close_session_once(call_id).await {
                    error!(call_id = %call_id, error = %err, "compensation after deadline failed");
                }
            }
            Ok((_, false)) => {}
            Err(err) => error!(call_id = %call_id, error = %err, "expiry bookkeeping failed"),
        }
    }

    /// If a cancellation was flagged, finish the call as `canceled`
    /// (closing any session) and report true.
    async fn finish_if_cancel_requested(&self, call_id: &str) -> Result<bool> {
        let (_, canceled) = self
            .registry
            .mutate(call_id, |s| {
                if s.cancel_requested && !s.status.is_terminal() {
                    s.transition(CallStatus::Canceled);
                    true
                } else {
                    false
                }
            })
            .await?;
        if canceled {
            info!(call_id = %call_id, "call canceled before placement");
            self.close_session_once(call_id).await?;
        }
        Ok(canceled)
    }

    /// Close the provider session exactly once. The claim happens under
    /// the registry lock; whichever path claims it performs the close,
    /// every other path sees `session_closed` and does nothing.
    async fn close_session_once(&self, call_id: &str) -> Result<()> {
        let (state, claimed) = self
            .registry
            .mutate(call_id, |s| match (&s.session_ref, s.session_closed) {
                (Some(session), false) => {
                    s.session_closed = true;
                    Some(session.clone())
                }
                _ => None,
            })
            .await?;
        let Some(session) = claimed else {
            return Ok(());
        };
        let adapter = self.adapter_for(state.provider);
        let outcome = timeout(self.step_timeout, adapter.close_session(&session))
            .await
            .unwrap_or_else(|_| {
                Err(CallError::ProviderUnavailable(format!(
                    "{}: close_session exceeded {}ms",
                    adapter.name(),
                    self.step_timeout.as_millis()
                )))
            });
        if let Err(err) = outcome {
            // Best-effort: record alongside, never over, the primary
            // failure.
            warn!(call_id = %call_id, session = %session.id(), error = %err, "session close failed");
            let _ = self
                .registry
                .mutate(call_id, |s| {
                    s.compensation_failure = Some(err.to_string());
                })
                .await;
        } else {
            debug!(call_id = %call_id, session = %session.id(), "session closed");
        }
        Ok(())
    }

    /// Apply one telephony status report. Updates are ordered by the
    /// collaborator-assigned sequence number; late or repeated
    /// deliveries are discarded, and nothing moves a terminal call.
    pub async fn apply_status_update(&self, call_id: &str, update: StatusUpdate) -> Result<()> {
        let (state, applied) = self
            .registry
            .mutate(call_id, |s| {
                if update.seq <= s.last_seq {
                    return Applied::Stale;
                }
                if s.status.is_terminal() {
                    s.last_seq = update.seq;
                    return Applied::AfterTerminal;
                }
                if !matches!(
                    s.status,
                    CallStatus::TelephonyRequested | CallStatus::Connected
                ) {
                    // No leg has been placed for this call yet.
                    return Applied::PreTelephony;
                }
                s.last_seq = update.seq;
                match update.status {
                    LegStatus::Queued | LegStatus::Ringing => Applied::Progress,
                    LegStatus::InProgress => {
                        s.transition(CallStatus::Connected);
                        Applied::Transitioned
                    }
                    LegStatus::Completed => {
                        s.transition(CallStatus::Completed);
                        Applied::Transitioned
                    }
                    LegStatus::Canceled => {
                        s.transition(CallStatus::Canceled);
                        Applied::Transitioned
                    }
                    LegStatus::Busy | LegStatus::NoAnswer | LegStatus::Failed => {
                        s.failure = Some(
                            CallError::Telephony(format!(
                                "leg ended without connecting: {:?}",
                                update.status
                            ))
                            .to_failure(),
                        );
                        s.transition(CallStatus::TelephonyFailed);
                        Applied::Transitioned
                    }
                }
            })
            .await?;
        match applied {
            Applied::Stale => {
                debug!(call_id = %call_id, seq = update.seq, "stale status update discarded");
            }
            Applied::AfterTerminal => {
                debug!(call_id = %call_id, seq = update.seq, "status update after terminal state discarded");
            }
            Applied::PreTelephony => {
                warn!(call_id = %call_id, seq = update.seq, "status update before telephony placement discarded");
            }
            Applied::Progress => {
                debug!(call_id = %call_id, seq = update.seq, status = ?update.status, "leg progress");
            }
            Applied::Transitioned => {
                info!(call_id = %call_id, seq = update.seq, status = %state.status, "status update applied");
                if state.status.is_terminal() {
                    self.close_session_once(call_id).await?;
                }
            }
        }
        Ok(())
    }

    /// Caller-initiated cancellation. Accepted from `initiated`,
    /// `session_created`, and `telephony_requested`; rejected once the
    /// call is connected or terminal. Best-effort: a leg that is
    /// already answered stays up.
    pub async fn cancel(&self, call_id: &str) -> Result<()> {
        let (_, action) = self
            .registry
            .mutate(call_id, |s| match s.status {
                CallStatus::Initiated | CallStatus::SessionCreated => {
                    s.cancel_requested = true;
                    CancelAction::Flagged
                }
                CallStatus::TelephonyRequested => {
                    s.cancel_requested = true;
                    match &s.telephony_ref {
                        Some(telephony_ref) => CancelAction::CancelLeg(telephony_ref.clone()),
                        None => CancelAction::Flagged,
                    }
                }
                status => CancelAction::Reject(status),
            })
            .await?;
        match action {
            CancelAction::Reject(status) => Err(CallError::InvalidState(format!(
                "cannot cancel a call in state '{status}'"
            ))),
            CancelAction::Flagged => {
                info!(call_id = %call_id, "cancellation flagged");
                Ok(())
            }
            CancelAction::CancelLeg(telephony_ref) => self.cancel_leg(call_id, &telephony_ref).await,
        }
    }

    async fn cancel_leg(&self, call_id: &str, telephony_ref: &str) -> Result<()> {
        match timeout(self.step_timeout, self.gateway.cancel_call(telephony_ref)).await {
            Ok(Ok(CancelOutcome::Canceled)) => {
                let (_, transitioned) = self
                    .registry
                    .mutate(call_id, |s| {
                        // A terminal report may have raced in; it wins.
                        if !s.status.is_terminal() {
                            s.transition(CallStatus::Canceled);
                            true
                        } else {
                            false
                        }
                    })
                    .await?;
                if transitioned {
                    info!(call_id = %call_id, telephony_ref = %telephony_ref, "call canceled");
                    self.close_session_once(call_id).await?;
                }
                Ok(())
            }
            Ok(Ok(CancelOutcome::AlreadyConnected)) => {
                info!(call_id = %call_id, "cancellation rejected: leg already connected");
                Ok(())
            }
            Ok(Err(err)) => {
                warn!(call_id = %call_id, error = %err, "leg cancellation failed");
                Ok(())
            }
            Err(_) => {
                warn!(call_id = %call_id, "leg cancellation timed out");
                Ok(())
            }
        }
    }
}

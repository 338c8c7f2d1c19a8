//! Front door of the engine: validation, duplicate collapsing, and
//! workflow spawn.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use callbridge_config::EngineSettings;
use callbridge_core::{
    new_call_id, CallError, CallHandle, CallId, CallRequest, CallState, ProviderAdapter,
    Result, StatusUpdate, TelephonyGateway,
};
use callbridge_core::validate_request;

use crate::orchestrator::CallOrchestrator;
use crate::registry::{CallRegistry, CreateOutcome};

pub struct CallRouter {
    registry: Arc<CallRegistry>,
    orchestrator: Arc<CallOrchestrator>,
    retention: Duration,
}

impl CallRouter {
    pub fn new(
        agent_adapter: Arc<dyn ProviderAdapter>,
        synthesis_adapter: Arc<dyn ProviderAdapter>,
        gateway: Arc<dyn TelephonyGateway>,
        settings: &EngineSettings,
    ) -> Self {
        let registry = Arc::new(CallRegistry::new());
        let orchestrator = Arc::new(CallOrchestrator::new(
            registry.clone(),
            agent_adapter,
            synthesis_adapter,
            gateway,
            settings,
        ));
        Self {
            registry,
            orchestrator,
            retention: Duration::from_secs(settings.retention_secs),
        }
    }

    /// Accept a call request. Validation happens before any state is
    /// created or any collaborator is contacted; an invalid request
    /// leaves no trace. Accepted requests get a registry entry and a
    /// background workflow, and the handle returns immediately.
    pub fn route_call(&self, request: CallRequest) -> Result<CallHandle> {
        validate_request(&request)?;

        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = self.registry.find_by_idempotency_key(key) {
                debug!(call_id = %existing.call_id, idempotency_key = %key, "duplicate request collapsed");
                return Ok(CallHandle {
                    call_id: existing.call_id,
                });
            }
        }

        let call_id = new_call_id();
        // Key reservation is atomic in create: a race between two
        // submissions with one key collapses here, not just in the
        // lookup above.
        if let CreateOutcome::Duplicate(existing) =
            self.registry.create(CallState::new(call_id.clone(), &request))?
        {
            debug!(call_id = %existing, "duplicate request collapsed at create");
            return Ok(CallHandle { call_id: existing });
        }
        info!(
            call_id = %call_id,
            provider = %request.payload.provider(),
            destination = %callbridge_logging::mask_destination(&request.destination_number),
            "call accepted"
        );

        let orchestrator = self.orchestrator.clone();
        let spawned_id = call_id.clone();
        tokio::spawn(async move {
            orchestrator.run(&spawned_id, &request).await;
        });

        Ok(CallHandle { call_id })
    }

    /// Current snapshot of a call. Never waits on an in-flight mutation.
    pub fn get_status(&self, call_id: &str) -> Result<CallState> {
        self.registry
            .get(call_id)
            .ok_or_else(|| CallError::NotFound(call_id.to_string()))
    }

    /// Request cancellation of a call that has not connected yet.
    pub async fn cancel(&self, call_id: &str) -> Result<()> {
        self.orchestrator.cancel(call_id).await
    }

    /// Feed one telephony status report into the call it belongs to.
    pub async fn apply_status_update(&self, call_id: &str, update: StatusUpdate) -> Result<()> {
        self.orchestrator.apply_status_update(call_id, update).await
    }

    /// Map a gateway-assigned leg identifier back to a call, for status
    /// channels that only carry the gateway's identifier.
    pub fn resolve_telephony_ref(&self, telephony_ref: &str) -> Option<CallId> {
        self.registry.find_by_telephony_ref(telephony_ref)
    }

    /// Drop terminal calls older than the retention window. Intended to
    /// run periodically; also ends the idempotency window for the
    /// evicted calls.
    pub fn evict_expired(&self) -> usize {
        self.registry.evict_older_than(self.retention)
    }

    pub fn registry(&self) -> &Arc<CallRegistry> {
        &self.registry
    }
}

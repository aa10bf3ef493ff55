use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::{ClerkId, CreditBalance, SubmissionId},
    error::GateError,
    protocol::{OperationOutput, SubmissionPayload, SubmissionResult},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub mod config;
pub mod request;
pub mod retry;
pub mod state;
pub mod transport;

pub use config::{load_settings, Settings};
pub use request::{
    NonEmptyPayload, PayloadValidator, RequiredAttachment, RequiredField, SubmissionRequest,
};
pub use retry::RetryPolicy;
pub use state::SubmissionPhase;

const BALANCE_UNVERIFIABLE_MESSAGE: &str = "could not verify your account; try again";
const OPERATION_FAILED_MESSAGE: &str = "operation failed; try again";

/// Fetches the remaining credit balance for an identity. Fetched fresh before
/// every submission attempt; the controller never caches it.
#[async_trait]
pub trait BalanceProvider: Send + Sync {
    async fn fetch_balance(&self, clerk_id: &ClerkId) -> Result<CreditBalance>;
}

pub struct MissingBalanceProvider;

#[async_trait]
impl BalanceProvider for MissingBalanceProvider {
    async fn fetch_balance(&self, clerk_id: &ClerkId) -> Result<CreditBalance> {
        Err(anyhow!("balance service unavailable for {clerk_id}"))
    }
}

/// Executes the gated remote operation. The payload is forwarded verbatim.
#[async_trait]
pub trait OperationService: Send + Sync {
    async fn execute(
        &self,
        clerk_id: &ClerkId,
        payload: &SubmissionPayload,
    ) -> Result<OperationOutput>;
}

pub struct MissingOperationService;

#[async_trait]
impl OperationService for MissingOperationService {
    async fn execute(
        &self,
        clerk_id: &ClerkId,
        _payload: &SubmissionPayload,
    ) -> Result<OperationOutput> {
        Err(anyhow!("operation service unavailable for {clerk_id}"))
    }
}

/// Upgrade/paywall affordance shown when a submission is blocked. The
/// controller only ever toggles it; it consumes no return value.
pub trait PaywallSurface: Send + Sync {
    fn set_open(&self, open: bool);
}

pub struct NullPaywallSurface;

impl PaywallSurface for NullPaywallSurface {
    fn set_open(&self, _open: bool) {}
}

#[derive(Debug, Clone)]
pub enum GateEvent {
    PhaseChanged(SubmissionPhase),
    BalanceFetched(CreditBalance),
    ResultReady(SubmissionId),
}

/// Per-controller knobs: collaborator timeouts and the bounded retry policy
/// for the operation call.
#[derive(Debug, Clone)]
pub struct GateOptions {
    pub balance_timeout: Duration,
    pub operation_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            balance_timeout: Duration::from_secs(config::DEFAULT_BALANCE_TIMEOUT_SECS),
            operation_timeout: Duration::from_secs(config::DEFAULT_OPERATION_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

impl GateOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            balance_timeout: settings.balance_timeout(),
            operation_timeout: settings.operation_timeout(),
            retry: settings.retry_policy(),
        }
    }
}

struct ControllerState {
    phase: SubmissionPhase,
    generation: u64,
    result: Option<SubmissionResult>,
    last_error: Option<GateError>,
}

/// Turns one user action into a single-flight sequence of
/// {validate, authorize, execute, present} with one state machine, regardless
/// of which remote operation is being gated. One instance per widget; the
/// controller exclusively owns the phase and the stored result.
pub struct SubmissionController {
    clerk_id: ClerkId,
    balance_provider: Arc<dyn BalanceProvider>,
    operation_service: Arc<dyn OperationService>,
    paywall: Arc<dyn PaywallSurface>,
    options: GateOptions,
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<GateEvent>,
}

impl SubmissionController {
    pub fn new(clerk_id: ClerkId) -> Arc<Self> {
        Self::with_collaborators(
            clerk_id,
            Arc::new(MissingBalanceProvider),
            Arc::new(MissingOperationService),
            Arc::new(NullPaywallSurface),
            GateOptions::default(),
        )
    }

    pub fn with_collaborators(
        clerk_id: ClerkId,
        balance_provider: Arc<dyn BalanceProvider>,
        operation_service: Arc<dyn OperationService>,
        paywall: Arc<dyn PaywallSurface>,
        options: GateOptions,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            clerk_id,
            balance_provider,
            operation_service,
            paywall,
            options,
            inner: Mutex::new(ControllerState {
                phase: SubmissionPhase::Idle,
                generation: 0,
                result: None,
                last_error: None,
            }),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<GateEvent> {
        self.events.subscribe()
    }

    pub async fn phase(&self) -> SubmissionPhase {
        self.inner.lock().await.phase.clone()
    }

    pub async fn result(&self) -> Option<SubmissionResult> {
        self.inner.lock().await.result.clone()
    }

    /// Classified cause of the last terminal failure, if any. Cleared when a
    /// new attempt is accepted or the input changes.
    pub async fn last_error(&self) -> Option<GateError> {
        self.inner.lock().await.last_error.clone()
    }

    /// The payload changed (new file selected, field edited) or the balance
    /// changed externally: return to `Idle`, clear any displayed result, and
    /// supersede every outstanding response.
    pub async fn reset_input(&self) {
        let mut guard = self.inner.lock().await;
        guard.generation += 1;
        guard.result = None;
        guard.last_error = None;
        debug!(
            generation = guard.generation,
            from = guard.phase.label(),
            "gate: input changed; returning to idle"
        );
        self.apply_phase(&mut guard, SubmissionPhase::Idle);
    }

    /// Closes the paywall affordance. The phase stays `Blocked`; only an
    /// input or balance change returns to `Idle`.
    pub fn dismiss_paywall(&self) {
        self.paywall.set_open(false);
    }

    /// One user-initiated attempt. The outcome is observed via `phase()`,
    /// `result()`, and the event stream; a call arriving while a submission
    /// is already in flight is ignored.
    pub async fn submit(&self, request: SubmissionRequest) {
        let my_generation = {
            let mut guard = self.inner.lock().await;
            if guard.phase.is_in_flight() {
                warn!(
                    phase = guard.phase.label(),
                    "gate: submit ignored; a submission is already in flight"
                );
                return;
            }
            // Validation must short-circuit before any network activity.
            if let Err(err) = request.validate() {
                let message = err.to_string();
                info!(%message, "gate: validation failed; no network calls issued");
                guard.last_error = Some(err);
                self.apply_phase(&mut guard, SubmissionPhase::ValidationFailed { message });
                return;
            }
            guard.generation += 1;
            guard.result = None;
            guard.last_error = None;
            self.apply_phase(&mut guard, SubmissionPhase::CheckingCredits);
            guard.generation
        };

        let submission_id = SubmissionId::generate();
        info!(
            %submission_id,
            generation = my_generation,
            clerk_id = %self.clerk_id,
            "gate: checking credit balance"
        );

        let balance = match tokio::time::timeout(
            self.options.balance_timeout,
            self.balance_provider.fetch_balance(&self.clerk_id),
        )
        .await
        {
            Ok(Ok(balance)) => balance,
            Ok(Err(err)) => {
                // Fail closed: an unverifiable balance never permits a
                // submission.
                warn!(%submission_id, "gate: balance fetch failed: {err:#}");
                self.fail_if_current(my_generation, BALANCE_UNVERIFIABLE_MESSAGE)
                    .await;
                return;
            }
            Err(_) => {
                warn!(
                    %submission_id,
                    timeout_secs = self.options.balance_timeout.as_secs(),
                    "gate: balance fetch timed out"
                );
                self.fail_if_current(my_generation, BALANCE_UNVERIFIABLE_MESSAGE)
                    .await;
                return;
            }
        };

        let _ = self.events.send(GateEvent::BalanceFetched(balance));

        if balance.is_exhausted() {
            let blocked = {
                let mut guard = self.inner.lock().await;
                if guard.generation != my_generation {
                    self.log_stale(submission_id, my_generation, guard.generation);
                    false
                } else {
                    guard.last_error = Some(GateError::AuthorizationExhausted);
                    self.apply_phase(&mut guard, SubmissionPhase::Blocked);
                    true
                }
            };
            if blocked {
                info!(
                    %submission_id,
                    balance = balance.0,
                    "gate: balance exhausted; submission blocked"
                );
                self.paywall.set_open(true);
            }
            return;
        }

        {
            let mut guard = self.inner.lock().await;
            if guard.generation != my_generation {
                self.log_stale(submission_id, my_generation, guard.generation);
                return;
            }
            self.apply_phase(&mut guard, SubmissionPhase::Submitting);
        }
        info!(
            %submission_id,
            balance = balance.0,
            "gate: balance sufficient; executing operation"
        );

        let outcome = self.execute_with_retry(submission_id, &request).await;

        let mut guard = self.inner.lock().await;
        if guard.generation != my_generation {
            self.log_stale(submission_id, my_generation, guard.generation);
            return;
        }
        match outcome {
            Ok(output) => {
                guard.result = Some(SubmissionResult {
                    submission_id,
                    output,
                    completed_at: Utc::now(),
                });
                self.apply_phase(&mut guard, SubmissionPhase::Succeeded);
                let _ = self.events.send(GateEvent::ResultReady(submission_id));
                info!(%submission_id, "gate: operation succeeded");
            }
            Err(err) => {
                // The raw cause is logged only; the surfaced message stays
                // generic and retryable.
                warn!(%submission_id, "gate: operation failed: {err:#}");
                guard.last_error = Some(GateError::Transport(OPERATION_FAILED_MESSAGE.to_string()));
                self.apply_phase(
                    &mut guard,
                    SubmissionPhase::Failed {
                        message: OPERATION_FAILED_MESSAGE.to_string(),
                    },
                );
            }
        }
    }

    /// At most `retry.max_attempts` operation calls, each under the
    /// operation timeout. The balance is never re-fetched here.
    async fn execute_with_retry(
        &self,
        submission_id: SubmissionId,
        request: &SubmissionRequest,
    ) -> Result<OperationOutput> {
        let retry = self.options.retry;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match tokio::time::timeout(
                self.options.operation_timeout,
                self.operation_service
                    .execute(&self.clerk_id, &request.payload),
            )
            .await
            {
                Ok(Ok(output)) => {
                    if output.is_empty() && retry.retry_on_empty && retry.allows_retry(attempt) {
                        info!(%submission_id, attempt, "gate: empty operation result; retrying");
                        continue;
                    }
                    return Ok(output);
                }
                Ok(Err(err)) => {
                    if retry.allows_retry(attempt) {
                        warn!(%submission_id, attempt, "gate: operation attempt failed: {err:#}");
                        continue;
                    }
                    return Err(err);
                }
                Err(_) => {
                    if retry.allows_retry(attempt) {
                        warn!(%submission_id, attempt, "gate: operation attempt timed out");
                        continue;
                    }
                    return Err(anyhow!(
                        "operation timed out after {}s",
                        self.options.operation_timeout.as_secs()
                    ));
                }
            }
        }
    }

    async fn fail_if_current(&self, my_generation: u64, message: &str) {
        let mut guard = self.inner.lock().await;
        if guard.generation != my_generation {
            debug!(
                generation = my_generation,
                current = guard.generation,
                "gate: stale failure discarded"
            );
            return;
        }
        guard.last_error = Some(GateError::Transport(message.to_string()));
        self.apply_phase(
            &mut guard,
            SubmissionPhase::Failed {
                message: message.to_string(),
            },
        );
    }

    fn apply_phase(&self, guard: &mut ControllerState, phase: SubmissionPhase) {
        guard.phase = phase.clone();
        let _ = self.events.send(GateEvent::PhaseChanged(phase));
    }

    fn log_stale(&self, submission_id: SubmissionId, generation: u64, current: u64) {
        // Discarded silently, never user-visible.
        debug!(
            %submission_id,
            current,
            error = %GateError::Stale { generation },
            "gate: stale response discarded"
        );
    }
}

//! Session Manager Service
//!
//! Owns every write to the session store. Explicit caller operations
//! (`connect`, `complete_oauth`, manual validation and refresh, `disconnect`)
//! and the health supervisor all go through here, so they share:
//!
//! - one single-flight slot per session key for validate and refresh
//! - per `(broker, operation)` rate limiting, consulted before any call
//! - a bounded timeout per broker call, classified as `NETWORK_ERROR`
//! - check-then-write against the session epoch, so a result computed
//!   before a disconnect or reconnect is dropped instead of applied

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::dto::{
    HealthStatistics, SessionHealthDto, SessionSnapshot, ValidationReport,
};
use crate::application::ports::{
    AlertSinkPort, AuthResponse, BrokerAdapter, ConnectionResult, Credentials, OAuthResult,
};
use crate::application::registry::BrokerRegistry;
use crate::domain::session::{
    AccountStatus, AlertReason, AuthenticationStep, ErrorKind, HealthChange, HealthPolicy,
    Session, SessionAlert, SessionChange, SessionError, SessionKey, SessionRepository,
    SessionStateMachine, SessionTrigger, TokenInfo, UpdateOutcome,
};
use crate::domain::shared::UserId;
use crate::observability;
use crate::resilience::{BrokerOperation, RateLimiter, RateLimiterConfig, SingleFlight};

// =============================================================================
// Configuration
// =============================================================================

/// Session manager configuration.
#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    /// Upper bound on any single broker call.
    pub operation_timeout: Duration,
    /// Health scoring and alert thresholds.
    pub health: HealthPolicy,
    /// Rate limits per broker operation.
    pub rate_limits: RateLimiterConfig,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(30),
            health: HealthPolicy::default(),
            rate_limits: RateLimiterConfig::default(),
        }
    }
}

// =============================================================================
// Cycle Types
// =============================================================================

/// Result of one validate or refresh cycle.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    /// Last broker response of the cycle (the refresh, if one ran).
    pub response: AuthResponse,
    /// A refresh call was made during the cycle.
    pub refreshed: bool,
    /// Session after the write. `None` when the result was dropped because
    /// the session changed while the call was running.
    pub session: Option<Session>,
    /// The call was rejected by the local rate limiter and never made.
    pub throttled: bool,
    /// Time spent in the cycle.
    pub elapsed: Duration,
}

type CycleResult = Result<CycleOutcome, SessionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleKind {
    Validate,
    Refresh,
}

type SharedAdapter = Arc<tokio::sync::Mutex<Box<dyn BrokerAdapter>>>;

/// Live adapter and credentials for a stored session.
#[derive(Clone)]
struct SessionHandle {
    adapter: SharedAdapter,
    credentials: Credentials,
    cancel: CancellationToken,
}

enum Call {
    Completed(AuthResponse),
    Throttled(AuthResponse),
}

impl Call {
    fn into_response(self) -> AuthResponse {
        match self {
            Self::Completed(response) | Self::Throttled(response) => response,
        }
    }
}

// =============================================================================
// Session Manager
// =============================================================================

/// Coordinates broker adapters and the session store.
pub struct SessionManager {
    registry: Arc<BrokerRegistry>,
    store: Arc<dyn SessionRepository>,
    alerts: Arc<dyn AlertSinkPort>,
    rate_limiter: RateLimiter,
    single_flight: SingleFlight<SessionKey, CycleResult>,
    handles: Mutex<HashMap<SessionKey, SessionHandle>>,
    config: SessionManagerConfig,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("brokers", &self.registry.list_available())
            .field("live_handles", &self.handles.lock().len())
            .field("in_flight", &self.single_flight.in_flight_count())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a manager.
    #[must_use]
    pub fn new(
        registry: Arc<BrokerRegistry>,
        store: Arc<dyn SessionRepository>,
        alerts: Arc<dyn AlertSinkPort>,
        config: SessionManagerConfig,
    ) -> Self {
        Self {
            registry,
            store,
            alerts,
            rate_limiter: RateLimiter::new(config.rate_limits.clone()),
            single_flight: SingleFlight::new(),
            handles: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Broker registry used to create adapters.
    #[must_use]
    pub fn registry(&self) -> &BrokerRegistry {
        &self.registry
    }

    /// Health policy in effect.
    #[must_use]
    pub const fn health_policy(&self) -> &HealthPolicy {
        &self.config.health
    }

    // =========================================================================
    // Caller Operations
    // =========================================================================

    /// Connect a session with fresh credentials.
    ///
    /// A successful connect replaces any existing session for the key and
    /// cancels work still running against the old one. A failed connect
    /// leaves the store untouched.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Registry` if the broker is not registered.
    pub async fn connect(
        &self,
        key: SessionKey,
        credentials: Credentials,
    ) -> Result<ConnectionResult, SessionError> {
        let mut adapter = self.registry.create_broker(key.broker.as_str())?;
        let previous = self.store.get(&key).map(|s| s.status());

        let response = match self
            .guarded(
                &key,
                &CancellationToken::new(),
                BrokerOperation::Connect,
                (AccountStatus::Inactive, AuthenticationStep::ReauthRequired),
                adapter.connect(&credentials),
            )
            .await?
        {
            Call::Throttled(response) => return Ok(response),
            Call::Completed(response) => response,
        };

        if !response.success {
            tracing::warn!(
                session = %key,
                error_kind = ?response.error_kind,
                message = %response.message,
                "Connect failed"
            );
            return Ok(response);
        }

        let session = Session::establish(
            key,
            previous,
            SessionTrigger::Connected,
            response.account_status,
            response.authentication_step,
            response.token_info.clone(),
            response.account_info.clone(),
            Utc::now(),
        )?;
        self.install(
            session,
            previous,
            Arc::new(tokio::sync::Mutex::new(adapter)),
            credentials,
        );
        Ok(response)
    }

    /// Exchange an OAuth authorization code for a token.
    ///
    /// Reuses the adapter created by `connect` when one is live. An expired
    /// or invalid code keeps a pending session pending.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Registry` if the broker is not registered, or
    /// `SessionError::InvalidTransition` if the stored session is not
    /// awaiting consent.
    pub async fn complete_oauth(
        &self,
        key: &SessionKey,
        auth_code: &str,
        credentials: Credentials,
    ) -> Result<OAuthResult, SessionError> {
        let existing = self.store.get(key);
        let previous = existing.as_ref().map(Session::status);
        // The code is single-use; refuse before spending it.
        SessionStateMachine::validate_transition(
            previous,
            SessionTrigger::OauthCompleted,
            AccountStatus::Active,
        )?;
        let adapter = match self.handle(key) {
            Some(handle) => handle.adapter,
            None => Arc::new(tokio::sync::Mutex::new(
                self.registry.create_broker(key.broker.as_str())?,
            )),
        };

        let response = {
            let mut guard = adapter.lock().await;
            match self
                .guarded(
                    key,
                    &CancellationToken::new(),
                    BrokerOperation::CompleteOauth,
                    (AccountStatus::ProceedToOauth, AuthenticationStep::OauthRequired),
                    guard.complete_oauth(auth_code, &credentials),
                )
                .await?
            {
                Call::Throttled(response) => return Ok(response),
                Call::Completed(response) => response,
            }
        };

        if response.success {
            let session = Session::establish(
                key.clone(),
                previous,
                SessionTrigger::OauthCompleted,
                response.account_status,
                response.authentication_step,
                response.token_info.clone(),
                response.account_info.clone(),
                Utc::now(),
            )?;
            self.install(session, previous, adapter, credentials);
            return Ok(response);
        }

        tracing::warn!(
            session = %key,
            error_kind = ?response.error_kind,
            message = %response.message,
            "OAuth completion failed"
        );
        if let Some(session) = existing
            && session.status() == AccountStatus::ProceedToOauth
            && response.error_kind == Some(ErrorKind::AuthCodeExpired)
        {
            let now = Utc::now();
            self.store.update_if_current(key, session.epoch(), &mut |s| {
                s.transition(
                    SessionTrigger::OauthCodeRejected,
                    AccountStatus::ProceedToOauth,
                    AuthenticationStep::OauthRequired,
                    now,
                )
                .ok()
                .map(|_| SessionTrigger::OauthCodeRejected)
            });
        }
        Ok(response)
    }

    /// Validate a session on demand (`validateSession`).
    ///
    /// Joins a validation or refresh already in flight for the key. Sessions
    /// waiting on the user are reported invalid without a broker call.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` for an unknown key and
    /// `SessionError::Cancelled` if the session was disconnected meanwhile.
    pub async fn validate_account_session(
        &self,
        key: &SessionKey,
    ) -> Result<ValidationReport, SessionError> {
        let started = Instant::now();
        let session = self.require(key)?;

        if !session.status().is_supervised() {
            return Ok(ValidationReport {
                is_valid: false,
                health_score: session.health_score(),
                needs_refresh: false,
                error_message: Some(format!(
                    "Session is {}, next step is {}",
                    session.status(),
                    session.authentication_step()
                )),
                error_kind: session.last_error().map(|e| e.kind),
                status: session.status(),
                response_time: started.elapsed(),
            });
        }

        let outcome = self.run_cycle(key, CycleKind::Validate).await?;
        let current = outcome.session.or_else(|| self.store.get(key));
        let status = current
            .as_ref()
            .map_or(outcome.response.account_status, Session::status);

        Ok(ValidationReport {
            is_valid: outcome.response.success && status == AccountStatus::Active,
            health_score: current.as_ref().map_or(0.0, Session::health_score),
            needs_refresh: status.needs_refresh(),
            error_message: (!outcome.response.success).then(|| outcome.response.message.clone()),
            error_kind: outcome.response.error_kind,
            status,
            response_time: started.elapsed(),
        })
    }

    /// Refresh a session's token on demand (`refreshSessionToken`).
    ///
    /// Returns whether the session holds a valid token afterwards. Joins an
    /// in-flight validation or refresh for the key instead of racing it.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` for an unknown key and
    /// `SessionError::Cancelled` if the session was disconnected meanwhile.
    pub async fn refresh_account_token(&self, key: &SessionKey) -> Result<bool, SessionError> {
        let session = self.require(key)?;
        if session.status().requires_user_action() {
            tracing::debug!(
                session = %key,
                status = %session.status(),
                "Refresh skipped, session needs re-authentication"
            );
            return Ok(false);
        }

        let outcome = self.run_cycle(key, CycleKind::Refresh).await?;
        Ok(outcome.response.success)
    }

    /// Disconnect a session.
    ///
    /// The session is set to `INACTIVE` under a fresh epoch and removed from
    /// the store before the broker is contacted, and any in-flight
    /// validation or refresh for the key is cancelled. Returns whether the broker acknowledged the logout; local
    /// state is reset either way.
    pub async fn disconnect(&self, key: &SessionKey) -> bool {
        let handle = self.handles.lock().remove(key);
        if let Some(handle) = &handle {
            handle.cancel.cancel();
        }

        let now = Utc::now();
        let mut from = None;
        let fenced = self.store.update_and_fence(key, &mut |s| {
            let previous = s
                .transition(
                    SessionTrigger::Disconnected,
                    AccountStatus::Inactive,
                    AuthenticationStep::ReauthRequired,
                    now,
                )
                .ok()?;
            from = Some(previous);
            Some(SessionTrigger::Disconnected)
        });
        if let Some(from) = from
            && from != AccountStatus::Inactive
        {
            observability::record_transition(key.broker.as_str(), from, AccountStatus::Inactive);
        }
        if fenced.is_some() {
            self.store.remove(key);
            tracing::info!(session = %key, "Session disconnected");
        }

        let Some(handle) = handle else {
            return fenced.is_some();
        };

        let broker = key.broker.as_str();
        if let Err(limit) = self
            .rate_limiter
            .try_acquire(broker, BrokerOperation::Disconnect)
        {
            tracing::warn!(
                session = %key,
                retry_after_ms = limit.retry_after.as_millis() as u64,
                "Broker logout skipped, rate limited"
            );
            observability::record_rate_limited(broker, BrokerOperation::Disconnect.as_str());
            return false;
        }

        let started = Instant::now();
        let mut adapter = handle.adapter.lock().await;
        let logged_out = tokio::time::timeout(self.config.operation_timeout, adapter.disconnect())
            .await
            .unwrap_or_else(|_| {
                tracing::warn!(session = %key, "Broker logout timed out");
                false
            });
        observability::record_operation(
            broker,
            BrokerOperation::Disconnect.as_str(),
            logged_out,
            started.elapsed(),
        );
        logged_out
    }

    /// Rehydrate a session from a persisted snapshot.
    ///
    /// Sessions that were waiting on a refresh come back `ACTIVE`; the next
    /// validation re-derives their status from the token's expiry.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Registry` if the broker is not registered, or
    /// `SessionError::InvalidTransition` for a snapshot in a status that
    /// only a fresh connect can produce.
    pub fn restore_session(
        &self,
        snapshot: SessionSnapshot,
        credentials: Credentials,
    ) -> Result<Session, SessionError> {
        let adapter = self.registry.create_broker(snapshot.key.broker.as_str())?;
        let status = if snapshot.status.needs_refresh() {
            AccountStatus::Active
        } else {
            snapshot.status
        };
        let previous = self.store.get(&snapshot.key).map(|s| s.status());
        let session = Session::establish(
            snapshot.key,
            previous,
            SessionTrigger::Connected,
            status,
            snapshot.authentication_step,
            snapshot.token_info,
            snapshot.account_info,
            Utc::now(),
        )?;
        tracing::info!(session = %session.key(), status = %status, "Restoring session");
        Ok(self.install(
            session,
            previous,
            Arc::new(tokio::sync::Mutex::new(adapter)),
            credentials,
        ))
    }

    /// Record a successful trading call made with a session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFound` for an unknown key.
    pub fn record_successful_call(&self, key: &SessionKey) -> Result<(), SessionError> {
        let session = self.require(key)?;
        let now = Utc::now();
        if let UpdateOutcome::Stale = self.store.update_if_current(key, session.epoch(), &mut |s| {
            s.record_call_success(now);
            None
        }) {
            tracing::debug!(session = %key, "Session replaced before call could be recorded");
        }
        Ok(())
    }

    // =========================================================================
    // Read API
    // =========================================================================

    /// Counts by status and overall health. Never calls a broker.
    #[must_use]
    pub fn health_statistics(&self) -> HealthStatistics {
        let stats = HealthStatistics::from_sessions(&self.store.list(), &self.config.health);
        for (status, count) in &stats.by_status {
            observability::set_sessions(*status, *count);
        }
        stats
    }

    /// Health of one session. Never calls a broker.
    #[must_use]
    pub fn session_health(&self, key: &SessionKey) -> Option<SessionHealthDto> {
        self.store
            .get(key)
            .map(|s| SessionHealthDto::from_session(&s, &self.config.health))
    }

    /// Health of every session a user owns. Never calls a broker.
    #[must_use]
    pub fn user_session_health(&self, user_id: &UserId) -> Vec<SessionHealthDto> {
        let mut sessions = self.store.list_for_user(user_id);
        sessions.sort_by(|a, b| a.key().cmp(b.key()));
        sessions
            .iter()
            .map(|s| SessionHealthDto::from_session(s, &self.config.health))
            .collect()
    }

    /// Subscribe to store change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.store.subscribe()
    }

    // =========================================================================
    // Supervisor Hooks
    // =========================================================================

    /// Keys the supervisor should validate.
    #[must_use]
    pub fn supervised_keys(&self) -> Vec<SessionKey> {
        self.store.supervised_keys()
    }

    /// Whether a validation or refresh is running for `key`.
    #[must_use]
    pub fn is_in_flight(&self, key: &SessionKey) -> bool {
        self.single_flight.is_in_flight(key)
    }

    /// Validate a supervised session unless work is already in flight.
    ///
    /// Returns `None` when the key was skipped.
    pub async fn validate_supervised(&self, key: &SessionKey) -> Option<CycleResult> {
        if self.is_in_flight(key) {
            return None;
        }
        Some(self.run_cycle(key, CycleKind::Validate).await)
    }

    /// Remove sessions `INACTIVE` for longer than `retention`.
    pub fn purge_inactive(&self, retention: chrono::Duration) -> Vec<SessionKey> {
        let purged = self.store.purge_inactive(retention, Utc::now());
        if !purged.is_empty() {
            let mut handles = self.handles.lock();
            for key in &purged {
                if let Some(handle) = handles.remove(key) {
                    handle.cancel.cancel();
                }
            }
        }
        purged
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn require(&self, key: &SessionKey) -> Result<Session, SessionError> {
        self.store
            .get(key)
            .ok_or_else(|| SessionError::NotFound { key: key.clone() })
    }

    fn handle(&self, key: &SessionKey) -> Option<SessionHandle> {
        self.handles.lock().get(key).cloned()
    }

    fn install(
        &self,
        session: Session,
        previous: Option<AccountStatus>,
        adapter: SharedAdapter,
        credentials: Credentials,
    ) -> Session {
        let stored = self.store.establish(session);
        let key = stored.key().clone();

        let handle = SessionHandle {
            adapter,
            credentials,
            cancel: CancellationToken::new(),
        };
        if let Some(old) = self.handles.lock().insert(key.clone(), handle) {
            old.cancel.cancel();
        }

        if let Some(from) = previous
            && from != stored.status()
        {
            observability::record_transition(key.broker.as_str(), from, stored.status());
        }
        tracing::info!(
            session = %key,
            status = %stored.status(),
            step = %stored.authentication_step(),
            epoch = stored.epoch(),
            "Session established"
        );
        stored
    }

    async fn run_cycle(&self, key: &SessionKey, kind: CycleKind) -> CycleResult {
        let flight = self
            .single_flight
            .run(key.clone(), || self.execute_cycle(key, kind))
            .await;
        if flight.shared {
            tracing::debug!(session = %key, "Joined in-flight session operation");
        }
        flight.value
    }

    /// Rate limit, then run `call` bounded by the operation timeout and the
    /// session's cancellation token.
    async fn guarded<F>(
        &self,
        key: &SessionKey,
        cancel: &CancellationToken,
        operation: BrokerOperation,
        fallback: (AccountStatus, AuthenticationStep),
        call: F,
    ) -> Result<Call, SessionError>
    where
        F: Future<Output = AuthResponse>,
    {
        let broker = key.broker.as_str();
        if let Err(limit) = self.rate_limiter.try_acquire(broker, operation) {
            tracing::debug!(
                session = %key,
                operation = %operation,
                retry_after_ms = limit.retry_after.as_millis() as u64,
                "Rate limited, call not attempted"
            );
            observability::record_rate_limited(broker, operation.as_str());
            return Ok(Call::Throttled(
                AuthResponse::failure(ErrorKind::RateLimited, limit.to_string(), fallback.0, fallback.1)
                    .with_retry_after(limit.retry_after),
            ));
        }

        let started = Instant::now();
        let timeout = self.config.operation_timeout;
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(session = %key, operation = %operation, "Operation cancelled");
                return Err(SessionError::Cancelled { key: key.clone() });
            }
            result = tokio::time::timeout(timeout, call) => result.unwrap_or_else(|_| {
                tracing::warn!(
                    session = %key,
                    operation = %operation,
                    timeout_ms = timeout.as_millis() as u64,
                    "Broker call timed out"
                );
                AuthResponse::failure(
                    ErrorKind::NetworkError,
                    format!("{operation} timed out after {}ms", timeout.as_millis()),
                    fallback.0,
                    fallback.1,
                )
            }),
        };

        observability::record_operation(broker, operation.as_str(), response.success, started.elapsed());
        Ok(Call::Completed(response))
    }

    async fn execute_cycle(&self, key: &SessionKey, kind: CycleKind) -> CycleResult {
        let started = Instant::now();
        let session = self.require(key)?;
        let handle = self
            .handle(key)
            .ok_or_else(|| SessionError::Cancelled { key: key.clone() })?;
        let fallback = (session.status(), session.authentication_step());

        let mut adapter = handle.adapter.lock().await;
        adapter.hydrate(
            session.status(),
            session.token_info().cloned(),
            session.account_info().cloned(),
        );

        let first = match kind {
            CycleKind::Validate => {
                self.guarded(
                    key,
                    &handle.cancel,
                    BrokerOperation::Validate,
                    fallback,
                    adapter.validate_session(&handle.credentials),
                )
                .await?
            }
            CycleKind::Refresh => {
                self.guarded(
                    key,
                    &handle.cancel,
                    BrokerOperation::Refresh,
                    fallback,
                    adapter.refresh_token(&handle.credentials),
                )
                .await?
            }
        };
        let first = match first {
            Call::Throttled(response) => {
                return Ok(CycleOutcome {
                    response,
                    refreshed: false,
                    session: Some(session),
                    throttled: true,
                    elapsed: started.elapsed(),
                });
            }
            Call::Completed(response) => response,
        };

        // One refresh attempt inside a validation cycle, never a retry loop.
        let mut refresh = None;
        if kind == CycleKind::Validate
            && requests_refresh(&first)
            && adapter.token_info().is_some_and(TokenInfo::refreshable)
        {
            tracing::info!(session = %key, "Token expired, refreshing within validation cycle");
            let call = self
                .guarded(
                    key,
                    &handle.cancel,
                    BrokerOperation::Refresh,
                    (first.account_status, first.authentication_step),
                    adapter.refresh_token(&handle.credentials),
                )
                .await?;
            refresh = Some(call.into_response());
        }
        drop(adapter);

        let plan = CyclePlan::derive(kind, session.status(), &first, refresh.as_ref());
        let refreshed = kind == CycleKind::Refresh || refresh.is_some();
        let response = refresh.unwrap_or(first);

        let now = Utc::now();
        let policy = &self.config.health;
        let mut applied = Vec::new();
        let mut health = None;
        let outcome = {
            let mut update = |s: &mut Session| -> Option<SessionTrigger> {
                let mut last = None;
                for t in &plan.transitions {
                    match s.transition(t.trigger, t.to, t.step, now) {
                        Ok(from) => {
                            applied.push((from, t.to, t.trigger));
                            last = Some(t.trigger);
                        }
                        Err(err) => {
                            tracing::warn!(session = %s.key(), error = %err, "Rejected session transition");
                        }
                    }
                }
                if let Some(token) = &plan.token {
                    s.replace_token(token.clone());
                }
                if plan.revoke_refresh {
                    s.revoke_refresh();
                }
                health = Some(match &plan.verdict {
                    Verdict::Success => s.record_success(policy, now),
                    Verdict::Failure { kind, message } => {
                        s.record_failure(policy, *kind, message.clone(), now)
                    }
                });
                last
            };
            self.store
                .update_if_current(key, session.epoch(), &mut update)
        };

        let after = match outcome {
            UpdateOutcome::Applied(after) => after,
            UpdateOutcome::Stale => {
                tracing::debug!(
                    session = %key,
                    epoch = session.epoch(),
                    "Session changed during operation, dropping result"
                );
                observability::record_stale_result(key.broker.as_str());
                return Ok(CycleOutcome {
                    response,
                    refreshed,
                    session: None,
                    throttled: false,
                    elapsed: started.elapsed(),
                });
            }
        };

        for (from, to, trigger) in &applied {
            observability::record_transition(key.broker.as_str(), *from, *to);
            if to.requires_user_action() {
                tracing::warn!(
                    session = %key,
                    from = %from,
                    to = %to,
                    trigger = %trigger,
                    error_kind = ?response.error_kind,
                    "Session demoted, re-authentication required"
                );
            } else {
                tracing::info!(
                    session = %key,
                    from = %from,
                    to = %to,
                    trigger = %trigger,
                    "Session status changed"
                );
            }
        }
        if let Some(change) = health {
            self.raise_alert(&session, &after, change, &response);
        }

        Ok(CycleOutcome {
            response,
            refreshed,
            session: Some(after),
            throttled: false,
            elapsed: started.elapsed(),
        })
    }

    /// Emit at most one alert per cycle. Demotion outranks the failure
    /// streak, which outranks the warning threshold.
    fn raise_alert(
        &self,
        before: &Session,
        after: &Session,
        change: HealthChange,
        response: &AuthResponse,
    ) {
        let policy = &self.config.health;
        let reason = if before.status() != after.status() && after.status().requires_user_action()
        {
            AlertReason::StatusDemoted
        } else if change.consecutive_failures > 0
            && change.consecutive_failures == policy.critical_failures
        {
            AlertReason::ConsecutiveFailures
        } else if change.crossed_below(policy.warning_threshold) {
            AlertReason::HealthDegraded
        } else {
            return;
        };

        let alert = SessionAlert {
            id: Uuid::new_v4(),
            session_key: after.key().clone(),
            previous_status: before.status(),
            new_status: after.status(),
            error_kind: response.error_kind,
            message: after
                .last_error()
                .map_or_else(|| response.message.clone(), |e| e.message.clone()),
            timestamp: Utc::now(),
            reason,
            health_score: after.health_score(),
            consecutive_failures: after.consecutive_failures(),
        };
        observability::record_alert(reason);
        self.alerts.publish(alert);
    }
}

/// A validation that found an expired but refreshable token.
fn requests_refresh(response: &AuthResponse) -> bool {
    !response.success
        && response.error_kind == Some(ErrorKind::TokenExpired)
        && response.account_status.needs_refresh()
}

// =============================================================================
// Cycle Planning
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
struct PlannedTransition {
    trigger: SessionTrigger,
    to: AccountStatus,
    step: AuthenticationStep,
}

#[derive(Debug, Clone, PartialEq)]
enum Verdict {
    Success,
    Failure { kind: ErrorKind, message: String },
}

/// Store mutations derived from a cycle's broker responses.
///
/// Only auth-classified failures change the status; transient and input
/// failures are bookkeeping only.
#[derive(Debug, Clone, PartialEq)]
struct CyclePlan {
    status: AccountStatus,
    transitions: Vec<PlannedTransition>,
    token: Option<TokenInfo>,
    revoke_refresh: bool,
    verdict: Verdict,
}

impl CyclePlan {
    fn derive(
        kind: CycleKind,
        current: AccountStatus,
        first: &AuthResponse,
        refresh: Option<&AuthResponse>,
    ) -> Self {
        let mut plan = Self {
            status: current,
            transitions: Vec::new(),
            token: None,
            revoke_refresh: false,
            verdict: Verdict::Success,
        };
        match kind {
            CycleKind::Validate => plan.apply_validation(first),
            CycleKind::Refresh => plan.apply_refresh(first),
        }
        if let Some(refresh) = refresh {
            plan.apply_refresh(refresh);
        }
        plan
    }

    fn push(&mut self, trigger: SessionTrigger, to: AccountStatus, step: AuthenticationStep) {
        if to != self.status {
            self.transitions.push(PlannedTransition { trigger, to, step });
            self.status = to;
        }
    }

    fn fail(&mut self, response: &AuthResponse) -> ErrorKind {
        let kind = response.error_kind.unwrap_or(ErrorKind::Unknown);
        self.verdict = Verdict::Failure {
            kind,
            message: response.message.clone(),
        };
        kind
    }

    fn apply_validation(&mut self, response: &AuthResponse) {
        if response.success {
            self.push(
                SessionTrigger::ProbeSucceeded,
                AccountStatus::Active,
                response.authentication_step,
            );
            self.verdict = Verdict::Success;
            return;
        }

        let kind = self.fail(response);
        if kind.is_auth_failure() {
            self.push(
                demotion_trigger(response),
                response.account_status,
                response.authentication_step,
            );
        }
    }

    fn apply_refresh(&mut self, response: &AuthResponse) {
        if response.success {
            self.push(
                SessionTrigger::RefreshSucceeded,
                AccountStatus::Active,
                response.authentication_step,
            );
            self.token.clone_from(&response.token_info);
            self.verdict = Verdict::Success;
            return;
        }

        let kind = self.fail(response);
        if !kind.is_transient() && response.account_status.requires_user_action() {
            self.push(
                SessionTrigger::RefreshRejected,
                response.account_status,
                response.authentication_step,
            );
            self.revoke_refresh = true;
        }
    }
}

/// Token expiry moves to a refresh or re-auth status; anything else the
/// broker rejected is a failed probe.
fn demotion_trigger(response: &AuthResponse) -> SessionTrigger {
    let token_expiry = response.error_kind == Some(ErrorKind::TokenExpired)
        && match response.account_status {
            AccountStatus::RefreshRequired | AccountStatus::TokenExpired => true,
            AccountStatus::ProceedToOauth => {
                response.authentication_step == AuthenticationStep::ReauthRequired
            }
            AccountStatus::Active | AccountStatus::Inactive => false,
        };
    if token_expiry {
        SessionTrigger::TokenExpiry
    } else {
        SessionTrigger::ProbeRejected
    }
}

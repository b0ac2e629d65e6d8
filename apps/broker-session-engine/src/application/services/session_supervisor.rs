//! Session Supervisor Service
//!
//! Periodically validates every supervised session through the
//! [`SessionManager`], with bounded concurrency, and purges sessions that
//! have been `INACTIVE` for longer than the retention window.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::session_manager::SessionManager;
use crate::observability;

/// Configuration for the session supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Time between sweeps.
    pub tick_interval: Duration,
    /// Maximum validations running at once.
    pub max_concurrent_validations: usize,
    /// How long an `INACTIVE` session is kept before it is purged.
    pub inactive_retention: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            max_concurrent_validations: 8,
            inactive_retention: Duration::from_secs(3600),
        }
    }
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Sessions validated.
    pub checked: usize,
    /// Sessions skipped because an operation was already in flight.
    pub skipped_in_flight: usize,
    /// Validations that succeeded.
    pub succeeded: usize,
    /// Validations that failed, were cancelled or were dropped as stale.
    pub failed: usize,
    /// Inactive sessions purged.
    pub purged: usize,
}

#[derive(Debug, Clone, Copy)]
enum Visit {
    Skipped,
    Succeeded,
    Failed,
}

/// Background health supervisor.
#[derive(Debug)]
pub struct SessionSupervisor {
    manager: Arc<SessionManager>,
    config: SupervisorConfig,
}

impl SessionSupervisor {
    /// Create a supervisor.
    #[must_use]
    pub const fn new(manager: Arc<SessionManager>, config: SupervisorConfig) -> Self {
        Self { manager, config }
    }

    /// Run one sweep.
    ///
    /// Keys with a validation or refresh already in flight are skipped, so a
    /// slow broker never accumulates overlapping probes for one session.
    pub async fn run_cycle(&self) -> CycleSummary {
        let started = Instant::now();
        let keys = self.manager.supervised_keys();
        let limit = self.config.max_concurrent_validations.max(1);

        let visits = parking_lot::Mutex::new(Vec::with_capacity(keys.len()));
        futures::stream::iter(keys)
            .for_each_concurrent(limit, |key| {
                let manager = &self.manager;
                let visits = &visits;
                async move {
                    let visit = match manager.validate_supervised(&key).await {
                        None => Visit::Skipped,
                        Some(Ok(outcome))
                            if outcome.response.success && outcome.session.is_some() =>
                        {
                            Visit::Succeeded
                        }
                        Some(Ok(outcome)) => {
                            tracing::debug!(
                                session = %key,
                                error_kind = ?outcome.response.error_kind,
                                message = %outcome.response.message,
                                "Supervised validation failed"
                            );
                            Visit::Failed
                        }
                        Some(Err(e)) => {
                            tracing::debug!(session = %key, error = %e, "Supervised validation aborted");
                            Visit::Failed
                        }
                    };
                    visits.lock().push(visit);
                }
            })
            .await;

        let mut summary = CycleSummary::default();
        for visit in visits.into_inner() {
            match visit {
                Visit::Skipped => summary.skipped_in_flight += 1,
                Visit::Succeeded => {
                    summary.checked += 1;
                    summary.succeeded += 1;
                }
                Visit::Failed => {
                    summary.checked += 1;
                    summary.failed += 1;
                }
            }
        }

        let retention = chrono::Duration::from_std(self.config.inactive_retention)
            .unwrap_or(chrono::Duration::MAX);
        let purged = self.manager.purge_inactive(retention);
        for key in &purged {
            tracing::info!(session = %key, "Purged inactive session");
        }
        summary.purged = purged.len();

        observability::record_supervisor_cycle(started.elapsed(), summary.purged);
        tracing::debug!(
            checked = summary.checked,
            skipped = summary.skipped_in_flight,
            succeeded = summary.succeeded,
            failed = summary.failed,
            purged = summary.purged,
            "Supervisor sweep complete"
        );
        summary
    }

    /// Spawn the sweep loop. It stops when `shutdown` is cancelled.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tracing::info!(
            tick_secs = self.config.tick_interval.as_secs(),
            max_concurrent = self.config.max_concurrent_validations,
            "Starting session supervisor"
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.run_cycle().await;
                    }
                    () = shutdown.cancelled() => {
                        tracing::info!("Session supervisor shutting down");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::application::ports::{
        AuthFlow, AuthResponse, BrokerAdapter, ConnectionResult, Credentials, NoOpAlertSink,
        OAuthResult, RefreshResult, ValidationResult,
    };
    use crate::application::registry::{BrokerPlugin, BrokerRegistry};
    use crate::application::services::SessionManagerConfig;
    use crate::domain::session::{
        AccountInfo, AccountStatus, AuthenticationStep, ErrorKind, SessionKey, TokenInfo,
    };
    use crate::infrastructure::persistence::InMemorySessionStore;
    use crate::resilience::RateLimit;

    /// Broker behaviour shared by every adapter the plugin creates.
    #[derive(Default)]
    struct BrokerScript {
        delay: Duration,
        failure: parking_lot::Mutex<Option<(ErrorKind, AccountStatus)>>,
        calls: AtomicUsize,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    struct SweepAdapter {
        script: Arc<BrokerScript>,
        status: AccountStatus,
        token: Option<TokenInfo>,
    }

    #[async_trait]
    impl BrokerAdapter for SweepAdapter {
        fn broker_name(&self) -> &str {
            "sweep"
        }

        fn auth_flow(&self) -> AuthFlow {
            AuthFlow::Direct
        }

        fn hydrate(
            &mut self,
            status: AccountStatus,
            token_info: Option<TokenInfo>,
            _account_info: Option<AccountInfo>,
        ) {
            self.status = status;
            self.token = token_info;
        }

        async fn connect(&mut self, _credentials: &Credentials) -> ConnectionResult {
            self.status = AccountStatus::Active;
            AuthResponse::success(AccountStatus::Active, AuthenticationStep::DirectAuth, "ok")
                .with_token(TokenInfo::non_expiring("tok"))
                .with_account(AccountInfo::new("A1", "Jane", "Sweep"))
        }

        async fn complete_oauth(&mut self, _code: &str, _credentials: &Credentials) -> OAuthResult {
            AuthResponse::failure(
                ErrorKind::ValidationError,
                "not an OAuth broker",
                self.status,
                AuthenticationStep::DirectAuth,
            )
        }

        async fn refresh_token(&mut self, _credentials: &Credentials) -> RefreshResult {
            AuthResponse::success(self.status, AuthenticationStep::DirectAuth, "ok")
        }

        async fn validate_session(&mut self, _credentials: &Credentials) -> ValidationResult {
            let script = &self.script;
            script.calls.fetch_add(1, Ordering::SeqCst);
            let running = script.running.fetch_add(1, Ordering::SeqCst) + 1;
            script.peak.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(script.delay).await;
            script.running.fetch_sub(1, Ordering::SeqCst);

            let failure = *script.failure.lock();
            match failure {
                Some((kind, status)) => {
                    let step = if kind.is_auth_failure() {
                        AuthenticationStep::ReauthRequired
                    } else {
                        AuthenticationStep::DirectAuth
                    };
                    AuthResponse::failure(kind, "broker unavailable", status, step)
                }
                None => AuthResponse::success(
                    AccountStatus::Active,
                    AuthenticationStep::DirectAuth,
                    "Session valid",
                ),
            }
        }

        async fn disconnect(&mut self) -> bool {
            self.status = AccountStatus::Inactive;
            self.token = None;
            true
        }

        fn is_connected(&self) -> bool {
            self.status == AccountStatus::Active
        }

        fn account_status(&self) -> AccountStatus {
            self.status
        }

        fn token_info(&self) -> Option<&TokenInfo> {
            self.token.as_ref()
        }

        fn account_info(&self) -> Option<&AccountInfo> {
            None
        }
    }

    struct Fixture {
        manager: Arc<SessionManager>,
        supervisor: Arc<SessionSupervisor>,
        script: Arc<BrokerScript>,
    }

    fn fixture(script: BrokerScript, config: SupervisorConfig) -> Fixture {
        let script = Arc::new(script);
        let registry = BrokerRegistry::new();
        let factory_script = Arc::clone(&script);
        registry
            .register_plugin(BrokerPlugin::new("sweep", "1.0.0", move || {
                Box::new(SweepAdapter {
                    script: Arc::clone(&factory_script),
                    status: AccountStatus::Inactive,
                    token: None,
                })
            }))
            .unwrap();

        let mut manager_config = SessionManagerConfig::default();
        manager_config.rate_limits.default = RateLimit::new(100, Duration::from_secs(1));
        let manager = Arc::new(SessionManager::new(
            Arc::new(registry),
            Arc::new(InMemorySessionStore::new()),
            Arc::new(NoOpAlertSink),
            manager_config,
        ));
        let supervisor = Arc::new(SessionSupervisor::new(Arc::clone(&manager), config));
        Fixture {
            manager,
            supervisor,
            script,
        }
    }

    fn key(account: usize) -> SessionKey {
        SessionKey::new("42", "sweep", format!("A{account}"))
    }

    async fn connect_all(fx: &Fixture, count: usize) -> Vec<SessionKey> {
        let mut keys = Vec::with_capacity(count);
        for account in 0..count {
            let response = fx
                .manager
                .connect(key(account), Credentials::new())
                .await
                .unwrap();
            assert!(response.success);
            keys.push(key(account));
        }
        keys
    }

    fn supervisor(config: SupervisorConfig) -> Arc<SessionSupervisor> {
        fixture(BrokerScript::default(), config).supervisor
    }

    #[test]
    fn default_config() {
        let config = SupervisorConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(30));
        assert_eq!(config.max_concurrent_validations, 8);
        assert_eq!(config.inactive_retention, Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn empty_store_sweep_is_a_noop() {
        let summary = supervisor(SupervisorConfig::default()).run_cycle().await;
        assert_eq!(summary, CycleSummary::default());
    }

    #[tokio::test]
    async fn sweep_updates_health_of_every_supervised_session() {
        let fx = fixture(BrokerScript::default(), SupervisorConfig::default());
        let keys = connect_all(&fx, 3).await;
        *fx.script.failure.lock() = Some((ErrorKind::NetworkError, AccountStatus::Active));

        let summary = fx.supervisor.run_cycle().await;

        assert_eq!(summary.checked, 3);
        assert_eq!(summary.failed, 3);
        assert_eq!(summary.skipped_in_flight, 0);
        for key in &keys {
            let health = fx.manager.session_health(key).unwrap();
            assert_eq!(health.status, AccountStatus::Active);
            assert_eq!(health.consecutive_failures, 1);
            assert!(health.health_score < 100.0);
        }

        *fx.script.failure.lock() = None;
        let summary = fx.supervisor.run_cycle().await;

        assert_eq!(summary.succeeded, 3);
        for key in &keys {
            let health = fx.manager.session_health(key).unwrap();
            assert_eq!(health.consecutive_failures, 0);
            assert!(health.last_validated_at.is_some());
        }
        assert_eq!(fx.script.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn sweep_skips_keys_with_work_in_flight() {
        let fx = fixture(
            BrokerScript {
                delay: Duration::from_millis(200),
                ..BrokerScript::default()
            },
            SupervisorConfig::default(),
        );
        let keys = connect_all(&fx, 2).await;

        let manager = Arc::clone(&fx.manager);
        let busy = keys[0].clone();
        let manual = tokio::spawn(async move { manager.validate_account_session(&busy).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(fx.manager.is_in_flight(&keys[0]));

        let summary = fx.supervisor.run_cycle().await;

        assert_eq!(summary.skipped_in_flight, 1);
        assert_eq!(summary.checked, 1);
        assert_eq!(summary.succeeded, 1);
        assert!(manual.await.unwrap().unwrap().is_valid);
        assert_eq!(fx.script.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn sweep_bounds_concurrent_validations() {
        let fx = fixture(
            BrokerScript {
                delay: Duration::from_millis(30),
                ..BrokerScript::default()
            },
            SupervisorConfig {
                max_concurrent_validations: 2,
                ..SupervisorConfig::default()
            },
        );
        connect_all(&fx, 6).await;

        let summary = fx.supervisor.run_cycle().await;

        assert_eq!(summary.checked, 6);
        assert_eq!(fx.script.calls.load(Ordering::SeqCst), 6);
        let peak = fx.script.peak.load(Ordering::SeqCst);
        assert!((1..=2).contains(&peak), "peak concurrency {peak}");
    }

    #[tokio::test]
    async fn demoted_sessions_are_purged_after_retention() {
        let fx = fixture(
            BrokerScript::default(),
            SupervisorConfig {
                inactive_retention: Duration::from_millis(100),
                ..SupervisorConfig::default()
            },
        );
        let keys = connect_all(&fx, 2).await;
        *fx.script.failure.lock() = Some((ErrorKind::AuthFailed, AccountStatus::Inactive));

        let summary = fx.supervisor.run_cycle().await;

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.purged, 0);
        assert!(fx.manager.supervised_keys().is_empty());
        assert_eq!(
            fx.manager.session_health(&keys[0]).unwrap().status,
            AccountStatus::Inactive
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        let summary = fx.supervisor.run_cycle().await;

        assert_eq!(summary.checked, 0);
        assert_eq!(summary.purged, 2);
        assert!(keys.iter().all(|k| fx.manager.session_health(k).is_none()));
        assert_eq!(fx.script.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn spawned_loop_stops_on_cancel() {
        let shutdown = CancellationToken::new();
        let handle = supervisor(SupervisorConfig {
            tick_interval: Duration::from_millis(10),
            ..SupervisorConfig::default()
        })
        .spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

//! System readiness state machine.
//!
//! Tracks the lifecycle Idle → Initializing → Ready | Degraded | Failed and
//! gates request handling on it. Initialization is single-flight: the first
//! caller of [`SystemStateMachine::ensure_initialized`] starts the attempt,
//! concurrent callers await the same attempt through a watch channel, and
//! every waiter is bounded by the configured timeout. `Failed` is terminal
//! until [`SystemStateMachine::reinitialize`] resets the machine.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use metrics::counter;
use parking_lot::RwLock;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tessera_core::{ServiceHealth, ServiceStatus, SystemState};
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tracing::{info, warn};

/// Services that must be healthy for the system to serve requests.
pub const CRITICAL_SERVICES: [&str; 2] = ["database", "auth"];

/// Failures surfaced to requests gated on readiness.
#[derive(Debug, Error)]
pub enum ReadinessError {
    /// System is not in an operational state.
    #[error("System is not ready (state: {state})")]
    NotReady {
        /// Current lifecycle state.
        state: SystemState,
    },

    /// Waiting for initialization exceeded the configured bound.
    #[error("Initialization timed out after {timeout:?}")]
    InitTimeout {
        /// The configured wait bound.
        timeout: Duration,
    },

    /// Initialization concluded with a failure.
    #[error("Initialization failed: {message}")]
    InitFailed {
        /// Why the critical path failed.
        message: String,
    },
}

impl IntoResponse for ReadinessError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": "not_ready",
                "message": self.to_string(),
            }
        });
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}

/// One initialization attempt at a time; waiters follow the watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitPhase {
    Pending,
    InProgress,
    Complete,
    Failed,
}

pub struct SystemStateMachine {
    state: RwLock<SystemState>,
    failure_reason: RwLock<Option<String>>,
    services: DashMap<String, ServiceHealth>,
    phase: Mutex<InitPhase>,
    changed_tx: watch::Sender<u64>,
    init_timeout: Duration,
}

impl SystemStateMachine {
    pub fn new(init_timeout: Duration) -> Self {
        let (changed_tx, _) = watch::channel(0);
        Self {
            state: RwLock::new(SystemState::Idle),
            failure_reason: RwLock::new(None),
            services: DashMap::new(),
            phase: Mutex::new(InitPhase::Pending),
            changed_tx,
            init_timeout,
        }
    }

    pub fn state(&self) -> SystemState {
        *self.state.read()
    }

    /// Whether regular requests may proceed.
    pub fn is_ready(&self) -> bool {
        self.state().is_operational()
    }

    /// Why the system last entered [`SystemState::Failed`], if it did.
    pub fn failure_reason(&self) -> Option<String> {
        self.failure_reason.read().clone()
    }

    /// Transition to `next`, logging the reason. No-op when already there.
    pub fn set_state(&self, next: SystemState, reason: &str) {
        {
            let mut state = self.state.write();
            if *state == next {
                return;
            }
            info!(from = %*state, to = %next, reason, "system state transition");
            counter!("tessera_system_state_transitions_total", "to" => next.to_string())
                .increment(1);
            *state = next;
        }
        if next == SystemState::Failed {
            *self.failure_reason.write() = Some(reason.to_string());
        }
        self.notify();
    }

    /// Record a service health report and fold it into the system state.
    ///
    /// The fold only applies while Initializing, Ready or Degraded; Failed
    /// and Idle are never left through a probe on its own.
    pub fn update_service_health(&self, name: &str, health: ServiceHealth) {
        if health.is_unhealthy() {
            warn!(service = name, message = %health.message, "service unhealthy");
        }
        self.services.insert(name.to_string(), health);
        self.refresh_state();
    }

    /// Sorted snapshot of all reported service healths.
    pub fn service_health(&self) -> BTreeMap<String, ServiceHealth> {
        self.services
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Run initialization exactly once, waiting for its conclusion.
    ///
    /// The first caller in the `Pending` phase spawns `init`; everyone else
    /// awaits the same attempt. The wait is bounded: exceeding the timeout
    /// marks the system Failed so later requests fail fast instead of piling
    /// up behind a hung initializer.
    ///
    /// # Errors
    ///
    /// [`ReadinessError::InitFailed`] when the attempt concluded with an
    /// error, [`ReadinessError::InitTimeout`] when the bound was exceeded,
    /// [`ReadinessError::NotReady`] when the machine concluded in a
    /// non-operational state.
    pub async fn ensure_initialized<F, Fut>(self: &Arc<Self>, init: F) -> Result<(), ReadinessError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        match self.state() {
            state if state.is_operational() => return Ok(()),
            SystemState::Failed => return Err(self.failed_error()),
            _ => {}
        }

        let mut changed_rx = self.changed_tx.subscribe();
        {
            let mut phase = self.phase.lock().await;
            match *phase {
                InitPhase::Complete | InitPhase::Failed => {
                    drop(phase);
                    return self.conclusion();
                }
                InitPhase::InProgress => {}
                InitPhase::Pending => {
                    *phase = InitPhase::InProgress;
                    self.set_state(SystemState::Initializing, "initialization started");
                    let machine = self.clone();
                    let attempt = init();
                    tokio::spawn(async move {
                        let result = attempt.await;
                        machine.finish_initialization(result).await;
                    });
                }
            }
        }

        let concluded = tokio::time::timeout(self.init_timeout, async {
            loop {
                if self.state() != SystemState::Initializing {
                    return;
                }
                if changed_rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await;

        match concluded {
            Ok(()) => self.conclusion(),
            Err(_) => {
                let message = format!(
                    "initialization did not conclude within {:?}",
                    self.init_timeout
                );
                self.abandon_attempt(&message).await;
                Err(ReadinessError::InitTimeout {
                    timeout: self.init_timeout,
                })
            }
        }
    }

    /// Reset a Failed (or any) machine back to Idle for a fresh attempt.
    pub async fn reinitialize(&self) {
        let mut phase = self.phase.lock().await;
        *phase = InitPhase::Pending;
        self.services.clear();
        *self.failure_reason.write() = None;
        self.set_state(SystemState::Idle, "reinitialize requested");
    }

    async fn finish_initialization(&self, result: Result<(), String>) {
        let mut phase = self.phase.lock().await;
        // A timeout or reinitialize may have moved on without us.
        if *phase != InitPhase::InProgress {
            return;
        }
        match result {
            Ok(()) => {
                *phase = InitPhase::Complete;
                drop(phase);
                // Service reports have been folding the state already; make
                // sure a silent initializer still concludes somewhere.
                self.refresh_state();
                if self.state() == SystemState::Initializing {
                    self.set_state(SystemState::Failed, "initializer reported no services");
                }
            }
            Err(message) => {
                *phase = InitPhase::Failed;
                drop(phase);
                self.set_state(SystemState::Failed, &message);
            }
        }
        self.notify();
    }

    async fn abandon_attempt(&self, message: &str) {
        {
            let mut phase = self.phase.lock().await;
            *phase = InitPhase::Failed;
        }
        self.set_state(SystemState::Failed, message);
    }

    fn conclusion(&self) -> Result<(), ReadinessError> {
        let state = self.state();
        if state.is_operational() {
            return Ok(());
        }
        if state == SystemState::Failed {
            return Err(self.failed_error());
        }
        Err(ReadinessError::NotReady { state })
    }

    fn failed_error(&self) -> ReadinessError {
        let message = self
            .failure_reason
            .read()
            .clone()
            .unwrap_or_else(|| "critical service failed".to_string());
        ReadinessError::InitFailed { message }
    }

    /// Fold the service map into a system state, while in a foldable state.
    fn refresh_state(&self) {
        let current = self.state();
        if !matches!(
            current,
            SystemState::Initializing | SystemState::Ready | SystemState::Degraded
        ) {
            return;
        }
        let next = self.fold_services();
        if next != current {
            self.set_state(next, "service health changed");
        }
    }

    fn fold_services(&self) -> SystemState {
        let mut critical_pending = false;
        for name in CRITICAL_SERVICES {
            match self.services.get(name) {
                None => critical_pending = true,
                Some(health) => match health.status {
                    ServiceStatus::Unhealthy => return SystemState::Failed,
                    ServiceStatus::Initializing => critical_pending = true,
                    ServiceStatus::Healthy => {}
                },
            }
        }
        if critical_pending {
            return SystemState::Initializing;
        }
        let optional_down = self.services.iter().any(|entry| {
            !CRITICAL_SERVICES.contains(&entry.key().as_str()) && entry.value().is_unhealthy()
        });
        if optional_down {
            SystemState::Degraded
        } else {
            SystemState::Ready
        }
    }

    fn notify(&self) {
        self.changed_tx.send_modify(|generation| *generation += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn machine() -> Arc<SystemStateMachine> {
        Arc::new(SystemStateMachine::new(Duration::from_secs(5)))
    }

    fn report_all_healthy(machine: &SystemStateMachine) {
        machine.update_service_health("database", ServiceHealth::healthy("connected"));
        machine.update_service_health("auth", ServiceHealth::healthy("ready"));
        machine.update_service_health("cache", ServiceHealth::healthy("local"));
        machine.update_service_health("theme_manager", ServiceHealth::healthy("loaded"));
    }

    #[tokio::test]
    async fn test_starts_idle() {
        let machine = machine();
        assert_eq!(machine.state(), SystemState::Idle);
        assert!(!machine.is_ready());
    }

    #[tokio::test]
    async fn test_initialization_runs_once_for_concurrent_callers() {
        let machine = machine();
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let machine = machine.clone();
            let runs = runs.clone();
            handles.push(tokio::spawn(async move {
                let inner = machine.clone();
                machine
                    .ensure_initialized(move || async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        inner.update_service_health(
                            "database",
                            ServiceHealth::healthy("connected"),
                        );
                        inner.update_service_health("auth", ServiceHealth::healthy("ready"));
                        Ok(())
                    })
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(machine.state(), SystemState::Ready);
    }

    #[tokio::test]
    async fn test_failed_initialization_is_terminal() {
        let machine = machine();
        let runs = Arc::new(AtomicUsize::new(0));

        let tracked = runs.clone();
        let err = machine
            .ensure_initialized(move || async move {
                tracked.fetch_add(1, Ordering::SeqCst);
                Err("database exploded".to_string())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ReadinessError::InitFailed { .. }));
        assert_eq!(machine.state(), SystemState::Failed);

        // No second attempt happens while Failed.
        let tracked = runs.clone();
        let err = machine
            .ensure_initialized(move || async move {
                tracked.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ReadinessError::InitFailed { message } if message.contains("exploded")));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reinitialize_allows_fresh_attempt() {
        let machine = machine();
        machine
            .ensure_initialized(|| async { Err("first attempt failed".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(machine.state(), SystemState::Failed);

        machine.reinitialize().await;
        assert_eq!(machine.state(), SystemState::Idle);
        assert!(machine.service_health().is_empty());

        let inner = machine.clone();
        machine
            .ensure_initialized(move || async move {
                report_all_healthy(&inner);
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(machine.state(), SystemState::Ready);
    }

    #[tokio::test]
    async fn test_slow_initialization_times_out() {
        let machine = Arc::new(SystemStateMachine::new(Duration::from_millis(50)));
        let err = machine
            .ensure_initialized(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ReadinessError::InitTimeout { .. }));
        assert_eq!(machine.state(), SystemState::Failed);
    }

    #[tokio::test]
    async fn test_late_completion_after_timeout_is_ignored() {
        let machine = Arc::new(SystemStateMachine::new(Duration::from_millis(30)));
        let inner = machine.clone();
        machine
            .ensure_initialized(move || async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                report_all_healthy(&inner);
                Ok(())
            })
            .await
            .unwrap_err();
        assert_eq!(machine.state(), SystemState::Failed);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(machine.state(), SystemState::Failed);
    }

    #[tokio::test]
    async fn test_optional_service_failure_degrades() {
        let machine = machine();
        machine.set_state(SystemState::Initializing, "test");
        report_all_healthy(&machine);
        assert_eq!(machine.state(), SystemState::Ready);

        machine.update_service_health("cache", ServiceHealth::unhealthy("redis unreachable"));
        assert_eq!(machine.state(), SystemState::Degraded);
        assert!(machine.is_ready());

        machine.update_service_health("cache", ServiceHealth::healthy("reconnected"));
        assert_eq!(machine.state(), SystemState::Ready);
    }

    #[tokio::test]
    async fn test_critical_service_failure_fails_terminally() {
        let machine = machine();
        machine.set_state(SystemState::Initializing, "test");
        report_all_healthy(&machine);
        assert_eq!(machine.state(), SystemState::Ready);

        machine.update_service_health("database", ServiceHealth::unhealthy("pool exhausted"));
        assert_eq!(machine.state(), SystemState::Failed);

        // Recovery reports do not leave Failed on their own.
        machine.update_service_health("database", ServiceHealth::healthy("reconnected"));
        assert_eq!(machine.state(), SystemState::Failed);
    }

    #[tokio::test]
    async fn test_health_updates_ignored_while_idle() {
        let machine = machine();
        machine.update_service_health("database", ServiceHealth::healthy("connected"));
        assert_eq!(machine.state(), SystemState::Idle);
    }

    #[tokio::test]
    async fn test_readiness_error_responses_are_503() {
        let response = ReadinessError::NotReady {
            state: SystemState::Initializing,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_partial_critical_reports_stay_initializing() {
        let machine = machine();
        machine.set_state(SystemState::Initializing, "test");
        machine.update_service_health("database", ServiceHealth::healthy("connected"));
        assert_eq!(machine.state(), SystemState::Initializing);

        machine.update_service_health("auth", ServiceHealth::initializing("warming"));
        assert_eq!(machine.state(), SystemState::Initializing);

        machine.update_service_health("auth", ServiceHealth::healthy("ready"));
        assert_eq!(machine.state(), SystemState::Ready);
    }
}

//! Lifecycle and health coordination for all domain bridges.
//!
//! The orchestrator owns the periodic timers (health sampling and REST
//! reconciliation), never the channels: bridges are torn down only through
//! their own `teardown`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures_util::future::join_all;
use ledgerplay_shared::UserId;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::bridges::{BridgeError, DomainBridge};
use crate::config::RealtimeConfig;
use crate::health::{AggregateHealth, ChannelHealth, HealthSnapshot};
use crate::identity::SessionIdentity;
use crate::notify::{NotificationSink, NotifyAction, NotifyOptions, Severity};
use crate::scheduler::{ScheduledTask, TaskFlow};
use crate::sync::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Uninitialized,
    Initializing,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorEvent {
    Initializing,
    Ready { succeeded: usize, failed: usize },
    HealthChanged {
        from: Option<AggregateHealth>,
        to: AggregateHealth,
    },
    RestartScheduled,
    TimersStopped,
    BridgesTornDown,
    SessionEnded,
}

#[derive(Debug, thiserror::Error)]
#[error("{bridge} bridge failed to initialize: {source}")]
pub struct InitializationError {
    pub bridge: &'static str,
    #[source]
    pub source: BridgeError,
}

#[derive(Debug, Default)]
pub struct InitializationReport {
    pub succeeded: Vec<&'static str>,
    pub failed: Vec<InitializationError>,
}

impl InitializationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug)]
pub enum InitOutcome {
    /// Another initialization was running; this call did nothing.
    AlreadyInFlight,
    Completed(InitializationReport),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrchestratorMetrics {
    pub messages_sent: u64,
    pub events_received: u64,
    pub active_players: usize,
    pub queued_notifications: usize,
    pub subscribed_rooms: usize,
    pub connected_channels: usize,
    pub total_channels: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorStatus {
    pub state: OrchestratorState,
    pub health: HealthSnapshot,
    pub metrics: OrchestratorMetrics,
    pub monitoring: bool,
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub health_interval: Duration,
    pub reconcile_interval: Duration,
    pub restart_grace: Duration,
    pub auto_reconnect: bool,
}

impl From<&RealtimeConfig> for OrchestratorOptions {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            health_interval: config.health_interval,
            reconcile_interval: config.reconcile_interval,
            restart_grace: config.restart_grace,
            auto_reconnect: config.auto_reconnect,
        }
    }
}

struct Inner {
    bridges: Vec<Arc<dyn DomainBridge>>,
    notifier: Arc<dyn NotificationSink>,
    options: OrchestratorOptions,
    session: Option<Arc<SessionIdentity>>,
    /// Bumped on every session end; pending restarts and initializations
    /// started under an older epoch must not bring channels back.
    session_epoch: AtomicU64,
    state: watch::Sender<OrchestratorState>,
    events: broadcast::Sender<OrchestratorEvent>,
    initializing: AtomicBool,
    restarting: AtomicBool,
    timers: Mutex<Vec<ScheduledTask>>,
    last_health: Mutex<Option<AggregateHealth>>,
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        bridges: Vec<Arc<dyn DomainBridge>>,
        notifier: Arc<dyn NotificationSink>,
        options: OrchestratorOptions,
    ) -> Self {
        Self::build(bridges, notifier, options, None)
    }

    /// Like [`Orchestrator::new`], but rejected credentials log the session out.
    pub fn with_session(
        bridges: Vec<Arc<dyn DomainBridge>>,
        notifier: Arc<dyn NotificationSink>,
        options: OrchestratorOptions,
        session: Arc<SessionIdentity>,
    ) -> Self {
        Self::build(bridges, notifier, options, Some(session))
    }

    fn build(
        bridges: Vec<Arc<dyn DomainBridge>>,
        notifier: Arc<dyn NotificationSink>,
        options: OrchestratorOptions,
        session: Option<Arc<SessionIdentity>>,
    ) -> Self {
        let (state, _) = watch::channel(OrchestratorState::Uninitialized);
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                bridges,
                notifier,
                options,
                session,
                session_epoch: AtomicU64::new(0),
                state,
                events,
                initializing: AtomicBool::new(false),
                restarting: AtomicBool::new(false),
                timers: Mutex::new(Vec::new()),
                last_health: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> OrchestratorState {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.inner.events.subscribe()
    }

    pub fn bridges(&self) -> &[Arc<dyn DomainBridge>] {
        &self.inner.bridges
    }

    fn epoch(&self) -> u64 {
        self.inner.session_epoch.load(Ordering::SeqCst)
    }

    fn emit(&self, event: OrchestratorEvent) {
        crate::log_debug!("Orchestrator event: {:?}", event);
        let _ = self.inner.events.send(event);
    }

    /// Initialize every bridge, tolerating individual failures.
    pub async fn initialize_all(&self) -> InitOutcome {
        if self.inner.initializing.swap(true, Ordering::SeqCst) {
            crate::log_debug!("Initialization already in flight");
            return InitOutcome::AlreadyInFlight;
        }
        let epoch = self.epoch();

        self.inner.state.send_replace(OrchestratorState::Initializing);
        self.emit(OrchestratorEvent::Initializing);
        crate::log_info!("Initializing {} bridge(s)", self.inner.bridges.len());

        let results = join_all(self.inner.bridges.iter().map(|bridge| async move {
            (bridge.name(), bridge.init().await)
        }))
        .await;

        let mut report = InitializationReport::default();
        for (bridge, result) in results {
            match result {
                Ok(()) => report.succeeded.push(bridge),
                Err(source) => {
                    crate::log_error!("{} bridge failed to initialize: {}", bridge, source);
                    report.failed.push(InitializationError { bridge, source });
                }
            }
        }

        if self.epoch() != epoch {
            crate::log_warn!("Session ended during initialization, tearing down");
            for bridge in &self.inner.bridges {
                bridge.teardown();
            }
            self.inner.state.send_replace(OrchestratorState::Uninitialized);
            self.inner.initializing.store(false, Ordering::SeqCst);
            return InitOutcome::Completed(report);
        }

        self.inner.state.send_replace(OrchestratorState::Ready);
        self.start_timers();
        self.inner.initializing.store(false, Ordering::SeqCst);
        self.emit(OrchestratorEvent::Ready {
            succeeded: report.succeeded.len(),
            failed: report.failed.len(),
        });
        if !report.is_complete() {
            crate::log_warn!(
                "{} of {} bridge(s) failed to initialize",
                report.failed.len(),
                self.inner.bridges.len()
            );
        }
        InitOutcome::Completed(report)
    }

    fn start_timers(&self) {
        let mut timers = lock(&self.inner.timers);
        if !timers.is_empty() {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        timers.push(ScheduledTask::spawn(
            "health",
            self.inner.options.health_interval,
            move || health_tick(weak.clone()),
        ));
        let weak = Arc::downgrade(&self.inner);
        timers.push(ScheduledTask::spawn(
            "reconcile",
            self.inner.options.reconcile_interval,
            move || reconcile_tick(weak.clone()),
        ));
        crate::log_info!("Health monitoring started");
    }

    fn stop_timers(&self) {
        let timers = std::mem::take(&mut *lock(&self.inner.timers));
        for timer in &timers {
            timer.stop();
        }
        if !timers.is_empty() {
            crate::log_info!("Stopped {} timer(s)", timers.len());
        }
    }

    pub fn is_monitoring(&self) -> bool {
        lock(&self.inner.timers).iter().any(|timer| timer.is_running())
    }

    /// Current per-channel states and their aggregate.
    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot::sample(
            self.inner
                .bridges
                .iter()
                .map(|bridge| ChannelHealth {
                    kind: bridge.kind(),
                    state: bridge.connection_state(),
                })
                .collect(),
        )
    }

    /// Sums of the bridges' own counters.
    pub fn metrics(&self) -> OrchestratorMetrics {
        let mut metrics = OrchestratorMetrics {
            total_channels: self.inner.bridges.len(),
            ..Default::default()
        };
        for bridge in &self.inner.bridges {
            let m = bridge.metrics();
            metrics.messages_sent += m.messages_sent;
            metrics.events_received += m.events_received;
            metrics.active_players += m.active_players;
            metrics.queued_notifications += m.queued_notifications;
            metrics.subscribed_rooms += m.subscribed_rooms;
            metrics.connected_channels += usize::from(m.connected);
        }
        metrics
    }

    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            state: self.state(),
            health: self.health(),
            metrics: self.metrics(),
            monitoring: self.is_monitoring(),
        }
    }

    /// Sample health now, notify on changes and trigger recovery when critical.
    ///
    /// Returns `true` if a restart was scheduled.
    pub fn check_health(&self) -> bool {
        let snapshot = self.health();
        self.observe(snapshot.aggregate);

        if snapshot.aggregate != AggregateHealth::Critical || !self.inner.options.auto_reconnect {
            return false;
        }
        if self.inner.restarting.load(Ordering::SeqCst) {
            return false;
        }
        crate::log_warn!("All channels down, scheduling restart");
        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.restart().await;
        });
        true
    }

    fn observe(&self, health: AggregateHealth) {
        let previous = lock(&self.inner.last_health).replace(health);
        if previous == Some(health) {
            return;
        }
        crate::log_info!(
            "Realtime health {} -> {}",
            previous.map_or("unknown", AggregateHealth::label),
            health.label()
        );
        self.emit(OrchestratorEvent::HealthChanged {
            from: previous,
            to: health,
        });

        let notifier = self.inner.notifier.as_ref();
        match health {
            AggregateHealth::Degraded => notifier.notify(
                Severity::Warning,
                "Some live features are reconnecting.",
                NotifyOptions::titled("Connection").with_duration(Duration::from_secs(5)),
            ),
            AggregateHealth::Critical => notifier.notify(
                Severity::Error,
                "Live updates are unavailable.",
                NotifyOptions::titled("Connection lost")
                    .persistent()
                    .with_action(NotifyAction::new("restart", "Restart"))
                    .with_action(NotifyAction::new("diagnose", "Diagnose")),
            ),
            AggregateHealth::Healthy if previous.is_some() => notifier.notify(
                Severity::Success,
                "Live updates restored.",
                NotifyOptions::titled("Connection").with_duration(Duration::from_secs(3)),
            ),
            AggregateHealth::Healthy => {}
        }
    }

    /// Full coordinated restart: stop timers, tear every bridge down, wait the
    /// grace period, then initialize again. Overlapping calls are ignored, and
    /// an orchestrator whose session ended stays down.
    pub async fn restart(&self) {
        if self.state() == OrchestratorState::Uninitialized {
            crate::log_debug!("Restart ignored, orchestrator is not initialized");
            return;
        }
        if self.inner.restarting.swap(true, Ordering::SeqCst) {
            crate::log_debug!("Restart already in progress");
            return;
        }
        let epoch = self.epoch();
        self.emit(OrchestratorEvent::RestartScheduled);

        let mut state = self.inner.state.subscribe();
        let _ = state
            .wait_for(|state| *state != OrchestratorState::Initializing)
            .await;
        if self.session_ended_since(epoch) {
            self.inner.restarting.store(false, Ordering::SeqCst);
            return;
        }

        self.stop_timers();
        self.emit(OrchestratorEvent::TimersStopped);
        for bridge in &self.inner.bridges {
            bridge.teardown();
        }
        self.emit(OrchestratorEvent::BridgesTornDown);

        tokio::time::sleep(self.inner.options.restart_grace).await;
        if !self.session_ended_since(epoch) {
            self.initialize_all().await;
        }
        self.inner.restarting.store(false, Ordering::SeqCst);
    }

    fn session_ended_since(&self, epoch: u64) -> bool {
        let ended =
            self.epoch() != epoch || self.state() == OrchestratorState::Uninitialized;
        if ended {
            crate::log_info!("Session ended, restart cancelled");
        }
        ended
    }

    /// Stop timers only; bridges keep their channels until their own teardown.
    pub fn shutdown(&self) {
        self.stop_timers();
        crate::log_info!("Orchestrator shut down");
    }

    /// Session ended: stop everything and return to `Uninitialized`.
    ///
    /// Cancels any restart or initialization still in flight.
    pub fn handle_auth_lost(&self) {
        self.inner.session_epoch.fetch_add(1, Ordering::SeqCst);
        self.stop_timers();
        for bridge in &self.inner.bridges {
            bridge.teardown();
        }
        *lock(&self.inner.last_health) = None;
        let previous = self.inner.state.send_replace(OrchestratorState::Uninitialized);
        if previous != OrchestratorState::Uninitialized {
            crate::log_warn!("Session ended, realtime channels torn down");
            self.emit(OrchestratorEvent::SessionEnded);
        }
    }

    /// Credentials were rejected: log the session out, then shut down.
    fn end_session(&self) {
        if let Some(session) = &self.inner.session {
            session.logout();
        }
        self.handle_auth_lost();
    }

    /// Follow session changes: logout tears down, a new login initializes.
    pub fn watch_session(&self, mut users: watch::Receiver<UserId>) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while users.changed().await.is_ok() {
                let user = *users.borrow_and_update();
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let orchestrator = Orchestrator { inner };
                if user.is_anonymous() {
                    if orchestrator.state() != OrchestratorState::Uninitialized {
                        orchestrator.handle_auth_lost();
                    }
                } else if orchestrator.state() == OrchestratorState::Uninitialized {
                    orchestrator.initialize_all().await;
                }
            }
        })
    }
}

async fn health_tick(inner: Weak<Inner>) -> TaskFlow {
    let Some(inner) = inner.upgrade() else {
        return TaskFlow::Stop;
    };
    if (Orchestrator { inner }).check_health() {
        TaskFlow::Stop
    } else {
        TaskFlow::Continue
    }
}

async fn reconcile_tick(inner: Weak<Inner>) -> TaskFlow {
    let Some(inner) = inner.upgrade() else {
        return TaskFlow::Stop;
    };
    let orchestrator = Orchestrator { inner };
    for bridge in orchestrator.bridges() {
        match bridge.reconcile().await {
            Ok(()) => {}
            Err(BridgeError::Api(e)) if e.is_auth_failure() => {
                crate::log_warn!("{} reconcile rejected credentials: {}", bridge.name(), e);
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move { orchestrator.end_session() });
                return TaskFlow::Stop;
            }
            Err(e) => crate::log_warn!("{} reconcile failed: {}", bridge.name(), e),
        }
    }
    TaskFlow::Continue
}

//! The presence state machine.
//!
//! [`PresenceEngine`] consumes samples from a [`LocationSource`], evaluates
//! them against the office fence and:
//! - tracks `Unknown -> Inside | Outside` membership
//! - fires enter/exit callbacks exactly once per flip
//! - arms an auto-logout timer on every `Inside -> Outside` flip and disarms
//!   it on the way back in
//! - records the most recent acquisition failure
//!
//! All mutation happens through [`PresenceEngine::start`],
//! [`PresenceEngine::stop`], [`PresenceEngine::refresh`] and sample
//! ingestion. Consumers only read clones via [`PresenceEngine::snapshot`].
//!
//! Samples are ingested one at a time. Callbacks for one sample finish before
//! the next sample is evaluated, and none start after `stop()` returns.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::geofence::GeofenceEvaluator;
use crate::location::{LocationResult, LocationSource, SampleHandler};
use crate::registry::{CallbackRegistry, GeofenceCallbacks, Registration};
use crate::scheduler::{CancelToken, Scheduler};
use crate::types::{
    GeofenceDefinition, MembershipState, PositionSample, SessionError, SessionErrorKind,
    TrackingSession,
};

/// Default time outside the fence before the session is logged out.
pub const DEFAULT_AUTO_LOGOUT_DELAY: Duration = Duration::from_secs(5 * 60);

/// Default period of the background one-shot refresh.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// The logout capability failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Logout failed: {0}")]
pub struct LogoutError(pub String);

/// Ends the authenticated session when the employee leaves the office.
pub trait LogoutHandler: Send + Sync + 'static {
    /// Log the current user out.
    ///
    /// # Errors
    ///
    /// Returns [`LogoutError`] if the session could not be ended.
    fn logout(&self) -> Result<(), LogoutError>;
}

impl<F> LogoutHandler for F
where
    F: Fn() -> Result<(), LogoutError> + Send + Sync + 'static,
{
    fn logout(&self) -> Result<(), LogoutError> {
        self()
    }
}

/// Tunables of the presence engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceSettings {
    /// The office fence.
    pub fence: GeofenceDefinition,

    /// Accuracy-aware membership rule.
    pub evaluator: GeofenceEvaluator,

    /// Time outside the fence before auto-logout.
    pub auto_logout_delay: Duration,

    /// Period of the background refresh while tracking. `None` disables it.
    pub refresh_interval: Option<Duration>,
}

impl PresenceSettings {
    /// Settings for `fence` with default timings.
    #[must_use]
    pub fn new(fence: GeofenceDefinition) -> Self {
        Self {
            fence,
            evaluator: GeofenceEvaluator::default(),
            auto_logout_delay: DEFAULT_AUTO_LOGOUT_DELAY,
            refresh_interval: Some(DEFAULT_REFRESH_INTERVAL),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Watch,
    Refresh,
}

enum Transition {
    Entered(PositionSample),
    Exited(PositionSample),
}

struct PendingLogout {
    seq: u64,
    token: CancelToken,
}

#[derive(Default)]
struct EngineState {
    session: TrackingSession,
    generation: u64,
    logout_seq: u64,
    pending_logout: Option<PendingLogout>,
    refresher: Option<JoinHandle<()>>,
}

struct EngineInner {
    settings: PresenceSettings,
    source: LocationSource,
    scheduler: Arc<dyn Scheduler>,
    logout: Arc<dyn LogoutHandler>,
    registry: Arc<CallbackRegistry>,
    state: Mutex<EngineState>,
    // Held across evaluation and callback dispatch of one sample.
    dispatch: Mutex<()>,
    // Serializes start/stop.
    lifecycle: Mutex<()>,
}

/// Cloneable handle to a single presence state machine.
#[derive(Clone)]
pub struct PresenceEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for PresenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceEngine")
            .field("settings", &self.inner.settings)
            .field("session", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl PresenceEngine {
    /// Create an idle engine.
    #[must_use]
    pub fn new(
        settings: PresenceSettings,
        source: LocationSource,
        scheduler: Arc<dyn Scheduler>,
        logout: Arc<dyn LogoutHandler>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                settings,
                source,
                scheduler,
                logout,
                registry: CallbackRegistry::new(),
                state: Mutex::new(EngineState::default()),
                dispatch: Mutex::new(()),
                lifecycle: Mutex::new(()),
            }),
        }
    }

    /// The engine's settings.
    #[must_use]
    pub fn settings(&self) -> &PresenceSettings {
        &self.inner.settings
    }

    /// Begin continuous tracking. Returns `false` if already tracking.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> bool {
        let _lifecycle = lock(&self.inner.lifecycle);

        let generation = {
            let mut state = self.inner.lock_state();
            if state.session.active {
                return false;
            }
            state.session.active = true;
            state.generation += 1;
            state.generation
        };

        info!(
            radius_m = self.inner.settings.fence.radius_m,
            "Starting presence tracking"
        );

        let weak = Arc::downgrade(&self.inner);
        let handler: SampleHandler = Arc::new(move |result| {
            if let Some(inner) = weak.upgrade() {
                inner.ingest(Origin::Watch, generation, result);
            }
        });
        self.inner.source.start_tracking(handler);

        if let Some(period) = self
            .inner
            .settings
            .refresh_interval
            .filter(|p| !p.is_zero())
        {
            let task = tokio::spawn(refresh_loop(Arc::downgrade(&self.inner), generation, period));
            self.inner.lock_state().refresher = Some(task);
        }

        true
    }

    /// Stop tracking, cancel any pending auto-logout and silence callbacks.
    ///
    /// Returns `false` if not tracking. The last sample and membership are kept.
    pub fn stop(&self) -> bool {
        let _lifecycle = lock(&self.inner.lifecycle);

        let (pending, refresher) = {
            let mut state = self.inner.lock_state();
            if !state.session.active {
                return false;
            }
            state.session.active = false;
            state.generation += 1;
            state.session.logout_deadline = None;
            (state.pending_logout.take(), state.refresher.take())
        };

        self.inner.source.stop_tracking();
        if let Some(pending) = pending {
            pending.token.cancel();
        }
        if let Some(refresher) = refresher {
            refresher.abort();
        }

        info!("Stopped presence tracking");
        true
    }

    /// Whether continuous tracking is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.lock_state().session.active
    }

    /// A copy of the current session state.
    #[must_use]
    pub fn snapshot(&self) -> TrackingSession {
        self.inner.lock_state().session.clone()
    }

    /// Acquire a fresh one-shot fix and ingest it.
    ///
    /// While idle the sample updates the session without firing callbacks or
    /// arming the logout timer.
    ///
    /// # Errors
    ///
    /// Returns the acquisition failure, which is also recorded on the session.
    pub async fn refresh(&self) -> LocationResult<PositionSample> {
        let generation = self.inner.lock_state().generation;
        let result = self.inner.source.get_current_location().await;
        self.inner.ingest(Origin::Refresh, generation, result.clone());
        result
    }

    /// Subscribe to enter/exit events.
    pub fn register(&self, callbacks: GeofenceCallbacks) -> Registration {
        self.inner.registry.register(callbacks)
    }

    /// The subscription registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.inner.registry
    }
}

impl EngineInner {
    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        lock(&self.state)
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = self.lock_state();
        state.session.active && state.generation == generation
    }

    fn ingest(
        self: &Arc<Self>,
        origin: Origin,
        generation: u64,
        result: LocationResult<PositionSample>,
    ) {
        let _dispatch = lock(&self.dispatch);

        let transition = {
            let mut state = self.lock_state();
            let current = state.session.active && state.generation == generation;

            // Only an idle refresh may update a session it was not started in.
            if !current && (origin == Origin::Watch || state.session.active) {
                debug!(?origin, "Dropping update from a superseded session");
                return;
            }

            match result {
                Err(err) => {
                    warn!(error = %err, ?origin, "Location update failed");
                    state.session.last_error = Some(err.into());
                    None
                }
                Ok(sample) => self.evaluate(&mut state, sample, current),
            }
        };

        if let Some(transition) = transition {
            self.dispatch(generation, &transition);
        }
    }

    fn evaluate(
        self: &Arc<Self>,
        state: &mut EngineState,
        sample: PositionSample,
        live: bool,
    ) -> Option<Transition> {
        let within = self
            .settings
            .evaluator
            .is_within(Some(&sample), &self.settings.fence);
        let next = MembershipState::from_within(within);
        let previous = std::mem::replace(&mut state.session.membership, next);

        state.session.last_sample = Some(sample.clone());
        if state
            .session
            .last_error
            .as_ref()
            .is_some_and(|e| e.kind != SessionErrorKind::Logout)
        {
            state.session.last_error = None;
        }

        if !live {
            return None;
        }

        match (previous, next) {
            (MembershipState::Outside, MembershipState::Inside) => {
                info!("Entered office geofence");
                Self::cancel_logout(state);
                Some(Transition::Entered(sample))
            }
            (MembershipState::Inside, MembershipState::Outside) => {
                warn!(
                    delay_secs = self.settings.auto_logout_delay.as_secs(),
                    "Left office geofence, auto-logout armed"
                );
                self.arm_logout(state);
                Some(Transition::Exited(sample))
            }
            (MembershipState::Unknown, membership) => {
                info!(?membership, "Initial geofence membership");
                None
            }
            _ => None,
        }
    }

    fn dispatch(&self, generation: u64, transition: &Transition) {
        for callbacks in self.registry.snapshot() {
            if !self.is_current(generation) {
                debug!("Tracking stopped during dispatch, skipping remaining callbacks");
                return;
            }
            match transition {
                Transition::Entered(sample) => callbacks.fire_enter(sample),
                Transition::Exited(sample) => callbacks.fire_exit(sample),
            }
        }
    }

    fn arm_logout(self: &Arc<Self>, state: &mut EngineState) {
        Self::cancel_logout(state);

        state.logout_seq += 1;
        let seq = state.logout_seq;
        let delay = self.settings.auto_logout_delay;
        let weak = Arc::downgrade(self);

        let token = self.scheduler.schedule_after(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.fire_logout(seq);
                }
            }),
        );

        state.pending_logout = Some(PendingLogout { seq, token });
        state.session.logout_deadline = chrono::Duration::from_std(delay)
            .ok()
            .map(|d| Utc::now() + d);
    }

    fn cancel_logout(state: &mut EngineState) {
        if let Some(pending) = state.pending_logout.take() {
            pending.token.cancel();
            debug!(seq = pending.seq, "Auto-logout disarmed");
        }
        state.session.logout_deadline = None;
    }

    fn fire_logout(&self, seq: u64) {
        {
            let mut state = self.lock_state();
            if !state.pending_logout.as_ref().is_some_and(|p| p.seq == seq) {
                return;
            }
            state.pending_logout = None;
            state.session.logout_deadline = None;
        }

        warn!(
            delay_secs = self.settings.auto_logout_delay.as_secs(),
            "Outside the office too long, logging out"
        );

        if let Err(err) = self.logout.logout() {
            error!(error = %err, "Auto-logout failed");
            self.lock_state().session.last_error = Some(SessionError {
                kind: SessionErrorKind::Logout,
                message: err.to_string(),
            });
        }
    }
}

async fn refresh_loop(engine: Weak<EngineInner>, generation: u64, period: Duration) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(inner) = engine.upgrade() else {
            return;
        };
        if !inner.is_current(generation) {
            return;
        }
        debug!("Periodic location refresh");
        let result = inner.source.get_current_location().await;
        inner.ingest(Origin::Refresh, generation, result);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::testing::{fix_at, ScriptedProvider};
    use crate::location::{AcquisitionPolicy, LocationError, PositionProvider};
    use crate::scheduler::TokioScheduler;
    use crate::types::Coordinate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const OFFICE: Coordinate = Coordinate::new(22.318_820, 73.187_437);

    struct Harness {
        engine: PresenceEngine,
        provider: Arc<ScriptedProvider>,
        logouts: Arc<AtomicUsize>,
        events: Arc<Mutex<Vec<&'static str>>>,
        _registration: Registration,
    }

    impl Harness {
        fn feed(&self, result: LocationResult<PositionSample>) {
            let generation = self.engine.inner.lock_state().generation;
            self.engine.inner.ingest(Origin::Watch, generation, result);
        }

        fn events(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }

        fn logouts(&self) -> usize {
            self.logouts.load(Ordering::SeqCst)
        }
    }

    fn settings(refresh_interval: Option<Duration>) -> PresenceSettings {
        PresenceSettings {
            refresh_interval,
            ..PresenceSettings::new(GeofenceDefinition::new(OFFICE, 250.0))
        }
    }

    fn harness_with(
        provider: ScriptedProvider,
        settings: PresenceSettings,
        logout_result: Result<(), LogoutError>,
    ) -> Harness {
        let provider = Arc::new(provider);
        let source = LocationSource::new(
            Arc::clone(&provider) as Arc<dyn PositionProvider>,
            AcquisitionPolicy::default(),
        );

        let logouts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&logouts);
        let logout = move || {
            counter.fetch_add(1, Ordering::SeqCst);
            logout_result.clone()
        };

        let engine = PresenceEngine::new(
            settings,
            source,
            Arc::new(TokioScheduler::try_current().unwrap()),
            Arc::new(logout),
        );

        let events = Arc::new(Mutex::new(Vec::new()));
        let (entered, exited) = (Arc::clone(&events), Arc::clone(&events));
        let registration = engine.register(
            GeofenceCallbacks::new()
                .on_enter(move |_| entered.lock().unwrap().push("enter"))
                .on_exit(move |_| exited.lock().unwrap().push("exit")),
        );

        Harness {
            engine,
            provider,
            logouts,
            events,
            _registration: registration,
        }
    }

    fn harness() -> Harness {
        harness_with(ScriptedProvider::new(), settings(None), Ok(()))
    }

    fn inside() -> LocationResult<PositionSample> {
        Ok(PositionSample::new(OFFICE, Some(10.0), Utc::now()))
    }

    fn outside() -> LocationResult<PositionSample> {
        // Roughly 2.2 km north of the office.
        Ok(PositionSample::new(
            Coordinate::new(OFFICE.latitude + 0.02, OFFICE.longitude),
            Some(10.0),
            Utc::now(),
        ))
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    async fn advance_secs(secs: u64) {
        tokio::time::advance(Duration::from_secs(secs)).await;
        settle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop_are_idempotent() {
        let h = harness();
        assert!(h.engine.start());
        assert!(!h.engine.start());
        settle().await;

        assert!(h.engine.is_active());
        assert_eq!(h.provider.watch_request_count(), 1);

        assert!(h.engine.stop());
        assert!(!h.engine.stop());
        assert!(!h.engine.snapshot().active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_membership_fires_nothing() {
        let h = harness();
        h.engine.start();

        h.feed(inside());
        h.feed(inside());
        h.feed(inside());

        assert!(h.events().is_empty());
        assert_eq!(h.engine.snapshot().membership, MembershipState::Inside);
        assert!(h.engine.snapshot().logout_deadline.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_outside_fires_nothing() {
        let h = harness();
        h.engine.start();

        h.feed(outside());

        assert!(h.events().is_empty());
        assert!(h.engine.snapshot().is_outside_office());
        assert!(h.engine.snapshot().logout_deadline.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_flip_fires_once() {
        let h = harness();
        h.engine.start();

        for result in [inside(), outside(), outside(), inside()] {
            h.feed(result);
        }

        assert_eq!(h.events(), vec!["exit", "enter"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_fires_once_after_delay() {
        let h = harness();
        h.engine.start();

        h.feed(inside());
        h.feed(outside());
        assert!(h.engine.snapshot().logout_deadline.is_some());

        advance_secs(299).await;
        assert_eq!(h.logouts(), 0);

        advance_secs(2).await;
        assert_eq!(h.logouts(), 1);
        assert!(h.engine.snapshot().logout_deadline.is_none());

        advance_secs(600).await;
        assert_eq!(h.logouts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reentry_disarms_logout() {
        let h = harness();
        h.engine.start();

        h.feed(inside());
        h.feed(outside());
        advance_secs(200).await;
        h.feed(inside());
        assert!(h.engine.snapshot().logout_deadline.is_none());

        advance_secs(400).await;
        assert_eq!(h.logouts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_exit_restarts_the_timer() {
        let h = harness();
        h.engine.start();

        h.feed(inside());
        h.feed(outside());
        advance_secs(200).await;
        h.feed(inside());
        h.feed(outside());

        advance_secs(200).await;
        assert_eq!(h.logouts(), 0);

        advance_secs(101).await;
        assert_eq!(h.logouts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_disarms_logout_and_silences_callbacks() {
        let h = harness();
        h.engine.start();
        h.feed(inside());
        h.feed(outside());

        let stale_generation = h.engine.inner.lock_state().generation;
        h.engine.stop();
        assert!(h.engine.snapshot().logout_deadline.is_none());

        advance_secs(400).await;
        assert_eq!(h.logouts(), 0);

        h.engine
            .inner
            .ingest(Origin::Watch, stale_generation, inside());
        assert_eq!(h.events(), vec!["exit"]);
        assert_eq!(h.engine.snapshot().membership, MembershipState::Outside);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sample_and_membership_survive_restart() {
        let h = harness();
        h.engine.start();
        h.feed(inside());
        h.engine.stop();

        let session = h.engine.snapshot();
        assert!(session.last_sample.is_some());
        assert!(session.is_within_office());

        h.engine.start();
        h.feed(outside());
        assert_eq!(h.events(), vec!["exit"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_recorded_without_changing_membership() {
        let h = harness();
        h.engine.start();
        h.feed(inside());

        h.feed(Err(LocationError::TimedOut));
        let session = h.engine.snapshot();
        assert_eq!(
            session.last_error.as_ref().map(|e| e.kind),
            Some(SessionErrorKind::TimedOut)
        );
        assert!(session.is_within_office());
        assert!(session.last_sample.is_some());

        h.feed(inside());
        assert!(h.engine.snapshot().last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_failure_is_recorded() {
        let h = harness_with(
            ScriptedProvider::new(),
            settings(None),
            Err(LogoutError("session store offline".into())),
        );
        h.engine.start();
        h.feed(inside());
        h.feed(outside());

        advance_secs(301).await;
        assert_eq!(h.logouts(), 1);

        let error = h.engine.snapshot().last_error.unwrap();
        assert_eq!(error.kind, SessionErrorKind::Logout);
        assert!(error.message.contains("session store offline"));

        // Location samples do not clear a logout failure.
        h.feed(outside());
        assert!(h.engine.snapshot().last_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_stopping_engine_halts_dispatch() {
        let h = harness();
        let engine = h.engine.clone();
        let later = Arc::new(AtomicUsize::new(0));
        let later_count = Arc::clone(&later);

        // Registered after the harness callbacks, so it runs second.
        let _stopper = h.engine.register(GeofenceCallbacks::new().on_exit(move |_| {
            engine.stop();
        }));
        let _after = h.engine.register(GeofenceCallbacks::new().on_exit(move |_| {
            later_count.fetch_add(1, Ordering::SeqCst);
        }));

        h.engine.start();
        h.feed(inside());
        h.feed(outside());

        assert_eq!(h.events(), vec!["exit"]);
        assert_eq!(later.load(Ordering::SeqCst), 0);
        assert!(!h.engine.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_samples_reach_the_session() {
        let (provider, tx) = ScriptedProvider::new().with_channel_watch();
        let h = harness_with(provider, settings(None), Ok(()));
        h.engine.start();

        tx.send(Ok(fix_at(OFFICE.latitude, OFFICE.longitude, 15.0)))
            .unwrap();
        settle().await;

        let session = h.engine.snapshot();
        assert!(session.is_within_office());
        assert_eq!(session.last_sample.unwrap().accuracy_m, Some(15.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_refresh_updates_without_events() {
        let provider = ScriptedProvider::new().with_fixes(vec![
            Ok(fix_at(OFFICE.latitude, OFFICE.longitude, 10.0)),
            Ok(fix_at(OFFICE.latitude + 0.02, OFFICE.longitude, 10.0)),
        ]);
        let h = harness_with(provider, settings(None), Ok(()));

        h.engine.refresh().await.unwrap();
        h.engine.refresh().await.unwrap();

        let session = h.engine.snapshot();
        assert!(!session.active);
        assert!(session.is_outside_office());
        assert!(session.logout_deadline.is_none());
        assert!(h.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_is_recorded() {
        let provider = ScriptedProvider::new().with_fixes(vec![Err(LocationError::PermissionDenied)]);
        let h = harness_with(provider, settings(None), Ok(()));

        let result = h.engine.refresh().await;
        assert_eq!(result, Err(LocationError::PermissionDenied));
        assert_eq!(
            h.engine.snapshot().fix_status(),
            crate::types::FixStatus::Denied
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_refresh_runs_while_tracking() {
        let provider =
            ScriptedProvider::new().with_fixes(vec![Ok(fix_at(OFFICE.latitude, OFFICE.longitude, 10.0))]);
        let h = harness_with(provider, settings(Some(Duration::from_secs(60))), Ok(()));
        h.engine.start();
        settle().await;
        assert_eq!(h.provider.fix_request_count(), 0);

        advance_secs(61).await;
        assert_eq!(h.provider.fix_request_count(), 1);
        assert!(h.engine.snapshot().is_within_office());

        h.engine.stop();
        advance_secs(600).await;
        assert_eq!(h.provider.fix_request_count(), 1);
    }
}

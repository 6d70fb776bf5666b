//! Application state shared across handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use fencepost_core::{
    default_data_dir, AttendanceDesk, AttendanceRecorder, Config, JournalRecorder,
    LocationSource, LogoutError, LogoutHandler, PresenceEngine, PushPositionProvider,
    Registration, TimingValidator, TokioScheduler,
};
use tracing::{info, warn};

/// Shared state handle used by all handlers.
pub type SharedState = Arc<AppState>;

/// The employee's authenticated session.
///
/// The presence engine's auto-logout closes it; `POST /api/session/login`
/// re-opens it.
#[derive(Debug, Default)]
pub struct SessionGate {
    logged_out: AtomicBool,
}

impl SessionGate {
    /// Whether the session has been closed.
    #[must_use]
    pub fn is_logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }

    /// Re-open the session. Returns `true` if it was closed.
    pub fn login(&self) -> bool {
        self.logged_out.swap(false, Ordering::SeqCst)
    }
}

impl LogoutHandler for SessionGate {
    fn logout(&self) -> Result<(), LogoutError> {
        if !self.logged_out.swap(true, Ordering::SeqCst) {
            warn!("Employee left the office, session logged out");
        }
        Ok(())
    }
}

/// Everything the handlers operate on.
///
/// One long-lived presence engine per server; the device feeds it through
/// the push provider.
pub struct AppState {
    /// The loaded configuration.
    pub config: Config,

    /// Fixes pushed by the employee's device.
    pub provider: Arc<PushPositionProvider>,

    /// The presence state machine.
    pub engine: PresenceEngine,

    /// Check-in/check-out over the engine.
    pub desk: AttendanceDesk,

    /// Session closed by auto-logout.
    pub session: Arc<SessionGate>,

    /// Keeps automatic attendance subscribed for the server's lifetime.
    auto_attendance: Option<Registration>,

    started_at: Instant,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("engine", &self.engine)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create state from `config`, journaling to its data directory.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or no data directory
    /// is known.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let data_dir = match &config.system.data_dir {
            Some(dir) => dir.clone(),
            None => default_data_dir()?,
        };
        info!(data_dir = %data_dir.display(), "Using attendance journal");
        Self::with_recorder(config, Arc::new(JournalRecorder::new(data_dir)))
    }

    /// Create state from `config` with an explicit attendance recorder.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_recorder(
        config: Config,
        recorder: Arc<dyn AttendanceRecorder>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let settings = config.presence_settings()?;

        let provider = Arc::new(PushPositionProvider::new());
        let source = build_source(&config, Arc::clone(&provider))?;

        let scheduler = TokioScheduler::try_current().context("no Tokio runtime")?;
        let session = Arc::new(SessionGate::default());
        let engine = PresenceEngine::new(
            settings,
            source,
            Arc::new(scheduler),
            Arc::clone(&session) as Arc<dyn LogoutHandler>,
        );

        let desk = AttendanceDesk::new(
            engine.clone(),
            TimingValidator::new(config.schedule.clone()),
            recorder,
            config.system.timezone,
        );

        let auto_attendance = config
            .tracking
            .auto_attendance
            .then(|| desk.enable_auto_attendance());

        if config.tracking.start_on_launch {
            engine.start();
        }

        Ok(Self {
            config,
            provider,
            engine,
            desk,
            session,
            auto_attendance,
            started_at: Instant::now(),
        })
    }

    /// Seconds since the state was created.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Whether automatic attendance is subscribed.
    #[must_use]
    pub const fn auto_attendance_enabled(&self) -> bool {
        self.auto_attendance.is_some()
    }
}

#[cfg(feature = "http-geocoder")]
fn build_source(
    config: &Config,
    provider: Arc<PushPositionProvider>,
) -> anyhow::Result<LocationSource> {
    let source = LocationSource::new(provider, config.acquisition.clone());
    if !config.geocoding.enabled {
        return Ok(source);
    }
    let geocoder = fencepost_core::HttpReverseGeocoder::new(
        &config.geocoding.endpoint,
        config.geocoding.language.clone(),
    )?;
    Ok(source.with_geocoder(Arc::new(geocoder)))
}

#[cfg(not(feature = "http-geocoder"))]
#[allow(clippy::unnecessary_wraps)]
fn build_source(
    config: &Config,
    provider: Arc<PushPositionProvider>,
) -> anyhow::Result<LocationSource> {
    if config.geocoding.enabled {
        warn!("Built without http-geocoder, addresses will not be resolved");
    }
    Ok(LocationSource::new(provider, config.acquisition.clone()))
}

//! Application configuration management.
//!
//! Handles loading, saving, and validating fencepost configuration:
//! - Office locations and which one is active
//! - Tracking timings and the accuracy buffer
//! - Location acquisition timeouts and retry budget
//! - The work schedule
//! - Reverse geocoding
//! - Timezone and data directory
//!
//! Configuration is read from a TOML file and overlaid with environment
//! variables prefixed `FENCEPOST`, using `__` between path segments:
//! `FENCEPOST__TRACKING__AUTO_LOGOUT_SECS=120`.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::geocode::DEFAULT_GEOCODER_ENDPOINT;
use crate::geofence::{
    GeofenceEvaluator, DEFAULT_ACCURACY_THRESHOLD_M, DEFAULT_BUFFER_MAX_M, DEFAULT_BUFFER_MIN_M,
};
use crate::location::AcquisitionPolicy;
use crate::presence::{PresenceSettings, DEFAULT_AUTO_LOGOUT_DELAY, DEFAULT_REFRESH_INTERVAL};
use crate::timing::TimingPolicy;
use crate::types::{Coordinate, GeofenceDefinition};

/// Prefix of environment variables that override file settings.
pub const ENV_PREFIX: &str = "FENCEPOST";

/// Largest accepted retry budget for location acquisition.
pub const MAX_RETRY_BUDGET: u32 = 5;

// =============================================================================
// ERRORS
// =============================================================================

/// Errors from loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// The configuration file could not be read.
    #[error("Failed to read {path}: {source}")]
    ReadError {
        /// File that failed.
        path: String,
        /// Underlying error.
        source: io::Error,
    },

    /// The configuration file could not be written.
    #[error("Failed to write {path}: {source}")]
    WriteError {
        /// File that failed.
        path: String,
        /// Underlying error.
        source: io::Error,
    },

    /// The layered sources could not be parsed into a configuration.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] ::config::ConfigError),

    /// The configuration could not be serialized to TOML.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A single field is invalid.
    #[error("Invalid {field}: {message}")]
    ValidationError {
        /// Dotted path of the field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields are invalid.
    #[error("{} configuration errors: {}", .0.len(), join_errors(.0))]
    MultipleValidationErrors(Vec<ConfigError>),
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// =============================================================================
// SECTIONS
// =============================================================================

/// A named office fence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OfficeLocation {
    /// Display name, unique among offices.
    #[schema(example = "Main Office")]
    pub name: String,

    /// Fence center latitude.
    #[schema(example = 22.31882)]
    pub latitude: f64,

    /// Fence center longitude.
    #[schema(example = 73.187437)]
    pub longitude: f64,

    /// Fence radius in meters.
    #[schema(example = 250.0)]
    pub radius_m: f64,
}

impl OfficeLocation {
    /// The fence this office defines.
    #[must_use]
    pub const fn fence(&self) -> GeofenceDefinition {
        GeofenceDefinition::new(Coordinate::new(self.latitude, self.longitude), self.radius_m)
    }
}

impl Default for OfficeLocation {
    fn default() -> Self {
        Self {
            name: "Main Office".to_string(),
            latitude: 22.318_820,
            longitude: 73.187_437,
            radius_m: 250.0,
        }
    }
}

/// Office fences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct OfficeConfig {
    /// Name of the active office. The first office when unset.
    pub active: Option<String>,

    /// Known offices.
    pub locations: Vec<OfficeLocation>,
}

impl Default for OfficeConfig {
    fn default() -> Self {
        Self {
            active: None,
            locations: vec![OfficeLocation::default()],
        }
    }
}

/// Presence tracking timings and tolerances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct TrackingConfig {
    /// Seconds outside the fence before auto-logout.
    #[schema(example = 300)]
    pub auto_logout_secs: u64,

    /// Seconds between background refreshes while tracking. 0 disables them.
    #[schema(example = 60)]
    pub refresh_interval_secs: u64,

    /// Smallest accuracy buffer added to the radius.
    #[schema(example = 50.0)]
    pub buffer_min_m: f64,

    /// Largest accuracy buffer added to the radius.
    #[schema(example = 500.0)]
    pub buffer_max_m: f64,

    /// Accuracy at or below which a fix counts as accurate.
    #[schema(example = 100.0)]
    pub accuracy_threshold_m: f64,

    /// Start tracking when the server starts.
    pub start_on_launch: bool,

    /// Check in and out automatically on entering and leaving the office.
    pub auto_attendance: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            auto_logout_secs: DEFAULT_AUTO_LOGOUT_DELAY.as_secs(),
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL.as_secs(),
            buffer_min_m: DEFAULT_BUFFER_MIN_M,
            buffer_max_m: DEFAULT_BUFFER_MAX_M,
            accuracy_threshold_m: DEFAULT_ACCURACY_THRESHOLD_M,
            start_on_launch: true,
            auto_attendance: false,
        }
    }
}

impl TrackingConfig {
    /// The geofence evaluator these settings describe.
    #[must_use]
    pub const fn evaluator(&self) -> GeofenceEvaluator {
        GeofenceEvaluator {
            buffer_min_m: self.buffer_min_m,
            buffer_max_m: self.buffer_max_m,
            accuracy_threshold_m: self.accuracy_threshold_m,
        }
    }

    /// Time outside the fence before auto-logout.
    #[must_use]
    pub const fn auto_logout_delay(&self) -> Duration {
        Duration::from_secs(self.auto_logout_secs)
    }

    /// Background refresh period, if enabled.
    #[must_use]
    pub const fn refresh_interval(&self) -> Option<Duration> {
        if self.refresh_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.refresh_interval_secs))
        }
    }
}

/// Reverse geocoding settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct GeocodingConfig {
    /// Whether samples are enriched with addresses.
    pub enabled: bool,

    /// Reverse-geocoding endpoint.
    #[schema(example = "https://api.bigdatacloud.net/data/reverse-geocode-client")]
    pub endpoint: String,

    /// Language of returned place names.
    #[schema(example = "en")]
    pub language: String,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_GEOCODER_ENDPOINT.to_string(),
            language: "en".to_string(),
        }
    }
}

/// System-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct SystemConfig {
    /// Timezone punches are stamped in.
    #[serde(with = "timezone_serde")]
    #[schema(value_type = String, example = "Asia/Kolkata")]
    pub timezone: Tz,

    /// Where the attendance journal lives. Platform default when unset.
    #[schema(value_type = Option<String>)]
    pub data_dir: Option<PathBuf>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Kolkata,
            data_dir: None,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Config {
    /// Office fences.
    pub office: OfficeConfig,

    /// Presence tracking.
    pub tracking: TrackingConfig,

    /// Location acquisition.
    pub acquisition: AcquisitionPolicy,

    /// Work schedule.
    pub schedule: TimingPolicy,

    /// Reverse geocoding.
    pub geocoding: GeocodingConfig,

    /// System settings.
    pub system: SystemConfig,
}

// =============================================================================
// LOADING AND SAVING
// =============================================================================

impl Config {
    /// The default configuration file path.
    ///
    /// On Linux: `/etc/fencepost/config.toml`. Elsewhere the platform config
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if no platform directory is known.
    pub fn default_path() -> ConfigResult<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            Ok(PathBuf::from("/etc/fencepost/config.toml"))
        }
        #[cfg(not(target_os = "linux"))]
        {
            directories::ProjectDirs::from("", "", "fencepost")
                .map(|dirs| dirs.config_dir().join("config.toml"))
                .ok_or_else(|| ConfigError::NotFound("platform config directory".into()))
        }
    }

    /// Load from `path`, which must exist, overlaid with the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or any source fails to parse.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Self::load_layered(path, ENV_PREFIX)
    }

    /// Load from `path` if it exists, else from defaults, overlaid with the
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source exists but fails to parse.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "No configuration file, using defaults");
        }
        Self::load_layered(path, ENV_PREFIX)
    }

    fn load_layered(path: &Path, env_prefix: &str) -> ConfigResult<Self> {
        let settings = ::config::Config::builder()
            .add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                ::config::Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Write as pretty TOML to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.display().to_string(),
            source,
        })?;
        Ok(())
    }

    /// The office presence is evaluated against.
    #[must_use]
    pub fn active_office(&self) -> Option<&OfficeLocation> {
        match &self.office.active {
            Some(name) => self.office.locations.iter().find(|o| &o.name == name),
            None => self.office.locations.first(),
        }
    }

    /// Presence engine settings for the active office.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if no office is active.
    pub fn presence_settings(&self) -> ConfigResult<PresenceSettings> {
        let office = self
            .active_office()
            .ok_or_else(|| invalid("office.active", "no active office location"))?;

        Ok(PresenceSettings {
            fence: office.fence(),
            evaluator: self.tracking.evaluator(),
            auto_logout_delay: self.tracking.auto_logout_delay(),
            refresh_interval: self.tracking.refresh_interval(),
        })
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

impl Config {
    /// Check every setting, reporting all problems at once.
    ///
    /// # Errors
    ///
    /// Returns the single [`ConfigError::ValidationError`], or
    /// [`ConfigError::MultipleValidationErrors`] when there are several.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        self.validate_offices(&mut errors);
        self.validate_tracking(&mut errors);
        self.validate_acquisition(&mut errors);
        self.validate_schedule(&mut errors);
        self.validate_geocoding(&mut errors);

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }

    fn validate_offices(&self, errors: &mut Vec<ConfigError>) {
        if self.office.locations.is_empty() {
            errors.push(invalid("office.locations", "at least one office is required"));
        }

        let mut names = HashSet::new();
        for (i, office) in self.office.locations.iter().enumerate() {
            let field = |name: &str| format!("office.locations[{i}].{name}");

            if office.name.trim().is_empty() {
                errors.push(invalid(field("name"), "must not be empty"));
            } else if !names.insert(office.name.as_str()) {
                errors.push(invalid(field("name"), format!("duplicate office '{}'", office.name)));
            }
            if !Coordinate::new(office.latitude, office.longitude).is_valid() {
                errors.push(invalid(
                    field("latitude"),
                    format!(
                        "({}, {}) is not a valid coordinate",
                        office.latitude, office.longitude
                    ),
                ));
            }
            if !(office.radius_m.is_finite() && office.radius_m > 0.0) {
                errors.push(invalid(field("radius_m"), "must be greater than 0"));
            }
        }

        if let Some(active) = &self.office.active {
            if !self.office.locations.iter().any(|o| &o.name == active) {
                errors.push(invalid(
                    "office.active",
                    format!("no office named '{active}'"),
                ));
            }
        }
    }

    fn validate_tracking(&self, errors: &mut Vec<ConfigError>) {
        let t = &self.tracking;
        if t.auto_logout_secs == 0 {
            errors.push(invalid("tracking.auto_logout_secs", "must be greater than 0"));
        }
        if !(t.buffer_min_m.is_finite() && t.buffer_min_m >= 0.0) {
            errors.push(invalid("tracking.buffer_min_m", "must be 0 or more"));
        }
        if !(t.buffer_max_m.is_finite() && t.buffer_max_m >= t.buffer_min_m) {
            errors.push(invalid(
                "tracking.buffer_max_m",
                "must be at least tracking.buffer_min_m",
            ));
        }
        if !(t.accuracy_threshold_m.is_finite() && t.accuracy_threshold_m > 0.0) {
            errors.push(invalid("tracking.accuracy_threshold_m", "must be greater than 0"));
        }
    }

    fn validate_acquisition(&self, errors: &mut Vec<ConfigError>) {
        let a = &self.acquisition;
        if a.primary_timeout_secs == 0 {
            errors.push(invalid("acquisition.primary_timeout_secs", "must be greater than 0"));
        }
        if a.relaxed_timeout_secs == 0 {
            errors.push(invalid("acquisition.relaxed_timeout_secs", "must be greater than 0"));
        }
        if a.max_retries > MAX_RETRY_BUDGET {
            errors.push(invalid(
                "acquisition.max_retries",
                format!("must be at most {MAX_RETRY_BUDGET}"),
            ));
        }
    }

    fn validate_schedule(&self, errors: &mut Vec<ConfigError>) {
        let s = &self.schedule;
        if s.work_end <= s.work_start {
            errors.push(invalid("schedule.work_end", "must be after schedule.work_start"));
        }
        if !(s.min_full_day_hours > 0.0 && s.min_full_day_hours <= 24.0) {
            errors.push(invalid(
                "schedule.min_full_day_hours",
                "must be between 0 and 24",
            ));
        }
    }

    fn validate_geocoding(&self, errors: &mut Vec<ConfigError>) {
        let g = &self.geocoding;
        if g.enabled && !(g.endpoint.starts_with("http://") || g.endpoint.starts_with("https://"))
        {
            errors.push(invalid("geocoding.endpoint", "must be an http(s) URL"));
        }
    }
}

mod timezone_serde {
    use chrono_tz::Tz;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(tz.name())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Tz, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|_| serde::de::Error::custom(format!("unknown timezone '{s}'")))
    }
}

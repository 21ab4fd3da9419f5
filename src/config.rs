use crate::frame::Rotation;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScannerConfig {
    pub camera: CameraConfig,
    pub scanner: ScanConfig,
    pub metadata: MetadataConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Whether the user granted camera access
    #[serde(default = "default_permission_granted")]
    pub permission_granted: bool,

    /// Camera resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Frames per second
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// Sensor rotation reported with every frame
    #[serde(default = "default_camera_rotation")]
    pub rotation: Rotation,

    /// Frames handed to the consumer and not yet released
    #[serde(default = "default_max_outstanding_frames")]
    pub max_outstanding_frames: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScanConfig {
    /// Report camera initialization failures on screen instead of only logging them
    #[serde(default = "default_surface_camera_errors")]
    pub surface_camera_errors: bool,

    /// Cancel in-flight decodes when the pipeline stops
    #[serde(default = "default_cancel_in_flight_on_stop")]
    pub cancel_in_flight_on_stop: bool,

    /// Simulated decoder latency in milliseconds
    #[serde(default = "default_decode_latency_ms")]
    pub decode_latency_ms: u64,

    /// Codes the simulated decoder cycles through
    #[serde(default = "default_simulated_codes")]
    pub simulated_codes: Vec<String>,

    /// Every n-th frame carries a code (0 disables)
    #[serde(default = "default_hit_every")]
    pub hit_every: u64,

    /// Every n-th frame fails to decode (0 disables)
    #[serde(default = "default_fail_every")]
    pub fail_every: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MetadataConfig {
    /// Base URL of the metadata API
    #[serde(default = "default_metadata_base_url")]
    pub base_url: String,

    /// Look up every newly decoded numeric value automatically
    #[serde(default = "default_auto_lookup")]
    pub auto_lookup: bool,

    /// Request timeout; unset leaves the HTTP client default in place
    #[serde(default)]
    pub request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Upper bound for draining in-flight work at shutdown
    #[serde(default = "default_shutdown_timeout_seconds")]
    pub shutdown_timeout_seconds: u64,
}

impl ScannerConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("qrscan.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.permission_granted", default_permission_granted())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .set_default(
                "camera.max_outstanding_frames",
                default_max_outstanding_frames() as i64,
            )?
            .set_default("scanner.surface_camera_errors", default_surface_camera_errors())?
            .set_default(
                "scanner.cancel_in_flight_on_stop",
                default_cancel_in_flight_on_stop(),
            )?
            .set_default("scanner.decode_latency_ms", default_decode_latency_ms())?
            .set_default("scanner.simulated_codes", default_simulated_codes())?
            .set_default("scanner.hit_every", default_hit_every())?
            .set_default("scanner.fail_every", default_fail_every())?
            .set_default("metadata.base_url", default_metadata_base_url())?
            .set_default("metadata.auto_lookup", default_auto_lookup())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default(
                "system.shutdown_timeout_seconds",
                default_shutdown_timeout_seconds(),
            )?
            .add_source(File::with_name(&path_str).required(false))
            // QRSCAN_METADATA__BASE_URL -> metadata.base_url
            .add_source(
                Environment::with_prefix("QRSCAN")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: ScannerConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.camera.max_outstanding_frames == 0 {
            return Err(ConfigError::Message(
                "Camera max_outstanding_frames must be greater than 0".to_string(),
            ));
        }

        if self.scanner.hit_every > 0 && self.scanner.simulated_codes.is_empty() {
            return Err(ConfigError::Message(
                "Scanner simulated_codes must not be empty when hit_every is set".to_string(),
            ));
        }

        if url::Url::parse(&self.metadata.base_url).is_err() {
            return Err(ConfigError::Message(format!(
                "Metadata base_url is not a valid URL: {}",
                self.metadata.base_url
            )));
        }

        if self.metadata.request_timeout_seconds == Some(0) {
            return Err(ConfigError::Message(
                "Metadata request_timeout_seconds must be greater than 0 when set".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Default configuration rendered as TOML
    pub fn default_toml() -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(&Self::default())
    }
}

impl CameraConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_micros(1_000_000u64 / self.fps.max(1) as u64)
    }
}

impl MetadataConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_seconds.map(Duration::from_secs)
    }
}

impl SystemConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            permission_granted: default_permission_granted(),
            resolution: default_camera_resolution(),
            fps: default_camera_fps(),
            rotation: default_camera_rotation(),
            max_outstanding_frames: default_max_outstanding_frames(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            surface_camera_errors: default_surface_camera_errors(),
            cancel_in_flight_on_stop: default_cancel_in_flight_on_stop(),
            decode_latency_ms: default_decode_latency_ms(),
            simulated_codes: default_simulated_codes(),
            hit_every: default_hit_every(),
            fail_every: default_fail_every(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            base_url: default_metadata_base_url(),
            auto_lookup: default_auto_lookup(),
            request_timeout_seconds: None,
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: default_event_bus_capacity(),
            shutdown_timeout_seconds: default_shutdown_timeout_seconds(),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            scanner: ScanConfig::default(),
            metadata: MetadataConfig::default(),
            system: SystemConfig::default(),
        }
    }
}

// Default value functions
fn default_permission_granted() -> bool {
    true
}
fn default_camera_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_camera_fps() -> u32 {
    30
}
fn default_camera_rotation() -> Rotation {
    Rotation::Rotate0
}
fn default_max_outstanding_frames() -> usize {
    1
}

fn default_surface_camera_errors() -> bool {
    true
}
fn default_cancel_in_flight_on_stop() -> bool {
    false
}
fn default_decode_latency_ms() -> u64 {
    40
}
fn default_simulated_codes() -> Vec<String> {
    vec!["42".to_string(), "1337".to_string()]
}
fn default_hit_every() -> u64 {
    15
}
fn default_fail_every() -> u64 {
    0
}

fn default_metadata_base_url() -> String {
    "https://your-api-server.com/".to_string()
}
fn default_auto_lookup() -> bool {
    false
}

fn default_event_bus_capacity() -> usize {
    100
}
fn default_shutdown_timeout_seconds() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ScannerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.camera.max_outstanding_frames, 1);
        assert!(config.scanner.surface_camera_errors);
        assert!(!config.scanner.cancel_in_flight_on_stop);
        assert_eq!(config.metadata.request_timeout(), None);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ScannerConfig::default();

        config.camera.resolution = (0, 0);
        assert!(config.validate().is_err());

        config.camera.resolution = (640, 480);
        assert!(config.validate().is_ok());

        config.metadata.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.metadata.base_url = "http://localhost:8080/".to_string();
        config.scanner.simulated_codes.clear();
        assert!(config.validate().is_err());

        config.scanner.hit_every = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[camera]
fps = 15
rotation = "Rotate90"

[metadata]
base_url = "http://127.0.0.1:9000/"
auto_lookup = true
request_timeout_seconds = 3
"#
        )
        .unwrap();

        let config = ScannerConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.camera.fps, 15);
        assert_eq!(config.camera.rotation, Rotation::Rotate90);
        assert_eq!(config.camera.resolution, (640, 480));
        assert!(config.metadata.auto_lookup);
        assert_eq!(config.metadata.request_timeout(), Some(Duration::from_secs(3)));
        assert_eq!(config.scanner.simulated_codes, default_simulated_codes());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ScannerConfig::load_from_file("/nonexistent/qrscan.toml").unwrap();
        assert_eq!(config.camera.fps, default_camera_fps());
        assert_eq!(config.metadata.base_url, default_metadata_base_url());
    }

    #[test]
    fn test_default_toml_round_trips() {
        let rendered = ScannerConfig::default_toml().unwrap();
        let parsed: ScannerConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.camera.fps, default_camera_fps());
        assert_eq!(parsed.scanner.simulated_codes, default_simulated_codes());
    }
}

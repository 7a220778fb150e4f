use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TurretConfig {
    pub camera: CameraConfig,
    pub detector: DetectorConfig,
    pub debounce: DebounceConfig,
    pub turret: TurretMotionConfig,
    pub recording: RecordingConfig,
    pub system: SystemConfig,
}

/// Where raw frames come from
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Synthetic,
    Directory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Analysis resolution (width, height); every frame is resized to this
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Frames per second produced by the synthetic source
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// Mirror frames horizontally before analysis
    #[serde(default = "default_flip_horizontal")]
    pub flip_horizontal: bool,

    #[serde(default = "default_source_kind")]
    pub source: SourceKind,

    /// Image directory replayed by the directory source
    #[serde(default)]
    pub directory: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectorConfig {
    /// Minimum region area (pixels) that counts as motion
    #[serde(default = "default_min_motion_area")]
    pub min_motion_area: f64,

    /// Per-pixel intensity delta that marks a pixel as changed
    #[serde(default = "default_diff_threshold")]
    pub diff_threshold: u8,

    /// 3x3 dilation passes applied to the binary mask
    #[serde(default = "default_dilate_iterations")]
    pub dilate_iterations: u32,

    /// Gaussian blur sigma applied during preprocessing (0 disables)
    #[serde(default = "default_blur_sigma")]
    pub blur_sigma: f32,

    /// Replace the reference frame every N analyzed frames
    #[serde(default = "default_reference_refresh_interval")]
    pub reference_refresh_interval_frames: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DebounceConfig {
    /// Frames motion stays active after the last positive frame
    #[serde(default = "default_motion_hold_frames")]
    pub motion_hold_frames: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TurretMotionConfig {
    /// Run the oscillating sweep at all
    #[serde(default = "default_turret_enabled")]
    pub enabled: bool,

    /// Duration of one rotation leg
    #[serde(default = "default_leg_duration")]
    pub leg_duration_seconds: f64,

    /// Wait between leg decision points
    #[serde(default = "default_wait_duration")]
    pub wait_duration_seconds: f64,

    /// Legs in one direction before reversing
    #[serde(default = "default_legs_before_reverse")]
    pub legs_before_reverse: u32,

    /// Pause after halting the motor before the leg is reported finished
    #[serde(default = "default_motor_stop_delay")]
    pub motor_stop_delay_seconds: f64,

    /// Window after a leg during which motion is ignored
    #[serde(default = "default_settle_duration")]
    pub settle_duration_seconds: f64,

    /// A leg without a completion signal after this long is treated as stalled
    #[serde(default = "default_max_rotation_duration")]
    pub max_rotation_duration_seconds: f64,

    /// Simulated platform speed
    #[serde(default = "default_degrees_per_second")]
    pub degrees_per_second: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RecordingConfig {
    /// Initial state of the user-toggleable recording flag
    #[serde(default = "default_recording_enabled")]
    pub enabled: bool,

    /// Base path for recordings
    #[serde(default = "default_recording_path")]
    pub path: String,

    /// Nominal playback rate stored in the metadata
    #[serde(default = "default_recording_fps")]
    pub fps: f64,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Write a metadata.json next to each recording
    #[serde(default = "default_save_metadata")]
    pub save_metadata: bool,

    /// Draw a box around each motion region on recorded frames
    #[serde(default = "default_annotate_regions")]
    pub annotate_regions: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Back-off after a transient frame source failure
    #[serde(default = "default_frame_interval")]
    pub frame_interval_seconds: f64,
}

impl TurretMotionConfig {
    pub fn leg_duration(&self) -> Duration {
        Duration::from_secs_f64(self.leg_duration_seconds)
    }

    pub fn wait_duration(&self) -> Duration {
        Duration::from_secs_f64(self.wait_duration_seconds)
    }

    pub fn motor_stop_delay(&self) -> Duration {
        Duration::from_secs_f64(self.motor_stop_delay_seconds)
    }

    pub fn settle_duration(&self) -> Duration {
        Duration::from_secs_f64(self.settle_duration_seconds)
    }

    pub fn max_rotation_duration(&self) -> Duration {
        Duration::from_secs_f64(self.max_rotation_duration_seconds)
    }
}

impl SystemConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(self.frame_interval_seconds)
    }
}

impl TurretConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("turretcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("camera.flip_horizontal", default_flip_horizontal())?
            .set_default("camera.source", "synthetic")?
            .set_default("detector.min_motion_area", default_min_motion_area())?
            .set_default("detector.diff_threshold", default_diff_threshold() as u32)?
            .set_default("detector.dilate_iterations", default_dilate_iterations())?
            .set_default("detector.blur_sigma", default_blur_sigma() as f64)?
            .set_default(
                "detector.reference_refresh_interval_frames",
                default_reference_refresh_interval(),
            )?
            .set_default("debounce.motion_hold_frames", default_motion_hold_frames())?
            .set_default("turret.enabled", default_turret_enabled())?
            .set_default("turret.leg_duration_seconds", default_leg_duration())?
            .set_default("turret.wait_duration_seconds", default_wait_duration())?
            .set_default("turret.legs_before_reverse", default_legs_before_reverse())?
            .set_default("turret.motor_stop_delay_seconds", default_motor_stop_delay())?
            .set_default("turret.settle_duration_seconds", default_settle_duration())?
            .set_default(
                "turret.max_rotation_duration_seconds",
                default_max_rotation_duration(),
            )?
            .set_default("turret.degrees_per_second", default_degrees_per_second())?
            .set_default("recording.enabled", default_recording_enabled())?
            .set_default("recording.path", default_recording_path())?
            .set_default("recording.fps", default_recording_fps())?
            .set_default("recording.jpeg_quality", default_jpeg_quality() as u32)?
            .set_default("recording.save_metadata", default_save_metadata())?
            .set_default("recording.annotate_regions", default_annotate_regions())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default("system.frame_interval_seconds", default_frame_interval())?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // TURRETCAM_DETECTOR__MIN_MOTION_AREA=5000
            .add_source(
                Environment::with_prefix("TURRETCAM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: TurretConfig = settings.try_deserialize()?;

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

        if self.camera.source == SourceKind::Directory && self.camera.directory.is_none() {
            return Err(ConfigError::Message(
                "Directory source requires camera.directory".to_string(),
            ));
        }

        if !self.detector.min_motion_area.is_finite() || self.detector.min_motion_area < 0.0 {
            return Err(ConfigError::Message(
                "Detector min_motion_area must be a non-negative number".to_string(),
            ));
        }

        if !self.detector.blur_sigma.is_finite() || self.detector.blur_sigma < 0.0 {
            return Err(ConfigError::Message(
                "Detector blur_sigma must be a non-negative number".to_string(),
            ));
        }

        if self.detector.reference_refresh_interval_frames == 0 {
            return Err(ConfigError::Message(
                "Reference refresh interval must be greater than 0".to_string(),
            ));
        }

        if self.debounce.motion_hold_frames == 0 {
            return Err(ConfigError::Message(
                "Motion hold frames must be greater than 0".to_string(),
            ));
        }

        let turret = &self.turret;
        for (name, value) in [
            ("leg_duration_seconds", turret.leg_duration_seconds),
            ("wait_duration_seconds", turret.wait_duration_seconds),
            ("max_rotation_duration_seconds", turret.max_rotation_duration_seconds),
            ("degrees_per_second", turret.degrees_per_second),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Message(format!(
                    "Turret {} must be greater than 0",
                    name
                )));
            }
        }

        for (name, value) in [
            ("motor_stop_delay_seconds", turret.motor_stop_delay_seconds),
            ("settle_duration_seconds", turret.settle_duration_seconds),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Message(format!(
                    "Turret {} must not be negative",
                    name
                )));
            }
        }

        if turret.legs_before_reverse == 0 {
            return Err(ConfigError::Message(
                "Turret legs_before_reverse must be greater than 0".to_string(),
            ));
        }

        if turret.max_rotation_duration_seconds
            <= turret.leg_duration_seconds + turret.motor_stop_delay_seconds
        {
            return Err(ConfigError::Message(
                "Turret max_rotation_duration_seconds must exceed one leg plus motor stop delay"
                    .to_string(),
            ));
        }

        if !(1..=100).contains(&self.recording.jpeg_quality) {
            return Err(ConfigError::Message(
                "Recording jpeg_quality must be within 1..=100".to_string(),
            ));
        }

        if !self.recording.fps.is_finite() || self.recording.fps <= 0.0 {
            return Err(ConfigError::Message(
                "Recording fps must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if !self.system.frame_interval_seconds.is_finite() || self.system.frame_interval_seconds < 0.0
        {
            return Err(ConfigError::Message(
                "System frame_interval_seconds must not be negative".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for TurretConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                resolution: default_camera_resolution(),
                fps: default_camera_fps(),
                flip_horizontal: default_flip_horizontal(),
                source: default_source_kind(),
                directory: None,
            },
            detector: DetectorConfig {
                min_motion_area: default_min_motion_area(),
                diff_threshold: default_diff_threshold(),
                dilate_iterations: default_dilate_iterations(),
                blur_sigma: default_blur_sigma(),
                reference_refresh_interval_frames: default_reference_refresh_interval(),
            },
            debounce: DebounceConfig {
                motion_hold_frames: default_motion_hold_frames(),
            },
            turret: TurretMotionConfig {
                enabled: default_turret_enabled(),
                leg_duration_seconds: default_leg_duration(),
                wait_duration_seconds: default_wait_duration(),
                legs_before_reverse: default_legs_before_reverse(),
                motor_stop_delay_seconds: default_motor_stop_delay(),
                settle_duration_seconds: default_settle_duration(),
                max_rotation_duration_seconds: default_max_rotation_duration(),
                degrees_per_second: default_degrees_per_second(),
            },
            recording: RecordingConfig {
                enabled: default_recording_enabled(),
                path: default_recording_path(),
                fps: default_recording_fps(),
                jpeg_quality: default_jpeg_quality(),
                save_metadata: default_save_metadata(),
                annotate_regions: default_annotate_regions(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
                frame_interval_seconds: default_frame_interval(),
            },
        }
    }
}

// Default value functions
fn default_camera_resolution() -> (u32, u32) {
    (640, 480)
}
fn default_camera_fps() -> u32 {
    20
}
fn default_flip_horizontal() -> bool {
    true
}
fn default_source_kind() -> SourceKind {
    SourceKind::Synthetic
}

fn default_min_motion_area() -> f64 {
    3000.0
}
fn default_diff_threshold() -> u8 {
    25
}
fn default_dilate_iterations() -> u32 {
    2
}
fn default_blur_sigma() -> f32 {
    3.5
} // matches a 21x21 Gaussian kernel
fn default_reference_refresh_interval() -> u32 {
    10
}

fn default_motion_hold_frames() -> u32 {
    50
}

fn default_turret_enabled() -> bool {
    true
}
fn default_leg_duration() -> f64 {
    0.15
}
fn default_wait_duration() -> f64 {
    3.0
}
fn default_legs_before_reverse() -> u32 {
    8
}
fn default_motor_stop_delay() -> f64 {
    0.05
}
fn default_settle_duration() -> f64 {
    1.0
}
fn default_max_rotation_duration() -> f64 {
    5.0
}
fn default_degrees_per_second() -> f64 {
    60.0
}

fn default_recording_enabled() -> bool {
    false
}
fn default_recording_path() -> String {
    "./recordings".to_string()
}
fn default_recording_fps() -> f64 {
    25.0
}
fn default_jpeg_quality() -> u8 {
    85
}
fn default_save_metadata() -> bool {
    true
}
fn default_annotate_regions() -> bool {
    true
}

fn default_event_bus_capacity() -> usize {
    100
}
fn default_frame_interval() -> f64 {
    0.05
}

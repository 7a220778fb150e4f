use crate::config::RecordingConfig;
use crate::error::RecordingError;

use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, info};

/// Destination for the frames of one motion episode
pub trait RecordingSink: Send {
    /// Open a new recording called `name`
    fn start(&mut self, name: &str) -> Result<(), RecordingError>;

    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), RecordingError>;

    /// Close the open recording
    fn stop(&mut self) -> Result<RecordingSummary, RecordingError>;

    fn is_open(&self) -> bool;
}

/// Written as `metadata.json` next to the frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSummary {
    pub name: String,
    pub directory: PathBuf,
    pub started_at: DateTime<Local>,
    pub ended_at: DateTime<Local>,
    pub frame_count: u64,
    pub fps: f64,
}

struct OpenRecording {
    name: String,
    directory: PathBuf,
    started_at: DateTime<Local>,
    frame_count: u64,
}

/// Stores each recording as a numbered JPEG sequence in its own directory
pub struct JpegSequenceSink {
    base_path: PathBuf,
    quality: u8,
    fps: f64,
    save_metadata: bool,
    current: Option<OpenRecording>,
}

impl JpegSequenceSink {
    pub fn new(config: &RecordingConfig) -> Self {
        Self {
            base_path: PathBuf::from(&config.path),
            quality: config.jpeg_quality,
            fps: config.fps,
            save_metadata: config.save_metadata,
            current: None,
        }
    }

    /// First free directory for `name`, suffixing `_2`, `_3`... on collision
    fn recording_directory(&self, name: &str) -> PathBuf {
        let mut candidate = self.base_path.join(name);
        let mut attempt = 2;
        while candidate.exists() {
            candidate = self.base_path.join(format!("{}_{}", name, attempt));
            attempt += 1;
        }
        candidate
    }

    fn write_metadata(&self, summary: &RecordingSummary) -> Result<(), RecordingError> {
        let metadata_err = |details: String| RecordingError::Metadata {
            name: summary.name.clone(),
            details,
        };

        let json = serde_json::to_string_pretty(summary).map_err(|e| metadata_err(e.to_string()))?;
        fs::write(summary.directory.join("metadata.json"), json)
            .map_err(|e| metadata_err(e.to_string()))?;
        Ok(())
    }
}

impl RecordingSink for JpegSequenceSink {
    fn start(&mut self, name: &str) -> Result<(), RecordingError> {
        if self.current.is_some() {
            self.stop()?;
        }

        let directory = self.recording_directory(name);
        fs::create_dir_all(&directory).map_err(|source| RecordingError::DirectoryCreation {
            path: directory.display().to_string(),
            source,
        })?;

        info!("Recording started: {}", directory.display());
        self.current = Some(OpenRecording {
            name: name.to_string(),
            directory,
            started_at: Local::now(),
            frame_count: 0,
        });
        Ok(())
    }

    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), RecordingError> {
        let quality = self.quality;
        let recording = self.current.as_mut().ok_or(RecordingError::NotStarted)?;
        let index = recording.frame_count + 1;

        let encode_err = |details: String| RecordingError::Encode {
            name: recording.name.clone(),
            frame: index,
            details,
        };

        let path = recording.directory.join(format!("frame_{:06}.jpg", index));
        let file = File::create(&path).map_err(|e| encode_err(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut writer, quality)
            .encode(frame.as_raw(), frame.width(), frame.height(), ColorType::Rgb8)
            .map_err(|e| encode_err(e.to_string()))?;
        writer.flush().map_err(|e| encode_err(e.to_string()))?;

        recording.frame_count = index;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    fn stop(&mut self) -> Result<RecordingSummary, RecordingError> {
        let recording = self.current.take().ok_or(RecordingError::NotStarted)?;

        let summary = RecordingSummary {
            name: recording.name,
            directory: recording.directory,
            started_at: recording.started_at,
            ended_at: Local::now(),
            frame_count: recording.frame_count,
            fps: self.fps,
        };

        if self.save_metadata {
            self.write_metadata(&summary)?;
        }

        info!(
            "Recording stopped: {} ({} frames)",
            summary.name, summary.frame_count
        );
        Ok(summary)
    }

    fn is_open(&self) -> bool {
        self.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::path::Path;

    fn sink_in(dir: &Path, save_metadata: bool) -> JpegSequenceSink {
        JpegSequenceSink::new(&RecordingConfig {
            enabled: true,
            path: dir.to_string_lossy().to_string(),
            fps: 25.0,
            jpeg_quality: 80,
            save_metadata,
            annotate_regions: false,
        })
    }

    #[test]
    fn test_writes_numbered_frames_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = sink_in(dir.path(), true);

        sink.start("20240101_120000_motion").unwrap();
        assert!(sink.is_open());

        let frame = RgbImage::from_pixel(32, 24, Rgb([90, 120, 200]));
        for _ in 0..3 {
            sink.write_frame(&frame).unwrap();
        }
        let summary = sink.stop().unwrap();
        assert!(!sink.is_open());

        let recording_dir = dir.path().join("20240101_120000_motion");
        assert_eq!(summary.directory, recording_dir);
        assert_eq!(summary.frame_count, 3);
        assert!(recording_dir.join("frame_000001.jpg").exists());
        assert!(recording_dir.join("frame_000003.jpg").exists());

        let decoded = image::open(recording_dir.join("frame_000002.jpg")).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));

        let metadata = fs::read_to_string(recording_dir.join("metadata.json")).unwrap();
        let parsed: RecordingSummary = serde_json::from_str(&metadata).unwrap();
        assert_eq!(parsed.frame_count, 3);
        assert_eq!(parsed.fps, 25.0);
    }

    #[test]
    fn test_metadata_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = sink_in(dir.path(), false);

        sink.start("quiet").unwrap();
        sink.stop().unwrap();
        assert!(!dir.path().join("quiet").join("metadata.json").exists());
    }

    #[test]
    fn test_name_collision_gets_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = sink_in(dir.path(), false);

        sink.start("episode").unwrap();
        sink.stop().unwrap();
        sink.start("episode").unwrap();
        let summary = sink.stop().unwrap();

        assert_eq!(summary.directory, dir.path().join("episode_2"));
    }

    #[test]
    fn test_write_without_start_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = sink_in(dir.path(), false);

        let frame = RgbImage::new(4, 4);
        assert!(matches!(
            sink.write_frame(&frame),
            Err(RecordingError::NotStarted)
        ));
        assert!(matches!(sink.stop(), Err(RecordingError::NotStarted)));
    }

    #[test]
    fn test_unwritable_base_path_fails_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_directory");
        fs::write(&blocker, "file").unwrap();

        let mut sink = sink_in(&blocker, false);
        assert!(matches!(
            sink.start("episode"),
            Err(RecordingError::DirectoryCreation { .. })
        ));
        assert!(!sink.is_open());
    }
}

use crate::config::{CameraConfig, SourceKind};
use crate::error::SourceError;
use crate::frame::RawFrame;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use std::collections::BTreeSet;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Producer of raw color frames.
///
/// `SourceError::Unavailable` is transient and the caller retries;
/// `SourceError::Closed` ends the stream.
#[async_trait]
pub trait FrameSource: Send {
    fn name(&self) -> &str;

    async fn next_frame(&mut self) -> Result<RawFrame, SourceError>;
}

fn pacing_interval(fps: u32) -> Interval {
    let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Build the source selected in the camera configuration
pub fn from_config(config: &CameraConfig) -> Result<Box<dyn FrameSource>, SourceError> {
    match config.source {
        SourceKind::Synthetic => Ok(Box::new(SyntheticFrameSource::new(
            config.resolution.0,
            config.resolution.1,
            config.fps,
        ))),
        SourceKind::Directory => {
            let directory = config.directory.as_deref().ok_or_else(|| SourceError::Device {
                details: "directory source configured without a directory".to_string(),
            })?;
            Ok(Box::new(DirectorySource::open(directory, config.fps)?))
        }
    }
}

/// A solid rectangle crossing the synthetic scene
#[derive(Debug, Clone)]
pub struct Intruder {
    /// Frame indices during which the intruder is visible
    pub frames: Range<u64>,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Horizontal drift in pixels per frame
    pub dx: i32,
}

impl Intruder {
    fn left_edge(&self, index: u64) -> i64 {
        let elapsed = index.saturating_sub(self.frames.start) as i64;
        self.x as i64 + elapsed * self.dx as i64
    }

    fn covers(&self, index: u64, x: u32, y: u32) -> bool {
        if !self.frames.contains(&index) {
            return false;
        }
        let left = self.left_edge(index);
        let (x, y) = (x as i64, y as i64);
        x >= left
            && x < left + self.width as i64
            && y >= self.y as i64
            && y < self.y as i64 + self.height as i64
    }
}

// Bright enough to stand out against the textured background in grayscale
const INTRUDER_COLOR: Rgb<u8> = Rgb([240, 240, 230]);

/// Deterministic textured scene with low-amplitude sensor noise
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    fps: u32,
    paced: bool,
    interval: Option<Interval>,
    index: u64,
    noise_amplitude: u8,
    intruders: Vec<Intruder>,
    failures: BTreeSet<u64>,
    frame_limit: Option<u64>,
}

impl SyntheticFrameSource {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            paced: true,
            interval: None,
            index: 0,
            noise_amplitude: 4,
            intruders: Vec::new(),
            failures: BTreeSet::new(),
            frame_limit: None,
        }
    }

    /// Produce frames as fast as they are asked for
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    pub fn with_intruder(mut self, intruder: Intruder) -> Self {
        self.intruders.push(intruder);
        self
    }

    pub fn with_noise_amplitude(mut self, amplitude: u8) -> Self {
        self.noise_amplitude = amplitude;
        self
    }

    /// Fail once, transiently, when frame `index` is next due
    pub fn with_failure_at(mut self, index: u64) -> Self {
        self.failures.insert(index);
        self
    }

    /// Close the stream after `limit` frames
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    fn render(&self, index: u64) -> RgbImage {
        let mut state = index.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
        let amplitude = self.noise_amplitude as u64 + 1;

        RgbImage::from_fn(self.width, self.height, |x, y| {
            if self.intruders.iter().any(|i| i.covers(index, x, y)) {
                return INTRUDER_COLOR;
            }

            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            let noise = (state % amplitude) as u8;

            let base = 64 + ((x * 3 + y * 2) % 64) as u8;
            let value = base.saturating_add(noise);
            Rgb([value, value, value.saturating_sub(8)])
        })
    }
}

#[async_trait]
impl FrameSource for SyntheticFrameSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn next_frame(&mut self) -> Result<RawFrame, SourceError> {
        if let Some(limit) = self.frame_limit {
            if self.index >= limit {
                return Err(SourceError::Closed);
            }
        }

        if self.paced {
            let fps = self.fps;
            self.interval
                .get_or_insert_with(|| pacing_interval(fps))
                .tick()
                .await;
        }

        if self.failures.remove(&self.index) {
            return Err(SourceError::Unavailable {
                details: format!("scripted dropout before frame {}", self.index),
            });
        }

        let image = self.render(self.index);
        let frame = RawFrame::new(self.index, SystemTime::now(), image);
        self.index += 1;
        Ok(frame)
    }
}

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Replays the images of a directory in lexical order, looping
pub struct DirectorySource {
    directory: PathBuf,
    files: Vec<PathBuf>,
    fps: u32,
    interval: Option<Interval>,
    position: usize,
    next_id: u64,
}

impl DirectorySource {
    pub fn open<P: AsRef<Path>>(directory: P, fps: u32) -> Result<Self, SourceError> {
        let directory = directory.as_ref().to_path_buf();
        let entries = std::fs::read_dir(&directory).map_err(|e| SourceError::Device {
            details: format!("cannot read {}: {}", directory.display(), e),
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(SourceError::Device {
                details: format!("no images in {}", directory.display()),
            });
        }

        info!("Replaying {} images from {}", files.len(), directory.display());

        Ok(Self {
            directory,
            files,
            fps,
            interval: None,
            position: 0,
            next_id: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl FrameSource for DirectorySource {
    fn name(&self) -> &str {
        "directory"
    }

    async fn next_frame(&mut self) -> Result<RawFrame, SourceError> {
        let fps = self.fps;
        self.interval
            .get_or_insert_with(|| pacing_interval(fps))
            .tick()
            .await;

        let path = self.files[self.position].clone();
        self.position = (self.position + 1) % self.files.len();
        if self.position == 0 {
            debug!("Looping back to start of {}", self.directory.display());
        }

        let load_path = path.clone();
        let loaded = tokio::task::spawn_blocking(move || image::open(&load_path))
            .await
            .map_err(|e| SourceError::Unavailable {
                details: format!("image loader task failed: {}", e),
            })?;

        let image = loaded.map_err(|e| {
            warn!("Skipping unreadable image {}: {}", path.display(), e);
            SourceError::Unavailable {
                details: format!("{}: {}", path.display(), e),
            }
        })?;

        let frame = RawFrame::new(self.next_id, SystemTime::now(), image.to_rgb8());
        self.next_id += 1;
        Ok(frame)
    }
}

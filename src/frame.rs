use image::{GrayImage, RgbImage};
use std::sync::Arc;
use std::time::SystemTime;

/// Raw color frame as delivered by a frame source
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Unique frame identifier
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// RGB pixel data (shared ownership for efficiency)
    pub image: Arc<RgbImage>,
}

impl RawFrame {
    pub fn new(id: u64, timestamp: SystemTime, image: RgbImage) -> Self {
        Self {
            id,
            timestamp,
            image: Arc::new(image),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Get frame age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Immutable grayscale intensity buffer used for motion comparison.
///
/// Cloning is cheap; the pixels are shared and never mutated after
/// construction.
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: u64,
    pub timestamp: SystemTime,
    pixels: Arc<GrayImage>,
}

impl Frame {
    pub fn new(id: u64, timestamp: SystemTime, pixels: GrayImage) -> Self {
        Self {
            id,
            timestamp,
            pixels: Arc::new(pixels),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixels(&self) -> &GrayImage {
        &self.pixels
    }
}

/// Output of the preprocessor: a comparison-ready grayscale frame plus
/// the display/recording representation of the same capture
#[derive(Debug, Clone)]
pub struct PreparedFrame {
    pub gray: Frame,
    pub display: Arc<RgbImage>,
}

impl PreparedFrame {
    pub fn id(&self) -> u64 {
        self.gray.id
    }

    pub fn timestamp(&self) -> SystemTime {
        self.gray.timestamp
    }
}

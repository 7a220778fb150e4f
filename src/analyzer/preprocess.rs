use crate::config::{CameraConfig, DetectorConfig};
use crate::error::DetectorError;
use crate::frame::{Frame, PreparedFrame, RawFrame};

use image::imageops::{self, FilterType};
use image::RgbImage;
use imageproc::filter::gaussian_blur_f32;
use std::sync::Arc;

/// Turns raw captures into comparison-ready frames.
///
/// Every frame is mirrored (optionally), resized to the analysis
/// resolution, converted to grayscale and blurred so that sensor noise
/// falls below the detector threshold. The mirrored, resized color image
/// is kept for display and recording.
#[derive(Debug, Clone)]
pub struct FramePreprocessor {
    resolution: (u32, u32),
    flip_horizontal: bool,
    blur_sigma: f32,
}

impl FramePreprocessor {
    pub fn new(camera: &CameraConfig, detector: &DetectorConfig) -> Self {
        Self {
            resolution: camera.resolution,
            flip_horizontal: camera.flip_horizontal,
            blur_sigma: detector.blur_sigma,
        }
    }

    pub fn prepare(&self, raw: &RawFrame) -> Result<PreparedFrame, DetectorError> {
        let (width, height) = raw.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectorError::Preprocess {
                details: format!("frame {} has empty dimensions {}x{}", raw.id, width, height),
            });
        }

        let mut display: RgbImage = if self.flip_horizontal {
            imageops::flip_horizontal(raw.image.as_ref())
        } else {
            raw.image.as_ref().clone()
        };

        let (target_width, target_height) = self.resolution;
        if display.dimensions() != self.resolution {
            display = imageops::resize(&display, target_width, target_height, FilterType::Triangle);
        }

        let mut gray = imageops::grayscale(&display);
        // gaussian_blur_f32 panics on a non-positive sigma
        if self.blur_sigma > 0.0 {
            gray = gaussian_blur_f32(&gray, self.blur_sigma);
        }

        Ok(PreparedFrame {
            gray: Frame::new(raw.id, raw.timestamp, gray),
            display: Arc::new(display),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TurretConfig;
    use image::Rgb;
    use std::time::SystemTime;

    fn preprocessor(resolution: (u32, u32), flip: bool, sigma: f32) -> FramePreprocessor {
        let mut config = TurretConfig::default();
        config.camera.resolution = resolution;
        config.camera.flip_horizontal = flip;
        config.detector.blur_sigma = sigma;
        FramePreprocessor::new(&config.camera, &config.detector)
    }

    /// Left half black, right half white
    fn split_frame(width: u32, height: u32) -> RawFrame {
        let image = RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        RawFrame::new(3, SystemTime::now(), image)
    }

    #[test]
    fn test_resizes_to_analysis_resolution() {
        let prepared = preprocessor((64, 48), false, 0.0)
            .prepare(&split_frame(320, 240))
            .unwrap();

        assert_eq!(prepared.gray.dimensions(), (64, 48));
        assert_eq!(prepared.display.dimensions(), (64, 48));
        assert_eq!(prepared.id(), 3);
    }

    #[test]
    fn test_flip_mirrors_frame() {
        let raw = split_frame(64, 48);

        let plain = preprocessor((64, 48), false, 0.0).prepare(&raw).unwrap();
        assert_eq!(plain.gray.pixels().get_pixel(0, 10)[0], 0);
        assert_eq!(plain.gray.pixels().get_pixel(63, 10)[0], 255);

        let mirrored = preprocessor((64, 48), true, 0.0).prepare(&raw).unwrap();
        assert_eq!(mirrored.gray.pixels().get_pixel(0, 10)[0], 255);
        assert_eq!(mirrored.gray.pixels().get_pixel(63, 10)[0], 0);
    }

    #[test]
    fn test_blur_softens_edges() {
        let raw = split_frame(64, 48);
        let blurred = preprocessor((64, 48), false, 3.5).prepare(&raw).unwrap();

        let left_of_edge = blurred.gray.pixels().get_pixel(31, 24)[0];
        let right_of_edge = blurred.gray.pixels().get_pixel(32, 24)[0];
        assert!(left_of_edge > 0);
        assert!(right_of_edge < 255);
    }

    #[test]
    fn test_empty_frame_is_rejected() {
        let raw = RawFrame::new(1, SystemTime::now(), RgbImage::new(0, 0));
        let result = preprocessor((64, 48), true, 3.5).prepare(&raw);
        assert!(matches!(result, Err(DetectorError::Preprocess { .. })));
    }
}

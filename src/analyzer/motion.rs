use crate::config::DetectorConfig;
use crate::error::DetectorError;
use crate::frame::Frame;

use image::{GrayImage, Luma};
use imageproc::{
    contrast::threshold,
    distance_transform::Norm,
    morphology::dilate,
    region_labelling::{connected_components, Connectivity},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Axis-aligned bounding box in analysis-frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One connected area of change between the reference and current frame.
///
/// `area` is the pixel count of the dilated component, so it is slightly
/// larger than the raw changed area whenever dilation is enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionRegion {
    pub bounds: BoundingBox,
    pub area: f64,
}

/// Parameters of the diff → threshold → dilate → label pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    /// Regions must be strictly larger than this to count
    pub min_motion_area: f64,
    /// Pixels whose delta is strictly above this are changed
    pub diff_threshold: u8,
    /// 3x3 dilation passes
    pub dilate_iterations: u32,
}

impl From<&DetectorConfig> for DetectionParams {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            min_motion_area: config.min_motion_area,
            diff_threshold: config.diff_threshold,
            dilate_iterations: config.dilate_iterations,
        }
    }
}

#[derive(Debug)]
struct RegionAccumulator {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    pixels: u64,
}

impl RegionAccumulator {
    fn new(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            pixels: 0,
        }
    }

    fn add(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.pixels += 1;
    }

    fn into_region(self) -> MotionRegion {
        MotionRegion {
            bounds: BoundingBox {
                x: self.min_x,
                y: self.min_y,
                width: self.max_x - self.min_x + 1,
                height: self.max_y - self.min_y + 1,
            },
            area: self.pixels as f64,
        }
    }
}

/// Compare `current` against `reference` and return every region whose
/// area exceeds `params.min_motion_area`, largest first.
///
/// Both frames must have identical dimensions; a mismatch means the caller
/// skipped a rebaseline.
pub fn detect_motion(
    reference: &Frame,
    current: &Frame,
    params: &DetectionParams,
) -> Result<Vec<MotionRegion>, DetectorError> {
    if reference.dimensions() != current.dimensions() {
        return Err(DetectorError::DimensionMismatch {
            reference: reference.dimensions(),
            current: current.dimensions(),
        });
    }

    let diff_image = frame_difference(reference.pixels(), current.pixels());
    let mut mask = threshold(&diff_image, params.diff_threshold);
    for _ in 0..params.dilate_iterations {
        mask = dilate(&mask, Norm::LInf, 1);
    }

    let components = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

    let mut accumulators: HashMap<u32, RegionAccumulator> = HashMap::new();
    for (x, y, label) in components.enumerate_pixels() {
        let id = label[0];
        if id == 0 {
            continue;
        }
        accumulators
            .entry(id)
            .or_insert_with(|| RegionAccumulator::new(x, y))
            .add(x, y);
    }

    let mut regions: Vec<MotionRegion> = accumulators
        .into_values()
        .map(RegionAccumulator::into_region)
        .filter(|region| region.area > params.min_motion_area)
        .collect();
    regions.sort_by(|a, b| b.area.total_cmp(&a.area));

    Ok(regions)
}

/// Absolute per-pixel intensity difference
fn frame_difference(reference: &GrayImage, current: &GrayImage) -> GrayImage {
    GrayImage::from_fn(reference.width(), reference.height(), |x, y| {
        let a = reference.get_pixel(x, y)[0];
        let b = current.get_pixel(x, y)[0];
        Luma([a.abs_diff(b)])
    })
}

/// Owns the reference frame and applies the refresh policy around
/// [`detect_motion`]
pub struct MotionDetector {
    params: DetectionParams,
    refresh_interval: u32,
    reference: Option<Frame>,
    frames_since_refresh: u32,
    frames_analyzed: u64,
    rebaselines: u64,
}

impl MotionDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        info!(
            "Initializing motion detector (min area {:.0}, threshold {}, dilate x{}, refresh every {} frames)",
            config.min_motion_area,
            config.diff_threshold,
            config.dilate_iterations,
            config.reference_refresh_interval_frames
        );

        Self {
            params: DetectionParams::from(config),
            refresh_interval: config.reference_refresh_interval_frames.max(1),
            reference: None,
            frames_since_refresh: 0,
            frames_analyzed: 0,
            rebaselines: 0,
        }
    }

    /// Replace the reference frame wholesale
    pub fn rebaseline(&mut self, frame: &Frame) {
        debug!("Rebaselining reference to frame {}", frame.id);
        self.reference = Some(frame.clone());
        self.frames_since_refresh = 0;
        self.rebaselines += 1;
    }

    /// Analyze a frame against the current reference.
    ///
    /// The first frame ever seen becomes the reference and yields no
    /// regions. After every `reference_refresh_interval_frames` analyzed
    /// frames the analyzed frame becomes the new reference, tracking slow
    /// ambient drift.
    pub fn analyze(&mut self, frame: &Frame) -> Result<Vec<MotionRegion>, DetectorError> {
        let reference = match &self.reference {
            Some(reference) => reference,
            None => {
                info!("Initializing reference frame with frame {}", frame.id);
                self.rebaseline(frame);
                return Ok(Vec::new());
            }
        };

        let regions = detect_motion(reference, frame, &self.params)?;
        self.frames_analyzed += 1;
        self.frames_since_refresh += 1;

        if self.frames_since_refresh >= self.refresh_interval {
            self.rebaseline(frame);
        }

        if let Some(largest) = regions.first() {
            debug!(
                "Frame {}: {} motion region(s), largest area {:.0}",
                frame.id,
                regions.len(),
                largest.area
            );
        }

        Ok(regions)
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    pub fn reference(&self) -> Option<&Frame> {
        self.reference.as_ref()
    }

    pub fn frames_analyzed(&self) -> u64 {
        self.frames_analyzed
    }

    pub fn rebaseline_count(&self) -> u64 {
        self.rebaselines
    }
}

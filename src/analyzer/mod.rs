mod motion;
mod preprocess;

pub use motion::{detect_motion, BoundingBox, DetectionParams, MotionDetector, MotionRegion};
pub use preprocess::FramePreprocessor;

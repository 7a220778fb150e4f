mod controller;
mod overlay;
mod sink;

pub use controller::{recording_name, RecordingController};
pub use overlay::annotate_regions;
pub use sink::{JpegSequenceSink, RecordingSink, RecordingSummary};

use crate::analyzer::MotionRegion;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use tracing::debug;

pub(crate) const REGION_BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Box thickness in pixels, drawn inward from the region bounds
const REGION_BOX_THICKNESS: u32 = 2;

/// Copy of `frame` with a box drawn around every motion region.
///
/// Region bounds are in analysis-frame pixels, which is also the size of the
/// display frame, so no scaling is needed. Boxes are clipped to the frame.
pub fn annotate_regions(frame: &RgbImage, regions: &[MotionRegion]) -> RgbImage {
    let mut annotated = frame.clone();

    for region in regions {
        let bounds = region.bounds;
        for inset in 0..REGION_BOX_THICKNESS {
            let width = bounds.width.saturating_sub(2 * inset);
            let height = bounds.height.saturating_sub(2 * inset);
            if width == 0 || height == 0 {
                break;
            }
            let rect = Rect::at((bounds.x + inset) as i32, (bounds.y + inset) as i32)
                .of_size(width, height);
            draw_hollow_rect_mut(&mut annotated, rect, REGION_BOX_COLOR);
        }
    }

    debug!("Annotated {} motion region(s)", regions.len());
    annotated
}

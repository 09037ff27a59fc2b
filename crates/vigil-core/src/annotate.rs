//! Frame annotation for outbound reports: localized faces are outlined on
//! the frame before it is JPEG-encoded and pushed to the coordinator.

use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};

use crate::capability::BoundingBox;

/// Outline color for localized faces.
pub const BOX_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const BOX_STROKE: u32 = 2;

/// Draw a rectangle outline for each box, clamped to the frame.
pub fn draw_boxes(frame: &mut RgbImage, boxes: &[BoundingBox]) {
    let (width, height) = frame.dimensions();
    for bbox in boxes {
        let b = bbox.clamped(width, height);
        if b.width() == 0 || b.height() == 0 {
            continue;
        }
        for t in 0..BOX_STROKE {
            // Horizontal edges
            for x in b.x1..b.x2 {
                put_pixel_checked(frame, x, b.y1.saturating_add(t));
                put_pixel_checked(frame, x, b.y2.saturating_sub(t + 1));
            }
            // Vertical edges
            for y in b.y1..b.y2 {
                put_pixel_checked(frame, b.x1.saturating_add(t), y);
                put_pixel_checked(frame, b.x2.saturating_sub(t + 1), y);
            }
        }
    }
}

fn put_pixel_checked(frame: &mut RgbImage, x: u32, y: u32) {
    if x < frame.width() && y < frame.height() {
        frame.put_pixel(x, y, BOX_COLOR);
    }
}

/// Encode a frame as JPEG bytes for the wire.
pub fn encode_jpeg(frame: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    frame.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)?;
    Ok(bytes)
}

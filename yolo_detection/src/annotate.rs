use crate::{detection::Detection, labels::ClassLabels};
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};
use std::path::Path;

const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_PADDING: u32 = 2;
const LINE_THICKNESS: u32 = 2;

/// Draws detection boxes and `label confidence` tags.
pub struct Annotator {
    font: Option<FontVec>,
    font_size: f32,
    line_thickness: u32,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            font: None,
            font_size: LABEL_FONT_SIZE,
            line_thickness: LINE_THICKNESS,
        }
    }
}

impl Annotator {
    pub fn new(font: Option<FontVec>) -> Self {
        Self {
            font,
            ..Self::default()
        }
    }

    /// Without a usable font the tags are skipped and only boxes are drawn.
    pub fn from_font_file(path: &Path) -> Self {
        let font = std::fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| FontVec::try_from_vec(bytes).map_err(|e| e.to_string()));
        match font {
            Ok(font) => Self::new(Some(font)),
            Err(e) => {
                tracing::warn!(
                    "Failed to load label font {:?}, drawing boxes only: {}",
                    path,
                    e
                );
                Self::new(None)
            }
        }
    }

    pub fn with_font_size(mut self, font_size: f32) -> Self {
        self.font_size = font_size;
        self
    }

    pub fn with_line_thickness(mut self, line_thickness: u32) -> Self {
        self.line_thickness = line_thickness.max(1);
        self
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn annotate(
        &self,
        image: &RgbImage,
        detections: &[Detection],
        labels: &ClassLabels,
    ) -> RgbImage {
        let mut canvas = image.clone();
        for detection in detections {
            let color = Rgb(labels.color(detection.class_id));
            self.draw_box(&mut canvas, detection, color);
        }
        canvas
    }

    fn draw_box(&self, canvas: &mut RgbImage, detection: &Detection, color: Rgb<u8>) {
        let (width, height) = canvas.dimensions();
        let x1 = (detection.bbox.x1.floor() as i32).clamp(0, width as i32 - 1);
        let y1 = (detection.bbox.y1.floor() as i32).clamp(0, height as i32 - 1);
        let x2 = (detection.bbox.x2.ceil() as i32).clamp(0, width as i32 - 1);
        let y2 = (detection.bbox.y2.ceil() as i32).clamp(0, height as i32 - 1);
        if x1 >= x2 || y1 >= y2 {
            return;
        }

        for t in 0..self.line_thickness as i32 {
            let w = x2 - x1 - 2 * t;
            let h = y2 - y1 - 2 * t;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(x1 + t, y1 + t).of_size(w as u32 + 1, h as u32 + 1);
            draw_hollow_rect_mut(canvas, rect, color);
        }

        if let Some(font) = &self.font {
            let label = format!("{} {:.2}", detection.label, detection.confidence);
            let scale = PxScale::from(self.font_size);
            let (text_width, text_height) = text_size(scale, font, &label);
            let tag_width = text_width + 2 * LABEL_PADDING;
            let tag_height = text_height + 2 * LABEL_PADDING;

            // Above the box when there is room, inside it otherwise.
            let tag_y = if y1 >= tag_height as i32 {
                y1 - tag_height as i32
            } else {
                y1
            };
            draw_filled_rect_mut(
                canvas,
                Rect::at(x1, tag_y).of_size(tag_width, tag_height),
                color,
            );
            draw_text_mut(
                canvas,
                Rgb([255, 255, 255]),
                x1 + LABEL_PADDING as i32,
                tag_y + LABEL_PADDING as i32,
                scale,
                font,
                &label,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    fn square(confidence: f32) -> Detection {
        Detection {
            bbox: BoundingBox {
                x1: 20.0,
                y1: 20.0,
                x2: 60.0,
                y2: 60.0,
            },
            class_id: 0,
            label: "square".to_string(),
            confidence,
        }
    }

    #[test]
    fn test_no_detections_leaves_image_untouched() {
        let img = RgbImage::from_pixel(80, 80, Rgb([255, 255, 255]));
        let labels = ClassLabels::from_names(&["square"]);

        let out = Annotator::default().annotate(&img, &[], &labels);

        assert_eq!(out, img);
    }

    #[test]
    fn test_box_drawn_in_class_color() {
        let img = RgbImage::from_pixel(80, 80, Rgb([255, 255, 255]));
        let labels = ClassLabels::from_names(&["square"]);
        let color = labels.color(0);

        let out = Annotator::default().annotate(&img, &[square(0.95)], &labels);

        assert_eq!(out.get_pixel(20, 20).0, color);
        assert_eq!(out.get_pixel(60, 40).0, color);
        assert_eq!(out.get_pixel(21, 40).0, color);
        // Interior and outside stay white.
        assert_eq!(out.get_pixel(40, 40).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(5, 5).0, [255, 255, 255]);
    }

    #[test]
    fn test_box_outside_image_is_clamped() {
        let img = RgbImage::from_pixel(30, 30, Rgb([0, 0, 0]));
        let labels = ClassLabels::from_names(&["square"]);

        let out = Annotator::default().annotate(&img, &[square(0.5)], &labels);

        assert_eq!(out.dimensions(), (30, 30));
        assert_eq!(out.get_pixel(29, 25).0, labels.color(0));
    }

    #[test]
    fn test_missing_font_falls_back_to_boxes() {
        let annotator = Annotator::from_font_file(Path::new("./does_not_exist.ttf"));

        assert!(!annotator.has_font());
    }

    #[test]
    fn test_bundled_font_draws_tag() {
        let font_path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../assets/DejaVuSans.ttf");
        let annotator = Annotator::from_font_file(&font_path);
        assert!(annotator.has_font());

        let img = RgbImage::from_pixel(120, 120, Rgb([255, 255, 255]));
        let labels = ClassLabels::from_names(&["square"]);
        let detection = Detection {
            bbox: BoundingBox {
                x1: 10.0,
                y1: 50.0,
                x2: 100.0,
                y2: 100.0,
            },
            ..square(0.95)
        };

        let out = annotator.annotate(&img, &[detection], &labels);

        // The tag background sits just above the box.
        assert_eq!(out.get_pixel(11, 48).0, labels.color(0));
    }
}

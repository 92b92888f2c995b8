use crate::{
    channels::{reorder, ChannelOrder},
    config::{LabelsConfig, ModelConfig, Validatable},
    detection::{BoundingBox, ConfidenceThreshold, RawDetection},
    error::{DetectError, ModelLoadError},
    labels::ClassLabels,
    model::DetectionModel,
};
use image::{imageops::FilterType, Rgb, RgbImage};
use ndarray::{Array, ArrayD, ArrayView2, Axis, Ix2, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use parking_lot::Mutex;
use std::fmt::Display;

const PAD_VALUE: u8 = 114;

/// Geometry of a square letterbox: the source is scaled by `scale` and
/// pasted at (`pad_x`, `pad_y`) on a `size` x `size` canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub size: u32,
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub new_width: u32,
    pub new_height: u32,
    pub src_width: u32,
    pub src_height: u32,
}

impl Letterbox {
    pub fn new(src_width: u32, src_height: u32, size: u32) -> Self {
        let bound = size.max(1);
        let scale = (size as f32 / src_width as f32).min(size as f32 / src_height as f32);
        let new_width = ((src_width as f32 * scale).round() as u32).clamp(1, bound);
        let new_height = ((src_height as f32 * scale).round() as u32).clamp(1, bound);
        Self {
            size,
            scale,
            pad_x: size.saturating_sub(new_width) / 2,
            pad_y: size.saturating_sub(new_height) / 2,
            new_width,
            new_height,
            src_width,
            src_height,
        }
    }

    pub fn resized_dimensions(&self) -> (u32, u32) {
        (self.new_width, self.new_height)
    }

    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        let (new_width, new_height) = self.resized_dimensions();
        let resized = image::imageops::resize(image, new_width, new_height, FilterType::Triangle);
        let mut canvas = RgbImage::from_pixel(self.size, self.size, Rgb([PAD_VALUE; 3]));
        image::imageops::overlay(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
        canvas
    }

    /// Maps a centre/size box from canvas space back onto the source image.
    pub fn unmap(&self, xc: f32, yc: f32, w: f32, h: f32) -> BoundingBox {
        let to_x =
            |v: f32| ((v - self.pad_x as f32) / self.scale).clamp(0.0, self.src_width as f32);
        let to_y =
            |v: f32| ((v - self.pad_y as f32) / self.scale).clamp(0.0, self.src_height as f32);
        BoundingBox {
            x1: to_x(xc - w / 2.),
            y1: to_y(yc - h / 2.),
            x2: to_x(xc + w / 2.),
            y2: to_y(yc + h / 2.),
        }
    }
}

fn image_to_tensor(img: &RgbImage) -> Array<f32, Ix4> {
    let (width, height) = img.dimensions();
    let mut input = Array::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in img.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        let [c0, c1, c2] = pixel.0;
        input[[0, 0, y, x]] = (c0 as f32) / 255.;
        input[[0, 1, y, x]] = (c1 as f32) / 255.;
        input[[0, 2, y, x]] = (c2 as f32) / 255.;
    }
    input
}

/// Decodes a `[4 + classes, candidates]` YOLO head: best class per
/// candidate, kept when its score clears the threshold.
pub fn decode_candidates(
    output: ArrayView2<f32>,
    threshold: ConfidenceThreshold,
    letterbox: &Letterbox,
) -> Vec<RawDetection> {
    let mut boxes = Vec::new();

    for column in output.axis_iter(Axis(1)) {
        let best = column
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .reduce(|accum, item| if item.1 > accum.1 { item } else { accum });
        let Some((class_id, confidence)) = best else {
            continue;
        };

        if !threshold.admits(confidence) {
            continue;
        }

        let bbox = letterbox.unmap(column[0], column[1], column[2], column[3]);
        if bbox.area() <= 0.0 {
            continue;
        }

        boxes.push(RawDetection {
            class_id,
            confidence,
            bbox,
        });
    }

    boxes
}

/// Greedy per-class suppression, highest confidence first.
pub fn non_max_suppression(
    mut boxes: Vec<RawDetection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    boxes.sort_by(|box1, box2| box2.confidence.total_cmp(&box1.confidence));
    let mut result: Vec<RawDetection> = Vec::new();

    for candidate in boxes {
        if result.len() >= max_detections {
            break;
        }
        let suppressed = result.iter().any(|kept| {
            kept.class_id == candidate.class_id && kept.bbox.iou(&candidate.bbox) >= iou_threshold
        });
        if !suppressed {
            result.push(candidate);
        }
    }

    result
}

/// Views a `[1, rows, cols]` model output as `[4 + classes, candidates]`.
///
/// The orientation follows the class table: the head is transposed only
/// when its columns, not its rows, hold the `4 + num_classes` values.
pub fn class_major_head(
    outputs: &ArrayD<f32>,
    num_classes: usize,
) -> Result<ArrayView2<'_, f32>, DetectError> {
    if outputs.ndim() != 3 || outputs.shape()[0] != 1 {
        return Err(DetectError::Inference(format!(
            "unexpected output shape {:?}",
            outputs.shape()
        )));
    }

    let head = outputs
        .index_axis(Axis(0), 0)
        .into_dimensionality::<Ix2>()
        .map_err(inference_error("unexpected output rank"))?;

    let values_per_candidate = num_classes + 4;
    let head = if head.ncols() == values_per_candidate && head.nrows() != values_per_candidate {
        head.reversed_axes()
    } else {
        head
    };

    if head.nrows() <= 4 {
        return Err(DetectError::Inference(format!(
            "output has no class scores: {:?}",
            outputs.shape()
        )));
    }
    if head.nrows() != values_per_candidate {
        return Err(DetectError::Inference(format!(
            "output shape {:?} does not match {} classes",
            outputs.shape(),
            num_classes
        )));
    }
    Ok(head)
}

fn load_error<E: Display>(context: &'static str) -> impl Fn(E) -> ModelLoadError {
    move |e| ModelLoadError(format!("{}: {}", context, e))
}

fn inference_error<E: Display>(context: &'static str) -> impl Fn(E) -> DetectError {
    move |e| DetectError::Inference(format!("{}: {}", context, e))
}

/// YOLO detector backed by an ONNX Runtime session.
pub struct OrtModel {
    session: Mutex<Session>,
    output_name: String,
    labels: ClassLabels,
    input_size: u32,
    iou_threshold: f32,
    max_detections: usize,
    channel_order: ChannelOrder,
}

impl OrtModel {
    pub fn load(
        model_config: &ModelConfig,
        labels_config: &LabelsConfig,
    ) -> Result<Self, ModelLoadError> {
        let model_path = model_config.get_path();
        model_config.validate().map_err(ModelLoadError)?;
        model_config.validate_settings().map_err(ModelLoadError)?;
        let labels = ClassLabels::load(labels_config)?;

        let session = Session::builder()
            .map_err(load_error("failed to create session builder"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_error("failed to set optimization level"))?
            .with_intra_threads(model_config.intra_threads)
            .map_err(load_error("failed to set intra threads"))?
            .commit_from_file(&model_path)
            .map_err(load_error("failed to load model weights"))?;

        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| ModelLoadError(format!("model {:?} has no outputs", model_path)))?;

        tracing::info!(
            model = %model_path.display(),
            classes = labels.len(),
            input_size = model_config.input_size,
            channel_order = model_config.channel_order.as_str(),
            "Loaded ONNX model"
        );

        Ok(Self {
            session: Mutex::new(session),
            output_name,
            labels,
            input_size: model_config.input_size,
            iou_threshold: model_config.iou_threshold,
            max_detections: model_config.max_detections,
            channel_order: model_config.channel_order,
        })
    }

    fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<ArrayD<f32>, DetectError> {
        let mut session = self.session.lock();

        let tensor_ref = TensorRef::from_array_view(input.view())
            .map_err(inference_error("failed to build tensor"))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(inference_error("inference failed"))?;

        let (shape, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(inference_error("failed to extract tensor"))?;

        ArrayD::from_shape_vec(shape.to_ixdyn(), data.to_vec())
            .map_err(inference_error("invalid tensor shape"))
    }
}

impl DetectionModel for OrtModel {
    fn labels(&self) -> &ClassLabels {
        &self.labels
    }

    fn predict(
        &self,
        image: &RgbImage,
        threshold: ConfidenceThreshold,
    ) -> Result<Vec<RawDetection>, DetectError> {
        let letterbox = Letterbox::new(image.width(), image.height(), self.input_size);
        let canvas = reorder(&letterbox.apply(image), ChannelOrder::Rgb, self.channel_order);
        let input = image_to_tensor(&canvas);

        let outputs = self.run_inference(&input)?;
        let head = class_major_head(&outputs, self.labels.len())?;

        let candidates = decode_candidates(head, threshold, &letterbox);
        let detections = non_max_suppression(candidates, self.iou_threshold, self.max_detections);

        tracing::debug!("Returning {} detections", detections.len());
        Ok(detections)
    }
}

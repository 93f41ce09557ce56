//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes the frame to 640×640, runs the model, decodes the three
//! anchor-free stride heads and applies NMS.

use crate::types::FaceRegion;
use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.4;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector model not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("image has zero width or height")]
    EmptyImage,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Mapping between letterboxed model space and source image space.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32, target: u32) -> Self {
        let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: (target as f32 - new_w) / 2.0,
            pad_y: (target as f32 - new_h) / 2.0,
        }
    }

    fn to_source(&self, (x, y): (f32, f32)) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Output tensor positions for one stride: (score, bbox, kps).
type StrideOutputs = (usize, usize, usize);

pub struct FaceDetector {
    session: Session,
    stride_outputs: [StrideOutputs; 3],
    score_threshold: f32,
    nms_threshold: f32,
}

impl FaceDetector {
    /// Load the SCRFD model (`det_10g.onnx` or a compatible export).
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();

        tracing::info!(
            path = %model_path.display(),
            outputs = ?output_names,
            "loaded SCRFD model"
        );

        if output_names.len() < 9 {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD needs 9 outputs (score/bbox/kps per stride), model has {}",
                output_names.len()
            )));
        }

        let stride_outputs = map_outputs(&output_names);
        tracing::debug!(?stride_outputs, "SCRFD output mapping");

        Ok(Self {
            session,
            stride_outputs,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
        })
    }

    pub fn with_thresholds(mut self, score: f32, nms: f32) -> Self {
        self.score_threshold = score;
        self.nms_threshold = nms;
        self
    }

    /// Detect faces, most confident first.
    pub fn detect(&mut self, image: &GrayImage) -> Result<Vec<FaceRegion>, DetectorError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DetectorError::EmptyImage);
        }
        let (input, letterbox) = preprocess(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (slot, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx, kps_idx) = self.stride_outputs[slot];
            let extract = |idx: usize, what: &str| {
                outputs[idx]
                    .try_extract_tensor::<f32>()
                    .map(|(_, data)| data)
                    .map_err(|e| DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}")))
            };
            let scores = extract(score_idx, "scores")?;
            let bboxes = extract(bbox_idx, "bboxes")?;
            let kps = extract(kps_idx, "landmarks")?;

            candidates.extend(decode_stride(
                StrideHead { scores, bboxes, kps, stride },
                &letterbox,
                self.score_threshold,
            ));
        }

        Ok(nms(candidates, self.nms_threshold))
    }
}

/// Letterbox a grayscale image into a normalized 1×3×640×640 tensor.
fn preprocess(image: &GrayImage) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::fit(image.width(), image.height(), SCRFD_INPUT_SIZE);
    let new_w = ((image.width() as f32 * letterbox.scale).round() as u32).max(1);
    let new_h = ((image.height() as f32 * letterbox.scale).round() as u32).max(1);
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let size = SCRFD_INPUT_SIZE as usize;
    let pad_x = letterbox.pad_x.floor() as u32;
    let pad_y = letterbox.pad_y.floor() as u32;

    // Padding holds the mean, which normalizes to 0.0.
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (tx, ty) = ((x + pad_x) as usize, (y + pad_y) as usize);
        if tx >= size || ty >= size {
            continue;
        }
        let normalized = (pixel[0] as f32 - SCRFD_MEAN) / SCRFD_STD;
        for channel in 0..3 {
            tensor[[0, channel, ty, tx]] = normalized;
        }
    }

    (tensor, letterbox)
}

/// Find output tensors by their `score_8`/`bbox_8`/`kps_8` names, falling
/// back to positional order [scores ×3, bboxes ×3, kps ×3].
fn map_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let named: Option<Vec<StrideOutputs>> = SCRFD_STRIDES
        .iter()
        .map(|&s| Some((find("score", s)?, find("bbox", s)?, find("kps", s)?)))
        .collect();

    match named {
        Some(v) => [v[0], v[1], v[2]],
        None => [(0, 3, 6), (1, 4, 7), (2, 5, 8)],
    }
}

struct StrideHead<'a> {
    scores: &'a [f32],
    bboxes: &'a [f32],
    kps: &'a [f32],
    stride: usize,
}

fn decode_stride(head: StrideHead<'_>, letterbox: &Letterbox, threshold: f32) -> Vec<FaceRegion> {
    let stride = head.stride as f32;
    let grid_w = SCRFD_INPUT_SIZE as usize / head.stride;
    let grid_h = SCRFD_INPUT_SIZE as usize / head.stride;
    let anchors = grid_w * grid_h * SCRFD_ANCHORS_PER_CELL;

    let mut regions = Vec::new();
    for idx in 0..anchors {
        let score = head.scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }
        let Some(offsets) = head.bboxes.get(idx * 4..idx * 4 + 4) else {
            continue;
        };

        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let cx = (cell % grid_w) as f32 * stride;
        let cy = (cell / grid_w) as f32 * stride;

        let (x1, y1) = letterbox.to_source((cx - offsets[0] * stride, cy - offsets[1] * stride));
        let (x2, y2) = letterbox.to_source((cx + offsets[2] * stride, cy + offsets[3] * stride));

        let landmarks = head.kps.get(idx * 10..idx * 10 + 10).map(|k| {
            std::array::from_fn(|i| {
                letterbox.to_source((cx + k[i * 2] * stride, cy + k[i * 2 + 1] * stride))
            })
        });

        regions.push(FaceRegion {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
            landmarks,
        });
    }
    regions
}

/// Greedy non-maximum suppression; output is sorted by confidence.
fn nms(mut regions: Vec<FaceRegion>, iou_threshold: f32) -> Vec<FaceRegion> {
    regions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceRegion> = Vec::new();
    for candidate in regions {
        if keep.iter().all(|k| iou(k, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &FaceRegion, b: &FaceRegion) -> f32 {
    let inter_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let inter_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let inter = inter_w * inter_h;
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 { inter / union } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn region(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> FaceRegion {
        FaceRegion {
            x,
            y,
            width: w,
            height: h,
            confidence,
            landmarks: None,
        }
    }

    #[test]
    fn test_iou() {
        let a = region(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = region(5.0, 0.0, 10.0, 10.0, 1.0);
        let c = region(20.0, 20.0, 10.0, 10.0, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(iou(&a, &c), 0.0);
    }

    #[test]
    fn test_nms_keeps_best_of_overlapping() {
        let kept = nms(
            vec![
                region(5.0, 5.0, 100.0, 100.0, 0.8),
                region(200.0, 200.0, 50.0, 50.0, 0.7),
                region(0.0, 0.0, 100.0, 100.0, 0.9),
            ],
            0.4,
        );
        let scores: Vec<f32> = kept.iter().map(|r| r.confidence).collect();
        assert_eq!(scores, vec![0.9, 0.7]);
    }

    #[test]
    fn test_letterbox_maps_back_to_source() {
        let lb = Letterbox::fit(320, 240, SCRFD_INPUT_SIZE);
        assert!((lb.scale - 2.0).abs() < 1e-6);
        assert!(lb.pad_x.abs() < 1e-6);
        assert!((lb.pad_y - 80.0).abs() < 1e-6);

        let (x, y) = lb.to_source((100.0 * lb.scale + lb.pad_x, 50.0 * lb.scale + lb.pad_y));
        assert!((x - 100.0).abs() < 1e-3);
        assert!((y - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_preprocess_pads_with_zero() {
        let image = GrayImage::from_pixel(320, 240, Luma([255]));
        let (tensor, _) = preprocess(&image);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        // Top padding band normalizes to zero, image area does not.
        assert_eq!(tensor[[0, 0, 10, 320]], 0.0);
        let inside = tensor[[0, 1, 320, 320]];
        assert!((inside - (255.0 - SCRFD_MEAN) / SCRFD_STD).abs() < 1e-4);
    }

    #[test]
    fn test_map_outputs_by_name() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8", "bbox_16", "kps_16", "score_16", "bbox_32", "kps_32",
            "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(map_outputs(&names), [(2, 0, 1), (5, 3, 4), (8, 6, 7)]);
    }

    #[test]
    fn test_map_outputs_positional() {
        let names: Vec<String> = (0..9).map(|i| format!("{}", 440 + i)).collect();
        assert_eq!(map_outputs(&names), [(0, 3, 6), (1, 4, 7), (2, 5, 8)]);
    }

    #[test]
    fn test_decode_single_anchor() {
        let stride = 32usize;
        let cells = (640 / stride) * (640 / stride);
        let mut scores = vec![0.0f32; cells * 2];
        let mut bboxes = vec![0.0f32; cells * 2 * 4];
        let kps = vec![0.0f32; cells * 2 * 10];

        // Anchor index 2 → cell 1 → centre (32, 0) in model space.
        scores[2] = 0.95;
        bboxes[8..12].copy_from_slice(&[0.5, 0.0, 0.5, 1.0]);

        let identity = Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };
        let regions = decode_stride(
            StrideHead {
                scores: &scores,
                bboxes: &bboxes,
                kps: &kps,
                stride,
            },
            &identity,
            0.5,
        );

        assert_eq!(regions.len(), 1);
        let r = &regions[0];
        assert_eq!((r.x, r.y, r.width, r.height), (16.0, 0.0, 32.0, 32.0));
        assert_eq!(r.landmarks.map(|l| l[0]), Some((32.0, 0.0)));
    }
}

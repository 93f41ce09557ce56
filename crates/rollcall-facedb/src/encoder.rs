//! Turning an image into face embeddings.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{Embedding, FaceRegion};
use image::GrayImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Finds faces in an image and embeds each of them.
///
/// Implementations return faces most confident first.
pub trait FaceEncoder {
    fn encode(&mut self, image: &GrayImage) -> Result<Vec<(FaceRegion, Embedding)>, EncoderError>;

    /// Encode only the most confident face.
    fn encode_best(
        &mut self,
        image: &GrayImage,
    ) -> Result<Option<(FaceRegion, Embedding)>, EncoderError> {
        Ok(self.encode(image)?.into_iter().next())
    }
}

/// SCRFD detection followed by ArcFace embedding.
pub struct OnnxEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxEncoder {
    pub fn new(detector: FaceDetector, recognizer: FaceRecognizer) -> Self {
        Self {
            detector,
            recognizer,
        }
    }

    /// Load `det_10g.onnx` and `w600k_r50.onnx`.
    pub fn load(detector_path: &Path, recognizer_path: &Path) -> Result<Self, EncoderError> {
        Ok(Self::new(
            FaceDetector::load(detector_path)?,
            FaceRecognizer::load(recognizer_path)?,
        ))
    }
}

impl FaceEncoder for OnnxEncoder {
    fn encode(&mut self, image: &GrayImage) -> Result<Vec<(FaceRegion, Embedding)>, EncoderError> {
        let faces = self.detector.detect(image)?;
        tracing::debug!(count = faces.len(), "faces detected");

        let mut encoded = Vec::with_capacity(faces.len());
        for face in faces {
            let embedding = self.recognizer.extract(image, &face)?;
            encoded.push((face, embedding));
        }
        Ok(encoded)
    }

    fn encode_best(
        &mut self,
        image: &GrayImage,
    ) -> Result<Option<(FaceRegion, Embedding)>, EncoderError> {
        let Some(face) = self.detector.detect(image)?.into_iter().next() else {
            return Ok(None);
        };
        let embedding = self.recognizer.extract(image, &face)?;
        Ok(Some((face, embedding)))
    }
}

use crate::encoder::{EncoderError, FaceEncoder, OnnxEncoder};
use crate::store::{FaceStore, StoreError};
use crate::types::{CosineMatcher, FaceRecord, FaceRegion, Matcher, Recognition};
use image::GrayImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Cosine similarity a probe must reach to count as a match.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.40;

const DETECTOR_MODEL: &str = "det_10g.onnx";
const RECOGNIZER_MODEL: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum FaceDbError {
    #[error("no face detected in the image")]
    NoFaceDetected,
    #[error("could not read image: {0}")]
    Image(#[from] image::ImageError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Encoder(#[from] EncoderError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where the face database keeps its models and records.
#[derive(Debug, Clone)]
pub struct FaceDbConfig {
    pub model_dir: PathBuf,
    pub db_path: PathBuf,
    pub similarity_threshold: f32,
}

impl FaceDbConfig {
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(DETECTOR_MODEL)
    }

    pub fn recognizer_model_path(&self) -> PathBuf {
        self.model_dir.join(RECOGNIZER_MODEL)
    }
}

/// `$XDG_DATA_HOME/rollcall/models`, or `~/.local/share/rollcall/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
        .join("models")
}

/// Decode an image file to grayscale. The format is sniffed from the
/// content, not the extension.
pub fn load_image(path: &Path) -> Result<GrayImage, FaceDbError> {
    let reader = image::ImageReader::open(path)?.with_guessed_format()?;
    Ok(reader.decode()?.to_luma8())
}

/// Enrolled identities plus the encoder used to match new images against them.
pub struct FaceDb<E> {
    encoder: E,
    store: FaceStore,
    matcher: CosineMatcher,
    threshold: f32,
}

impl FaceDb<OnnxEncoder> {
    /// Load both ONNX models and open the store. Fails if any is missing.
    pub fn open(config: &FaceDbConfig) -> Result<Self, FaceDbError> {
        let encoder = OnnxEncoder::load(
            &config.detector_model_path(),
            &config.recognizer_model_path(),
        )?;
        let store = FaceStore::open(&config.db_path)?;
        Ok(Self::new(encoder, store, config.similarity_threshold))
    }
}

impl<E: FaceEncoder> FaceDb<E> {
    pub fn new(encoder: E, store: FaceStore, threshold: f32) -> Self {
        Self {
            encoder,
            store,
            matcher: CosineMatcher,
            threshold,
        }
    }

    /// Enroll the most confident face in `image` under `id`.
    pub fn add(&mut self, image: &GrayImage, id: &str, name: &str) -> Result<String, FaceDbError> {
        let (region, embedding) = self
            .encoder
            .encode_best(image)?
            .ok_or(FaceDbError::NoFaceDetected)?;

        let record = FaceRecord {
            id: id.to_string(),
            name: name.to_string(),
            embedding,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.store.insert(&record)?;

        tracing::info!(id, name, confidence = region.confidence, "face enrolled");
        Ok(record.id)
    }

    /// Match the most confident face in `image` against the enrolled faces.
    ///
    /// `None` when there is no face or nothing clears the threshold.
    pub fn recognize(&mut self, image: &GrayImage) -> Result<Option<Recognition>, FaceDbError> {
        let Some((region, embedding)) = self.encoder.encode_best(image)? else {
            tracing::debug!("recognize: no face in image");
            return Ok(None);
        };
        let gallery = self.store.all()?;
        Ok(self.identify(region, &embedding, &gallery))
    }

    /// Match every face in `image`, most confident first.
    pub fn recognize_all(
        &mut self,
        image: &GrayImage,
    ) -> Result<Vec<(FaceRegion, Option<Recognition>)>, FaceDbError> {
        let faces = self.encoder.encode(image)?;
        if faces.is_empty() {
            return Ok(Vec::new());
        }
        let gallery = self.store.all()?;
        Ok(faces
            .into_iter()
            .map(|(region, embedding)| {
                let recognition = self.identify(region.clone(), &embedding, &gallery);
                (region, recognition)
            })
            .collect())
    }

    fn identify(
        &self,
        region: FaceRegion,
        embedding: &crate::Embedding,
        gallery: &[FaceRecord],
    ) -> Option<Recognition> {
        let result = self.matcher.compare(embedding, gallery, self.threshold);
        tracing::debug!(
            matched = result.matched,
            similarity = result.similarity,
            gallery = gallery.len(),
            "compared face against gallery"
        );
        match (result.matched, result.id, result.name) {
            (true, Some(id), Some(name)) => Some(Recognition {
                id,
                name,
                confidence: result.similarity,
                region,
            }),
            _ => None,
        }
    }

    pub fn list(&self) -> Result<Vec<FaceRecord>, FaceDbError> {
        Ok(self.store.all()?)
    }

    pub fn get(&self, id: &str) -> Result<Option<FaceRecord>, FaceDbError> {
        Ok(self.store.get(id)?)
    }

    pub fn remove(&self, id: &str) -> Result<bool, FaceDbError> {
        Ok(self.store.remove(id)?)
    }

    pub fn len(&self) -> Result<usize, FaceDbError> {
        Ok(self.store.count()?)
    }

    pub fn is_empty(&self) -> Result<bool, FaceDbError> {
        Ok(self.len()? == 0)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

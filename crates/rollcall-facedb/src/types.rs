use serde::{Deserialize, Serialize};

/// A detected face: box in source-image pixels, detector score and the
/// five alignment landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl FaceRegion {
    /// Integer rectangle `(x, y, w, h)` clipped to a `width` × `height` image.
    ///
    /// Returns `None` when the region lies entirely outside the image.
    pub fn clipped_rect(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x.max(0.0).floor() as u32;
        let y0 = self.y.max(0.0).floor() as u32;
        let x1 = ((self.x + self.width).ceil().max(0.0) as u32).min(width);
        let y1 = ((self.y + self.height).ceil().max(0.0) as u32).min(height);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model that produced this embedding (e.g. "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Cosine similarity in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Scale to unit length. Zero vectors are left untouched.
    pub fn normalized(mut self) -> Self {
        let norm: f32 = self.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut self.values {
                *v /= norm;
            }
        }
        self
    }
}

/// A stored identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceRecord {
    /// Composite `"{reg_no}_{name}"` key, see [`crate::FaceId`].
    pub id: String,
    pub name: String,
    pub embedding: Embedding,
    pub created_at: String,
}

/// Outcome of comparing a probe against the gallery.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    /// Cosine similarity of the best gallery entry.
    pub similarity: f32,
    pub id: Option<String>,
    pub name: Option<String>,
}

impl MatchResult {
    fn miss(similarity: f32) -> Self {
        Self {
            matched: false,
            similarity,
            id: None,
            name: None,
        }
    }
}

/// A face that matched a stored identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recognition {
    pub id: String,
    pub name: String,
    pub confidence: f32,
    pub region: FaceRegion,
}

/// Strategy for comparing a probe embedding against the stored identities.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[FaceRecord], threshold: f32) -> MatchResult;
}

/// Cosine similarity matcher.
///
/// Visits every gallery entry; there is no early exit on a good match.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[FaceRecord], threshold: f32) -> MatchResult {
        let mut best_sim = f32::NEG_INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, record) in gallery.iter().enumerate() {
            let sim = probe.similarity(&record.embedding);
            if sim > best_sim {
                best_sim = sim;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_sim >= threshold => MatchResult {
                matched: true,
                similarity: best_sim,
                id: Some(gallery[idx].id.clone()),
                name: Some(gallery[idx].name.clone()),
            },
            Some(_) => MatchResult::miss(best_sim),
            None => MatchResult::miss(0.0),
        }
    }
}

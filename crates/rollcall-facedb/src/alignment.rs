//! Face alignment to the canonical ArcFace crop.
//!
//! A 4-DOF similarity transform (scale, rotation, translation) is fitted by
//! least squares from the five detected landmarks to the InsightFace
//! reference positions, then the face is resampled into a 112×112 crop.

use image::{GrayImage, Luma};

/// Side of the aligned crop fed to the recognizer.
pub const ALIGNED_SIZE: u32 = 112;

/// InsightFace reference landmarks for a 112×112 crop.
pub const REFERENCE_LANDMARKS: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

/// `dst = [[a, -b], [b, a]] * src + [tx, ty]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityTransform {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl SimilarityTransform {
    const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        tx: 0.0,
        ty: 0.0,
    };

    /// Least-squares fit mapping `src` points onto `dst` points.
    ///
    /// Each pair contributes two rows of the normal equations:
    ///   sx·a − sy·b + tx = dx
    ///   sy·a + sx·b + ty = dy
    pub fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Self {
        let mut ata = [[0.0f32; 4]; 4];
        let mut atb = [0.0f32; 4];

        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            let rows = [([sx, -sy, 1.0, 0.0], dx), ([sy, sx, 0.0, 1.0], dy)];
            for (row, rhs) in rows {
                for j in 0..4 {
                    for k in 0..4 {
                        ata[j][k] += row[j] * row[k];
                    }
                    atb[j] += row[j] * rhs;
                }
            }
        }

        match solve_normal_equations(ata, atb) {
            Some([a, b, tx, ty]) => Self { a, b, tx, ty },
            None => Self::IDENTITY,
        }
    }

    pub fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    /// Map a destination point back into source space.
    ///
    /// Returns `None` for a degenerate (zero-scale) transform.
    pub fn invert(&self, (x, y): (f32, f32)) -> Option<(f32, f32)> {
        let det = self.a * self.a + self.b * self.b;
        if det.abs() < 1e-12 {
            return None;
        }
        let dx = x - self.tx;
        let dy = y - self.ty;
        Some((
            (self.a * dx + self.b * dy) / det,
            (-self.b * dx + self.a * dy) / det,
        ))
    }
}

/// Gaussian elimination with partial pivoting on a 4×4 system.
fn solve_normal_equations(mut m: [[f32; 4]; 4], mut rhs: [f32; 4]) -> Option<[f32; 4]> {
    for col in 0..4 {
        let pivot_row = (col..4)
            .max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))
            .unwrap_or(col);
        m.swap(col, pivot_row);
        rhs.swap(col, pivot_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            return None;
        }
        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for k in col..4 {
                m[row][k] -= factor * m[col][k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        let tail: f32 = ((i + 1)..4).map(|j| m[i][j] * x[j]).sum();
        x[i] = (rhs[i] - tail) / m[i][i];
    }
    Some(x)
}

/// Bilinear sample; pixels outside the image read as black.
fn sample_bilinear(image: &GrayImage, sx: f32, sy: f32) -> f32 {
    let x0 = sx.floor() as i64;
    let y0 = sy.floor() as i64;
    let fx = sx - x0 as f32;
    let fy = sy - y0 as f32;

    let at = |x: i64, y: i64| -> f32 {
        if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
            image.get_pixel(x as u32, y as u32)[0] as f32
        } else {
            0.0
        }
    };

    at(x0, y0) * (1.0 - fx) * (1.0 - fy)
        + at(x0 + 1, y0) * fx * (1.0 - fy)
        + at(x0, y0 + 1) * (1.0 - fx) * fy
        + at(x0 + 1, y0 + 1) * fx * fy
}

/// Resample `image` through `transform` into an `out_size`² crop.
pub fn warp(image: &GrayImage, transform: &SimilarityTransform, out_size: u32) -> GrayImage {
    let mut out = GrayImage::new(out_size, out_size);
    for (ox, oy, pixel) in out.enumerate_pixels_mut() {
        let value = transform
            .invert((ox as f32, oy as f32))
            .map(|(sx, sy)| sample_bilinear(image, sx, sy))
            .unwrap_or(0.0);
        *pixel = Luma([value.round().clamp(0.0, 255.0) as u8]);
    }
    out
}

/// Align a face to the canonical 112×112 ArcFace crop.
pub fn align_face(image: &GrayImage, landmarks: &[(f32, f32); 5]) -> GrayImage {
    let transform = SimilarityTransform::estimate(landmarks, &REFERENCE_LANDMARKS);
    warp(image, &transform, ALIGNED_SIZE)
}

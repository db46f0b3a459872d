//! No-reference image quality scoring.
//!
//! The scorer itself is an opaque backend behind [`QualityScorer`]; the
//! batch around it owns the parts that matter to the workflow: integrity
//! checking, per-image fault isolation, and the valid/corrupted split.

use crate::scan::{self, ScanOptions};
use anyhow::Result;
use image::DynamicImage;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Scalar image-quality backend: image in, score out.
pub trait QualityScorer {
    /// Metric label; the valid-results CSV score column is `<metric>_score`.
    fn metric(&self) -> &str;

    fn score(&self, image: &DynamicImage) -> Result<f64>;
}

/// Why one image produced no score. The batch keeps going either way.
#[derive(Debug, Error)]
pub enum ScoreError {
    /// Unreadable or corrupt image file.
    #[error("{0}")]
    Corrupt(String),
    /// The scoring backend failed on an otherwise readable image.
    #[error("model failure: {0}")]
    Model(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRow {
    pub path: PathBuf,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptRow {
    pub path: PathBuf,
    pub error: String,
}

/// Result of a quality batch. Every eligible input lands in exactly one of
/// the two tables.
#[derive(Debug, Default)]
pub struct QualityReport {
    pub valid: Vec<ScoredRow>,
    pub corrupted: Vec<CorruptRow>,
}

/// Score every image under `dir` (recursively, so both flat corpora and
/// per-category layouts work). Fatal only when the directory is missing or
/// holds no eligible images; corrupt files and backend failures are recorded
/// and skipped.
pub fn score_folder(dir: &Path, scorer: &dyn QualityScorer) -> Result<QualityReport> {
    let paths = scan::scan_images(dir, ScanOptions { recursive: true })?;
    if paths.is_empty() {
        anyhow::bail!(
            "no images found in {}; add images in JPG, JPEG, or PNG format",
            dir.display()
        );
    }

    let mut out = QualityReport::default();
    for path in paths {
        match score_one(&path, scorer) {
            Ok(score) => {
                tracing::debug!("{}: {} {:.4}", path.display(), scorer.metric(), score);
                out.valid.push(ScoredRow { path, score });
            }
            Err(err) => {
                tracing::warn!("bad image {}: {err}", path.display());
                out.corrupted.push(CorruptRow {
                    path,
                    error: err.to_string(),
                });
            }
        }
    }
    tracing::info!(
        "scored {} images, {} corrupted",
        out.valid.len(),
        out.corrupted.len()
    );
    Ok(out)
}

fn score_one(path: &Path, scorer: &dyn QualityScorer) -> Result<f64, ScoreError> {
    verify_image(path)?;
    // Second open for the real decode, after the integrity pass.
    let image = image::open(path).map_err(|e| ScoreError::Corrupt(e.to_string()))?;
    scorer
        .score(&image)
        .map_err(|e| ScoreError::Model(e.to_string()))
}

/// Cheap integrity pass before decoding: JPEG headers through `jpeg-decoder`,
/// everything else through the `image` reader's header probe.
fn verify_image(path: &Path) -> Result<(), ScoreError> {
    let corrupt = |e: String| ScoreError::Corrupt(e);
    let is_jpeg = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg"))
        .unwrap_or(false);

    if is_jpeg {
        let file = File::open(path).map_err(|e| corrupt(e.to_string()))?;
        let mut decoder = jpeg_decoder::Decoder::new(BufReader::new(file));
        decoder.read_info().map_err(|e| corrupt(e.to_string()))?;
    } else {
        image::ImageReader::open(path)
            .map_err(|e| corrupt(e.to_string()))?
            .with_guessed_format()
            .map_err(|e| corrupt(e.to_string()))?
            .into_dimensions()
            .map_err(|e| corrupt(e.to_string()))?;
    }
    Ok(())
}

/// Built-in blur metric: variance of the 3x3 Laplacian over the grayscale
/// image. Higher means sharper. Always available, no model files needed.
#[derive(Debug, Default, Clone, Copy)]
pub struct LaplacianScorer;

impl QualityScorer for LaplacianScorer {
    fn metric(&self) -> &str {
        "laplacian"
    }

    fn score(&self, image: &DynamicImage) -> Result<f64> {
        Ok(laplacian_variance(image))
    }
}

fn laplacian_variance(image: &DynamicImage) -> f64 {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let mut values = Vec::with_capacity(((width - 2) * (height - 2)) as usize);
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let center = i32::from(gray.get_pixel(x, y)[0]);
            let top = i32::from(gray.get_pixel(x, y - 1)[0]);
            let bottom = i32::from(gray.get_pixel(x, y + 1)[0]);
            let left = i32::from(gray.get_pixel(x - 1, y)[0]);
            let right = i32::from(gray.get_pixel(x + 1, y)[0]);
            values.push(f64::from(top + bottom + left + right - 4 * center));
        }
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

#[cfg(feature = "ort")]
pub use self::onnx::{OrtScorer, OrtScorerConfig};

#[cfg(feature = "ort")]
mod onnx {
    use super::QualityScorer;
    use anyhow::{Context, Result, anyhow};
    use image::{DynamicImage, imageops::FilterType};
    use ndarray::{Array4, CowArray};
    use ort::{
        GraphOptimizationLevel, SessionBuilder, environment::Environment, session::Session,
        tensor::OrtOwnedTensor, value::Value,
    };
    use std::path::PathBuf;
    use std::sync::{Arc, OnceLock};

    static ORT_ENV: OnceLock<Arc<Environment>> = OnceLock::new();

    fn ort_env() -> Result<Arc<Environment>> {
        if let Some(env) = ORT_ENV.get() {
            return Ok(env.clone());
        }
        let env = Environment::builder()
            .with_name("florasift")
            .build()
            .map_err(|e| anyhow!("cannot initialize ONNX Runtime: {e}"))?
            .into_arc();
        let _ = ORT_ENV.set(env.clone());
        Ok(env)
    }

    /// Configuration for the ONNX-backed no-reference scorer.
    #[derive(Debug, Clone)]
    pub struct OrtScorerConfig {
        pub model_path: PathBuf,
        pub metric: String,
        pub input_size: u32,
        pub mean: [f32; 3],
        pub std: [f32; 3],
    }

    impl Default for OrtScorerConfig {
        fn default() -> Self {
            Self {
                model_path: PathBuf::from("models/niqe.onnx"),
                metric: "NIQE".to_string(),
                input_size: 512,
                mean: [0.485, 0.456, 0.406],
                std: [0.229, 0.224, 0.225],
            }
        }
    }

    /// No-reference IQA network backed by ONNX Runtime. Expects a model
    /// taking a normalized 1x3xNxN float input and returning a scalar score
    /// as its first output.
    pub struct OrtScorer {
        session: Session,
        metric: String,
        input_size: u32,
        mean: [f32; 3],
        std: [f32; 3],
    }

    impl OrtScorer {
        pub fn new(config: &OrtScorerConfig) -> Result<Self> {
            if !config.model_path.exists() {
                anyhow::bail!("model file missing: {}", config.model_path.display());
            }
            let env = ort_env()?;
            let session = SessionBuilder::new(&env)?
                .with_optimization_level(GraphOptimizationLevel::Level1)?
                .with_model_from_file(&config.model_path)
                .with_context(|| format!("cannot load {}", config.model_path.display()))?;
            Ok(Self {
                session,
                metric: config.metric.clone(),
                input_size: config.input_size,
                mean: config.mean,
                std: config.std,
            })
        }

        fn prepare_input(&self, image: &DynamicImage) -> Array4<f32> {
            let size = self.input_size;
            let resized = image
                .resize_exact(size, size, FilterType::Triangle)
                .to_rgb8();
            let mut array = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
            for (x, y, pixel) in resized.enumerate_pixels() {
                let [r, g, b] = pixel.0;
                let (row, col) = (y as usize, x as usize);
                array[[0, 0, row, col]] = normalize(r, self.mean[0], self.std[0]);
                array[[0, 1, row, col]] = normalize(g, self.mean[1], self.std[1]);
                array[[0, 2, row, col]] = normalize(b, self.mean[2], self.std[2]);
            }
            array
        }
    }

    impl QualityScorer for OrtScorer {
        fn metric(&self) -> &str {
            &self.metric
        }

        fn score(&self, image: &DynamicImage) -> Result<f64> {
            let input_array = self.prepare_input(image).into_dyn();
            let cow = CowArray::from(input_array.view());
            let input = Value::from_array(self.session.allocator(), &cow)
                .map_err(|e| anyhow!("cannot build input tensor: {e}"))?;
            let outputs: Vec<Value> = self.session.run(vec![input])?;
            let first = outputs
                .first()
                .ok_or_else(|| anyhow!("model returned no output"))?;
            let tensor: OrtOwnedTensor<f32, _> = first.try_extract()?;
            let view = tensor.view();
            let score = view
                .iter()
                .next()
                .copied()
                .ok_or_else(|| anyhow!("model returned an empty tensor"))?;
            Ok(f64::from(score))
        }
    }

    fn normalize(value: u8, mean: f32, std: f32) -> f32 {
        (f32::from(value) / 255.0 - mean) / std
    }
}

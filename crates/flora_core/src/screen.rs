//! Yes/no screening passes driven by a vision-language model.
//!
//! Two batches share the same shape: send every image with a prompt, read a
//! short completion back, normalize it to a fixed label. The blur screen
//! walks one sampled seed folder; the taxa pass walks an arbitrary corpus
//! and derives the expected flower from each filename.

use crate::naming;
use crate::scan::{self, ScanOptions};
use crate::vlm::VisionModel;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Normalized verdict for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    /// The completion mentioned neither word. Kept apart from a genuine no
    /// so unparseable output stays visible in the results.
    Unclear,
    /// The model call itself failed.
    Error,
}

impl Answer {
    /// Substring match over the raw completion, `Yes` checked first. Never
    /// produces [`Answer::Error`]; that label is reserved for failed calls.
    pub fn parse(response: &str) -> Self {
        if response.contains("Yes") {
            Answer::Yes
        } else if response.contains("No") {
            Answer::No
        } else {
            Answer::Unclear
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Answer::Yes => "Yes",
            Answer::No => "No",
            Answer::Unclear => "Unclear",
            Answer::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenRow {
    pub image_name: String,
    pub answer: Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxaRow {
    pub image_name: String,
    pub answer: Answer,
    /// Flower name derived from the filename; `N/A` when the call failed.
    pub flower: String,
}

/// Run the fixed-prompt screen over one sampled seed folder. Fatal when the
/// seed folder is missing or holds no images; a failed model call records an
/// `Error` row and the batch moves on.
pub fn screen_seed_folder(
    base: &Path,
    seed: u64,
    categories: &[String],
    prompt: &str,
    model: &dyn VisionModel,
) -> Result<Vec<ScreenRow>> {
    let paths = scan::gather_seed_images(base, seed, categories)?;
    if paths.is_empty() {
        anyhow::bail!(
            "no images found in {}; add images in JPG, JPEG, or PNG format",
            scan::seed_dir(base, seed).display()
        );
    }
    Ok(run_screen(&paths, prompt, model))
}

/// Same screen over an arbitrary corpus directory, flat or nested.
pub fn screen_folder(dir: &Path, prompt: &str, model: &dyn VisionModel) -> Result<Vec<ScreenRow>> {
    let paths = scan::scan_images(dir, ScanOptions { recursive: true })?;
    if paths.is_empty() {
        anyhow::bail!(
            "no images found in {}; add images in JPG, JPEG, or PNG format",
            dir.display()
        );
    }
    Ok(run_screen(&paths, prompt, model))
}

fn run_screen(paths: &[PathBuf], prompt: &str, model: &dyn VisionModel) -> Vec<ScreenRow> {
    tracing::info!("total images to process: {}", paths.len());
    let mut rows = Vec::with_capacity(paths.len());
    for path in paths {
        let image_name = file_name(path);
        match model.complete(path, prompt) {
            Ok(response) => {
                let answer = Answer::parse(&response);
                tracing::info!("processed {image_name}: {}", answer.as_str());
                rows.push(ScreenRow { image_name, answer });
            }
            Err(err) => {
                tracing::warn!("error processing {}: {err}", path.display());
                rows.push(ScreenRow {
                    image_name,
                    answer: Answer::Error,
                });
            }
        }
    }
    rows
}

/// Ask per image whether it shows taxa other than the flower its filename
/// names. `template` must carry a `{flower}` placeholder.
pub fn screen_taxa(
    dir: &Path,
    template: &str,
    model: &dyn VisionModel,
) -> Result<Vec<TaxaRow>> {
    let paths = scan::scan_images(dir, ScanOptions { recursive: true })?;
    if paths.is_empty() {
        anyhow::bail!(
            "no images found in {}; add images in JPG, JPEG, or PNG format",
            dir.display()
        );
    }
    tracing::info!("total images to process: {}", paths.len());

    let mut rows = Vec::with_capacity(paths.len());
    for path in &paths {
        let image_name = file_name(path);
        let flower = naming::flower_name(&image_name).to_string();
        let prompt = template.replace("{flower}", &flower);
        match model.complete(path, &prompt) {
            Ok(response) => {
                let answer = Answer::parse(&response);
                tracing::info!("processed {image_name}: {} (flower: {flower})", answer.as_str());
                rows.push(TaxaRow {
                    image_name,
                    answer,
                    flower,
                });
            }
            Err(err) => {
                tracing::warn!("error processing {}: {err}", path.display());
                rows.push(TaxaRow {
                    image_name,
                    answer: Answer::Error,
                    flower: "N/A".to_string(),
                });
            }
        }
    }
    Ok(rows)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

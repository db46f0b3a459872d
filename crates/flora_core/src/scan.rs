//! Directory enumeration for image batches.

use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Options controlling how folder scanning behaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// When true, scan subdirectories recursively.
    pub recursive: bool,
}

/// Scan a folder for image files and return their paths in sorted order.
///
/// Sorting keeps downstream sampling and CSV row order identical across
/// platforms. An existing-but-empty folder yields an empty list; callers
/// that require eligible images treat that as fatal themselves.
pub fn scan_images(path: impl AsRef<Path>, opts: ScanOptions) -> Result<Vec<PathBuf>> {
    let root = path.as_ref();
    if !root.exists() {
        anyhow::bail!("directory does not exist: {}", root.display());
    }
    if !root.is_dir() {
        anyhow::bail!("path is not a directory: {}", root.display());
    }

    let walker = if opts.recursive {
        WalkDir::new(root).into_iter()
    } else {
        WalkDir::new(root).max_depth(1).into_iter()
    };

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("walkdir error: {}", e);
                continue;
            }
        };
        let path = entry.path();
        if path.is_file() && is_supported_image(path) {
            paths.push(path.to_path_buf());
        }
    }

    paths.sort();
    Ok(paths)
}

/// Destination folder for one seed of a sampling experiment.
pub fn seed_dir(base: &Path, seed: u64) -> PathBuf {
    base.join(format!("seed_{seed}"))
}

/// Gather images from `<base>/seed_<seed>/<category>/` for every configured
/// category. Missing category subfolders are skipped; a missing seed folder
/// is fatal.
pub fn gather_seed_images(base: &Path, seed: u64, categories: &[String]) -> Result<Vec<PathBuf>> {
    let seed_root = seed_dir(base, seed);
    if !seed_root.is_dir() {
        anyhow::bail!(
            "directory does not exist: {}; run the sampler for seed {} first",
            seed_root.display(),
            seed
        );
    }

    let mut paths = Vec::new();
    for category in categories {
        let folder = seed_root.join(category);
        if !folder.is_dir() {
            continue;
        }
        let found = scan_images(&folder, ScanOptions::default())?;
        tracing::info!("found {} images in {}", found.len(), category);
        paths.extend(found);
    }
    Ok(paths)
}

fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) => {
            let ext = ext.to_ascii_lowercase();
            matches!(ext.as_str(), "jpg" | "jpeg" | "png")
        }
        None => false,
    }
}

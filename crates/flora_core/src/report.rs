//! Result tables and metadata files.
//!
//! Every batch ends the same way: accumulate rows in memory, then write one
//! CSV (or JSON record) in a single pass. Headers are part of the workflow's
//! downstream tooling, so they are fixed here rather than derived.

use crate::quality::{CorruptRow, ScoredRow};
use crate::screen::{ScreenRow, TaxaRow};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Valid-results table: `Image_Path,<metric>_score`.
pub fn write_quality_csv(rows: &[ScoredRow], metric: &str, path: impl AsRef<Path>) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    let score_header = format!("{metric}_score");
    wtr.write_record(["Image_Path", score_header.as_str()])?;
    for row in rows {
        let score = format!("{}", row.score);
        wtr.write_record([row.path.to_string_lossy().as_ref(), score.as_str()])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Corrupted-results table: `Image_Path,Error`.
pub fn write_corrupted_csv(rows: &[CorruptRow], path: impl AsRef<Path>) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["Image_Path", "Error"])?;
    for row in rows {
        wtr.write_record([row.path.to_string_lossy().as_ref(), row.error.as_str()])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Screening table: `image_name,<answer_column>`.
pub fn write_screen_csv(
    rows: &[ScreenRow],
    answer_column: &str,
    path: impl AsRef<Path>,
) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["image_name", answer_column])?;
    for row in rows {
        wtr.write_record([row.image_name.as_str(), row.answer.as_str()])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Taxa table: `Image Name,Contains Other Taxa,Identified Flower Name`.
pub fn write_taxa_csv(rows: &[TaxaRow], path: impl AsRef<Path>) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["Image Name", "Contains Other Taxa", "Identified Flower Name"])?;
    for row in rows {
        wtr.write_record([
            row.image_name.as_str(),
            row.answer.as_str(),
            row.flower.as_str(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Serialize `value` as pretty JSON, creating parent directories as needed.
pub fn write_json_pretty<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("cannot write {}", path.display()))?;
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub copied: usize,
    pub missing: usize,
}

/// Copy every file a CSV column lists into `dest`, keeping filenames. Rows
/// pointing at files that no longer exist are logged and counted, not fatal;
/// a missing column is.
pub fn copy_listed_files(csv_path: &Path, column: &str, dest: &Path) -> Result<CopyStats> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("cannot open {}", csv_path.display()))?;
    let idx = reader
        .headers()?
        .iter()
        .position(|h| h == column)
        .with_context(|| format!("column '{column}' not found in {}", csv_path.display()))?;

    fs::create_dir_all(dest).with_context(|| format!("cannot create {}", dest.display()))?;

    let mut stats = CopyStats::default();
    for record in reader.records() {
        let record = record?;
        let Some(src) = record.get(idx) else {
            continue;
        };
        let src_path = Path::new(src);
        let Some(file_name) = src_path.file_name() else {
            tracing::warn!("file not found: {src}");
            stats.missing += 1;
            continue;
        };
        if src_path.is_file() {
            fs::copy(src_path, dest.join(file_name))
                .with_context(|| format!("cannot copy {src}"))?;
            stats.copied += 1;
            if stats.copied % 100 == 0 {
                tracing::info!("copied {} files", stats.copied);
            }
        } else {
            tracing::warn!("file not found: {src}");
            stats.missing += 1;
        }
    }
    tracing::info!("copied {} files, {} missing", stats.copied, stats.missing);
    Ok(stats)
}

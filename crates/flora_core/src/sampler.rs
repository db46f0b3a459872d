//! Deterministic stratified sampling of the flower corpus.
//!
//! One sampling run partitions the source folder by category prefix, draws a
//! fixed-size random sample per category from the sorted filename list, and
//! copies the picks into `<dest>/seed_<seed>/<category>/`. The draw is fully
//! determined by the base seed and the category name, so a run can be
//! reproduced byte-for-byte on any machine.

use crate::config::WorkflowConfig;
use crate::naming;
use crate::report;
use crate::scan::{self, ScanOptions};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Per-seed sampling record, written next to the copied files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRunRecord {
    pub seed: u64,
    /// Category -> eligible files found in the source.
    pub available: BTreeMap<String, usize>,
    /// Category -> files actually copied.
    pub copied: BTreeMap<String, usize>,
    /// One entry per short category (fewer files than requested).
    pub warnings: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Aggregate record for a multi-seed experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub source_dir: PathBuf,
    pub samples_per_category: usize,
    pub runs: Vec<SeedRunRecord>,
    pub completed_at: DateTime<Utc>,
}

pub const METADATA_FILE: &str = "sampling_metadata.json";
pub const SUMMARY_FILE: &str = "experiment_summary.json";

/// Partition image filenames into categories by prefix pattern.
///
/// Files matching no category are ignored; files matching several are
/// assigned to the first match only. Buckets come back sorted, which is what
/// makes the seeded draw reproducible.
pub fn partition_by_category(
    paths: &[PathBuf],
    categories: &[String],
) -> BTreeMap<String, Vec<String>> {
    let mut buckets: BTreeMap<String, Vec<String>> = categories
        .iter()
        .map(|c| (c.clone(), Vec::new()))
        .collect();

    for path in paths {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(category) = naming::category_for(name, categories) {
            if let Some(bucket) = buckets.get_mut(category) {
                bucket.push(name.to_string());
            }
        }
    }

    for bucket in buckets.values_mut() {
        bucket.sort();
    }
    buckets
}

/// Seed for one category's draw: the base seed offset by a hash of the
/// category name, so draws are independent of category order in the config.
pub fn category_seed(base: u64, category: &str) -> u64 {
    base.wrapping_add(fnv1a(category.as_bytes()))
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Draw `k` names uniformly without replacement from a sorted list.
///
/// Uses a partial Fisher-Yates shuffle over a copy of the list; with the
/// same seed and the same input the picks are identical on every platform.
/// When the list holds `k` names or fewer, all of them come back.
pub fn draw_sample(names: &[String], k: usize, seed: u64) -> Vec<String> {
    let mut names = names.to_vec();
    if names.len() <= k {
        return names;
    }
    let mut rng = fastrand::Rng::with_seed(seed);
    for i in 0..k {
        let j = rng.usize(i..names.len());
        names.swap(i, j);
    }
    names.truncate(k);
    names
}

/// Run the sampler for a single seed: draw per category, copy the picks into
/// `<dest>/seed_<seed>/<category>/`, and write the metadata record.
pub fn run_seed(config: &WorkflowConfig, seed: u64) -> Result<SeedRunRecord> {
    let source = &config.corpus.source_dir;
    let requested = config.sampling.samples_per_category;

    let paths = scan_images_for_sampling(source)?;
    let buckets = partition_by_category(&paths, &config.corpus.categories);

    let seed_root = scan::seed_dir(&config.sampling.dest_dir, seed);
    let mut record = SeedRunRecord {
        seed,
        available: BTreeMap::new(),
        copied: BTreeMap::new(),
        warnings: Vec::new(),
        completed_at: Utc::now(),
    };

    for category in &config.corpus.categories {
        let names = buckets.get(category).map(Vec::as_slice).unwrap_or(&[]);
        record.available.insert(category.clone(), names.len());
        tracing::info!("found {} images for {}", names.len(), category);

        let picks = if names.len() < requested {
            let warning = format!(
                "only {} images available for {}, copying all of them",
                names.len(),
                category
            );
            tracing::warn!("{warning}");
            record.warnings.push(warning);
            names.to_vec()
        } else {
            draw_sample(names, requested, category_seed(seed, category))
        };

        let dest = seed_root.join(category);
        fs::create_dir_all(&dest)
            .with_context(|| format!("cannot create {}", dest.display()))?;

        for (i, name) in picks.iter().enumerate() {
            let from = source.join(name);
            let to = dest.join(name);
            fs::copy(&from, &to)
                .with_context(|| format!("cannot copy {} to {}", from.display(), to.display()))?;
            if (i + 1) % 100 == 0 || i + 1 == picks.len() {
                tracing::info!("copied {}/{} images for {}", i + 1, picks.len(), category);
            }
        }
        record.copied.insert(category.clone(), picks.len());
    }

    record.completed_at = Utc::now();
    report::write_json_pretty(&record, &seed_root.join(METADATA_FILE))?;
    Ok(record)
}

/// Run the sampler for every configured seed and write the experiment
/// summary at the destination root. A single re-run of one seed goes through
/// [`run_seed`] instead, which leaves the summary untouched.
pub fn run_experiment(config: &WorkflowConfig) -> Result<ExperimentSummary> {
    let mut runs = Vec::with_capacity(config.sampling.seeds.len());
    for &seed in &config.sampling.seeds {
        tracing::info!("sampling with seed {seed}");
        runs.push(run_seed(config, seed)?);
    }

    let summary = ExperimentSummary {
        source_dir: config.corpus.source_dir.clone(),
        samples_per_category: config.sampling.samples_per_category,
        runs,
        completed_at: Utc::now(),
    };
    report::write_json_pretty(&summary, &config.sampling.dest_dir.join(SUMMARY_FILE))?;
    Ok(summary)
}

fn scan_images_for_sampling(source: &Path) -> Result<Vec<PathBuf>> {
    let paths = scan::scan_images(source, ScanOptions::default())?;
    if paths.is_empty() {
        tracing::warn!("no eligible images under {}", source.display());
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_corpus(dir: &Path, category: &str, count: usize) {
        for i in 0..count {
            let mut f = File::create(dir.join(format!("{category}_{i}.jpg"))).unwrap();
            // distinct contents so copies can be told apart
            writeln!(f, "{category} {i}").unwrap();
        }
    }

    fn test_config(source: &Path, dest: &Path, samples: usize) -> WorkflowConfig {
        let raw = format!(
            r#"
            [corpus]
            source_dir = "{}"
            categories = ["A", "B"]

            [sampling]
            dest_dir = "{}"
            samples_per_category = {}
            seeds = [42, 123]
            "#,
            source.display(),
            dest.display(),
            samples
        );
        toml::from_str(&raw).unwrap()
    }

    #[test]
    fn partition_assigns_each_file_once() {
        let categories = vec!["A".to_string(), "A_B".to_string()];
        let paths = vec![
            PathBuf::from("/x/A_1.jpg"),
            PathBuf::from("/x/A_B_2.jpg"),
            PathBuf::from("/x/C_3.jpg"),
            PathBuf::from("/x/A_2.png"),
        ];
        let buckets = partition_by_category(&paths, &categories);
        assert_eq!(buckets["A"], vec!["A_1.jpg", "A_2.png"]);
        assert_eq!(buckets["A_B"], vec!["A_B_2.jpg"]);
        let assigned: usize = buckets.values().map(Vec::len).sum();
        assert_eq!(assigned, 3);
    }

    #[test]
    fn draw_is_deterministic_and_without_replacement() {
        let names: Vec<String> = (0..40).map(|i| format!("B_{i:02}.jpg")).collect();
        let first = draw_sample(&names, 5, category_seed(42, "B"));
        let second = draw_sample(&names, 5, category_seed(42, "B"));
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);

        let mut unique = first.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 5);

        let other_seed = draw_sample(&names, 5, category_seed(123, "B"));
        assert_ne!(first, other_seed);
    }

    #[test]
    fn draw_takes_all_when_short() {
        let names: Vec<String> = (0..3).map(|i| format!("A_{i}.jpg")).collect();
        let picks = draw_sample(&names, 5, 7);
        assert_eq!(picks, names);
    }

    #[test]
    fn category_seed_depends_on_name_not_order() {
        assert_ne!(category_seed(42, "A"), category_seed(42, "B"));
        assert_eq!(category_seed(42, "A"), category_seed(42, "A"));
    }

    #[test]
    fn run_seed_copies_and_records() -> Result<()> {
        let source = tempdir()?;
        let dest = tempdir()?;
        write_corpus(source.path(), "A", 3);
        write_corpus(source.path(), "B", 10);

        let config = test_config(source.path(), dest.path(), 5);
        let record = run_seed(&config, 42)?;

        assert_eq!(record.available["A"], 3);
        assert_eq!(record.available["B"], 10);
        assert_eq!(record.copied["A"], 3);
        assert_eq!(record.copied["B"], 5);
        assert_eq!(record.warnings.len(), 1);
        assert!(record.warnings[0].contains("A"));

        let copied_b = std::fs::read_dir(dest.path().join("seed_42").join("B"))?.count();
        assert_eq!(copied_b, 5);
        assert!(dest.path().join("seed_42").join(METADATA_FILE).exists());
        Ok(())
    }

    #[test]
    fn repeated_runs_pick_identical_files() -> Result<()> {
        let source = tempdir()?;
        write_corpus(source.path(), "A", 3);
        write_corpus(source.path(), "B", 10);

        let dest_one = tempdir()?;
        let dest_two = tempdir()?;
        let first = run_seed(&test_config(source.path(), dest_one.path(), 5), 42)?;
        let second = run_seed(&test_config(source.path(), dest_two.path(), 5), 42)?;
        assert_eq!(first.copied, second.copied);

        let names = |root: &Path| -> Vec<String> {
            let mut names: Vec<String> = std::fs::read_dir(root.join("seed_42").join("B"))
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                .collect();
            names.sort();
            names
        };
        assert_eq!(names(dest_one.path()), names(dest_two.path()));
        Ok(())
    }

    #[test]
    fn experiment_writes_summary_for_all_seeds() -> Result<()> {
        let source = tempdir()?;
        let dest = tempdir()?;
        write_corpus(source.path(), "A", 2);
        write_corpus(source.path(), "B", 2);

        let config = test_config(source.path(), dest.path(), 2);
        let summary = run_experiment(&config)?;
        assert_eq!(summary.runs.len(), 2);
        assert_eq!(summary.samples_per_category, 2);

        let raw = std::fs::read_to_string(dest.path().join(SUMMARY_FILE))?;
        let parsed: ExperimentSummary = serde_json::from_str(&raw)?;
        assert_eq!(parsed.runs.len(), 2);
        assert_eq!(parsed.runs[0].seed, 42);
        assert_eq!(parsed.runs[1].seed, 123);
        Ok(())
    }
}

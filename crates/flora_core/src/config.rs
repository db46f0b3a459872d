//! Workflow configuration.
//!
//! One TOML file describes a whole experiment: where the corpus lives, how
//! sampling partitions it, and which prompts/backends the screening jobs
//! use. Everything that used to be a literal buried in a job is a named
//! field here, validated before any job runs.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    pub corpus: CorpusConfig,
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    #[serde(default)]
    pub screening: ScreeningConfig,
    #[serde(default)]
    pub taxa: TaxaConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorpusConfig {
    /// Flat folder of `{category}_{number}.{ext}` images.
    pub source_dir: PathBuf,
    /// Category name prefixes, in match-priority order.
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplingConfig {
    /// Folder receiving `seed_<seed>/<category>/` copies and metadata.
    pub dest_dir: PathBuf,
    pub samples_per_category: usize,
    /// Base seeds, one sampling run per seed.
    pub seeds: Vec<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Metric label; the valid-results CSV score column is `<metric>_score`.
    /// Only applies to the ONNX scorer, since the built-in metric names itself.
    pub metric: String,
    /// ONNX model file for the `ort`-backed scorer.
    pub model_path: Option<PathBuf>,
    pub input_size: u32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            metric: "NIQE".to_string(),
            model_path: None,
            input_size: 512,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScreeningConfig {
    /// Fixed prompt sent with every image.
    pub prompt: String,
    /// Header of the answer column in the screening CSV.
    pub answer_column: String,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            prompt: "Is the image too blurry or low quality to allow identification? \
                     Answer only Yes or No."
                .to_string(),
            answer_column: "human_presence".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaxaConfig {
    /// Prompt template; `{flower}` is replaced with the filename-derived name.
    pub prompt_template: String,
}

impl Default for TaxaConfig {
    fn default() -> Self {
        Self {
            prompt_template: "Does the image contain other taxa than the one in the image \
                              {flower}? Answer only Yes or No."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible chat endpoint serving a vision model.
    pub endpoint: String,
    /// Model name passed through to the endpoint; empty uses its default.
    pub name: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080".to_string(),
            name: String::new(),
            max_tokens: 10,
            temperature: 0.0,
        }
    }
}

impl WorkflowConfig {
    /// Load and validate a workflow file. Any problem here is fatal; jobs
    /// never start with a half-usable configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        let config: WorkflowConfig = toml::from_str(&raw)
            .with_context(|| format!("cannot parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.corpus.categories.is_empty() {
            anyhow::bail!("corpus.categories must name at least one category");
        }
        if self.corpus.categories.iter().any(|c| c.is_empty()) {
            anyhow::bail!("corpus.categories must not contain empty names");
        }
        let unique: HashSet<&String> = self.corpus.categories.iter().collect();
        if unique.len() != self.corpus.categories.len() {
            anyhow::bail!("corpus.categories contains duplicates");
        }

        if self.sampling.samples_per_category == 0 {
            anyhow::bail!("sampling.samples_per_category must be at least 1");
        }
        if self.sampling.seeds.is_empty() {
            anyhow::bail!("sampling.seeds must name at least one seed");
        }
        let unique_seeds: HashSet<&u64> = self.sampling.seeds.iter().collect();
        if unique_seeds.len() != self.sampling.seeds.len() {
            anyhow::bail!("sampling.seeds contains duplicates");
        }

        if self.quality.metric.is_empty() {
            anyhow::bail!("quality.metric must not be empty");
        }
        if self.screening.answer_column.is_empty() {
            anyhow::bail!("screening.answer_column must not be empty");
        }
        if !self.taxa.prompt_template.contains("{flower}") {
            anyhow::bail!("taxa.prompt_template must contain a {{flower}} placeholder");
        }
        if self.model.max_tokens == 0 {
            anyhow::bail!("model.max_tokens must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> WorkflowConfig {
        toml::from_str(
            r#"
            [corpus]
            source_dir = "/data/images"
            categories = ["Bellis_perennis", "Leucanthemum_vulgare"]

            [sampling]
            dest_dir = "/data/samples"
            samples_per_category = 200
            seeds = [42, 123, 456]
            "#,
        )
        .unwrap()
    }

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config = minimal();
        config.validate().unwrap();
        assert_eq!(config.quality.metric, "NIQE");
        assert_eq!(config.screening.answer_column, "human_presence");
        assert!(config.screening.prompt.contains("too blurry"));
        assert!(config.taxa.prompt_template.contains("{flower}"));
        assert_eq!(config.model.max_tokens, 10);
        assert_eq!(config.model.endpoint, "http://localhost:8080");
    }

    #[test]
    fn duplicate_seeds_rejected() {
        let mut config = minimal();
        config.sampling.seeds = vec![42, 42];
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_categories_rejected() {
        let mut config = minimal();
        config.corpus.categories.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_categories_rejected() {
        let mut config = minimal();
        config.corpus.categories.push("Bellis_perennis".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_sample_size_rejected() {
        let mut config = minimal();
        config.sampling.samples_per_category = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn taxa_template_requires_placeholder() {
        let mut config = minimal();
        config.taxa.prompt_template = "Does the image contain other taxa?".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn overridden_sections_parse() {
        let config: WorkflowConfig = toml::from_str(
            r#"
            [corpus]
            source_dir = "/data/images"
            categories = ["A"]

            [sampling]
            dest_dir = "/data/out"
            samples_per_category = 5
            seeds = [7]

            [screening]
            prompt = "Is there a person in the image? Answer only Yes or No."
            answer_column = "person_present"

            [model]
            endpoint = "http://gpu-box:8000"
            name = "qwen2.5-vl-3b-instruct"
            max_tokens = 16
            temperature = 0.1
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.screening.answer_column, "person_present");
        assert_eq!(config.model.name, "qwen2.5-vl-3b-instruct");
    }
}

pub mod config;
pub mod naming;
pub mod quality;
pub mod report;
pub mod sampler;
pub mod scan;
pub mod screen;
pub mod vlm;

pub use config::WorkflowConfig;
pub use quality::{LaplacianScorer, QualityReport, QualityScorer, score_folder};
pub use sampler::{run_experiment, run_seed};
pub use scan::{ScanOptions, scan_images};
pub use screen::{Answer, screen_folder, screen_seed_folder, screen_taxa};
pub use vlm::{ChatClient, VisionModel};

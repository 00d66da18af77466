/// Config file loading and creation for the peerjudge CLI.
///
/// Config lives at ~/.config/peerjudge/config.toml.
/// All fields are optional; CLI args override config values.
use peerjudge_core::{QualityConfig, QuotaPolicy, SchedulerConfig, SessionConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::bail;

#[derive(Deserialize, Default, Debug, PartialEq)]
pub struct PeerjudgeConfig {
    pub project: Option<String>,
    pub question: Option<String>,
    pub seed: Option<u64>,
    pub concurrency: Option<usize>,
    pub log: Option<String>,
    pub min_per_reviewer: Option<usize>,
    pub max_per_reviewer: Option<usize>,
    pub target_appearances_per_item: Option<usize>,
    pub top_candidates: Option<usize>,
    pub consecutive_bias_threshold: Option<u32>,
    pub short_response_threshold_ms: Option<u64>,
}

impl PeerjudgeConfig {
    /// Library configuration with file values layered over the defaults.
    pub fn session_config(&self, seed: u64) -> SessionConfig {
        let quota_defaults = QuotaPolicy::default();
        let scheduler_defaults = SchedulerConfig::default();
        let quality_defaults = QualityConfig::default();

        SessionConfig {
            scheduler: SchedulerConfig {
                top_candidates: self.top_candidates.unwrap_or(scheduler_defaults.top_candidates),
                seed,
                ..scheduler_defaults
            },
            quality: QualityConfig {
                consecutive_bias_threshold: self
                    .consecutive_bias_threshold
                    .unwrap_or(quality_defaults.consecutive_bias_threshold),
                short_response_threshold_ms: self
                    .short_response_threshold_ms
                    .unwrap_or(quality_defaults.short_response_threshold_ms),
                ..quality_defaults
            },
            quota: QuotaPolicy {
                min_per_reviewer: self.min_per_reviewer.unwrap_or(quota_defaults.min_per_reviewer),
                max_per_reviewer: self.max_per_reviewer.unwrap_or(quota_defaults.max_per_reviewer),
                target_appearances_per_item: self
                    .target_appearances_per_item
                    .unwrap_or(quota_defaults.target_appearances_per_item),
            },
        }
    }
}

const DEFAULT_CONFIG_TEMPLATE: &str = "\
# peerjudge configuration
# All values here can be overridden by CLI flags.

# Session identity used for the decision log
# project = \"essay-2024\"
# question = \"q1\"

# Seed for pair selection (same seed + same log = same pairs)
# seed = 0

# Max reviewers simulated at once
# concurrency = 16

# Append-only JSONL decision log
# log = \"decisions.jsonl\"

# Per-reviewer quota bounds and coverage target
# min_per_reviewer = 3
# max_per_reviewer = 20
# target_appearances_per_item = 8

# Next pair is drawn from this many top-priority candidates
# top_candidates = 5

# Quality checks
# consecutive_bias_threshold = 5
# short_response_threshold_ms = 3000
";

/// Returns the default config path: ~/.config/peerjudge/config.toml
pub fn config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| bail("HOME environment variable not set"));
    PathBuf::from(home).join(".config").join("peerjudge").join("config.toml")
}

/// Parse config text. Kept separate from file IO for testing.
pub fn parse_config(content: &str) -> Result<PeerjudgeConfig, toml::de::Error> {
    toml::from_str(content)
}

/// Load config from a file path. Returns default (all None) if file doesn't exist.
pub fn load_config(path: &Path) -> PeerjudgeConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content)
            .unwrap_or_else(|e| bail(format!("Failed to parse config at {}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => PeerjudgeConfig::default(),
        Err(e) => bail(format!("Failed to read config at {}: {e}", path.display())),
    }
}

/// Create the default config file. Errors if it already exists.
pub fn create_default_config() -> PathBuf {
    let path = config_path();

    if path.exists() {
        bail(format!("Config file already exists at {}", path.display()));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap_or_else(|e| {
            bail(format!("Failed to create directory {}: {e}", parent.display()))
        });
    }

    std::fs::write(&path, DEFAULT_CONFIG_TEMPLATE)
        .unwrap_or_else(|e| bail(format!("Failed to write config to {}: {e}", path.display())));

    path
}

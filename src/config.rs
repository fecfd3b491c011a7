// WHY: Tuned constants live in one serde struct so a TOML file or CLI flag can move
// them without a rebuild; every field has a default so partial files are valid

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::insertion::InsertionType;

/// Pipeline tuning parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum characters of context accepted before HEAD and after TAIL
    pub context_window: usize,
    /// Maximum legal-insertion characters on each side of a privileged insertion
    pub insertion_max: usize,
    /// Lexicon entries per compiled recognizer batch
    pub batch_size: usize,
    /// Include the open hint vocabulary as a privileged SPLIT insertion
    pub hint_vocabulary: bool,
    /// Per-call bound for external collaborators, in seconds
    pub timeout_secs: u64,
    /// Rows below this insertion confidence are rejected before POS validation
    pub drop_threshold: f64,
    /// Insertion confidence strictly above this overturns a POS rejection
    pub pos_override_threshold: f64,
    /// Multiplier applied when a preferred possessive marker is missing
    pub preferred_de_penalty: f64,
    /// Confidence for WHOLE rows without an external PP
    pub whole_confidence: f64,
    /// Confidence for WHOLE rows with a preposition+pronoun before HEAD
    pub ext_pp_confidence: f64,
    /// Characters before HEAD searched for an external PP
    pub ext_pp_lookbehind: usize,
    /// Insertion type selection order, first satisfied rule wins
    pub insertion_priority: Vec<InsertionType>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            context_window: 40,
            insertion_max: 10,
            batch_size: 30,
            hint_vocabulary: true,
            timeout_secs: 30,
            drop_threshold: 0.3,
            pos_override_threshold: 0.55,
            preferred_de_penalty: 0.7,
            whole_confidence: 0.5,
            ext_pp_confidence: 0.8,
            ext_pp_lookbehind: 50,
            insertion_priority: InsertionType::DEFAULT_PRIORITY.to_vec(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Invalid pipeline configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to load config {}", path.display()))?;
        info!("Loaded pipeline configuration from {}", path.display());
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Reject settings that would make the recognizer unbuildable or the scores meaningless
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be at least 1");
        }
        for (name, value) in [
            ("drop_threshold", self.drop_threshold),
            ("pos_override_threshold", self.pos_override_threshold),
            ("preferred_de_penalty", self.preferred_de_penalty),
            ("whole_confidence", self.whole_confidence),
            ("ext_pp_confidence", self.ext_pp_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{name} must be within [0, 1], got {value}");
            }
        }
        let derived_only =
            self.insertion_priority.iter().find(|t| t.required_categories().is_empty());
        if let Some(bad) = derived_only {
            anyhow::bail!("insertion_priority entry {bad} is not a category-driven insertion type");
        }
        Ok(())
    }
}

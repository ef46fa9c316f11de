// Scanner configuration: detection patterns, confidence arithmetic,
// discovery filters, and performance settings. Loaded from YAML once at
// startup; regexes are compiled here, never per file.
use anyhow::Result;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::error::ConfigError;

/// Raw per-technology detection entry as it appears in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnologyPatternConfig {
    pub patterns: Vec<String>,
    #[serde(default)]
    pub context_keywords: Vec<String>,
    #[serde(default = "default_minimum_confidence")]
    pub minimum_confidence: f64,
}

fn default_minimum_confidence() -> f64 {
    0.7
}

/// Additive confidence arithmetic knobs. Each term is independently
/// tunable so operators can audit why a detection fired.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceCalculation {
    pub base_confidence: f64,
    pub context_keyword_bonus: f64,
    pub version_reference_bonus: f64,
    pub multiple_pattern_bonus: f64,
}

impl Default for ConfidenceCalculation {
    fn default() -> Self {
        Self {
            base_confidence: 0.6,
            context_keyword_bonus: 0.05,
            version_reference_bonus: 0.1,
            multiple_pattern_bonus: 0.05,
        }
    }
}

/// Context-window analysis settings. The boost values are multipliers in
/// the config document; the additive bonus applied is `boost - 1.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextAnalysis {
    pub context_window_lines: usize,
    pub code_block_boost: f64,
    pub title_boost: f64,
}

impl Default for ContextAnalysis {
    fn default() -> Self {
        Self {
            context_window_lines: 3,
            code_block_boost: 1.2,
            title_boost: 1.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSizeLimits {
    pub minimum_file_size_bytes: u64,
    pub maximum_file_size_mb: u64,
}

impl Default for FileSizeLimits {
    fn default() -> Self {
        Self {
            minimum_file_size_bytes: 1,
            maximum_file_size_mb: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDiscovery {
    pub base_directories: Vec<String>,
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub file_size_limits: FileSizeLimits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSettings {
    /// Worker pool size; 0 means one worker per CPU.
    #[serde(default)]
    pub max_concurrent_files: usize,
    /// Overall scan wall-time bound in seconds; 0 disables the deadline.
    #[serde(default)]
    pub scan_timeout_seconds: u64,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            max_concurrent_files: 0,
            scan_timeout_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnologyDetection {
    pub detection_patterns: BTreeMap<String, TechnologyPatternConfig>,
    #[serde(default)]
    pub confidence_calculation: ConfidenceCalculation,
    #[serde(default)]
    pub context_analysis: ContextAnalysis,
}

/// Top-level scanner configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub technology_detection: TechnologyDetection,
    pub file_discovery: FileDiscovery,
    #[serde(default)]
    pub performance_settings: PerformanceSettings,
}

impl ScannerConfig {
    /// Load and parse the configuration file. Missing or malformed
    /// configuration is fatal.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        let config: ScannerConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Compile the per-technology pattern tables. Invalid regexes are
    /// warned about and skipped; they never abort startup.
    pub fn compile_patterns(&self) -> Vec<CompiledTechnology> {
        let mut compiled = Vec::new();
        for (name, tech) in &self.technology_detection.detection_patterns {
            let mut patterns = Vec::new();
            for raw in &tech.patterns {
                match RegexBuilder::new(raw)
                    .case_insensitive(true)
                    .multi_line(true)
                    .build()
                {
                    Ok(re) => patterns.push(re),
                    Err(e) => {
                        warn!("Invalid pattern for {}: {} ({})", name, raw, e);
                    }
                }
            }
            compiled.push(CompiledTechnology {
                name: name.clone(),
                patterns,
                context_keywords: tech
                    .context_keywords
                    .iter()
                    .map(|k| k.to_lowercase())
                    .collect(),
                minimum_confidence: tech.minimum_confidence,
            });
        }
        compiled
    }
}

/// One technology's detection rules with patterns compiled into the
/// native regex engine.
#[derive(Debug, Clone)]
pub struct CompiledTechnology {
    pub name: String,
    pub patterns: Vec<Regex>,
    pub context_keywords: Vec<String>,
    pub minimum_confidence: f64,
}

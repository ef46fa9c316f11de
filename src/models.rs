// Core data model: detection results, per-file analyses, and the
// versioned registry snapshot the scanner persists.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::classifier::FileType;

pub const REGISTRY_SCHEMA_VERSION: &str = "1.0.0";

/// How severely a technology change would hit files that reference it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    Low,
    Medium,
    High,
    Critical,
}

impl Criticality {
    pub fn name(&self) -> &'static str {
        match self {
            Criticality::Low => "low",
            Criticality::Medium => "medium",
            Criticality::High => "high",
            Criticality::Critical => "critical",
        }
    }
}

/// One raw pattern hit inside a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternReference {
    pub line_number: usize,
    /// Trimmed source line, capped at 200 chars.
    pub context: String,
    pub reference_type: String,
    pub confidence: f64,
}

/// A detected technology reference with its aggregate confidence and the
/// evidence that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnologyReference {
    pub name: String,
    pub category: String,
    /// Always clamped to [0, 1].
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_constraint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_version: Option<String>,
    pub criticality: Criticality,
    pub usage_context: Vec<String>,
    pub references: Vec<PatternReference>,
}

/// Cross-file dependency links, populated by downstream relationship
/// analysis. Empty at scan time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyRelationships {
    pub depends_on: Vec<String>,
    pub depended_on_by: Vec<String>,
}

/// Update bookkeeping attached to each registry file entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTracking {
    pub needs_update: bool,
    pub update_priority: String,
    pub pending_updates: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    pub update_history: Vec<String>,
}

impl Default for UpdateTracking {
    fn default() -> Self {
        Self {
            needs_update: false,
            update_priority: "none".to_string(),
            pending_updates: Vec::new(),
            last_updated: None,
            update_history: Vec::new(),
        }
    }
}

/// Complete analysis of one instruction file. Identity is the path,
/// versioned by `file_hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub file_path: String,
    pub file_type: FileType,
    pub file_hash: String,
    pub last_modified: DateTime<Utc>,
    pub last_scanned: DateTime<Utc>,
    /// Mean of contained reference confidences, or 1.0 when none were
    /// found (confident absence).
    pub scan_confidence: f64,
    pub technologies: Vec<TechnologyReference>,
    #[serde(default)]
    pub dependency_relationships: DependencyRelationships,
    #[serde(default)]
    pub update_tracking: UpdateTracking,
}

/// Registry-wide scan statistics, computed by a single-threaded fold over
/// completed worker results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryStatistics {
    pub total_files_scanned: usize,
    pub total_technologies_detected: usize,
    pub high_confidence_detections: usize,
    pub skipped_files: usize,
    pub average_technologies_per_file: f64,
    pub processing_time_seconds: f64,
    pub files_per_second: f64,
}

/// The versioned, atomically-persisted snapshot of all per-file results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry {
    pub version: String,
    pub generated: DateTime<Utc>,
    pub statistics: RegistryStatistics,
    pub files: BTreeMap<String, FileAnalysis>,
}

impl Registry {
    pub fn new(statistics: RegistryStatistics, files: BTreeMap<String, FileAnalysis>) -> Self {
        Self {
            version: REGISTRY_SCHEMA_VERSION.to_string(),
            generated: Utc::now(),
            statistics,
            files,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_criticality_ordering() {
        assert!(Criticality::Critical > Criticality::High);
        assert!(Criticality::High > Criticality::Medium);
        assert!(Criticality::Medium > Criticality::Low);
    }

    #[test]
    fn test_registry_roundtrip_keeps_file_entries() {
        let analysis = FileAnalysis {
            file_path: "/p/CLAUDE.md".to_string(),
            file_type: crate::classifier::FileType::ClaudeMd,
            file_hash: "abc".to_string(),
            last_modified: Utc::now(),
            last_scanned: Utc::now(),
            scan_confidence: 1.0,
            technologies: Vec::new(),
            dependency_relationships: DependencyRelationships::default(),
            update_tracking: UpdateTracking::default(),
        };
        let mut files = BTreeMap::new();
        files.insert(analysis.file_path.clone(), analysis);
        let registry = Registry::new(RegistryStatistics::default(), files);

        let json = serde_json::to_string(&registry).unwrap();
        let back: Registry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.version, REGISTRY_SCHEMA_VERSION);
        assert!(back.files.contains_key("/p/CLAUDE.md"));
        assert_eq!(back.files["/p/CLAUDE.md"].update_tracking.update_priority, "none");
    }
}

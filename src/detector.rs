// Technology detector: runs the compiled pattern tables over file content
// and produces explainable, bounded confidence scores. Pure and stateless;
// safe to call concurrently.
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::config::{CompiledTechnology, ConfidenceCalculation, ContextAnalysis, ScannerConfig};
use crate::models::{Criticality, PatternReference, TechnologyReference};

/// Cap on the aggregate bonus for multiple distinct pattern hits.
const MULTIPLE_PATTERN_BONUS_CAP: f64 = 0.3;
/// Snippets stored in references are trimmed to this many chars.
const SNIPPET_LIMIT: usize = 200;

struct TechDefinition {
    category: &'static str,
    criticality: Criticality,
    current_stable: Option<&'static str>,
}

lazy_static! {
    /// Standardized technology definitions. Lookups that miss fall back
    /// to `unknown` / medium.
    static ref TECH_DEFINITIONS: HashMap<&'static str, TechDefinition> = {
        let mut m = HashMap::new();
        m.insert("React", TechDefinition { category: "frontend_framework", criticality: Criticality::Critical, current_stable: Some("18.2.0") });
        m.insert("Next.js", TechDefinition { category: "frontend_framework", criticality: Criticality::High, current_stable: Some("14.1.0") });
        m.insert("Vue", TechDefinition { category: "frontend_framework", criticality: Criticality::High, current_stable: Some("3.4.0") });
        m.insert("TypeScript", TechDefinition { category: "programming_language", criticality: Criticality::High, current_stable: Some("5.3.0") });
        m.insert("Python", TechDefinition { category: "programming_language", criticality: Criticality::High, current_stable: Some("3.12.0") });
        m.insert("Node.js", TechDefinition { category: "backend_framework", criticality: Criticality::High, current_stable: Some("20.11.0") });
        m.insert("Express", TechDefinition { category: "backend_framework", criticality: Criticality::Medium, current_stable: Some("4.18.0") });
        m.insert("PostgreSQL", TechDefinition { category: "database", criticality: Criticality::High, current_stable: Some("16.1") });
        m.insert("Docker", TechDefinition { category: "infrastructure", criticality: Criticality::High, current_stable: Some("24.0.0") });
        m.insert("Kubernetes", TechDefinition { category: "infrastructure", criticality: Criticality::High, current_stable: Some("1.29.0") });
        m.insert("Webpack", TechDefinition { category: "build_tool", criticality: Criticality::Medium, current_stable: Some("5.89.0") });
        m.insert("Vite", TechDefinition { category: "build_tool", criticality: Criticality::Medium, current_stable: Some("5.0.0") });
        m.insert("Jest", TechDefinition { category: "dev_tool", criticality: Criticality::Medium, current_stable: Some("29.7.0") });
        m.insert("ESLint", TechDefinition { category: "dev_tool", criticality: Criticality::Low, current_stable: Some("8.56.0") });
        m.insert("GitHub Actions", TechDefinition { category: "ci_cd", criticality: Criticality::Medium, current_stable: None });
        m.insert("Terraform", TechDefinition { category: "infrastructure", criticality: Criticality::High, current_stable: Some("1.7.0") });
        m
    };

    // Version shapes searched adjacent to a technology mention, in
    // priority order: semantic, major, range.
    static ref SEMANTIC_VERSION: Regex = Regex::new(r"\b(\d+)\.(\d+)\.(\d+)\b").unwrap();
    static ref MAJOR_VERSION: Regex = Regex::new(r"\bv(\d+)\b|\b(\d+)\.x\b").unwrap();
    static ref RANGE_VERSION: Regex = Regex::new(r"([><=^~]{1,2}\s*\d+(?:\.\d+){0,2})").unwrap();
}

/// Fixed usage-context vocabulary keyed by the keywords that imply it.
const USAGE_CONTEXTS: &[(&str, &[&str])] = &[
    ("installation", &["install", "setup", "npm install", "yarn add", "pip install"]),
    ("configuration", &["config", "configure", "settings", "options", ".config."]),
    ("code_examples", &["```", "example", "code", "snippet"]),
    ("best_practices", &["best practice", "recommended", "should", "avoid"]),
    ("troubleshooting", &["error", "issue", "problem", "debug", "fix"]),
    ("integration", &["integrate", "connect", "plugin", "extension"]),
    ("testing", &["test", "spec", "jest", "unit", "integration"]),
    ("deployment", &["deploy", "build", "production", "docker", "ci/cd"]),
];

pub struct TechnologyDetector {
    technologies: Vec<CompiledTechnology>,
    confidence: ConfidenceCalculation,
    context: ContextAnalysis,
}

impl TechnologyDetector {
    pub fn new(config: &ScannerConfig) -> Self {
        Self {
            technologies: config.compile_patterns(),
            confidence: config.technology_detection.confidence_calculation.clone(),
            context: config.technology_detection.context_analysis.clone(),
        }
    }

    /// Detect technology references in `content`. A technology is retained
    /// only when its aggregate confidence reaches its configured threshold;
    /// zero pattern matches never produce a reference.
    pub fn detect(&self, content: &str, path: &Path) -> Vec<TechnologyReference> {
        let lines: Vec<&str> = content.lines().collect();
        let mut detected = Vec::new();

        for tech in &self.technologies {
            let mut references = Vec::new();
            let mut total_confidence = 0.0;
            let mut usage_contexts: BTreeSet<&'static str> = BTreeSet::new();
            let mut detected_version: Option<String> = None;

            for pattern in &tech.patterns {
                for m in pattern.find_iter(content) {
                    let line_idx = content[..m.start()].matches('\n').count();
                    let context_line = lines.get(line_idx).copied().unwrap_or("");

                    let window = self.context_window(&lines, line_idx);
                    let (contexts, boost) = self.analyze_context(&window, tech);
                    usage_contexts.extend(contexts);

                    let mut reference_confidence = self.confidence.base_confidence + boost;

                    if let Some(version) = detect_version(context_line, &tech.name) {
                        reference_confidence += self.confidence.version_reference_bonus;
                        detected_version.get_or_insert(version);
                    }

                    references.push(PatternReference {
                        line_number: line_idx + 1,
                        context: truncate(context_line.trim(), SNIPPET_LIMIT),
                        reference_type: "explicit_mention".to_string(),
                        confidence: reference_confidence.clamp(0.0, 1.0),
                    });
                    total_confidence += reference_confidence;
                }
            }

            if references.is_empty() {
                continue;
            }

            let mut aggregate = total_confidence / references.len() as f64;
            if references.len() > 1 {
                aggregate += (references.len() as f64 * self.confidence.multiple_pattern_bonus)
                    .min(MULTIPLE_PATTERN_BONUS_CAP);
            }
            let aggregate = aggregate.clamp(0.0, 1.0);

            if aggregate < tech.minimum_confidence {
                continue;
            }

            let def = TECH_DEFINITIONS.get(tech.name.as_str());
            detected.push(TechnologyReference {
                name: tech.name.clone(),
                category: def.map_or("unknown", |d| d.category).to_string(),
                confidence: aggregate,
                version_constraint: detected_version,
                current_version: def
                    .and_then(|d| d.current_stable)
                    .map(ToString::to_string),
                criticality: def.map_or(Criticality::Medium, |d| d.criticality),
                usage_context: usage_contexts.iter().map(ToString::to_string).collect(),
                references,
            });
        }

        debug!(
            "Detected {} technologies in {}",
            detected.len(),
            path.display()
        );
        detected
    }

    /// Lowercased text of the ±N-line window around `line_idx`.
    fn context_window(&self, lines: &[&str], line_idx: usize) -> String {
        let start = line_idx.saturating_sub(self.context.context_window_lines);
        let end = (line_idx + self.context.context_window_lines + 1).min(lines.len());
        lines[start..end].join(" ").to_lowercase()
    }

    /// Derive usage-context tags and the contextual confidence bonus for
    /// one match window.
    fn analyze_context(
        &self,
        window: &str,
        tech: &CompiledTechnology,
    ) -> (Vec<&'static str>, f64) {
        let contexts: Vec<&'static str> = USAGE_CONTEXTS
            .iter()
            .filter(|(_, keywords)| keywords.iter().any(|k| window.contains(k)))
            .map(|(tag, _)| *tag)
            .collect();

        let mut boost = 0.0;
        for keyword in &tech.context_keywords {
            if window.contains(keyword.as_str()) {
                boost += self.confidence.context_keyword_bonus;
            }
        }
        if window.contains("```") {
            boost += self.context.code_block_boost - 1.0;
        }
        if window.contains('#') {
            boost += self.context.title_boost - 1.0;
        }

        (contexts, boost)
    }
}

/// Look for a parsable version string after the technology name on the
/// same line. Semantic versions win over major versions over ranges.
fn detect_version(line: &str, tech_name: &str) -> Option<String> {
    // Search and slice the same lowercased copy: lowercasing can change
    // char byte widths, so offsets into it do not map back to `line`.
    let lower = line.to_lowercase();
    let name = tech_name.to_lowercase();
    let pos = lower.find(&name)?;
    let tail = &lower[pos + name.len()..];

    if let Some(c) = SEMANTIC_VERSION.captures(tail) {
        return Some(format!("{}.{}.{}", &c[1], &c[2], &c[3]));
    }
    if let Some(c) = MAJOR_VERSION.captures(tail) {
        return c.get(1).or_else(|| c.get(2)).map(|m| m.as_str().to_string());
    }
    if let Some(c) = RANGE_VERSION.captures(tail) {
        return Some(c[1].to_string());
    }
    None
}

fn truncate(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        s.to_string()
    } else {
        let mut end = limit;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s[..end].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        FileDiscovery, FileSizeLimits, PerformanceSettings, TechnologyDetection,
        TechnologyPatternConfig,
    };
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn test_config() -> ScannerConfig {
        let mut detection_patterns = BTreeMap::new();
        detection_patterns.insert(
            "React".to_string(),
            TechnologyPatternConfig {
                patterns: vec![r"\bReact\b".to_string(), r"react-dom".to_string()],
                context_keywords: vec!["component".to_string(), "jsx".to_string()],
                minimum_confidence: 0.7,
            },
        );
        detection_patterns.insert(
            "Docker".to_string(),
            TechnologyPatternConfig {
                patterns: vec![r"\bDocker(file)?\b".to_string()],
                context_keywords: vec!["container".to_string()],
                minimum_confidence: 0.7,
            },
        );
        ScannerConfig {
            technology_detection: TechnologyDetection {
                detection_patterns,
                confidence_calculation: ConfidenceCalculation::default(),
                context_analysis: ContextAnalysis::default(),
            },
            file_discovery: FileDiscovery {
                base_directories: vec![".".to_string()],
                include_patterns: vec!["**/*.md".to_string()],
                exclude_patterns: Vec::new(),
                file_size_limits: FileSizeLimits::default(),
            },
            performance_settings: PerformanceSettings::default(),
        }
    }

    fn detector() -> TechnologyDetector {
        TechnologyDetector::new(&test_config())
    }

    #[test]
    fn test_no_match_means_no_reference() {
        let found = detector().detect("plain prose about nothing", &PathBuf::from("a.md"));
        assert!(found.is_empty());
    }

    #[test]
    fn test_detects_with_context_bonuses() {
        let content = "\
## React setup

Install React with `npm install react react-dom`.

```jsx
import React from 'react';
```
";
        let found = detector().detect(content, &PathBuf::from("a.md"));
        let react = found.iter().find(|t| t.name == "React").expect("React detected");
        assert!(react.confidence >= 0.7);
        assert!(react.confidence <= 1.0);
        assert_eq!(react.category, "frontend_framework");
        assert_eq!(react.criticality, Criticality::Critical);
        assert!(react.usage_context.contains(&"installation".to_string()));
        assert!(react.usage_context.contains(&"code_examples".to_string()));
        assert!(!react.references.is_empty());
        assert!(react.references.iter().all(|r| r.line_number >= 1));
    }

    #[test]
    fn test_confidence_clamped_with_stacked_bonuses() {
        // Every bonus fires on every line: headings, code fences, both
        // context keywords, versions, and many distinct matches.
        let line = "## React 18.2.0 component jsx ``` React react-dom\n";
        let content = line.repeat(12);
        let found = detector().detect(&content, &PathBuf::from("a.md"));
        for tech in &found {
            assert!(tech.confidence <= 1.0, "aggregate clamped");
            assert!(tech.confidence >= 0.0);
            for r in &tech.references {
                assert!(r.confidence <= 1.0, "per-reference clamped");
            }
        }
    }

    #[test]
    fn test_version_detection_priority() {
        assert_eq!(
            detect_version("React 18.2.0 is current", "React"),
            Some("18.2.0".to_string())
        );
        assert_eq!(detect_version("React v18 only", "React"), Some("18".to_string()));
        assert_eq!(
            detect_version("react >=17.0 required", "React"),
            Some(">=17.0".to_string())
        );
        assert_eq!(detect_version("React without numbers", "React"), None);
        assert_eq!(detect_version("no mention at all", "React"), None);
    }

    #[test]
    fn test_version_detection_survives_multibyte_lowercasing() {
        // 'İ' lowercases to a longer byte sequence, shifting offsets
        // between a line and its lowercased copy.
        assert_eq!(
            detect_version("İİİ React 18.2.0", "React"),
            Some("18.2.0".to_string())
        );
        assert_eq!(detect_version("İİİ React", "React"), None);
        assert_eq!(detect_version("ẞtraße React v18", "React"), Some("18".to_string()));
    }

    #[test]
    fn test_multibyte_content_scans_cleanly() {
        let content = "# İİİ React 18.2.0\nİnstall React with npm.\n";
        let found = detector().detect(content, &PathBuf::from("a.md"));
        let react = found.iter().find(|t| t.name == "React").expect("React detected");
        assert_eq!(react.version_constraint.as_deref(), Some("18.2.0"));
    }

    #[test]
    fn test_detection_is_deterministic() {
        let content = "# Docker\nRun the Dockerfile in a container.\n";
        let d = detector();
        let first = d.detect(content, &PathBuf::from("a.md"));
        let second = d.detect(content, &PathBuf::from("a.md"));
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_unknown_technology_falls_back() {
        let mut config = test_config();
        config.technology_detection.detection_patterns.insert(
            "Obscurity".to_string(),
            TechnologyPatternConfig {
                patterns: vec![r"\bObscurity\b".to_string()],
                context_keywords: Vec::new(),
                minimum_confidence: 0.5,
            },
        );
        let d = TechnologyDetector::new(&config);
        let found = d.detect("# Obscurity\nObscurity is used here.\n", &PathBuf::from("a.md"));
        let tech = found.iter().find(|t| t.name == "Obscurity").unwrap();
        assert_eq!(tech.category, "unknown");
        assert_eq!(tech.criticality, Criticality::Medium);
        assert!(tech.current_version.is_none());
    }
}

// Changeset (PR) context analyzer: runs a reduced detection pass over
// proposed file changes, scores complexity and security smells, and
// assesses architecture impact and risk before the change lands.
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{info, warn};

use crate::vault::KnowledgeVault;

const IMPORT_PATTERN_WEIGHT: f64 = 0.25;
const CONFIG_PATTERN_WEIGHT: f64 = 0.3;
const MAX_IMPORTS: usize = 20;
const MAX_DEPENDENCY_REFS: usize = 15;
const HIGH_COMPLEXITY_SCORE: u32 = 70;

/// One file in the proposed changeset with whatever content/diff text is
/// available for it.
#[derive(Debug, Clone)]
pub struct ChangedFile {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangesetDetection {
    pub name: String,
    pub category: String,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_detected: Option<String>,
    pub detection_method: String,
    pub file_references: Vec<String>,
    pub usage_context: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexityIndicators {
    pub line_count: usize,
    pub function_count: usize,
    pub class_count: usize,
    pub import_count: usize,
    /// Bounded [0, 100].
    pub complexity_score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangedFileAnalysis {
    pub filename: String,
    pub file_type: String,
    pub technologies_detected: Vec<ChangesetDetection>,
    pub import_statements: Vec<String>,
    pub dependency_references: Vec<String>,
    pub complexity_indicators: ComplexityIndicators,
    pub security_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchitectureImpact {
    pub impact_level: String,
    pub affected_layers: Vec<String>,
    pub technology_additions: Vec<ChangesetDetection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub overall_risk: String,
    pub security_risk: String,
    pub compatibility_risk: String,
    pub performance_risk: String,
    pub risk_factors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedTechnology {
    pub name: String,
    pub current_version: String,
    pub monitoring_priority: String,
    pub detected_confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_version: Option<String>,
    /// None when no version was detected in the changeset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_match: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeVaultMatches {
    pub total_technologies_tracked: usize,
    pub tracked_technologies: Vec<TrackedTechnology>,
    pub untracked_technologies: Vec<String>,
    pub dependency_matches: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangesetAnalysis {
    pub changeset_id: String,
    pub total_files_changed: usize,
    pub file_analyses: Vec<ChangedFileAnalysis>,
    pub detected_technologies: Vec<ChangesetDetection>,
    pub architecture_impact: ArchitectureImpact,
    pub risk_assessment: RiskAssessment,
    pub knowledge_vault_matches: KnowledgeVaultMatches,
    pub analysis_timestamp: DateTime<Utc>,
}

struct PatternGroup {
    name: &'static str,
    category: &'static str,
    patterns: Vec<Regex>,
}

fn compile(group: &[&str]) -> Vec<Regex> {
    group
        .iter()
        .filter_map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .multi_line(true)
                .build()
                .ok()
        })
        .collect()
}

lazy_static! {
    static ref IMPORT_PATTERNS: Vec<PatternGroup> = vec![
        PatternGroup {
            name: "react",
            category: "frontend_framework",
            patterns: compile(&[
                r#"import.*from ["']react["']"#,
                r"import React",
                r#"from ["']react["']"#,
            ]),
        },
        PatternGroup {
            name: "typescript",
            category: "programming_language",
            patterns: compile(&[
                r"export.*interface",
                r"type\s+\w+\s*=",
                r":\s*\w+\[\]",
            ]),
        },
        PatternGroup {
            name: "next.js",
            category: "frontend_framework",
            patterns: compile(&[
                r#"import.*from ["']next/"#,
                r"export.*getServerSideProps",
                r"export.*getStaticProps",
            ]),
        },
        PatternGroup {
            name: "express",
            category: "backend_framework",
            patterns: compile(&[
                r#"import.*from ["']express["']"#,
                r#"require\(["']express["']"#,
                r"app\.(get|post)\(",
            ]),
        },
        PatternGroup {
            name: "python",
            category: "programming_language",
            patterns: compile(&[
                r"^import\s+\w+",
                r"from\s+\w+\s+import",
                r"def\s+\w+\(",
            ]),
        },
    ];

    static ref CONFIG_PATTERNS: Vec<PatternGroup> = vec![
        PatternGroup {
            name: "webpack",
            category: "build_tool",
            patterns: compile(&[r"module\.exports\s*=", r"webpack\.config", r"entry:"]),
        },
        PatternGroup {
            name: "babel",
            category: "build_tool",
            patterns: compile(&[r"@babel/", r#""presets":\s*\["#, r#""plugins":\s*\["#]),
        },
        PatternGroup {
            name: "eslint",
            category: "build_tool",
            patterns: compile(&[r#""rules":\s*\{"#, r#""extends":\s*\["#, r"eslint-disable"]),
        },
    ];

    static ref SECURITY_CHECKS: Vec<(&'static str, Vec<Regex>)> = vec![
        (
            "hardcoded_secrets",
            compile(&[
                r#"password\s*=\s*["'][^"']+["']"#,
                r#"api_key\s*=\s*["'][^"']+["']"#,
                r#"secret\s*=\s*["'][^"']+["']"#,
            ]),
        ),
        (
            "sql_injection",
            compile(&[r"SELECT\s.*\+.*", r"INSERT\s.*\+.*", r"UPDATE\s.*\+.*"]),
        ),
        (
            "xss_vulnerability",
            compile(&[r"innerHTML\s*=\s*.*\+", r"document\.write\s*\(", r"eval\s*\("]),
        ),
        (
            "insecure_random",
            compile(&[r"Math\.random\(\)", r"random\.random\(\)"]),
        ),
    ];

    static ref JS_IMPORT: Vec<Regex> = compile(&[
        r#"import\s+.*from\s+["'][^"']+["']"#,
        r#"require\(["'][^"']+["']\)"#,
    ]);
    static ref PY_IMPORT: Vec<Regex> = compile(&[
        r"^import\s+[\w\.]+",
        r"^from\s+[\w\.]+\s+import\s+.*",
    ]);
    static ref JS_FUNCTION: Vec<Regex> = compile(&[
        r"function\s+\w+",
        r"const\s+\w+\s*=\s*\(.*\)\s*=>",
    ]);
    static ref CLASS_DECL: Regex = Regex::new(r"class\s+\w+").unwrap();
    static ref PY_FUNCTION: Regex = Regex::new(r"def\s+\w+").unwrap();
    static ref IMPORT_KEYWORD: Regex = Regex::new(r"import\s+").unwrap();
    static ref NPM_DEPENDENCY: Regex = Regex::new(r#""([\w@/.-]+)":\s*"([~^]?[\d][^"]*)""#).unwrap();
    static ref PIP_DEPENDENCY: Regex = Regex::new(r"([a-zA-Z0-9_-]+)==([0-9.]+)").unwrap();
    static ref VERSION_NEAR_NAME: Regex = Regex::new(r#"["']([0-9]+\.[0-9]+\.?[0-9]*)["']"#).unwrap();
}

fn file_type_for(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "js" => "javascript",
        "jsx" => "react_component",
        "ts" => "typescript",
        "tsx" => "typescript_react",
        "py" => "python",
        "md" => "markdown",
        "json" => "json_config",
        "yaml" | "yml" => "yaml_config",
        "toml" => "toml_config",
        "css" => "stylesheet",
        "html" => "html_template",
        "sql" => "sql_script",
        "sh" => "shell_script",
        "env" => "environment_config",
        _ => "unknown",
    }
}

pub struct ChangesetAnalyzer;

impl ChangesetAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze a proposed changeset. The vault cross-reference is skipped
    /// when no store is supplied.
    pub fn analyze(
        &self,
        changeset_id: &str,
        files: &[ChangedFile],
        vault: Option<&KnowledgeVault>,
    ) -> ChangesetAnalysis {
        info!(
            "Analyzing changeset {} ({} files)",
            changeset_id,
            files.len()
        );

        let file_analyses: Vec<ChangedFileAnalysis> =
            files.iter().map(|f| self.analyze_file(f)).collect();

        let detected_technologies = aggregate_detections(&file_analyses);
        let architecture_impact = assess_architecture_impact(&file_analyses, &detected_technologies);
        let risk_assessment = assess_risk(&file_analyses, &detected_technologies);
        let knowledge_vault_matches = match vault {
            Some(v) => cross_reference(v, &detected_technologies),
            None => KnowledgeVaultMatches::default(),
        };

        ChangesetAnalysis {
            changeset_id: changeset_id.to_string(),
            total_files_changed: files.len(),
            file_analyses,
            detected_technologies,
            architecture_impact,
            risk_assessment,
            knowledge_vault_matches,
            analysis_timestamp: Utc::now(),
        }
    }

    fn analyze_file(&self, file: &ChangedFile) -> ChangedFileAnalysis {
        let file_type = file_type_for(&file.path);
        let content = &file.content;

        let mut detections = Vec::new();
        for (groups, weight, method) in [
            (&*IMPORT_PATTERNS, IMPORT_PATTERN_WEIGHT, "import_pattern"),
            (&*CONFIG_PATTERNS, CONFIG_PATTERN_WEIGHT, "configuration_pattern"),
        ] {
            for group in groups {
                let mut confidence = 0.0;
                let mut matched: Vec<String> = Vec::new();
                for pattern in &group.patterns {
                    let hits: Vec<&str> =
                        pattern.find_iter(content).map(|m| m.as_str()).collect();
                    if !hits.is_empty() {
                        confidence += weight;
                        matched.extend(hits.iter().take(2).map(|s| s.to_string()));
                    }
                }
                if confidence > 0.0 {
                    detections.push(ChangesetDetection {
                        name: group.name.to_string(),
                        category: group.category.to_string(),
                        confidence: confidence.min(1.0),
                        version_detected: extract_version(content, group.name),
                        detection_method: method.to_string(),
                        file_references: vec![file.path.clone()],
                        usage_context: matched.into_iter().take(5).collect(),
                    });
                }
            }
        }

        ChangedFileAnalysis {
            filename: file.path.clone(),
            file_type: file_type.to_string(),
            technologies_detected: detections,
            import_statements: extract_imports(content, file_type),
            dependency_references: extract_dependency_refs(content, file_type, &file.path),
            complexity_indicators: analyze_complexity(content, file_type),
            security_patterns: detect_security_patterns(content),
        }
    }
}

impl Default for ChangesetAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Version string adjacent to the technology name, e.g. a manifest pin.
fn extract_version(content: &str, tech_name: &str) -> Option<String> {
    for line in content.lines() {
        if line.to_lowercase().contains(tech_name) {
            if let Some(c) = VERSION_NEAR_NAME.captures(line) {
                return Some(c[1].to_string());
            }
        }
    }
    None
}

fn extract_imports(content: &str, file_type: &str) -> Vec<String> {
    let patterns: &[Regex] = match file_type {
        "javascript" | "typescript" | "react_component" | "typescript_react" => &JS_IMPORT,
        "python" => &PY_IMPORT,
        _ => return Vec::new(),
    };
    let mut imports = Vec::new();
    for pattern in patterns {
        imports.extend(pattern.find_iter(content).map(|m| m.as_str().to_string()));
    }
    imports.truncate(MAX_IMPORTS);
    imports
}

fn extract_dependency_refs(content: &str, file_type: &str, path: &str) -> Vec<String> {
    let mut refs = Vec::new();
    if path.ends_with("package.json") || file_type == "json_config" {
        refs.extend(
            NPM_DEPENDENCY
                .captures_iter(content)
                .map(|c| format!("{}@{}", &c[1], &c[2])),
        );
    } else if path.ends_with("requirements.txt") || file_type == "python" {
        refs.extend(
            PIP_DEPENDENCY
                .captures_iter(content)
                .map(|c| format!("{}=={}", &c[1], &c[2])),
        );
    }
    refs.truncate(MAX_DEPENDENCY_REFS);
    refs
}

/// Line/function/class counts folded into a bounded [0, 100] score:
/// lines contribute up to 50, functions up to 30, classes up to 20.
fn analyze_complexity(content: &str, file_type: &str) -> ComplexityIndicators {
    let line_count = content.lines().count();
    let (function_count, class_count) = match file_type {
        "javascript" | "typescript" | "react_component" | "typescript_react" => {
            let functions: usize = JS_FUNCTION
                .iter()
                .map(|p| p.find_iter(content).count())
                .sum();
            (functions, CLASS_DECL.find_iter(content).count())
        }
        "python" => (
            PY_FUNCTION.find_iter(content).count(),
            CLASS_DECL.find_iter(content).count(),
        ),
        _ => (0, 0),
    };
    let import_count = IMPORT_KEYWORD.find_iter(content).count();

    let line_score = (line_count as f64 / 10.0).min(50.0);
    let function_score = (function_count as f64 * 5.0).min(30.0);
    let class_score = (class_count as f64 * 10.0).min(20.0);

    ComplexityIndicators {
        line_count,
        function_count,
        class_count,
        import_count,
        complexity_score: (line_score + function_score + class_score) as u32,
    }
}

fn detect_security_patterns(content: &str) -> Vec<String> {
    SECURITY_CHECKS
        .iter()
        .filter(|(_, patterns)| patterns.iter().any(|p| p.is_match(content)))
        .map(|(name, _)| name.to_string())
        .collect()
}

/// Per technology across all files: max confidence, union of contexts and
/// file references, sorted by confidence descending.
fn aggregate_detections(file_analyses: &[ChangedFileAnalysis]) -> Vec<ChangesetDetection> {
    let mut by_name: BTreeMap<String, ChangesetDetection> = BTreeMap::new();
    for analysis in file_analyses {
        for tech in &analysis.technologies_detected {
            match by_name.get_mut(&tech.name) {
                Some(existing) => {
                    existing.confidence = existing.confidence.max(tech.confidence);
                    if existing.version_detected.is_none() {
                        existing.version_detected = tech.version_detected.clone();
                    }
                    for file in &tech.file_references {
                        if !existing.file_references.contains(file) {
                            existing.file_references.push(file.clone());
                        }
                    }
                    for ctx in &tech.usage_context {
                        if !existing.usage_context.contains(ctx) {
                            existing.usage_context.push(ctx.clone());
                        }
                    }
                }
                None => {
                    by_name.insert(tech.name.clone(), tech.clone());
                }
            }
        }
    }
    let mut aggregated: Vec<ChangesetDetection> = by_name.into_values().collect();
    aggregated.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    aggregated
}

fn assess_architecture_impact(
    file_analyses: &[ChangedFileAnalysis],
    technologies: &[ChangesetDetection],
) -> ArchitectureImpact {
    let frontend = file_analyses
        .iter()
        .filter(|f| matches!(f.file_type.as_str(), "react_component" | "typescript_react"))
        .count();
    let backend = file_analyses
        .iter()
        .filter(|f| f.file_type == "python")
        .count();
    let config = file_analyses
        .iter()
        .filter(|f| f.file_type.contains("config"))
        .count();

    let impact_level = if frontend > 5 || backend > 5 {
        "high"
    } else if frontend > 2 || backend > 2 || config > 1 {
        "medium"
    } else {
        "low"
    };

    let mut affected_layers = Vec::new();
    if frontend > 0 {
        affected_layers.push("frontend".to_string());
    }
    if backend > 0 {
        affected_layers.push("backend".to_string());
    }
    if config > 0 {
        affected_layers.push("configuration".to_string());
    }

    ArchitectureImpact {
        impact_level: impact_level.to_string(),
        affected_layers,
        technology_additions: technologies
            .iter()
            .filter(|t| t.confidence > 0.7)
            .cloned()
            .collect(),
    }
}

fn risk_score(level: &str) -> u32 {
    match level {
        "high" => 3,
        "medium" => 2,
        _ => 1,
    }
}

fn assess_risk(
    file_analyses: &[ChangedFileAnalysis],
    technologies: &[ChangesetDetection],
) -> RiskAssessment {
    let mut risk_factors = Vec::new();

    let security_issues: usize = file_analyses.iter().map(|f| f.security_patterns.len()).sum();
    let security_risk = if security_issues > 3 {
        risk_factors.push(format!("Multiple security patterns detected ({security_issues})"));
        "high"
    } else if security_issues > 0 {
        risk_factors.push(format!("Security patterns detected ({security_issues})"));
        "medium"
    } else {
        "low"
    };

    let high_complexity = file_analyses
        .iter()
        .filter(|f| f.complexity_indicators.complexity_score > HIGH_COMPLEXITY_SCORE)
        .count();
    let performance_risk = if high_complexity > 2 {
        risk_factors.push(format!("High complexity files ({high_complexity})"));
        "high"
    } else {
        "low"
    };

    let confident_technologies = technologies.iter().filter(|t| t.confidence > 0.8).count();
    let compatibility_risk = if confident_technologies > 3 {
        risk_factors.push(format!("Multiple new technologies ({confident_technologies})"));
        "medium"
    } else {
        "low"
    };

    let mean = (risk_score(security_risk) + risk_score(compatibility_risk)
        + risk_score(performance_risk)) as f64
        / 3.0;
    let overall_risk = if mean >= 2.5 {
        "high"
    } else if mean >= 1.5 {
        "medium"
    } else {
        "low"
    };

    RiskAssessment {
        overall_risk: overall_risk.to_string(),
        security_risk: security_risk.to_string(),
        compatibility_risk: compatibility_risk.to_string(),
        performance_risk: performance_risk.to_string(),
        risk_factors,
    }
}

/// Cross-reference detections against the registry store: version drift
/// for tracked technologies and mapping pressure per technology.
fn cross_reference(
    vault: &KnowledgeVault,
    technologies: &[ChangesetDetection],
) -> KnowledgeVaultMatches {
    let mut matches = KnowledgeVaultMatches::default();
    let mut seen: BTreeSet<String> = BTreeSet::new();

    for tech in technologies {
        if !seen.insert(tech.name.clone()) {
            continue;
        }
        let entries = match vault.query_technologies(&[("technology_name", &tech.name)]) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Vault lookup failed for {}: {}", tech.name, e);
                continue;
            }
        };
        match entries.first() {
            Some(entry) => {
                matches.total_technologies_tracked += 1;
                matches.tracked_technologies.push(TrackedTechnology {
                    name: tech.name.clone(),
                    current_version: entry.current_version.clone(),
                    monitoring_priority: entry.monitoring_priority.clone(),
                    detected_confidence: tech.confidence,
                    detected_version: tech.version_detected.clone(),
                    version_match: tech
                        .version_detected
                        .as_ref()
                        .map(|v| *v == entry.current_version),
                });
            }
            None => matches.untracked_technologies.push(tech.name.clone()),
        }

        if let Ok(deps) = vault.get_dependencies_by_technology(&tech.name) {
            if !deps.is_empty() {
                matches.dependency_matches.insert(tech.name.clone(), deps.len());
            }
        }
    }

    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changed(path: &str, content: &str) -> ChangedFile {
        ChangedFile {
            path: path.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_frontend_heavy_changeset_is_high_impact() {
        let mut files: Vec<ChangedFile> = (0..6)
            .map(|i| {
                changed(
                    &format!("src/components/Widget{i}.tsx"),
                    "import React from 'react';\nexport const Widget = () => <div/>;\n",
                )
            })
            .collect();
        files.push(changed(
            "webpack.config.json",
            "{\"rules\": {}, \"extends\": [\"base\"]}\n",
        ));

        let analysis = ChangesetAnalyzer::new().analyze("pr-42", &files, None);
        assert_eq!(analysis.architecture_impact.impact_level, "high");
        assert!(analysis
            .architecture_impact
            .affected_layers
            .contains(&"frontend".to_string()));
        assert!(analysis
            .architecture_impact
            .affected_layers
            .contains(&"configuration".to_string()));
        assert_eq!(analysis.total_files_changed, 7);
    }

    #[test]
    fn test_reduced_detection_caps_confidence() {
        let file = changed(
            "app.tsx",
            "import React from 'react';\nimport { useState } from 'react';\n\
             export interface Props {}\ntype Mode = string;\nconst x: string[] = [];\n",
        );
        let analysis = ChangesetAnalyzer::new().analyze("pr-1", &[file], None);
        for tech in &analysis.detected_technologies {
            assert!(tech.confidence <= 1.0);
            assert!(tech.confidence > 0.0);
        }
        assert!(analysis
            .detected_technologies
            .iter()
            .any(|t| t.name == "react"));
        assert!(analysis
            .detected_technologies
            .iter()
            .any(|t| t.name == "typescript"));
    }

    #[test]
    fn test_security_patterns_reported_once_each() {
        let file = changed(
            "auth.py",
            "password = \"hunter2\"\napi_key = \"abc\"\nimport random\nx = random.random()\n",
        );
        let analysis = ChangesetAnalyzer::new().analyze("pr-2", &[file], None);
        let patterns = &analysis.file_analyses[0].security_patterns;
        assert_eq!(
            patterns.iter().filter(|p| *p == "hardcoded_secrets").count(),
            1
        );
        assert!(patterns.contains(&"insecure_random".to_string()));
        assert_eq!(analysis.risk_assessment.security_risk, "medium");
    }

    #[test]
    fn test_complexity_score_is_bounded() {
        let big = format!(
            "{}{}",
            "def f():\n    pass\n".repeat(40),
            "class C:\n    pass\n".repeat(10)
        );
        let indicators = analyze_complexity(&big, "python");
        assert!(indicators.complexity_score <= 100);
        assert_eq!(indicators.function_count, 40);
        assert_eq!(indicators.class_count, 10);

        let empty = analyze_complexity("", "python");
        assert_eq!(empty.complexity_score, 0);
    }

    #[test]
    fn test_aggregation_takes_max_confidence_and_unions_files() {
        let files = vec![
            changed("a.jsx", "import React from 'react';\n"),
            changed(
                "b.jsx",
                "import React from 'react';\nimport x from 'react';\n",
            ),
        ];
        let analysis = ChangesetAnalyzer::new().analyze("pr-3", &files, None);
        let react = analysis
            .detected_technologies
            .iter()
            .find(|t| t.name == "react")
            .unwrap();
        assert_eq!(react.file_references.len(), 2);
        // Sorted by confidence descending
        let confidences: Vec<f64> = analysis
            .detected_technologies
            .iter()
            .map(|t| t.confidence)
            .collect();
        let mut sorted = confidences.clone();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_eq!(confidences, sorted);
    }

    #[test]
    fn test_dependency_refs_from_manifest() {
        let file = changed(
            "package.json",
            "{\"dependencies\": {\"react\": \"18.2.0\", \"express\": \"^4.18.0\"}}",
        );
        let analysis = ChangesetAnalyzer::new().analyze("pr-4", &[file], None);
        let refs = &analysis.file_analyses[0].dependency_references;
        assert!(refs.contains(&"react@18.2.0".to_string()));
        assert!(refs.contains(&"express@^4.18.0".to_string()));
    }

    #[test]
    fn test_vault_cross_reference_reports_version_drift() {
        use crate::vault::TechnologyTracking;
        let tmp = tempfile::TempDir::new().unwrap();
        let vault = KnowledgeVault::open(tmp.path()).unwrap();
        vault
            .create_technology(TechnologyTracking {
                id: String::new(),
                technology_name: "react".to_string(),
                category: "frontend_framework".to_string(),
                current_version: "18.2.0".to_string(),
                version_pattern: "semantic".to_string(),
                monitoring_priority: "critical".to_string(),
                description: None,
                archived: false,
                first_tracked: None,
                last_updated: None,
            })
            .unwrap();

        let detections = vec![
            ChangesetDetection {
                name: "react".to_string(),
                category: "frontend_framework".to_string(),
                confidence: 0.75,
                version_detected: Some("17.0.2".to_string()),
                detection_method: "import_pattern".to_string(),
                file_references: vec!["app.tsx".to_string()],
                usage_context: Vec::new(),
            },
            ChangesetDetection {
                name: "express".to_string(),
                category: "backend_framework".to_string(),
                confidence: 0.5,
                version_detected: None,
                detection_method: "import_pattern".to_string(),
                file_references: vec!["server.js".to_string()],
                usage_context: Vec::new(),
            },
        ];

        let matches = cross_reference(&vault, &detections);
        assert_eq!(matches.total_technologies_tracked, 1);
        let react = &matches.tracked_technologies[0];
        assert_eq!(react.current_version, "18.2.0");
        assert_eq!(react.version_match, Some(false));
        assert_eq!(
            matches.untracked_technologies,
            vec!["express".to_string()]
        );
    }
}

// Concurrent scanner: discovers candidate files, fans analysis out over a
// bounded rayon pool, folds per-worker results into registry statistics,
// and persists the registry with backup-then-atomic-replace.
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use glob::Pattern;
use indicatif::{ProgressBar, ProgressStyle};
use md5::{Digest, Md5};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::classifier;
use crate::config::ScannerConfig;
use crate::detector::TechnologyDetector;
use crate::error::PersistError;
use crate::models::{
    DependencyRelationships, FileAnalysis, Registry, RegistryStatistics, UpdateTracking,
};

/// Detections at or above this confidence count as high-confidence in the
/// registry statistics.
const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.9;

/// Outcome of one worker task. Workers never touch shared counters; all
/// statistics come from a single-threaded fold over these records.
enum WorkerOutcome {
    Analyzed(Box<FileAnalysis>),
    Skipped,
}

pub struct ScanOutcome {
    pub registry: Registry,
}

pub struct DependencyScanner {
    config: ScannerConfig,
    detector: TechnologyDetector,
}

impl DependencyScanner {
    pub fn new(config: ScannerConfig) -> Self {
        let detector = TechnologyDetector::new(&config);
        Self { config, detector }
    }

    /// Discover candidate files: walk the configured base directories,
    /// apply include globs, exclude patterns, and the size window.
    pub fn discover_files(&self) -> Vec<PathBuf> {
        let discovery = &self.config.file_discovery;
        let includes = compile_globs(&discovery.include_patterns);
        let min_size = discovery.file_size_limits.minimum_file_size_bytes;
        let max_size = discovery.file_size_limits.maximum_file_size_mb * 1024 * 1024;

        let mut discovered = Vec::new();
        for base in &discovery.base_directories {
            let base_path = Path::new(base);
            if !base_path.exists() {
                warn!("Base directory does not exist: {}", base);
                continue;
            }
            for entry in WalkDir::new(base_path)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let path = entry.path();
                let relative = path.strip_prefix(base_path).unwrap_or(path);

                if !matches_any_include(&includes, relative) {
                    continue;
                }
                if is_excluded(&discovery.exclude_patterns, path) {
                    continue;
                }
                match entry.metadata() {
                    Ok(meta) => {
                        let size = meta.len();
                        if size < min_size || size > max_size {
                            continue;
                        }
                    }
                    Err(e) => {
                        warn!("Could not access file {}: {}", path.display(), e);
                        continue;
                    }
                }
                discovered.push(path.to_path_buf());
            }
        }

        discovered.sort();
        discovered.dedup();
        info!("Discovered {} files to scan", discovered.len());
        discovered
    }

    /// Analyze a single file: hash, classify, detect. Pure per file.
    pub fn analyze_file(&self, path: &Path) -> Result<FileAnalysis> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;

        let mut hasher = Md5::new();
        hasher.update(content.as_bytes());
        let file_hash = format!("{:x}", hasher.finalize());

        let last_modified: DateTime<Utc> = fs::metadata(path)
            .and_then(|m| m.modified())
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());

        let technologies = self.detector.detect(&content, path);
        let scan_confidence = if technologies.is_empty() {
            // Confident absence: nothing matched, nothing to doubt.
            1.0
        } else {
            technologies.iter().map(|t| t.confidence).sum::<f64>() / technologies.len() as f64
        };

        Ok(FileAnalysis {
            file_path: path.to_string_lossy().to_string(),
            file_type: classifier::classify(path),
            file_hash,
            last_modified,
            last_scanned: Utc::now(),
            scan_confidence,
            technologies,
            dependency_relationships: DependencyRelationships::default(),
            update_tracking: UpdateTracking::default(),
        })
    }

    /// Run the full scan pipeline and assemble the registry snapshot.
    /// Per-file failures are logged and skipped; only discovery of zero
    /// files or configuration problems surface as errors upstream.
    pub fn scan(&self) -> Result<ScanOutcome> {
        let start = Instant::now();
        let files = self.discover_files();

        let workers = match self.config.performance_settings.max_concurrent_files {
            0 => rayon::current_num_threads(),
            n => n,
        };
        let timeout = match self.config.performance_settings.scan_timeout_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        info!("Starting scan of {} files with {} workers", files.len(), workers);

        let progress = ProgressBar::new(files.len() as u64);
        progress.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .context("building scan worker pool")?;

        let outcomes: Vec<WorkerOutcome> = pool.install(|| {
            files
                .par_iter()
                .map(|path| {
                    // Scan deadline: files not started in time are skipped
                    // with a warning, never aborting the scan.
                    if let Some(limit) = timeout {
                        if start.elapsed() > limit {
                            warn!("Scan deadline reached, skipping {}", path.display());
                            progress.inc(1);
                            return WorkerOutcome::Skipped;
                        }
                    }
                    let outcome = match self.analyze_file(path) {
                        Ok(analysis) => WorkerOutcome::Analyzed(Box::new(analysis)),
                        Err(e) => {
                            warn!("Skipping {}: {:#}", path.display(), e);
                            WorkerOutcome::Skipped
                        }
                    };
                    progress.inc(1);
                    outcome
                })
                .collect()
        });
        progress.finish_and_clear();

        // Single-threaded fold after the join; no shared mutable counters.
        let mut files_map = BTreeMap::new();
        let mut skipped = 0usize;
        for outcome in outcomes {
            match outcome {
                WorkerOutcome::Analyzed(analysis) => {
                    files_map.insert(analysis.file_path.clone(), *analysis);
                }
                WorkerOutcome::Skipped => skipped += 1,
            }
        }

        let elapsed = start.elapsed().as_secs_f64();
        let statistics = compute_statistics(&files_map, skipped, elapsed);
        info!(
            "Scan completed: {} files analyzed, {} skipped, {} technologies detected",
            statistics.total_files_scanned, statistics.skipped_files,
            statistics.total_technologies_detected
        );

        Ok(ScanOutcome {
            registry: Registry::new(statistics, files_map),
        })
    }
}

fn compute_statistics(
    files: &BTreeMap<String, FileAnalysis>,
    skipped: usize,
    elapsed_seconds: f64,
) -> RegistryStatistics {
    let total_files = files.len();
    let total_technologies: usize = files.values().map(|f| f.technologies.len()).sum();
    let high_confidence = files
        .values()
        .flat_map(|f| &f.technologies)
        .filter(|t| t.confidence >= HIGH_CONFIDENCE_THRESHOLD)
        .count();

    RegistryStatistics {
        total_files_scanned: total_files,
        total_technologies_detected: total_technologies,
        high_confidence_detections: high_confidence,
        skipped_files: skipped,
        average_technologies_per_file: total_technologies as f64 / total_files.max(1) as f64,
        processing_time_seconds: elapsed_seconds,
        files_per_second: total_files as f64 / elapsed_seconds.max(0.001),
    }
}

/// Persist the registry: back up any existing file to
/// `<path>.backup.<timestamp>`, write to a temp file in the target
/// directory, then atomically rename into place. Readers never observe a
/// partial registry; a failure leaves the previous registry intact.
pub fn save_registry(registry: &Registry, output_path: &Path) -> Result<(), PersistError> {
    let json = serde_json::to_vec_pretty(registry)?;

    if output_path.exists() {
        let backup_path = PathBuf::from(format!(
            "{}.backup.{}",
            output_path.display(),
            Utc::now().format("%Y%m%d_%H%M%S")
        ));
        fs::rename(output_path, &backup_path).map_err(PersistError::Backup)?;
        info!("Created backup: {}", backup_path.display());
    }

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(PersistError::TempWrite)?;
        }
    }
    let tmp_path = output_path.with_extension("tmp");
    fs::write(&tmp_path, &json).map_err(PersistError::TempWrite)?;
    fs::rename(&tmp_path, output_path).map_err(PersistError::Replace)?;

    debug!("Registry saved to {}", output_path.display());
    Ok(())
}

fn compile_globs(patterns: &[String]) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|p| match Pattern::new(p) {
            Ok(pat) => Some(pat),
            Err(e) => {
                warn!("Invalid include pattern {}: {}", p, e);
                None
            }
        })
        .collect()
}

fn matches_any_include(includes: &[Pattern], relative: &Path) -> bool {
    includes.iter().any(|pat| {
        if pat.matches_path(relative) {
            return true;
        }
        // `**/*.md` should also match a file at the base directory root.
        pat.as_str()
            .strip_prefix("**/")
            .and_then(|rest| Pattern::new(rest).ok())
            .is_some_and(|rest| rest.matches_path(relative))
    })
}

/// Exclude patterns come in three forms: directory (`**/node_modules/**`),
/// extension (`**/*.log`), and plain substring.
fn is_excluded(patterns: &[String], path: &Path) -> bool {
    let path_str = path.to_string_lossy();
    for pattern in patterns {
        if let Some(dir) = pattern
            .strip_prefix("**/")
            .and_then(|p| p.strip_suffix("/**"))
        {
            if path_str.contains(&format!("/{}/", dir)) || path_str.ends_with(&format!("/{}", dir))
            {
                return true;
            }
        } else if let Some(ext) = pattern.strip_prefix("**/*.") {
            if path_str.ends_with(&format!(".{}", ext)) {
                return true;
            }
        } else {
            let core: String = pattern.chars().filter(|c| *c != '*').collect();
            if !core.is_empty() && path_str.contains(core.trim_matches('/')) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ConfidenceCalculation, ContextAnalysis, FileDiscovery, FileSizeLimits,
        PerformanceSettings, TechnologyDetection, TechnologyPatternConfig,
    };
    use std::io::Write;
    use tempfile::TempDir;

    fn config_for(dir: &Path, workers: usize) -> ScannerConfig {
        let mut detection_patterns = BTreeMap::new();
        detection_patterns.insert(
            "React".to_string(),
            TechnologyPatternConfig {
                patterns: vec![r"\bReact\b".to_string()],
                context_keywords: vec!["component".to_string()],
                minimum_confidence: 0.5,
            },
        );
        ScannerConfig {
            technology_detection: TechnologyDetection {
                detection_patterns,
                confidence_calculation: ConfidenceCalculation::default(),
                context_analysis: ContextAnalysis::default(),
            },
            file_discovery: FileDiscovery {
                base_directories: vec![dir.to_string_lossy().to_string()],
                include_patterns: vec!["**/*.md".to_string()],
                exclude_patterns: vec!["**/node_modules/**".to_string()],
                file_size_limits: FileSizeLimits {
                    minimum_file_size_bytes: 1,
                    maximum_file_size_mb: 1,
                },
            },
            performance_settings: PerformanceSettings {
                max_concurrent_files: workers,
                scan_timeout_seconds: 0,
            },
        }
    }

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_discovery_applies_filters() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "a.md", "# React notes\n");
        write_file(tmp.path(), "sub/b.md", "plain\n");
        write_file(tmp.path(), "c.txt", "not included\n");
        write_file(tmp.path(), "node_modules/d.md", "excluded\n");
        write_file(tmp.path(), "empty.md", "");

        let scanner = DependencyScanner::new(config_for(tmp.path(), 1));
        let files = scanner.discover_files();
        let names: Vec<String> = files
            .iter()
            .map(|p| {
                p.strip_prefix(tmp.path())
                    .unwrap()
                    .to_string_lossy()
                    .to_string()
            })
            .collect();
        assert_eq!(names, vec!["a.md", "sub/b.md"]);
    }

    #[test]
    fn test_parallel_matches_sequential_totals() {
        let tmp = TempDir::new().unwrap();
        for i in 0..20 {
            write_file(
                tmp.path(),
                &format!("file_{}.md", i),
                "# React\nUse the React component model.\n",
            );
        }

        let sequential = DependencyScanner::new(config_for(tmp.path(), 1))
            .scan()
            .unwrap();
        let parallel = DependencyScanner::new(config_for(tmp.path(), 4))
            .scan()
            .unwrap();

        assert_eq!(
            sequential.registry.statistics.total_files_scanned,
            parallel.registry.statistics.total_files_scanned
        );
        assert_eq!(sequential.registry.statistics.total_files_scanned, 20);
        assert_eq!(
            sequential.registry.statistics.total_technologies_detected,
            parallel.registry.statistics.total_technologies_detected
        );
    }

    #[test]
    fn test_rescan_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(tmp.path(), "a.md", "# React\nReact component docs.\n");

        let scanner = DependencyScanner::new(config_for(tmp.path(), 1));
        let first = scanner.analyze_file(&path).unwrap();
        let second = scanner.analyze_file(&path).unwrap();

        assert_eq!(first.file_hash, second.file_hash);
        let names = |a: &FileAnalysis| {
            a.technologies
                .iter()
                .map(|t| (t.name.clone(), t.confidence.to_bits()))
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&first), names(&second));
    }

    #[test]
    fn test_unreadable_file_is_skipped_not_fatal() {
        let tmp = TempDir::new().unwrap();
        write_file(tmp.path(), "good.md", "# React docs\n");
        // Invalid UTF-8 defeats read_to_string
        let bad = tmp.path().join("bad.md");
        let mut f = fs::File::create(&bad).unwrap();
        f.write_all(&[0xff, 0xfe, 0x20, 0x21]).unwrap();

        let outcome = DependencyScanner::new(config_for(tmp.path(), 2))
            .scan()
            .unwrap();
        assert_eq!(outcome.registry.statistics.total_files_scanned, 1);
        assert_eq!(outcome.registry.statistics.skipped_files, 1);
    }

    #[test]
    fn test_absence_is_confident() {
        let tmp = TempDir::new().unwrap();
        let path = write_file(tmp.path(), "a.md", "nothing to see\n");
        let scanner = DependencyScanner::new(config_for(tmp.path(), 1));
        let analysis = scanner.analyze_file(&path).unwrap();
        assert!(analysis.technologies.is_empty());
        assert!((analysis.scan_confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_save_registry_backs_up_and_replaces() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("registry.json");

        let first = Registry::new(RegistryStatistics::default(), BTreeMap::new());
        save_registry(&first, &out).unwrap();

        let mut stats = RegistryStatistics::default();
        stats.total_files_scanned = 7;
        let second = Registry::new(stats, BTreeMap::new());
        save_registry(&second, &out).unwrap();

        // Exactly one backup from the first write, live file has the second
        let backups: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("backup"))
            .collect();
        assert_eq!(backups.len(), 1);

        let live: Registry =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(live.statistics.total_files_scanned, 7);

        // No half-written temp files left behind
        assert!(!out.with_extension("tmp").exists());
    }
}

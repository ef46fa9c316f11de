// Dependency registry store: four entity kinds persisted as one JSON
// document per item, with required-field validation, filtered queries,
// workflow-status management, and impact analysis.
//
// Known limitation: the store assumes a single writer at a time per
// entity id. Concurrent writers to the same id race last-write-wins,
// which is acceptable for infrequent, human/automation-triggered updates.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::VaultError;
use crate::workflow::{ProcessingStatus, WorkflowStatus, MAX_RETRIES};

const DB_TECHNOLOGY: &str = "technology_tracking";
const DB_DEPENDENCY: &str = "dependency_mapping";
const DB_UPDATES: &str = "knowledge_updates";
const DB_CHANGES: &str = "change_events";
const DATABASES: [&str; 4] = [DB_TECHNOLOGY, DB_DEPENDENCY, DB_UPDATES, DB_CHANGES];

/// Required-fields contract shared by the four entity kinds. `validate`
/// reports every missing field at once; nothing is persisted on failure.
pub trait Validatable {
    const ENTITY: &'static str;

    /// (field name, present-and-non-empty) pairs for the required fields.
    fn required_fields(&self) -> Vec<(&'static str, bool)>;

    fn validate(&self) -> Result<(), VaultError> {
        let missing: Vec<String> = self
            .required_fields()
            .into_iter()
            .filter(|(_, present)| !present)
            .map(|(name, _)| name.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(VaultError::Validation {
                entity: Self::ENTITY,
                missing,
            })
        }
    }
}

fn filled(s: &str) -> bool {
    !s.trim().is_empty()
}

/// How essential a mapped dependency is to the file that carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyCriticality {
    Essential,
    Important,
    Optional,
}

impl DependencyCriticality {
    pub fn name(&self) -> &'static str {
        match self {
            DependencyCriticality::Essential => "essential",
            DependencyCriticality::Important => "important",
            DependencyCriticality::Optional => "optional",
        }
    }
}

/// One row per monitored technology. Never deleted; archived instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnologyTracking {
    #[serde(default)]
    pub id: String,
    pub technology_name: String,
    pub category: String,
    pub current_version: String,
    pub version_pattern: String,
    pub monitoring_priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_tracked: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl Validatable for TechnologyTracking {
    const ENTITY: &'static str = "technology_tracking";

    fn required_fields(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("technology_name", filled(&self.technology_name)),
            ("category", filled(&self.category)),
            ("current_version", filled(&self.current_version)),
            ("version_pattern", filled(&self.version_pattern)),
            ("monitoring_priority", filled(&self.monitoring_priority)),
        ]
    }
}

/// Links one instruction file to one technology it depends on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyMapping {
    #[serde(default)]
    pub id: String,
    pub mapping_name: String,
    pub ai_file_path: String,
    pub ai_file_type: String,
    pub technology_name: String,
    pub technology_category: String,
    pub dependency_type: String,
    pub dependency_criticality: DependencyCriticality,
    pub update_priority: String,
    pub validation_status: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usage_context: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_constraint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovered_date: Option<DateTime<Utc>>,
}

impl Validatable for DependencyMapping {
    const ENTITY: &'static str = "dependency_mapping";

    fn required_fields(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("mapping_name", filled(&self.mapping_name)),
            ("ai_file_path", filled(&self.ai_file_path)),
            ("ai_file_type", filled(&self.ai_file_type)),
            ("technology_name", filled(&self.technology_name)),
            ("technology_category", filled(&self.technology_category)),
            ("dependency_type", filled(&self.dependency_type)),
            ("update_priority", filled(&self.update_priority)),
            ("validation_status", filled(&self.validation_status)),
        ]
    }
}

/// A unit of remediation work triggered by a change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeUpdate {
    #[serde(default)]
    pub id: String,
    pub update_title: String,
    pub trigger_event: String,
    pub affected_file_path: String,
    pub affected_file_type: String,
    pub update_description: String,
    pub update_type: String,
    pub update_scope: String,
    pub workflow_status: WorkflowStatus,
    pub update_priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_technology: Option<String>,
    /// Times this update has re-entered analysis after a failure.
    #[serde(default)]
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl Validatable for KnowledgeUpdate {
    const ENTITY: &'static str = "knowledge_updates";

    fn required_fields(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("update_title", filled(&self.update_title)),
            ("trigger_event", filled(&self.trigger_event)),
            ("affected_file_path", filled(&self.affected_file_path)),
            ("affected_file_type", filled(&self.affected_file_type)),
            ("update_description", filled(&self.update_description)),
            ("update_type", filled(&self.update_type)),
            ("update_scope", filled(&self.update_scope)),
            ("update_priority", filled(&self.update_priority)),
        ]
    }
}

/// A detected upstream technology change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(default)]
    pub id: String,
    pub event_title: String,
    pub technology_name: String,
    pub technology_category: String,
    pub change_type: String,
    pub change_classification: String,
    pub detection_source: String,
    pub detection_method: String,
    pub change_description: String,
    pub processing_status: ProcessingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detected_date: Option<DateTime<Utc>>,
}

impl Validatable for ChangeEvent {
    const ENTITY: &'static str = "change_events";

    fn required_fields(&self) -> Vec<(&'static str, bool)> {
        vec![
            ("event_title", filled(&self.event_title)),
            ("technology_name", filled(&self.technology_name)),
            ("technology_category", filled(&self.technology_category)),
            ("change_type", filled(&self.change_type)),
            ("change_classification", filled(&self.change_classification)),
            ("detection_source", filled(&self.detection_source)),
            ("detection_method", filled(&self.detection_method)),
            ("change_description", filled(&self.change_description)),
        ]
    }
}

/// Per-criticality impact buckets for one technology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactSummary {
    pub total_affected_files: usize,
    pub by_criticality: BTreeMap<String, usize>,
    pub high_impact_changes: usize,
    pub pending_critical_updates: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    pub technology_name: String,
    pub affected_files: usize,
    pub recent_changes: usize,
    pub pending_updates: usize,
    pub impact_summary: ImpactSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSummary {
    pub database_counts: BTreeMap<String, usize>,
    pub critical_items: BTreeMap<String, usize>,
    pub pending_work: BTreeMap<String, usize>,
    pub health_indicators: HealthIndicators,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthIndicators {
    pub critical_attention_needed: bool,
    pub pending_work_load: String,
}

/// File-backed store rooted at a base directory, one sub-database per
/// entity kind, items as `<id>.json` under `items/`.
pub struct KnowledgeVault {
    root: PathBuf,
}

impl KnowledgeVault {
    /// Open (and lazily lay out) the store. An unwritable root is a fatal
    /// database error.
    pub fn open(root: &Path) -> Result<Self, VaultError> {
        for db in DATABASES {
            fs::create_dir_all(root.join(db).join("items")).map_err(|e| {
                VaultError::Database(format!(
                    "cannot initialize store at {}: {}",
                    root.display(),
                    e
                ))
            })?;
        }
        debug!("Opened knowledge vault at {}", root.display());
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn items_dir(&self, db: &str) -> PathBuf {
        self.root.join(db).join("items")
    }

    fn item_path(&self, db: &str, id: &str) -> PathBuf {
        self.items_dir(db).join(format!("{}.json", id))
    }

    fn save_value(&self, db: &str, id: &str, value: &Value) -> Result<(), VaultError> {
        let json = serde_json::to_vec_pretty(value)?;
        fs::write(self.item_path(db, id), json)?;
        Ok(())
    }

    fn load_value(&self, db: &str, id: &str) -> Result<Option<Value>, VaultError> {
        let path = self.item_path(db, id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn query_values(
        &self,
        db: &str,
        filters: &[(&str, &str)],
    ) -> Result<Vec<(String, Value)>, VaultError> {
        let dir = self.items_dir(db);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut items = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_none_or(|e| e != "json") {
                continue;
            }
            let id = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let value: Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
            let matches = filters.iter().all(|(key, expected)| {
                value.get(*key).and_then(Value::as_str) == Some(*expected)
            });
            if matches {
                items.push((id, value));
            }
        }
        Ok(items)
    }

    fn create<T: Validatable + Serialize>(
        &self,
        db: &str,
        entity: &mut T,
        set_id: impl FnOnce(&mut T) -> &mut String,
    ) -> Result<String, VaultError> {
        let id_slot = set_id(entity);
        if id_slot.is_empty() {
            *id_slot = Uuid::new_v4().to_string();
        }
        let id = id_slot.clone();
        entity.validate()?;
        self.save_value(db, &id, &serde_json::to_value(entity)?)?;
        Ok(id)
    }

    /// Items that parse as JSON but no longer match the entity shape are
    /// skipped with a warning so degraded stores stay visible to operators.
    fn typed<T: for<'de> Deserialize<'de>>(db: &str, values: Vec<(String, Value)>) -> Vec<T> {
        values
            .into_iter()
            .filter_map(|(id, v)| match serde_json::from_value(v) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    warn!("Skipping malformed {} item {}: {}", db, id, e);
                    None
                }
            })
            .collect()
    }

    // --- Technology tracking ---

    pub fn create_technology(
        &self,
        mut entity: TechnologyTracking,
    ) -> Result<String, VaultError> {
        let now = Utc::now();
        entity.first_tracked.get_or_insert(now);
        entity.last_updated.get_or_insert(now);
        self.create(DB_TECHNOLOGY, &mut entity, |e| &mut e.id)
    }

    pub fn get_technology(&self, id: &str) -> Result<Option<TechnologyTracking>, VaultError> {
        Ok(self
            .load_value(DB_TECHNOLOGY, id)?
            .and_then(|v| serde_json::from_value(v).ok()))
    }

    pub fn query_technologies(
        &self,
        filters: &[(&str, &str)],
    ) -> Result<Vec<TechnologyTracking>, VaultError> {
        Ok(Self::typed(
            DB_TECHNOLOGY,
            self.query_values(DB_TECHNOLOGY, filters)?,
        ))
    }

    pub fn get_technologies_by_category(
        &self,
        category: &str,
    ) -> Result<Vec<TechnologyTracking>, VaultError> {
        self.query_technologies(&[("category", category)])
    }

    pub fn get_critical_technologies(&self) -> Result<Vec<TechnologyTracking>, VaultError> {
        self.query_technologies(&[("monitoring_priority", "critical")])
    }

    /// Technologies are never silently deleted; archival keeps the row.
    pub fn archive_technology(&self, id: &str) -> Result<bool, VaultError> {
        let Some(mut tech) = self.get_technology(id)? else {
            return Ok(false);
        };
        tech.archived = true;
        tech.last_updated = Some(Utc::now());
        self.save_value(DB_TECHNOLOGY, id, &serde_json::to_value(&tech)?)?;
        Ok(true)
    }

    // --- Dependency mappings ---

    pub fn create_dependency_mapping(
        &self,
        mut entity: DependencyMapping,
    ) -> Result<String, VaultError> {
        entity.discovered_date.get_or_insert_with(Utc::now);
        self.create(DB_DEPENDENCY, &mut entity, |e| &mut e.id)
    }

    pub fn get_dependency_mapping(
        &self,
        id: &str,
    ) -> Result<Option<DependencyMapping>, VaultError> {
        Ok(self
            .load_value(DB_DEPENDENCY, id)?
            .and_then(|v| serde_json::from_value(v).ok()))
    }

    pub fn query_dependencies(
        &self,
        filters: &[(&str, &str)],
    ) -> Result<Vec<DependencyMapping>, VaultError> {
        Ok(Self::typed(
            DB_DEPENDENCY,
            self.query_values(DB_DEPENDENCY, filters)?,
        ))
    }

    pub fn get_dependencies_by_technology(
        &self,
        technology_name: &str,
    ) -> Result<Vec<DependencyMapping>, VaultError> {
        self.query_dependencies(&[("technology_name", technology_name)])
    }

    pub fn get_dependencies_by_file(
        &self,
        file_path: &str,
    ) -> Result<Vec<DependencyMapping>, VaultError> {
        self.query_dependencies(&[("ai_file_path", file_path)])
    }

    /// Essential plus important mappings.
    pub fn get_critical_dependencies(&self) -> Result<Vec<DependencyMapping>, VaultError> {
        let mut deps = self.query_dependencies(&[("dependency_criticality", "essential")])?;
        deps.extend(self.query_dependencies(&[("dependency_criticality", "important")])?);
        Ok(deps)
    }

    // --- Knowledge updates ---

    pub fn create_knowledge_update(
        &self,
        mut entity: KnowledgeUpdate,
    ) -> Result<String, VaultError> {
        entity.detected_date.get_or_insert_with(Utc::now);
        self.create(DB_UPDATES, &mut entity, |e| &mut e.id)
    }

    pub fn get_knowledge_update(&self, id: &str) -> Result<Option<KnowledgeUpdate>, VaultError> {
        Ok(self
            .load_value(DB_UPDATES, id)?
            .and_then(|v| serde_json::from_value(v).ok()))
    }

    pub fn query_updates(
        &self,
        filters: &[(&str, &str)],
    ) -> Result<Vec<KnowledgeUpdate>, VaultError> {
        Ok(Self::typed(
            DB_UPDATES,
            self.query_values(DB_UPDATES, filters)?,
        ))
    }

    /// Updates not in a terminal workflow state.
    pub fn get_pending_updates(&self) -> Result<Vec<KnowledgeUpdate>, VaultError> {
        Ok(self
            .query_updates(&[])?
            .into_iter()
            .filter(|u| !u.workflow_status.is_terminal())
            .collect())
    }

    pub fn get_critical_updates(&self) -> Result<Vec<KnowledgeUpdate>, VaultError> {
        self.query_updates(&[("update_priority", "critical")])
    }

    /// Move an update through its workflow. Returns Ok(false) for a
    /// missing id (expected control flow for callers); illegal transitions
    /// and an exhausted retry budget are rejected without mutating state.
    pub fn update_workflow_status(
        &self,
        id: &str,
        new_status: WorkflowStatus,
    ) -> Result<bool, VaultError> {
        let Some(mut update) = self.get_knowledge_update(id)? else {
            return Ok(false);
        };

        let current = update.workflow_status;
        if !current.can_transition_to(new_status) {
            return Err(VaultError::IllegalTransition {
                from: current.to_string(),
                to: new_status.to_string(),
            });
        }
        if current == WorkflowStatus::Failed && new_status == WorkflowStatus::Analyzing {
            if update.retry_count >= MAX_RETRIES {
                return Err(VaultError::IllegalTransition {
                    from: format!("failed (retry budget of {} exhausted)", MAX_RETRIES),
                    to: new_status.to_string(),
                });
            }
            update.retry_count += 1;
        }

        update.workflow_status = new_status;
        update.last_modified = Some(Utc::now());
        if new_status == WorkflowStatus::Completed {
            update.completed_date = Some(Utc::now());
        }

        self.save_value(DB_UPDATES, id, &serde_json::to_value(&update)?)?;
        info!("Update {} moved {} -> {}", id, current, new_status);
        Ok(true)
    }

    // --- Change events ---

    pub fn create_change_event(&self, mut entity: ChangeEvent) -> Result<String, VaultError> {
        entity.detected_date.get_or_insert_with(Utc::now);
        self.create(DB_CHANGES, &mut entity, |e| &mut e.id)
    }

    pub fn get_change_event(&self, id: &str) -> Result<Option<ChangeEvent>, VaultError> {
        Ok(self
            .load_value(DB_CHANGES, id)?
            .and_then(|v| serde_json::from_value(v).ok()))
    }

    pub fn query_change_events(
        &self,
        filters: &[(&str, &str)],
    ) -> Result<Vec<ChangeEvent>, VaultError> {
        Ok(Self::typed(
            DB_CHANGES,
            self.query_values(DB_CHANGES, filters)?,
        ))
    }

    pub fn get_critical_changes(&self) -> Result<Vec<ChangeEvent>, VaultError> {
        self.query_change_events(&[("change_classification", "critical")])
    }

    pub fn get_breaking_changes(&self) -> Result<Vec<ChangeEvent>, VaultError> {
        self.query_change_events(&[("change_type", "breaking_change")])
    }

    /// Advance a change event one step along its linear pipeline. Returns
    /// the new status, or None when the id is unknown or the event is
    /// already completed.
    pub fn advance_change_event(
        &self,
        id: &str,
    ) -> Result<Option<ProcessingStatus>, VaultError> {
        let Some(mut event) = self.get_change_event(id)? else {
            return Ok(None);
        };
        let Some(next) = event.processing_status.next() else {
            return Ok(None);
        };
        event.processing_status = next;
        self.save_value(DB_CHANGES, id, &serde_json::to_value(&event)?)?;
        Ok(Some(next))
    }

    // --- Impact analysis ---

    /// Bucket every mapping that references `technology_name` by its
    /// criticality and summarize related change/update pressure.
    pub fn analyze_technology_impact(
        &self,
        technology_name: &str,
    ) -> Result<ImpactAnalysis, VaultError> {
        let dependencies = self.get_dependencies_by_technology(technology_name)?;
        let changes = self.query_change_events(&[("technology_name", technology_name)])?;
        let updates = self.query_updates(&[("related_technology", technology_name)])?;

        let mut by_criticality = BTreeMap::new();
        for dep in &dependencies {
            *by_criticality
                .entry(dep.dependency_criticality.name().to_string())
                .or_insert(0) += 1;
        }

        let pending: Vec<&KnowledgeUpdate> = updates
            .iter()
            .filter(|u| !u.workflow_status.is_terminal())
            .collect();

        Ok(ImpactAnalysis {
            technology_name: technology_name.to_string(),
            affected_files: dependencies.len(),
            recent_changes: changes.len(),
            pending_updates: pending.len(),
            impact_summary: ImpactSummary {
                total_affected_files: dependencies.len(),
                by_criticality,
                high_impact_changes: changes
                    .iter()
                    .filter(|c| {
                        matches!(c.change_classification.as_str(), "critical" | "high")
                    })
                    .count(),
                pending_critical_updates: pending
                    .iter()
                    .filter(|u| u.update_priority == "critical")
                    .count(),
            },
        })
    }

    pub fn get_system_health_summary(&self) -> Result<HealthSummary, VaultError> {
        let tech_count = self.query_technologies(&[])?.len();
        let dep_count = self.query_dependencies(&[])?.len();
        let update_count = self.query_updates(&[])?.len();
        let change_count = self.query_change_events(&[])?.len();

        let critical_updates = self.get_critical_updates()?.len();
        let critical_changes = self.get_critical_changes()?.len();
        let pending_updates = self.get_pending_updates()?.len();

        let mut database_counts = BTreeMap::new();
        database_counts.insert(DB_TECHNOLOGY.to_string(), tech_count);
        database_counts.insert(DB_DEPENDENCY.to_string(), dep_count);
        database_counts.insert(DB_UPDATES.to_string(), update_count);
        database_counts.insert(DB_CHANGES.to_string(), change_count);

        let mut critical_items = BTreeMap::new();
        critical_items.insert(
            "technologies".to_string(),
            self.get_critical_technologies()?.len(),
        );
        critical_items.insert(
            "dependencies".to_string(),
            self.get_critical_dependencies()?.len(),
        );
        critical_items.insert("updates".to_string(), critical_updates);
        critical_items.insert("changes".to_string(), critical_changes);

        let mut pending_work = BTreeMap::new();
        pending_work.insert("updates_pending".to_string(), pending_updates);

        let pending_work_load = if pending_updates > 10 {
            "high"
        } else if pending_updates > 5 {
            "moderate"
        } else {
            "low"
        };

        Ok(HealthSummary {
            database_counts,
            critical_items,
            pending_work,
            health_indicators: HealthIndicators {
                critical_attention_needed: critical_updates > 0 || critical_changes > 0,
                pending_work_load: pending_work_load.to_string(),
            },
        })
    }
}

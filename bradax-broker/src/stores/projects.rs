//! Project records and the project store.
//!
//! Projects are created and updated out-of-band by operators; the request
//! pipeline only reads. The store keeps an immutable in-memory snapshot and
//! re-reads the backing file when its mtime moves, so operator edits become
//! visible without a restart. A failed re-read keeps the last good snapshot.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::fsio;
use super::StoreError;

// ── Project ────────────────────────────────────────────────────────────

/// Lifecycle state of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Eligible for token issuance and invocation.
    Active,
    /// Retained but not usable.
    Inactive,
    /// Administratively frozen.
    Suspended,
}

/// One tenant of the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Stable lowercase identifier, unique across the store.
    pub project_id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Owning organisation, embedded in issued tokens.
    #[serde(default)]
    pub organization: String,
    /// Opaque fingerprint consulted during token issuance.
    pub api_key_hash: String,
    /// Models this project may invoke.
    pub allowed_models: Vec<String>,
    /// Lifecycle state.
    pub status: ProjectStatus,
    /// Remaining budget in USD, two-decimal precision, never negative.
    pub budget_remaining: f64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last out-of-band update.
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Whether `model_id` is on the allow-list.
    #[must_use]
    pub fn allows_model(&self, model_id: &str) -> bool {
        self.allowed_models.iter().any(|m| m == model_id)
    }
}

fn validate(projects: &[Project]) -> Result<(), StoreError> {
    let mut seen = rustc_hash::FxHashSet::default();
    for project in projects {
        if project.project_id != project.project_id.to_lowercase() {
            return Err(StoreError::Integrity {
                message: format!("project_id '{}' is not lowercase", project.project_id),
            });
        }
        if !seen.insert(project.project_id.clone()) {
            return Err(StoreError::Integrity {
                message: format!("duplicate project_id '{}'", project.project_id),
            });
        }
        if project.status == ProjectStatus::Active && project.allowed_models.is_empty() {
            return Err(StoreError::Integrity {
                message: format!(
                    "active project '{}' has an empty allowed_models list",
                    project.project_id
                ),
            });
        }
        if project.budget_remaining < 0.0 {
            return Err(StoreError::Integrity {
                message: format!(
                    "project '{}' has a negative budget",
                    project.project_id
                ),
            });
        }
    }
    Ok(())
}

// ── ProjectStore ───────────────────────────────────────────────────────

struct CacheState {
    projects: Arc<FxHashMap<String, Project>>,
    loaded_mtime: Option<SystemTime>,
}

/// JSON-backed project store with an mtime-watched in-memory cache.
pub struct ProjectStore {
    path: PathBuf,
    cache: RwLock<CacheState>,
}

impl ProjectStore {
    /// Load and validate `projects.json`. A missing file starts empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on unreadable, unparseable, or
    /// invariant-violating contents — startup must fail fast.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let (projects, mtime) = if path.exists() {
            read_validated(&path)?
        } else {
            (Arc::new(FxHashMap::default()), None)
        };
        tracing::info!(path = %path.display(), projects = projects.len(), "loaded project store");
        Ok(Self {
            path,
            cache: RwLock::new(CacheState {
                projects,
                loaded_mtime: mtime,
            }),
        })
    }

    /// Look up one project, refreshing from disk if the file changed.
    #[must_use]
    pub fn get(&self, project_id: &str) -> Option<Project> {
        self.refresh_if_stale();
        self.read_cache().get(project_id).cloned()
    }

    /// Snapshot of every project.
    #[must_use]
    pub fn all(&self) -> Arc<FxHashMap<String, Project>> {
        self.refresh_if_stale();
        self.read_cache()
    }

    /// Insert or replace a project and persist atomically (admin surface).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the resulting set violates an invariant or
    /// the write fails.
    pub fn upsert(&self, mut project: Project) -> Result<(), StoreError> {
        project.project_id = project.project_id.to_lowercase();
        project.updated_at = Utc::now();
        project.budget_remaining = (project.budget_remaining * 100.0).round() / 100.0;

        let mut next: FxHashMap<String, Project> = self.read_cache().as_ref().clone();
        next.insert(project.project_id.clone(), project);
        self.persist(next)
    }

    /// Remove a project and persist atomically (admin surface).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the id is unknown or the write fails.
    pub fn remove(&self, project_id: &str) -> Result<(), StoreError> {
        let mut next: FxHashMap<String, Project> = self.read_cache().as_ref().clone();
        if next.remove(project_id).is_none() {
            return Err(StoreError::Integrity {
                message: format!("unknown project_id '{project_id}'"),
            });
        }
        self.persist(next)
    }

    fn persist(&self, next: FxHashMap<String, Project>) -> Result<(), StoreError> {
        let mut records: Vec<&Project> = next.values().collect();
        records.sort_by(|a, b| a.project_id.cmp(&b.project_id));
        let owned: Vec<Project> = records.into_iter().cloned().collect();
        validate(&owned)?;
        fsio::write_json_atomic(&self.path, &owned)?;
        let mtime = fs_mtime(&self.path);
        let mut guard = self.write_cache();
        guard.projects = Arc::new(next);
        guard.loaded_mtime = mtime;
        Ok(())
    }

    fn refresh_if_stale(&self) {
        let current = fs_mtime(&self.path);
        {
            let guard = self
                .cache
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if guard.loaded_mtime == current {
                return;
            }
        }
        match read_validated(&self.path) {
            Ok((projects, mtime)) => {
                let mut guard = self.write_cache();
                guard.projects = projects;
                guard.loaded_mtime = mtime;
                tracing::debug!(path = %self.path.display(), "project store refreshed");
            }
            Err(error) => {
                tracing::warn!(
                    path = %self.path.display(),
                    %error,
                    "project store refresh failed, keeping previous snapshot"
                );
            }
        }
    }

    fn read_cache(&self) -> Arc<FxHashMap<String, Project>> {
        self.cache
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .projects
            .clone()
    }

    fn write_cache(&self) -> std::sync::RwLockWriteGuard<'_, CacheState> {
        self.cache
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn read_validated(
    path: &Path,
) -> Result<(Arc<FxHashMap<String, Project>>, Option<SystemTime>), StoreError> {
    let records: Vec<Project> = fsio::read_json(path)?;
    validate(&records)?;
    let map = records
        .into_iter()
        .map(|p| (p.project_id.clone(), p))
        .collect();
    Ok((Arc::new(map), fs_mtime(path)))
}

fn fs_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

// ── Tests ──────────────────────────────────────────────────────────────

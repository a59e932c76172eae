//! Source repository resolution per extension id.
//!
//! Lookup order: explicit override from the registry settings, then the
//! on-disk cache, then the remote community index. The index is fetched at
//! most once per resolver; whatever it yields is merged into the cache and
//! persisted so later lookups work offline. Overrides are never touched by
//! the lower-precedence sources.

use crate::network::CommunityIndexSource;
use crate::persist::{atomic_read_json, atomic_write_json};
use crate::registry::Registry;
use crate::repo_id::normalize_repository;
use crate::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Default)]
struct CacheState {
    loaded: bool,
    mappings: BTreeMap<String, String>,
    remote_attempted: bool,
}

pub struct RepoResolver {
    registry: Registry,
    index: Arc<dyn CommunityIndexSource>,
    cache_path: PathBuf,
    state: Mutex<CacheState>,
}

impl RepoResolver {
    pub fn new(
        registry: Registry,
        index: Arc<dyn CommunityIndexSource>,
        cache_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            index,
            cache_path: cache_path.into(),
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Resolve `id` to an `owner/name` identifier.
    ///
    /// A failed remote fetch is logged and yields `None`.
    pub async fn resolve(&self, id: &str) -> Option<String> {
        let overrides = self.registry.settings().await.repo_overrides;
        if let Some(repo) = overrides.get(id) {
            return Some(repo.clone());
        }

        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state, &overrides);
        if let Some(repo) = state.mappings.get(id) {
            return Some(repo.clone());
        }

        if state.remote_attempted {
            return None;
        }
        state.remote_attempted = true;

        match self.merge_remote(&mut state, &overrides).await {
            Ok(added) => debug!("Community index added {} mappings", added),
            Err(e) => {
                warn!("Failed to fetch community index: {}", e);
                return None;
            }
        }
        if let Err(e) = self.persist(&state.mappings) {
            warn!("Failed to persist repository cache: {}", e);
        }
        state.mappings.get(id).cloned()
    }

    /// Whether a mapping exists for `id` without going to the network.
    pub async fn has_mapping(&self, id: &str) -> bool {
        let overrides = self.registry.settings().await.repo_overrides;
        if overrides.contains_key(id) {
            return true;
        }
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state, &overrides);
        state.mappings.contains_key(id)
    }

    /// Set an explicit mapping. It wins over every other source from now on.
    ///
    /// The registry is saved and the cache file rewritten; failures of
    /// either are returned.
    pub async fn set_repo(&self, id: &str, repo: &str) -> Result<String> {
        let repo = normalize_repository(repo)?;
        self.registry
            .update(|state| {
                state
                    .settings
                    .repo_overrides
                    .insert(id.to_string(), repo.clone());
                Ok(())
            })
            .await?;
        self.registry.save().await?;

        let overrides = self.registry.settings().await.repo_overrides;
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state, &overrides);
        state.mappings.insert(id.to_string(), repo.clone());
        self.persist(&state.mappings)?;
        info!("Mapped {} to {}", id, repo);
        Ok(repo)
    }

    /// Fetch the community index again, ignoring the once-per-session memo.
    pub async fn refresh_index(&self) -> Result<usize> {
        let overrides = self.registry.settings().await.repo_overrides;
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state, &overrides);
        state.remote_attempted = true;
        let added = self.merge_remote(&mut state, &overrides).await?;
        self.persist(&state.mappings)?;
        Ok(added)
    }

    fn ensure_loaded(&self, state: &mut CacheState, overrides: &BTreeMap<String, String>) {
        if !state.loaded {
            state.mappings = match atomic_read_json(&self.cache_path) {
                Ok(cached) => cached.unwrap_or_default(),
                Err(e) => {
                    warn!(
                        "Ignoring unreadable repository cache {}: {}",
                        self.cache_path.display(),
                        e
                    );
                    BTreeMap::new()
                }
            };
            state.loaded = true;
            debug!("Loaded {} cached repository mappings", state.mappings.len());
        }
        for (id, repo) in overrides {
            state.mappings.insert(id.clone(), repo.clone());
        }
    }

    async fn merge_remote(
        &self,
        state: &mut CacheState,
        overrides: &BTreeMap<String, String>,
    ) -> Result<usize> {
        let entries = self.index.fetch_community_index().await?;
        let mut added = 0;
        for entry in entries {
            if entry.id.is_empty() || overrides.contains_key(&entry.id) {
                continue;
            }
            let repo = match normalize_repository(&entry.repo) {
                Ok(repo) => repo,
                Err(_) => {
                    debug!("Skipping index entry {} with repo {:?}", entry.id, entry.repo);
                    continue;
                }
            };
            if state.mappings.insert(entry.id, repo).is_none() {
                added += 1;
            }
        }
        Ok(added)
    }

    fn persist(&self, mappings: &BTreeMap<String, String>) -> Result<()> {
        atomic_write_json(&self.cache_path, mappings, false)
    }
}

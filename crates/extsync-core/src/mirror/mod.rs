//! Two-way sync between registry records and mirror documents.
//!
//! Each record has one markdown document in the mirror directory. The
//! document is identified by its `ext_ro_id` front-matter key, never by its
//! file name, so it can be renamed when the display name changes.
//!
//! Export regenerates the front-matter and keeps the body. Import applies the
//! writable keys back onto the registry. Writes made by export must not come
//! back in as edits: an in-flight counter is held for the duration of every
//! export, and the content of each written file is fingerprinted so that a
//! late watcher event for our own write is recognized and dropped.

pub mod frontmatter;
mod watcher;

pub use frontmatter::{ExportFields, ImportedFields};
pub use watcher::{run_watch_loop, MirrorWatcher};

use crate::config::{MirrorConfig, PathsConfig};
use crate::events::{EventBus, SyncEvent};
use crate::host::ExtensionHost;
use crate::persist::atomic_write_text;
use crate::registry::{ExtensionRecord, Registry, RegistryState};
use crate::repo_id::normalize_repository;
use crate::resolver::RepoResolver;
use crate::{Result, SyncError};
use regex::Regex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, info, warn};

/// Holds the "export in flight" signal until dropped.
pub struct ExportGuard {
    counter: Arc<AtomicUsize>,
}

impl ExportGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for ExportGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Why an import pass left a document alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ExportInFlight,
    NotMirrorDocument,
    Removed,
    OwnWrite,
    Malformed,
    MissingId,
    UnknownId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Applied { id: String },
    Skipped(SkipReason),
}

pub struct NoteMirror {
    dir: PathBuf,
    registry: Registry,
    resolver: Arc<RepoResolver>,
    host: Arc<dyn ExtensionHost>,
    events: EventBus,
    in_flight: Arc<AtomicUsize>,
    written: Mutex<HashMap<PathBuf, u64>>,
}

impl NoteMirror {
    pub fn new(
        dir: impl Into<PathBuf>,
        registry: Registry,
        resolver: Arc<RepoResolver>,
        host: Arc<dyn ExtensionHost>,
        events: EventBus,
    ) -> Self {
        Self {
            dir: dir.into(),
            registry,
            resolver,
            host,
            events,
            in_flight: Arc::new(AtomicUsize::new(0)),
            written: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Raise the "export in flight" signal until the guard is dropped.
    pub fn export_guard(&self) -> ExportGuard {
        ExportGuard::enter(&self.in_flight)
    }

    pub fn is_export_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Export one record and return the path of its document.
    pub async fn export_one(&self, id: &str) -> Result<PathBuf> {
        let state = self.registry.snapshot().await;
        let record = state
            .extension(id)
            .ok_or_else(|| SyncError::UnknownExtension { id: id.to_string() })?;
        let index = self.scan()?;
        self.export_record(&state, record, &index).await
    }

    /// Export every record. Stops at the first failure.
    pub async fn export_all(&self) -> Result<usize> {
        let state = self.registry.snapshot().await;
        let index = self.scan()?;
        for record in &state.extensions {
            self.export_record(&state, record, &index).await?;
        }
        info!(
            "Exported {} mirror documents to {}",
            state.extensions.len(),
            self.dir.display()
        );
        Ok(state.extensions.len())
    }

    async fn export_record(
        &self,
        state: &RegistryState,
        record: &ExtensionRecord,
        index: &HashMap<String, PathBuf>,
    ) -> Result<PathBuf> {
        let repo = self.resolver.resolve(&record.id).await;
        let installed = state.settings.installed_by_tool.contains(&record.id)
            || record.is_tool_installed();
        let fields = export_fields(state, record, repo, installed);

        let _guard = self.export_guard();
        fs::create_dir_all(&self.dir).map_err(|e| SyncError::io_with_path(e, &self.dir))?;

        let target = self.dir.join(document_file_name(record));
        let (path, body, previous) = match self.locate(&record.id, index)? {
            Some((found, content)) => {
                let path = self.move_to_target(found, &target)?;
                let body = match frontmatter::split_document(&content) {
                    (Some(_), body) => body.to_string(),
                    (None, whole) => whole.to_string(),
                };
                (path, body, Some(content))
            }
            None => {
                // Another extension already owns a document with this name.
                let path = if target.exists() {
                    self.dir.join(format!(
                        "{}-{}.{}",
                        document_stem(record),
                        sanitize_file_stem(&record.id),
                        PathsConfig::MIRROR_EXTENSION
                    ))
                } else {
                    target
                };
                (path, MirrorConfig::DEFAULT_BODY.to_string(), None)
            }
        };

        let rendered = frontmatter::render_document(&fields, &body)?;
        if previous.as_deref() == Some(rendered.as_str()) {
            debug!("Mirror document for {} is up to date", record.id);
            return Ok(path);
        }

        atomic_write_text(&path, &rendered)?;
        self.remember_write(&path, &rendered);
        debug!("Exported {} to {}", record.id, path.display());
        Ok(path)
    }

    /// Find the existing document for `id`: by front-matter id first, then
    /// by the legacy `<id>.md` name if that file is not claimed by another id.
    fn locate(
        &self,
        id: &str,
        index: &HashMap<String, PathBuf>,
    ) -> Result<Option<(PathBuf, String)>> {
        if let Some(path) = index.get(id) {
            if let Ok(content) = fs::read_to_string(path) {
                return Ok(Some((path.clone(), content)));
            }
        }

        let legacy = self.dir.join(format!(
            "{}.{}",
            sanitize_file_stem(id),
            PathsConfig::MIRROR_EXTENSION
        ));
        if !legacy.is_file() {
            return Ok(None);
        }
        let content =
            fs::read_to_string(&legacy).map_err(|e| SyncError::io_with_path(e, &legacy))?;
        let claimed_by_other = matches!(
            frontmatter::parse_document(&content),
            Ok(Some((ImportedFields { id: Some(other), .. }, _))) if other != id
        );
        if claimed_by_other {
            return Ok(None);
        }
        Ok(Some((legacy, content)))
    }

    fn move_to_target(&self, found: PathBuf, target: &Path) -> Result<PathBuf> {
        if found == target {
            return Ok(found);
        }
        if target.exists() {
            debug!(
                "Keeping {} since {} is taken",
                found.display(),
                target.display()
            );
            return Ok(found);
        }
        fs::rename(&found, target).map_err(|e| SyncError::io_with_path(e, &found))?;
        info!("Renamed {} to {}", found.display(), target.display());
        Ok(target.to_path_buf())
    }

    /// Map of front-matter id to document path for the mirror directory.
    fn scan(&self) -> Result<HashMap<String, PathBuf>> {
        let mut index = HashMap::new();
        if !self.dir.exists() {
            return Ok(index);
        }
        let entries = fs::read_dir(&self.dir).map_err(|e| SyncError::io_with_path(e, &self.dir))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if !is_mirror_file(&path) {
                continue;
            }
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            if let Ok(Some((ImportedFields { id: Some(id), .. }, _))) =
                frontmatter::parse_document(&content)
            {
                index.entry(id).or_insert(path);
            }
        }
        Ok(index)
    }

    fn remember_write(&self, path: &Path, content: &str) {
        if let Ok(mut written) = self.written.lock() {
            written.insert(path.to_path_buf(), fingerprint(content));
        }
    }

    /// True while `path` still holds exactly what export last wrote. Any other
    /// content forgets that write, so a later revert to it is a user edit.
    fn is_own_write(&self, path: &Path, content: &str) -> bool {
        let Ok(mut written) = self.written.lock() else {
            return false;
        };
        match written.get(path) {
            Some(&hash) if hash == fingerprint(content) => true,
            Some(_) => {
                written.remove(path);
                false
            }
            None => false,
        }
    }

    fn in_mirror_dir(&self, path: &Path) -> bool {
        let Some(parent) = path.parent() else {
            return false;
        };
        if parent == self.dir {
            return true;
        }
        match (parent.canonicalize(), self.dir.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// Apply an externally edited document back onto the registry.
    pub async fn handle_document_changed(&self, path: &Path) -> Result<ImportOutcome> {
        if self.is_export_in_flight() {
            return Ok(ImportOutcome::Skipped(SkipReason::ExportInFlight));
        }
        if !is_mirror_file(path) || !self.in_mirror_dir(path) {
            return Ok(ImportOutcome::Skipped(SkipReason::NotMirrorDocument));
        }
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!("Mirror document {} unreadable: {}", path.display(), e);
                return Ok(ImportOutcome::Skipped(SkipReason::Removed));
            }
        };
        if self.is_own_write(path, &content) {
            return Ok(ImportOutcome::Skipped(SkipReason::OwnWrite));
        }

        let fields = match frontmatter::parse_document(&content) {
            Ok(Some((fields, _))) => fields,
            Ok(None) => return Ok(ImportOutcome::Skipped(SkipReason::MissingId)),
            Err(e) => {
                warn!("Skipping malformed mirror document {}: {}", path.display(), e);
                return Ok(ImportOutcome::Skipped(SkipReason::Malformed));
            }
        };
        let Some(id) = fields.id.clone() else {
            return Ok(ImportOutcome::Skipped(SkipReason::MissingId));
        };
        if !self.registry.contains(&id).await {
            debug!("Mirror document {} names unknown id {}", path.display(), id);
            return Ok(ImportOutcome::Skipped(SkipReason::UnknownId));
        }

        self.registry
            .update(|state| {
                if let Some(record) = state.extension_mut(&id) {
                    if let Some(desc) = &fields.description {
                        record.description = desc.clone();
                    }
                    if let Some(note) = &fields.note {
                        record.user_note = note.clone();
                    }
                    if let Some(enabled) = fields.enabled {
                        record.enabled = enabled;
                    }
                }
                Ok(())
            })
            .await?;

        if let Some(wanted) = fields.enabled {
            self.apply_run_state(&id, wanted).await;
        }
        if let Some(repo) = &fields.repo {
            self.apply_repo(&id, repo).await;
        }

        self.registry.save().await?;
        self.events.emit(SyncEvent::RegistryChanged);
        info!("Imported mirror edits for {}", id);
        Ok(ImportOutcome::Applied { id })
    }

    async fn apply_run_state(&self, id: &str, wanted: bool) {
        if id == self.host.self_id() {
            return;
        }
        let running = match self.host.enabled_ids().await {
            Ok(set) => set.contains(id),
            Err(e) => {
                warn!("Failed to read run state of {}: {}", id, e);
                return;
            }
        };
        if running == wanted {
            return;
        }

        self.events.emit(SyncEvent::ApplyingStateChange {
            id: id.to_string(),
            active: true,
        });
        let result = if wanted {
            self.host.enable(id).await
        } else {
            self.host.disable(id).await
        };
        if let Err(e) = result {
            warn!("Failed to {} {}: {}", if wanted { "enable" } else { "disable" }, id, e);
        }
        self.events.emit(SyncEvent::ApplyingStateChange {
            id: id.to_string(),
            active: false,
        });
    }

    /// The repository key is only taken from a document when nothing more
    /// authoritative exists for the id.
    async fn apply_repo(&self, id: &str, repo: &str) {
        if self.registry.is_installed_by_tool(id).await {
            debug!("Ignoring repository edit for tool-installed {}", id);
            return;
        }
        if self.resolver.has_mapping(id).await {
            return;
        }
        let normalized = match normalize_repository(repo) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!("Ignoring repository edit for {}: {}", id, e);
                return;
            }
        };
        if let Err(e) = self.resolver.set_repo(id, &normalized).await {
            warn!("Failed to store repository for {}: {}", id, e);
        }
    }
}

fn export_fields(
    state: &RegistryState,
    record: &ExtensionRecord,
    repo: Option<String>,
    installed: bool,
) -> ExportFields {
    let group = record
        .group_id
        .as_ref()
        .map(|gid| {
            state
                .groups
                .iter()
                .find(|g| &g.id == gid)
                .map(|g| g.name.clone())
                .unwrap_or_else(|| gid.clone())
        })
        .unwrap_or_default();
    let tags = record
        .tag_ids
        .iter()
        .map(|tid| {
            state
                .tags
                .iter()
                .find(|t| &t.id == tid)
                .map(|t| t.name.clone())
                .unwrap_or_else(|| tid.clone())
        })
        .collect();
    let delay = record
        .delay_profile_id
        .as_ref()
        .map(|did| {
            state
                .delays
                .iter()
                .find(|d| &d.id == did)
                .map(|d| d.name.clone())
                .unwrap_or_else(|| did.clone())
        })
        .unwrap_or_default();

    ExportFields {
        ext_ro_id: record.id.clone(),
        ext_rw_desc: record.description.clone(),
        ext_rw_note: record.user_note.clone(),
        ext_rw_enabled: record.enabled,
        ext_rwc_repo: repo.unwrap_or_default(),
        ext_ro_group: group,
        ext_ro_tags: tags,
        ext_ro_delay: delay,
        ext_ro_installed_by_tool: installed,
    }
}

fn sanitize_file_stem(name: &str) -> String {
    static INVALID: OnceLock<Option<Regex>> = OnceLock::new();
    let invalid = INVALID.get_or_init(|| Regex::new(r#"[/\\?%*:|"<>]"#).ok());
    let cleaned = match invalid {
        Some(re) => re.replace_all(name, "-").into_owned(),
        None => name.to_string(),
    };
    cleaned.trim().trim_matches('.').to_string()
}

/// File name derived from the display name, falling back to the id.
pub fn document_file_name(record: &ExtensionRecord) -> String {
    format!("{}.{}", document_stem(record), PathsConfig::MIRROR_EXTENSION)
}

fn document_stem(record: &ExtensionRecord) -> String {
    [record.display_name.as_str(), record.id.as_str()]
        .into_iter()
        .map(sanitize_file_stem)
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| "extension".to_string())
}

fn is_mirror_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PathsConfig::MIRROR_EXTENSION))
}

fn fingerprint(content: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

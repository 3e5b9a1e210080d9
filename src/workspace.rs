use crate::{
    cache::{CacheEntry, FileFragment},
    config::EngineConfig,
    error::{Error, Result},
    knowledge::{parse_content, KnowledgeBase, KnowledgeBuilder},
};

use anyhow::Context;
use walkdir::{DirEntry, WalkDir};

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Identity of the document a request comes from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DocumentId {
    /// Saved document with a file-system path
    Path(PathBuf),
    /// Unsaved buffer or non-file document, e.g. `untitled:Untitled-1`
    Virtual(String),
}

impl DocumentId {
    pub fn path(&self) -> Option<&Path> {
        match self {
            DocumentId::Path(path) => Some(path),
            DocumentId::Virtual(_) => None,
        }
    }
}

impl From<PathBuf> for DocumentId {
    fn from(path: PathBuf) -> Self {
        DocumentId::Path(path)
    }
}

impl From<&Path> for DocumentId {
    fn from(path: &Path) -> Self {
        DocumentId::Path(path.to_path_buf())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProjectRoot {
    /// Nearest ancestor carrying a root marker
    Known(PathBuf),
    /// No marker found: the document's own directory
    Standalone(PathBuf),
    /// Virtual, relative or dangerous location; only the document text is used
    NoStableRoot,
}

impl ProjectRoot {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ProjectRoot::Known(path) | ProjectRoot::Standalone(path) => Some(path),
            ProjectRoot::NoStableRoot => None,
        }
    }
}

/// Directories that must never be scanned as a workspace.
fn is_dangerous(dir: &Path) -> bool {
    dir.parent().is_none() || dirs::home_dir().as_deref() == Some(dir)
}

fn stable_path(document: &DocumentId) -> Result<&Path> {
    match document {
        DocumentId::Path(path)
            if path.is_absolute() && !path.components().any(|c| c == Component::ParentDir) =>
        {
            Ok(path)
        }
        DocumentId::Path(path) => Err(Error::UnstableRoot(path.clone())),
        DocumentId::Virtual(name) => Err(Error::UnstableRoot(PathBuf::from(name))),
    }
}

pub fn resolve_project_root(document: &DocumentId, config: &EngineConfig) -> ProjectRoot {
    let path = match stable_path(document) {
        Ok(path) => path,
        Err(err) => {
            log::debug!("{}", err);
            return ProjectRoot::NoStableRoot;
        }
    };

    let Some(dir) = path.parent() else {
        return ProjectRoot::NoStableRoot;
    };

    for ancestor in dir.ancestors() {
        if is_dangerous(ancestor) {
            break;
        }
        if config.root_markers.iter().any(|marker| ancestor.join(marker).exists()) {
            return ProjectRoot::Known(ancestor.to_path_buf());
        }
    }

    if is_dangerous(dir) {
        log::debug!("{}", Error::UnstableRoot(dir.to_path_buf()));
        return ProjectRoot::NoStableRoot;
    }

    ProjectRoot::Standalone(dir.to_path_buf())
}

pub fn is_journal_file(path: &Path, config: &EngineConfig) -> bool {
    let by_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| config.journal_extensions.iter().any(|e| e == ext));
    let by_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .map_or(false, |name| config.journal_file_names.iter().any(|n| n == name));

    by_extension || by_name
}

fn is_skipped_dir(entry: &DirEntry, config: &EngineConfig) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || config.skip_dirs.iter().any(|skip| *skip == name)
}

/// Every journal file below `root`, sorted by path.
pub fn discover_journal_files(root: &Path, config: &EngineConfig) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e, config))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                log::warn!("Skipping unreadable entry under {}: {}", root.display(), err);
                continue;
            }
        };

        if entry.file_type().is_file() && is_journal_file(entry.path(), config) {
            files.push(entry.into_path());
        } else if entry.file_type().is_file() {
            log::trace!("not a journal file: {}", entry.path().display());
        }
    }

    files.sort();
    files
}

pub(crate) fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

fn parse_file(path: &Path) -> anyhow::Result<KnowledgeBase> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(parse_content(&content, Some(path)))
}

/// Scan `root`, re-parsing only files that are new or whose modification time
/// differs from the one recorded in `previous`.
pub fn scan_workspace(
    root: &Path,
    config: &EngineConfig,
    previous: Option<&CacheEntry>,
) -> CacheEntry {
    let files = discover_journal_files(root, config);
    log::info!("Scanning {} journal files under {}", files.len(), root.display());

    let mut fragments = BTreeMap::new();
    let mut reused = 0;

    for path in files {
        let modified = modified_time(&path);

        if let Some(fragment) = previous.and_then(|entry| entry.fresh_fragment(&path, modified)) {
            fragments.insert(path, fragment.clone());
            reused += 1;
            continue;
        }

        match parse_file(&path) {
            Ok(knowledge) => {
                fragments.insert(path, FileFragment { modified, knowledge });
            }
            Err(err) => log::warn!("Excluding journal from workspace: {:#}", err),
        }
    }

    let mut builder = KnowledgeBuilder::new();
    for fragment in fragments.values() {
        builder.absorb(&fragment.knowledge);
    }

    log::info!(
        "Workspace {} ready: {} files, {} re-parsed",
        root.display(),
        fragments.len(),
        fragments.len() - reused
    );

    CacheEntry {
        root: root.to_path_buf(),
        config: Arc::new(config.clone()),
        knowledge: builder.finish(),
        files: fragments,
    }
}

/// Knowledge aggregated over every journal file under `root`.
pub fn parse_workspace(root: &Path, config: &EngineConfig) -> KnowledgeBase {
    scan_workspace(root, config, None).knowledge
}

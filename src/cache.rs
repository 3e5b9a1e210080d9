use crate::{
    config::EngineConfig,
    knowledge::KnowledgeBase,
    workspace::{modified_time, scan_workspace},
};

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

/// Parse result of one journal file, with the modification time it was read at.
#[derive(Clone, Debug)]
pub struct FileFragment {
    pub modified: Option<SystemTime>,
    pub knowledge: KnowledgeBase,
}

/// Knowledge of one project root. Entries are replaced whole, never edited.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub root: PathBuf,
    /// Configuration the root was scanned with
    pub config: Arc<EngineConfig>,
    pub knowledge: KnowledgeBase,
    pub files: BTreeMap<PathBuf, FileFragment>,
}

impl CacheEntry {
    /// The stored fragment of `path`, if it was read at exactly `modified`.
    pub fn fresh_fragment(
        &self,
        path: &Path,
        modified: Option<SystemTime>,
    ) -> Option<&FileFragment> {
        self.files
            .get(path)
            .filter(|fragment| modified.is_some() && fragment.modified == modified)
    }

    /// Whether any known file changed or disappeared since it was read.
    /// New files are only noticed by a rescan.
    pub fn is_stale(&self) -> bool {
        self.files
            .keys()
            .any(|path| self.fresh_fragment(path, modified_time(path)).is_none())
    }
}

/// Opaque key-value store holding one entry per project root.
pub trait CacheStore {
    fn get(&self, root: &Path) -> Option<Arc<CacheEntry>>;
    fn set(&self, root: &Path, entry: Arc<CacheEntry>);
    fn remove(&self, root: &Path);
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<PathBuf, Arc<CacheEntry>>>,
}

impl CacheStore for MemoryStore {
    fn get(&self, root: &Path) -> Option<Arc<CacheEntry>> {
        let entries = self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.get(root).cloned()
    }

    fn set(&self, root: &Path, entry: Arc<CacheEntry>) {
        let mut entries = self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(root.to_path_buf(), entry);
    }

    fn remove(&self, root: &Path) {
        let mut entries = self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.remove(root);
    }
}

/// Workspace knowledge per project root, rebuilt on a miss and revalidated
/// through per-file modification times.
pub struct WorkspaceCache<S: CacheStore = MemoryStore> {
    store: S,
    config: EngineConfig,
}

impl WorkspaceCache<MemoryStore> {
    pub fn in_memory(config: EngineConfig) -> Self {
        WorkspaceCache::new(MemoryStore::default(), config)
    }
}

impl<S: CacheStore> WorkspaceCache<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        WorkspaceCache { store, config }
    }

    /// Configuration used where a root has none of its own.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn entry(&self, root: &Path) -> Option<Arc<CacheEntry>> {
        self.store.get(root)
    }

    /// Up to date entry of `root`. A miss scans the whole workspace; a hit
    /// whose files changed on disk is rescanned incrementally.
    pub fn current(&self, root: &Path) -> Arc<CacheEntry> {
        match self.store.get(root) {
            Some(entry) if !entry.is_stale() => {
                log::debug!("cache hit for {}", root.display());
                entry
            }
            Some(entry) => {
                log::debug!("stale cache entry for {}", root.display());
                self.scan(root, Some(&*entry))
            }
            None => {
                log::debug!("cache miss for {}", root.display());
                self.scan(root, None)
            }
        }
    }

    pub fn knowledge(&self, root: &Path) -> KnowledgeBase {
        self.current(root).knowledge.clone()
    }

    /// Rediscover the files of `root`, re-parse only the changed ones and
    /// reload its configuration.
    pub fn rescan(&self, root: &Path) -> Arc<CacheEntry> {
        let previous = self.store.get(root);
        self.scan(root, previous.as_deref())
    }

    pub fn refresh(&self, root: &Path) -> KnowledgeBase {
        self.rescan(root).knowledge.clone()
    }

    fn scan(&self, root: &Path, previous: Option<&CacheEntry>) -> Arc<CacheEntry> {
        let config = EngineConfig::load_or(root, &self.config);
        let entry = Arc::new(scan_workspace(root, &config, previous));
        self.store.set(root, Arc::clone(&entry));
        entry
    }

    pub fn invalidate(&self, root: &Path) {
        log::debug!("invalidating {}", root.display());
        self.store.remove(root);
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheStore, MemoryStore, WorkspaceCache};
    use crate::config::{EngineConfig, CONFIG_FILE};
    use anyhow::Result;
    use std::fs;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    #[test]
    fn miss_scans_then_hits() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("a.journal"), "account Assets:Cash\n")?;

        let cache = WorkspaceCache::in_memory(EngineConfig::default());
        assert!(cache.entry(dir.path()).is_none());

        let first = cache.knowledge(dir.path());
        assert!(first.declared_accounts().contains("Assets:Cash"));
        let stored = cache.entry(dir.path()).ok_or(anyhow::anyhow!("entry not stored"))?;

        // a hit only checks the files it already knows
        fs::write(dir.path().join("b.journal"), "account Income\n")?;
        let second = cache.knowledge(dir.path());
        assert!(!second.declared_accounts().contains("Income"));
        let again = cache.entry(dir.path()).ok_or(anyhow::anyhow!("entry vanished"))?;
        assert!(Arc::ptr_eq(&stored, &again));
        Ok(())
    }

    #[test]
    fn changed_file_is_rescanned_on_hit() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let journal = dir.path().join("a.journal");
        fs::write(&journal, "account Assets:Cash\n")?;

        let cache = WorkspaceCache::in_memory(EngineConfig::default());
        cache.knowledge(dir.path());

        fs::write(&journal, "account Assets:Cash\naccount Assets:Savings\n")?;
        let file = fs::File::options().write(true).open(&journal)?;
        file.set_modified(SystemTime::now() + Duration::from_secs(5))?;

        let kb = cache.knowledge(dir.path());
        assert!(kb.declared_accounts().contains("Assets:Savings"));
        let entry = cache.entry(dir.path()).ok_or(anyhow::anyhow!("no entry"))?;
        assert!(!entry.is_stale());
        Ok(())
    }

    #[test]
    fn entries_carry_root_config() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join(CONFIG_FILE), "max_results = 1\nskip_dirs = [\"old\"]\n")?;
        fs::create_dir_all(dir.path().join("old"))?;
        fs::write(dir.path().join("old/a.journal"), "account Assets:Old\n")?;

        let cache = WorkspaceCache::in_memory(EngineConfig::default());
        let entry = cache.current(dir.path());
        assert_eq!(entry.config.max_results, 1);
        assert!(entry.files.is_empty());
        assert_eq!(cache.config().max_results, 100);
        Ok(())
    }

    #[test]
    fn invalidate_forces_rescan() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("a.journal"), "account Assets:Cash\n")?;

        let cache = WorkspaceCache::in_memory(EngineConfig::default());
        cache.knowledge(dir.path());
        fs::write(dir.path().join("b.journal"), "account Income\n")?;
        cache.invalidate(dir.path());

        assert!(cache.knowledge(dir.path()).declared_accounts().contains("Income"));
        Ok(())
    }

    #[test]
    fn memory_store_replaces_whole_entries() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = MemoryStore::default();
        let cache = WorkspaceCache::new(store, EngineConfig::default());
        cache.knowledge(dir.path());
        let before = cache.entry(dir.path()).ok_or(anyhow::anyhow!("no entry"))?;
        cache.refresh(dir.path());
        let after = cache.entry(dir.path()).ok_or(anyhow::anyhow!("no entry"))?;

        assert!(!Arc::ptr_eq(&before, &after));
        assert!(before.files.is_empty());
        assert!(!after.is_stale());

        let standalone = MemoryStore::default();
        standalone.set(dir.path(), after.clone());
        standalone.remove(dir.path());
        assert!(standalone.get(dir.path()).is_none());
        Ok(())
    }
}

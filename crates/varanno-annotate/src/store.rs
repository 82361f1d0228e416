//! Annotation persistence
//!
//! The batch job only needs two questions answered by storage: has this
//! variant already been annotated, and where does a new result go. Stores
//! that buffer writes make them durable on [`AnnotationStore::flush`].

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use varanno_common::{AnnotationResult, Result, VarannoError};

/// Persistent home for annotation results, keyed by variant.
#[async_trait]
pub trait AnnotationStore: Send + Sync {
    /// Whether a result for this variant is already stored.
    async fn is_annotated(&self, variant: &str) -> Result<bool>;

    /// Store (or replace) the result for this variant.
    async fn save(&self, variant: &str, result: &AnnotationResult) -> Result<()>;

    /// Write out anything saved but not yet durable.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, AnnotationResult>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, variant: &str) -> Option<AnnotationResult> {
        self.entries.read().await.get(variant).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl AnnotationStore for MemoryStore {
    async fn is_annotated(&self, variant: &str) -> Result<bool> {
        Ok(self.entries.read().await.contains_key(variant))
    }

    async fn save(&self, variant: &str, result: &AnnotationResult) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(variant.to_string(), result.clone());
        Ok(())
    }
}

/// Saves between two rewrites of a [`JsonFileStore`] document.
pub const DEFAULT_FLUSH_EVERY: usize = 100;

/// Store backed by a single JSON document mapping variant to result.
///
/// Saves are buffered and the document is rewritten once every
/// `flush_every` saves, and on [`AnnotationStore::flush`]. Each rewrite goes
/// through a temporary file and a rename, so a crash never leaves a
/// half-written store behind. Results saved since the last rewrite are lost
/// unless `flush` is called.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    flush_every: usize,
    state: Mutex<FileState>,
}

#[derive(Debug, Default)]
struct FileState {
    entries: BTreeMap<String, AnnotationResult>,
    /// Saves not yet written to disk
    unflushed: usize,
}

impl JsonFileStore {
    /// Open the store at `path`; a missing file starts an empty store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                VarannoError::store(format!("{} is not a valid store: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), entries = entries.len(), "Opened annotation store");

        Ok(Self {
            path,
            flush_every: DEFAULT_FLUSH_EVERY,
            state: Mutex::new(FileState {
                entries,
                unflushed: 0,
            }),
        })
    }

    /// Rewrite the document every `saves` saves. Zero is treated as one.
    pub fn with_flush_every(mut self, saves: usize) -> Self {
        self.flush_every = saves.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, variant: &str) -> Option<AnnotationResult> {
        self.state.lock().await.entries.get(variant).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    async fn persist(&self, entries: &BTreeMap<String, AnnotationResult>) -> Result<()> {
        let content = serde_json::to_string_pretty(entries)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl AnnotationStore for JsonFileStore {
    async fn is_annotated(&self, variant: &str) -> Result<bool> {
        Ok(self.state.lock().await.entries.contains_key(variant))
    }

    async fn save(&self, variant: &str, result: &AnnotationResult) -> Result<()> {
        let mut state = self.state.lock().await;
        let previous = state.entries.insert(variant.to_string(), result.clone());
        state.unflushed += 1;

        if state.unflushed < self.flush_every {
            return Ok(());
        }

        if let Err(e) = self.persist(&state.entries).await {
            // The failed item is dropped; earlier buffered saves wait for the next flush.
            match previous {
                Some(old) => state.entries.insert(variant.to_string(), old),
                None => state.entries.remove(variant),
            };
            state.unflushed -= 1;
            return Err(e);
        }

        state.unflushed = 0;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.unflushed == 0 {
            return Ok(());
        }

        self.persist(&state.entries).await?;
        debug!(path = %self.path.display(), saves = state.unflushed, "Flushed annotation store");
        state.unflushed = 0;
        Ok(())
    }
}

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use quest_domain::repository::{Document, Repository};

const EXTENSION: &str = "json";

/// One JSON file per document under `dir`, named `<id>.json`, mirrored in an
/// in-memory cache.
pub struct JsonRepository<T> {
    dir: PathBuf,
    documents: RwLock<BTreeMap<String, T>>,
}

impl<T> JsonRepository<T>
where
    T: Document + Serialize + DeserializeOwned,
{
    /// Creates `dir` if needed and loads every document in it.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("creating document directory `{}`", dir.display()))?;
        let dir = fs::canonicalize(dir)
            .with_context(|| format!("resolving `{}`", dir.display()))?;
        let repository = Self {
            dir,
            documents: RwLock::new(BTreeMap::new()),
        };
        repository.reload_all()?;
        Ok(repository)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Drops the cache and reads the directory again. Returns the number of
    /// documents loaded.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub fn reload_all(&self) -> Result<usize> {
        let mut loaded = BTreeMap::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file() || !is_document_file(path) {
                continue;
            }
            let document: T = read_document(path)?;
            loaded.insert(document.id().to_string(), document);
        }
        let count = loaded.len();
        *self.documents.write() = loaded;
        debug!(count, "documents loaded");
        Ok(count)
    }

    /// Brings one file's cache entry in line with the disk: re-reads it when
    /// it exists, forgets it when it was removed. Files that do not parse are
    /// logged and leave the cache untouched.
    pub fn reload_path(&self, path: &Path) -> Result<()> {
        if !self.owns(path) {
            return Ok(());
        }
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            return Ok(());
        };
        if !path.exists() {
            if self.documents.write().remove(stem).is_some() {
                debug!(id = stem, "document removed externally");
            }
            return Ok(());
        }
        match read_document::<T>(path) {
            Ok(document) => {
                if document.id() != stem {
                    warn!(file = %path.display(), id = document.id(), "file name and document id differ");
                }
                self.documents
                    .write()
                    .insert(document.id().to_string(), document);
                debug!(id = stem, "document reloaded");
            }
            Err(err) => warn!(file = %path.display(), error = %err, "skipping unreadable document"),
        }
        Ok(())
    }

    /// Whether `path` names a document file directly inside this repository.
    pub fn owns(&self, path: &Path) -> bool {
        path.parent() == Some(self.dir.as_path()) && is_document_file(path)
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        ensure!(
            !id.is_empty() && !id.starts_with('.') && !id.contains(['/', '\\']),
            "document id `{id}` cannot be used as a file name"
        );
        Ok(self.dir.join(format!("{id}.{EXTENSION}")))
    }

    fn write_file(&self, entity: &T) -> Result<()> {
        let path = self.path_for(entity.id())?;
        write_json(&path, entity)
    }
}

impl<T> Repository<T> for JsonRepository<T>
where
    T: Document + PartialEq + Serialize + DeserializeOwned,
{
    fn get(&self, id: &str) -> Result<Option<T>> {
        Ok(self.documents.read().get(id).cloned())
    }

    fn put(&self, entity: T) -> Result<()> {
        let mut documents = self.documents.write();
        self.write_file(&entity)?;
        documents.insert(entity.id().to_string(), entity);
        Ok(())
    }

    fn all(&self) -> Result<Vec<T>> {
        Ok(self.documents.read().values().cloned().collect())
    }

    /// Rewrites only the documents whose content differs from the cache.
    fn put_all(&self, entities: Vec<T>) -> Result<()> {
        let mut documents = self.documents.write();
        for entity in entities {
            if documents.get(entity.id()) == Some(&entity) {
                continue;
            }
            self.write_file(&entity)?;
            documents.insert(entity.id().to_string(), entity);
        }
        Ok(())
    }
}

fn is_document_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(EXTENSION))
        .unwrap_or(false)
}

pub(crate) fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading `{}`", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing `{}`", path.display()))
}

/// Writes through a sibling temp file and a rename so readers and the
/// watcher never see a half-written document.
pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut raw = serde_json::to_string_pretty(value)
        .with_context(|| format!("serializing `{}`", path.display()))?;
    raw.push('\n');
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, raw).with_context(|| format!("writing `{}`", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replacing `{}`", path.display()))?;
    Ok(())
}

use std::collections::BTreeMap;

use anyhow::Result;
use parking_lot::RwLock;

use crate::habit::Habit;
use crate::quest::Quest;

/// A JSON-shaped record keyed by `id`.
pub trait Document: Clone + Send + Sync {
    fn id(&self) -> &str;
}

impl Document for Habit {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Document for Quest {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Storage collaborator. Failures propagate to the caller unretried.
pub trait Repository<T: Document>: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<T>>;
    fn put(&self, entity: T) -> Result<()>;
    fn all(&self) -> Result<Vec<T>>;

    /// Writes a whole snapshot back.
    fn put_all(&self, entities: Vec<T>) -> Result<()> {
        for entity in entities {
            self.put(entity)?;
        }
        Ok(())
    }
}

/// Process-local repository, ordered by id.
#[derive(Debug)]
pub struct MemoryRepository<T> {
    documents: RwLock<BTreeMap<String, T>>,
}

impl<T> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self {
            documents: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<T: Document> MemoryRepository<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(entities: impl IntoIterator<Item = T>) -> Self {
        let documents = entities
            .into_iter()
            .map(|entity| (entity.id().to_string(), entity))
            .collect();
        Self {
            documents: RwLock::new(documents),
        }
    }
}

impl<T: Document> Repository<T> for MemoryRepository<T> {
    fn get(&self, id: &str) -> Result<Option<T>> {
        Ok(self.documents.read().get(id).cloned())
    }

    fn put(&self, entity: T) -> Result<()> {
        self.documents
            .write()
            .insert(entity.id().to_string(), entity);
        Ok(())
    }

    fn all(&self) -> Result<Vec<T>> {
        Ok(self.documents.read().values().cloned().collect())
    }
}

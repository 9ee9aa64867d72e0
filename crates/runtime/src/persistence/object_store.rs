//! Domain object storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use reify_core::{Bookmark, DomainObject, downcast_ref};

/// A stored object together with its version.
///
/// Versions start at 1 on insert and grow by one on every applied write.
#[derive(Debug)]
pub struct StoredObject {
    pub version: u64,
    pub object: Box<dyn DomainObject>,
}

/// One write of a unit of work: the new state, the bookmark it was loaded under and
/// the version it was loaded at.
///
/// The write lands under `bookmark` even if the object's own id has changed since.
#[derive(Debug)]
pub struct ObjectWrite {
    pub bookmark: Bookmark,
    pub expected_version: u64,
    pub object: Box<dyn DomainObject>,
}

/// Object store abstraction.
pub trait ObjectStore: Send + Sync {
    /// Load a copy of the object behind `bookmark`.
    fn fetch(&self, bookmark: &Bookmark) -> Result<Option<StoredObject>, StoreError>;

    /// Add a new object. Returns its initial version.
    fn insert(&self, object: Box<dyn DomainObject>) -> Result<u64, StoreError>;

    /// Apply all writes or none of them.
    ///
    /// Every write must carry the version currently stored for its object.
    fn apply(&self, writes: Vec<ObjectWrite>) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(Bookmark),
    #[error("object already exists: {0}")]
    AlreadyExists(Bookmark),
    #[error("concurrent modification of {bookmark}: expected version {expected}, found {found}")]
    Concurrency {
        bookmark: Bookmark,
        expected: u64,
        found: u64,
    },
    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory object store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<Bookmark, (u64, Box<dyn DomainObject>)>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Typed copy of a stored object.
    pub fn snapshot<T: DomainObject + Clone>(&self, bookmark: &Bookmark) -> Option<T> {
        let objects = self.objects.read().unwrap();
        objects
            .get(bookmark)
            .and_then(|(_, object)| downcast_ref::<T>(object.as_ref()))
            .cloned()
    }

    pub fn version(&self, bookmark: &Bookmark) -> Option<u64> {
        self.objects.read().unwrap().get(bookmark).map(|(v, _)| *v)
    }

    pub fn remove(&self, bookmark: &Bookmark) -> bool {
        self.objects.write().unwrap().remove(bookmark).is_some()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn fetch(&self, bookmark: &Bookmark) -> Result<Option<StoredObject>, StoreError> {
        let objects = self.objects.read().unwrap();
        Ok(objects.get(bookmark).map(|(version, object)| StoredObject {
            version: *version,
            object: object.clone_object(),
        }))
    }

    fn insert(&self, object: Box<dyn DomainObject>) -> Result<u64, StoreError> {
        let bookmark = object.bookmark();
        let mut objects = self.objects.write().unwrap();
        if objects.contains_key(&bookmark) {
            return Err(StoreError::AlreadyExists(bookmark));
        }
        objects.insert(bookmark, (1, object));
        Ok(1)
    }

    fn apply(&self, writes: Vec<ObjectWrite>) -> Result<(), StoreError> {
        let mut objects = self.objects.write().unwrap();

        // Check everything before touching anything.
        for write in &writes {
            let found = objects
                .get(&write.bookmark)
                .map(|(v, _)| *v)
                .ok_or_else(|| StoreError::NotFound(write.bookmark.clone()))?;
            if found != write.expected_version {
                return Err(StoreError::Concurrency {
                    bookmark: write.bookmark.clone(),
                    expected: write.expected_version,
                    found,
                });
            }
        }

        for write in writes {
            let next = write.expected_version + 1;
            objects.insert(write.bookmark, (next, write.object));
        }
        Ok(())
    }
}

impl<S> ObjectStore for Arc<S>
where
    S: ObjectStore + ?Sized,
{
    fn fetch(&self, bookmark: &Bookmark) -> Result<Option<StoredObject>, StoreError> {
        (**self).fetch(bookmark)
    }

    fn insert(&self, object: Box<dyn DomainObject>) -> Result<u64, StoreError> {
        (**self).insert(object)
    }

    fn apply(&self, writes: Vec<ObjectWrite>) -> Result<(), StoreError> {
        (**self).apply(writes)
    }
}

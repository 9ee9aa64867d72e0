//! Unit of work over an [`ObjectStore`].
//!
//! A transaction copies every object it touches into a private working set. Handlers
//! mutate those copies; nothing reaches the store until [`Transaction::commit`], which
//! writes all dirty copies in one version-checked `apply`.
//!
//! ```text
//! Active ──commit──> Committed
//!   │
//!   └──rollback / failed commit──> Aborted
//! ```

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use tracing::debug;

use reify_core::{Bookmark, DomainObject, InteractionId};

use crate::persistence::{ObjectStore, ObjectWrite, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransactionError {
    #[error("transaction {id} is {state:?}, not active")]
    NotActive {
        id: InteractionId,
        state: TransactionState,
    },
    #[error("no object for {0}")]
    UnknownObject(Bookmark),
    /// Optimistic concurrency failure at commit.
    #[error("commit conflict: {0}")]
    Conflict(String),
    #[error("store failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for TransactionError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency { .. } => TransactionError::Conflict(value.to_string()),
            StoreError::NotFound(bookmark) => TransactionError::UnknownObject(bookmark),
            other => TransactionError::Store(other),
        }
    }
}

#[derive(Debug)]
struct Loaded {
    version: u64,
    object: Box<dyn DomainObject>,
    dirty: bool,
}

pub struct Transaction<'s> {
    id: InteractionId,
    store: &'s dyn ObjectStore,
    state: TransactionState,
    working_set: BTreeMap<Bookmark, Loaded>,
}

impl<'s> Transaction<'s> {
    pub fn begin(id: InteractionId, store: &'s dyn ObjectStore) -> Self {
        debug!(transaction = %id, "transaction started");
        Self {
            id,
            store,
            state: TransactionState::Active,
            working_set: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> InteractionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Read access to an object, loading it into the working set on first use.
    pub fn get(&mut self, bookmark: &Bookmark) -> Result<&dyn DomainObject, TransactionError> {
        let loaded = self.load(bookmark)?;
        Ok(loaded.object.as_ref())
    }

    /// Write access to an object. The object is written back on commit.
    pub fn get_mut(
        &mut self,
        bookmark: &Bookmark,
    ) -> Result<&mut dyn DomainObject, TransactionError> {
        let loaded = self.load(bookmark)?;
        loaded.dirty = true;
        Ok(loaded.object.as_mut())
    }

    /// Frozen copy of the current working state, for use as a read-only argument.
    pub fn snapshot(
        &mut self,
        bookmark: &Bookmark,
    ) -> Result<Arc<dyn DomainObject>, TransactionError> {
        let loaded = self.load(bookmark)?;
        Ok(Arc::from(loaded.object.clone_object()))
    }

    pub fn dirty_count(&self) -> usize {
        self.working_set.values().filter(|l| l.dirty).count()
    }

    /// Write every dirty object back. Returns the number of objects written.
    pub fn commit(&mut self) -> Result<usize, TransactionError> {
        self.ensure_active()?;

        let writes: Vec<ObjectWrite> = std::mem::take(&mut self.working_set)
            .into_iter()
            .filter(|(_, l)| l.dirty)
            .map(|(bookmark, l)| ObjectWrite {
                bookmark,
                expected_version: l.version,
                object: l.object,
            })
            .collect();
        let written = writes.len();

        if written > 0 {
            if let Err(e) = self.store.apply(writes) {
                self.state = TransactionState::Aborted;
                debug!(transaction = %self.id, error = %e, "commit failed");
                return Err(e.into());
            }
        }

        self.state = TransactionState::Committed;
        debug!(transaction = %self.id, written, "transaction committed");
        Ok(written)
    }

    /// Discard the working set.
    pub fn rollback(&mut self) -> Result<(), TransactionError> {
        self.ensure_active()?;
        let discarded = self.dirty_count();
        self.working_set.clear();
        self.state = TransactionState::Aborted;
        debug!(transaction = %self.id, discarded, "transaction rolled back");
        Ok(())
    }

    fn load(&mut self, bookmark: &Bookmark) -> Result<&mut Loaded, TransactionError> {
        self.ensure_active()?;
        match self.working_set.entry(bookmark.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let stored = self
                    .store
                    .fetch(bookmark)?
                    .ok_or_else(|| TransactionError::UnknownObject(bookmark.clone()))?;
                Ok(entry.insert(Loaded {
                    version: stored.version,
                    object: stored.object,
                    dirty: false,
                }))
            }
        }
    }

    fn ensure_active(&self) -> Result<(), TransactionError> {
        if self.state.is_active() {
            Ok(())
        } else {
            Err(TransactionError::NotActive {
                id: self.id,
                state: self.state,
            })
        }
    }
}

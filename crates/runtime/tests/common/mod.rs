#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use reify_commands::{Command, CommandDto, Interaction};
use reify_core::{Bookmark, Clock, DomainObject, FixedClock, InteractionId, UserMemento};
use reify_metamodel::Metamodel;
use reify_runtime::{
    BackgroundCommandScheduler, BackgroundService, CommandExecutor, CommandRepository, CommandStats,
    InMemoryCommandRepository, InMemoryObjectStore, ObjectStore, ObjectWrite, RepositoryCommandSource,
    RepositoryError, StoreError, StoredObject,
};

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 16, 10, 0, 0).unwrap()
}

/// Demo domain, in-memory stores and a clock that only moves when told to.
pub struct Fixture {
    pub metamodel: Arc<Metamodel>,
    pub store: Arc<InMemoryObjectStore>,
    pub repo: Arc<InMemoryCommandRepository>,
    pub clock: Arc<FixedClock>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            metamodel: Arc::new(reify_demo::metamodel().unwrap()),
            store: InMemoryObjectStore::arc(),
            repo: InMemoryCommandRepository::arc(),
            clock: Arc::new(FixedClock::new(epoch())),
        }
    }

    pub fn seed<T: DomainObject + Clone>(&self, object: T) -> T {
        self.store.insert(Box::new(object.clone())).unwrap();
        object
    }

    pub fn current<T: DomainObject + Clone>(&self, bookmark: &Bookmark) -> T {
        self.store.snapshot(bookmark).unwrap()
    }

    pub fn background(&self) -> BackgroundService {
        BackgroundService::new(self.metamodel.clone(), self.repo.clone())
            .with_clock(self.clock.clone())
    }

    pub fn executor(&self) -> CommandExecutor {
        self.executor_over(self.store.clone(), self.repo.clone())
    }

    pub fn executor_over(
        &self,
        store: Arc<dyn ObjectStore>,
        repo: Arc<dyn CommandRepository>,
    ) -> CommandExecutor {
        CommandExecutor::new(self.metamodel.clone(), store, repo).with_clock(self.clock.clone())
    }

    pub fn source(&self) -> RepositoryCommandSource {
        RepositoryCommandSource::new(self.repo.clone(), self.executor())
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn interaction(&self, user: &str) -> Interaction {
        Interaction::open(InteractionId::new(), UserMemento::new(user), self.clock.now())
    }

    pub fn command(&self, id: InteractionId) -> Command {
        self.repo.find(id).unwrap().unwrap()
    }
}

/// Object store whose writes fail while `failing` is set.
pub struct FailingCommitStore {
    pub inner: Arc<InMemoryObjectStore>,
    pub failing: AtomicBool,
}

impl FailingCommitStore {
    pub fn new(inner: Arc<InMemoryObjectStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failing: AtomicBool::new(true),
        })
    }
}

impl ObjectStore for FailingCommitStore {
    fn fetch(&self, bookmark: &Bookmark) -> Result<Option<StoredObject>, StoreError> {
        self.inner.fetch(bookmark)
    }

    fn insert(&self, object: Box<dyn DomainObject>) -> Result<u64, StoreError> {
        self.inner.insert(object)
    }

    fn apply(&self, writes: Vec<ObjectWrite>) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Storage("disk full".to_string()));
        }
        self.inner.apply(writes)
    }
}

/// Command repository whose first `failures` persists fail.
pub struct FlakyRepository {
    pub inner: Arc<InMemoryCommandRepository>,
    pub failures: AtomicUsize,
}

impl FlakyRepository {
    pub fn new(inner: Arc<InMemoryCommandRepository>, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failures: AtomicUsize::new(failures),
        })
    }
}

impl CommandRepository for FlakyRepository {
    fn persist(&self, command: &Command) -> Result<(), RepositoryError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RepositoryError::Storage("connection reset".to_string()));
        }
        self.inner.persist(command)
    }

    fn find(&self, id: InteractionId) -> Result<Option<Command>, RepositoryError> {
        self.inner.find(id)
    }

    fn find_by_parent(&self, parent: InteractionId) -> Result<Vec<Command>, RepositoryError> {
        self.inner.find_by_parent(parent)
    }

    fn find_background_not_yet_started(
        &self,
        limit: usize,
    ) -> Result<Vec<Command>, RepositoryError> {
        self.inner.find_background_not_yet_started(limit)
    }

    fn stats(&self) -> Result<CommandStats, RepositoryError> {
        self.inner.stats()
    }
}

impl BackgroundCommandScheduler for FlakyRepository {
    fn schedule(
        &self,
        dto: CommandDto,
        parent: InteractionId,
        sequence: u32,
    ) -> Result<InteractionId, RepositoryError> {
        self.inner.schedule(dto, parent, sequence)
    }
}

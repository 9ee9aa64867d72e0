//! Storage seams: domain objects and commands.
//!
//! Both stores are external collaborators of the pipeline. The in-memory versions are
//! complete enough for tests and the demo worker.

pub mod command_repository;
pub mod object_store;

pub use command_repository::{
    BackgroundCommandScheduler, CommandRepository, CommandStats, InMemoryCommandRepository,
    RepositoryError,
};
pub use object_store::{InMemoryObjectStore, ObjectStore, ObjectWrite, StoreError, StoredObject};

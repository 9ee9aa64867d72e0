//! `reify-runtime`: capture, storage and replay of commands.
//!
//! - [`background`]: proxies that turn action calls into pending background commands
//! - [`executor`]: replays a command's descriptor inside its own unit of work
//! - [`scanner`] / [`worker`]: find due commands and drive the executor over them
//! - [`persistence`]: object and command storage seams, with in-memory implementations
//!
//! Everything here is synchronous; "background" means later, not concurrently.

pub mod background;
pub mod config;
pub mod executor;
pub mod interaction_service;
pub mod persistence;
pub mod scanner;
pub mod transaction;
pub mod worker;

pub use background::{BACKGROUND_COUNTER, BackgroundProxy, BackgroundService, InterceptError, Intercepted};
pub use config::{ConfigError, WorkerConfig};
pub use executor::{CommandExecutor, ExecutionError, failure_text};
pub use interaction_service::{InteractionError, InteractionService};
pub use persistence::{
    BackgroundCommandScheduler, CommandRepository, CommandStats, InMemoryCommandRepository,
    InMemoryObjectStore, ObjectStore, ObjectWrite, RepositoryError, StoreError, StoredObject,
};
pub use scanner::{BackgroundCommandExecution, RepositoryCommandSource, ScanReport};
pub use transaction::{Transaction, TransactionError, TransactionState};
pub use worker::{BackgroundWorker, BackgroundWorkerHandle, WorkerStats};

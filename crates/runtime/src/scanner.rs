//! Drives the executor over whatever commands are due.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use reify_commands::{Command, CommandOutcome};

use crate::executor::CommandExecutor;
use crate::persistence::{CommandRepository, RepositoryError};

/// Tally of one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub executed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Executes due commands one at a time, in the order the source returns them.
///
/// Each command gets its own unit of work; a failing command is recorded on that command
/// and the scan moves on.
pub trait BackgroundCommandExecution {
    fn executor(&self) -> &CommandExecutor;

    /// Commands eligible for execution right now, in execution order.
    fn find_commands_to_execute(&self) -> Result<Vec<Command>, RepositoryError>;

    fn execute_all(&self) -> Result<ScanReport, RepositoryError> {
        let commands = self.find_commands_to_execute()?;
        let mut report = ScanReport::default();

        for mut command in commands {
            let outcome = self.executor().execute(&mut command);
            report.executed += 1;
            match outcome {
                CommandOutcome::Success(_) => report.succeeded += 1,
                CommandOutcome::Failure(_) => report.failed += 1,
            }
            debug!(
                interaction_id = %command.interaction_id(),
                state = ?command.state(),
                "command processed"
            );
        }

        if report.executed > 0 {
            info!(
                executed = report.executed,
                succeeded = report.succeeded,
                failed = report.failed,
                "background scan finished"
            );
        }
        Ok(report)
    }
}

/// Sources due commands from a [`CommandRepository`]: background commands not yet
/// started, oldest first.
pub struct RepositoryCommandSource {
    repository: Arc<dyn CommandRepository>,
    executor: CommandExecutor,
    batch_size: usize,
}

impl RepositoryCommandSource {
    pub const DEFAULT_BATCH_SIZE: usize = 50;

    pub fn new(repository: Arc<dyn CommandRepository>, executor: CommandExecutor) -> Self {
        Self {
            repository,
            executor,
            batch_size: Self::DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl BackgroundCommandExecution for RepositoryCommandSource {
    fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    fn find_commands_to_execute(&self) -> Result<Vec<Command>, RepositoryError> {
        self.repository
            .find_background_not_yet_started(self.batch_size)
    }
}

#[cfg(test)]
mod tests {
    use reify_commands::{CommandDto, ExecutorKind};
    use reify_core::{Bookmark, InteractionId};
    use reify_demo::Invoice;
    use reify_metamodel::{CommandPersistence, MemberId};

    use super::*;
    use crate::persistence::{BackgroundCommandScheduler, InMemoryCommandRepository, InMemoryObjectStore, ObjectStore};

    fn source(
        repo: Arc<InMemoryCommandRepository>,
        store: Arc<InMemoryObjectStore>,
    ) -> RepositoryCommandSource {
        let metamodel = Arc::new(reify_demo::metamodel().unwrap());
        let executor = CommandExecutor::new(metamodel, store, repo.clone());
        RepositoryCommandSource::new(repo, executor)
    }

    fn approve(number: &str) -> CommandDto {
        CommandDto::action_invocation(
            InteractionId::new(),
            "alice",
            chrono::Utc::now(),
            vec![Bookmark::new("Invoice", number)],
            MemberId::new("Invoice", "approve"),
            vec![],
        )
    }

    #[test]
    fn empty_source_reports_nothing() {
        let source = source(InMemoryCommandRepository::arc(), InMemoryObjectStore::arc());
        assert_eq!(source.execute_all().unwrap(), ScanReport::default());
    }

    #[test]
    fn batch_size_caps_one_scan() {
        let repo = InMemoryCommandRepository::arc();
        let store = InMemoryObjectStore::arc();
        let parent = InteractionId::new();
        for (sequence, number) in ["INV-1", "INV-2", "INV-3"].into_iter().enumerate() {
            store.insert(Box::new(Invoice::new(number, 10.0))).unwrap();
            repo.schedule(approve(number), parent, sequence as u32).unwrap();
        }

        let source = source(repo.clone(), store).with_batch_size(2);
        assert_eq!(source.execute_all().unwrap().executed, 2);
        assert_eq!(source.execute_all().unwrap().executed, 1);
        assert_eq!(source.execute_all().unwrap().executed, 0);
        assert_eq!(repo.stats().unwrap().succeeded, 3);
    }

    #[test]
    fn foreground_commands_are_never_picked_up() {
        let repo = InMemoryCommandRepository::arc();
        let command = Command::from_dto(
            approve("INV-1"),
            ExecutorKind::Foreground,
            CommandPersistence::Persisted,
        );
        repo.persist(&command).unwrap();

        let source = source(repo, InMemoryObjectStore::arc());
        assert!(source.find_commands_to_execute().unwrap().is_empty());
    }
}

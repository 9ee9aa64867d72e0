//! Command storage and background scheduling.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use reify_commands::{Command, CommandDto, CommandState, ExecutorKind};
use reify_core::InteractionId;
use reify_metamodel::CommandPersistence;

/// Command repository abstraction.
pub trait CommandRepository: Send + Sync {
    /// Insert or replace a command. A completed command can only be rewritten unchanged.
    fn persist(&self, command: &Command) -> Result<(), RepositoryError>;

    fn find(&self, id: InteractionId) -> Result<Option<Command>, RepositoryError>;

    /// Background commands scheduled by `parent`, in sequence order.
    fn find_by_parent(&self, parent: InteractionId) -> Result<Vec<Command>, RepositoryError>;

    /// Background commands not yet started, oldest first (timestamp, then sequence).
    fn find_background_not_yet_started(&self, limit: usize)
    -> Result<Vec<Command>, RepositoryError>;

    fn stats(&self) -> Result<CommandStats, RepositoryError>;
}

/// Receives descriptors captured by the interception proxy.
pub trait BackgroundCommandScheduler: Send + Sync {
    /// Record `dto` as a pending background command spawned by `parent`.
    fn schedule(
        &self,
        dto: CommandDto,
        parent: InteractionId,
        sequence: u32,
    ) -> Result<InteractionId, RepositoryError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RepositoryError {
    #[error("command {0} is completed and cannot be modified")]
    Immutable(InteractionId),
    #[error("command already exists: {0}")]
    AlreadyExists(InteractionId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Command statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CommandStats {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// In-memory command repository for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryCommandRepository {
    commands: RwLock<HashMap<InteractionId, Command>>,
}

impl InMemoryCommandRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn len(&self) -> usize {
        self.commands.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<Command> {
        let mut all: Vec<_> = self.commands.read().unwrap().values().cloned().collect();
        all.sort_by_key(|c| (c.timestamp(), c.interaction_id()));
        all
    }
}

impl CommandRepository for InMemoryCommandRepository {
    fn persist(&self, command: &Command) -> Result<(), RepositoryError> {
        let mut commands = self.commands.write().unwrap();
        let id = command.interaction_id();
        if let Some(existing) = commands.get(&id) {
            if existing.is_completed() && existing != command {
                return Err(RepositoryError::Immutable(id));
            }
        }
        commands.insert(id, command.clone());
        Ok(())
    }

    fn find(&self, id: InteractionId) -> Result<Option<Command>, RepositoryError> {
        Ok(self.commands.read().unwrap().get(&id).cloned())
    }

    fn find_by_parent(&self, parent: InteractionId) -> Result<Vec<Command>, RepositoryError> {
        let commands = self.commands.read().unwrap();
        let mut children: Vec<_> = commands
            .values()
            .filter(|c| c.parent() == Some(parent))
            .cloned()
            .collect();
        children.sort_by_key(|c| c.sequence());
        Ok(children)
    }

    fn find_background_not_yet_started(
        &self,
        limit: usize,
    ) -> Result<Vec<Command>, RepositoryError> {
        let commands = self.commands.read().unwrap();
        let mut due: Vec<_> = commands
            .values()
            .filter(|c| c.executor() == ExecutorKind::Background && c.started_at().is_none())
            .cloned()
            .collect();

        due.sort_by_key(|c| (c.timestamp(), c.sequence(), c.interaction_id()));
        due.truncate(limit);
        Ok(due)
    }

    fn stats(&self) -> Result<CommandStats, RepositoryError> {
        let commands = self.commands.read().unwrap();
        let mut stats = CommandStats::default();
        for command in commands.values() {
            match command.state() {
                CommandState::Pending => stats.pending += 1,
                CommandState::Running => stats.running += 1,
                CommandState::Completed if command.exception().is_some() => stats.failed += 1,
                CommandState::Completed => stats.succeeded += 1,
            }
        }
        Ok(stats)
    }
}

impl BackgroundCommandScheduler for InMemoryCommandRepository {
    fn schedule(
        &self,
        dto: CommandDto,
        parent: InteractionId,
        sequence: u32,
    ) -> Result<InteractionId, RepositoryError> {
        let command = Command::from_dto(dto, ExecutorKind::Background, CommandPersistence::Persisted)
            .with_parent(parent, sequence);
        let id = command.interaction_id();

        let mut commands = self.commands.write().unwrap();
        if commands.contains_key(&id) {
            return Err(RepositoryError::AlreadyExists(id));
        }
        debug!(
            interaction_id = %id,
            parent = %parent,
            sequence,
            member = %command.member_identifier().map(ToString::to_string).unwrap_or_default(),
            "background command scheduled"
        );
        commands.insert(id, command);
        Ok(id)
    }
}

impl<R> CommandRepository for Arc<R>
where
    R: CommandRepository + ?Sized,
{
    fn persist(&self, command: &Command) -> Result<(), RepositoryError> {
        (**self).persist(command)
    }

    fn find(&self, id: InteractionId) -> Result<Option<Command>, RepositoryError> {
        (**self).find(id)
    }

    fn find_by_parent(&self, parent: InteractionId) -> Result<Vec<Command>, RepositoryError> {
        (**self).find_by_parent(parent)
    }

    fn find_background_not_yet_started(
        &self,
        limit: usize,
    ) -> Result<Vec<Command>, RepositoryError> {
        (**self).find_background_not_yet_started(limit)
    }

    fn stats(&self) -> Result<CommandStats, RepositoryError> {
        (**self).stats()
    }
}

impl<S> BackgroundCommandScheduler for Arc<S>
where
    S: BackgroundCommandScheduler + ?Sized,
{
    fn schedule(
        &self,
        dto: CommandDto,
        parent: InteractionId,
        sequence: u32,
    ) -> Result<InteractionId, RepositoryError> {
        (**self).schedule(dto, parent, sequence)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use reify_core::Bookmark;
    use reify_metamodel::MemberId;

    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 14, 30, 0).unwrap()
    }

    fn dto_at(at: DateTime<Utc>) -> CommandDto {
        CommandDto::action_invocation(
            InteractionId::new(),
            "alice",
            at,
            vec![Bookmark::new("Invoice", "INV-1")],
            MemberId::new("Invoice", "approve"),
            vec![],
        )
    }

    #[test]
    fn scheduled_commands_are_pending_background_children() {
        let repo = InMemoryCommandRepository::new();
        let parent = InteractionId::new();

        let id = repo.schedule(dto_at(test_time()), parent, 0).unwrap();
        let stored = repo.find(id).unwrap().unwrap();

        assert_eq!(stored.executor(), ExecutorKind::Background);
        assert_eq!(stored.parent(), Some(parent));
        assert_eq!(stored.sequence(), Some(0));
        assert_eq!(stored.state(), CommandState::Pending);
        assert!(stored.should_persist());
    }

    #[test]
    fn due_commands_are_ordered_by_timestamp_then_sequence() {
        let repo = InMemoryCommandRepository::new();
        let parent = InteractionId::new();

        let later = repo
            .schedule(dto_at(test_time() + Duration::seconds(1)), parent, 0)
            .unwrap();
        let second = repo.schedule(dto_at(test_time()), parent, 2).unwrap();
        let first = repo.schedule(dto_at(test_time()), parent, 1).unwrap();

        let due: Vec<_> = repo
            .find_background_not_yet_started(10)
            .unwrap()
            .iter()
            .map(Command::interaction_id)
            .collect();
        assert_eq!(due, vec![first, second, later]);

        assert_eq!(repo.find_background_not_yet_started(1).unwrap().len(), 1);
    }

    #[test]
    fn started_commands_are_no_longer_due() {
        let repo = InMemoryCommandRepository::new();
        let id = repo.schedule(dto_at(test_time()), InteractionId::new(), 0).unwrap();

        let mut command = repo.find(id).unwrap().unwrap();
        command.start(test_time()).unwrap();
        repo.persist(&command).unwrap();

        assert!(repo.find_background_not_yet_started(10).unwrap().is_empty());
        assert_eq!(repo.stats().unwrap().running, 1);
    }

    #[test]
    fn completed_commands_cannot_be_rewritten() {
        let repo = InMemoryCommandRepository::new();
        let id = repo.schedule(dto_at(test_time()), InteractionId::new(), 0).unwrap();

        let stale = repo.find(id).unwrap().unwrap();
        let mut command = stale.clone();
        command.complete_with_exception(test_time(), "boom").unwrap();
        repo.persist(&command).unwrap();
        // Idempotent re-persist is fine.
        repo.persist(&command).unwrap();

        assert!(matches!(
            repo.persist(&stale),
            Err(RepositoryError::Immutable(found)) if found == id
        ));
        assert_eq!(repo.find(id).unwrap().unwrap(), command);
        assert_eq!(repo.stats().unwrap().failed, 1);
    }

    #[test]
    fn children_come_back_in_sequence_order() {
        let repo = InMemoryCommandRepository::new();
        let parent = InteractionId::new();
        let other = InteractionId::new();

        let b = repo.schedule(dto_at(test_time()), parent, 1).unwrap();
        let a = repo.schedule(dto_at(test_time()), parent, 0).unwrap();
        repo.schedule(dto_at(test_time()), other, 0).unwrap();

        let children: Vec<_> = repo
            .find_by_parent(parent)
            .unwrap()
            .iter()
            .map(Command::interaction_id)
            .collect();
        assert_eq!(children, vec![a, b]);
    }
}

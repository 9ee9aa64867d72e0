//! The `Command` aggregate and its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reify_core::{Bookmark, InteractionId};
use reify_metamodel::{CommandPersistence, MemberId};

use crate::dto::CommandDto;
use crate::error::CommandStateError;

/// Who drives execution of a command.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutorKind {
    /// Executed synchronously with the interaction that created it.
    Foreground,
    /// Captured now, executed later by the background scanner.
    Background,
}

/// How an execution ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    /// Completed; carries a reference to the returned object unless the member is void.
    Success(Option<Bookmark>),
    /// Failed; carries the full diagnostic text.
    Failure(String),
}

/// Derived lifecycle state.
///
/// ```text
/// Pending ──start──> Running ──complete──> Completed(result | exception)
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CommandState {
    Pending,
    Running,
    Completed,
}

/// One logical business interaction: what was asked, by whom, and how it ended.
///
/// Only the lifecycle methods mutate a command, and none of them succeed once
/// `completed_at` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    interaction_id: InteractionId,
    username: String,
    timestamp: DateTime<Utc>,

    member_identifier: Option<MemberId>,
    target: Option<Bookmark>,
    dto: Option<CommandDto>,

    executor: ExecutorKind,
    persistence: CommandPersistence,
    persist_hint: bool,

    /// Interaction that scheduled this command (background commands only).
    parent: Option<InteractionId>,
    /// Ordinal among the background commands scheduled by `parent`.
    sequence: Option<u32>,

    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    outcome: Option<CommandOutcome>,
}

impl Command {
    /// The (not yet populated) command owned by a freshly opened interaction.
    ///
    /// It is kept only if something hints that it matters, typically because it spawned
    /// background work that points back at it.
    pub fn for_interaction(
        interaction_id: InteractionId,
        username: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            interaction_id,
            username: username.into(),
            timestamp,
            member_identifier: None,
            target: None,
            dto: None,
            executor: ExecutorKind::Foreground,
            persistence: CommandPersistence::IfHinted,
            persist_hint: false,
            parent: None,
            sequence: None,
            started_at: None,
            completed_at: None,
            outcome: None,
        }
    }

    /// A command reconstituted from a captured descriptor.
    pub fn from_dto(dto: CommandDto, executor: ExecutorKind, persistence: CommandPersistence) -> Self {
        let mut command = Self::for_interaction(dto.interaction_id, dto.user.clone(), dto.timestamp);
        command.executor = executor;
        command.persistence = persistence;
        command.member_identifier = Some(dto.member_identifier().clone());
        command.target = dto.targets.first().cloned();
        command.dto = Some(dto);
        command
    }

    /// Record that this command was scheduled by `parent` as its `sequence`-th background task.
    pub fn with_parent(mut self, parent: InteractionId, sequence: u32) -> Self {
        self.parent = Some(parent);
        self.sequence = Some(sequence);
        self
    }

    pub fn interaction_id(&self) -> InteractionId {
        self.interaction_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn member_identifier(&self) -> Option<&MemberId> {
        self.member_identifier.as_ref()
    }

    /// First target of the descriptor.
    pub fn target(&self) -> Option<&Bookmark> {
        self.target.as_ref()
    }

    pub fn dto(&self) -> Option<&CommandDto> {
        self.dto.as_ref()
    }

    pub fn executor(&self) -> ExecutorKind {
        self.executor
    }

    pub fn persistence(&self) -> CommandPersistence {
        self.persistence
    }

    pub fn parent(&self) -> Option<InteractionId> {
        self.parent
    }

    pub fn sequence(&self) -> Option<u32> {
        self.sequence
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn outcome(&self) -> Option<&CommandOutcome> {
        self.outcome.as_ref()
    }

    pub fn result(&self) -> Option<&Bookmark> {
        match &self.outcome {
            Some(CommandOutcome::Success(result)) => result.as_ref(),
            _ => None,
        }
    }

    pub fn exception(&self) -> Option<&str> {
        match &self.outcome {
            Some(CommandOutcome::Failure(text)) => Some(text),
            _ => None,
        }
    }

    pub fn state(&self) -> CommandState {
        match (self.started_at, self.completed_at) {
            (_, Some(_)) => CommandState::Completed,
            (Some(_), None) => CommandState::Running,
            (None, None) => CommandState::Pending,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Whether the queue should keep this command once it completes.
    ///
    /// Background commands are always kept, since the scanner finds pending work in storage.
    pub fn should_persist(&self) -> bool {
        if self.executor == ExecutorKind::Background {
            return true;
        }
        match self.persistence {
            CommandPersistence::Persisted => true,
            CommandPersistence::IfHinted => self.persist_hint,
            CommandPersistence::NotPersisted => false,
        }
    }

    pub fn persist_hint(&self) -> bool {
        self.persist_hint
    }

    /// Hint that this command is worth keeping (honoured by `IfHinted`).
    pub fn hint_persist(&mut self) {
        self.persist_hint = true;
    }

    /// Attach the descriptor of the member being invoked in the owning interaction.
    pub fn set_dto(
        &mut self,
        dto: CommandDto,
        persistence: CommandPersistence,
    ) -> Result<(), CommandStateError> {
        self.ensure_not_completed()?;
        self.member_identifier = Some(dto.member_identifier().clone());
        self.target = dto.targets.first().cloned();
        self.persistence = persistence;
        self.dto = Some(dto);
        Ok(())
    }

    /// Enter `Running`. A second call keeps the first `started_at`.
    pub fn start(&mut self, at: DateTime<Utc>) -> Result<(), CommandStateError> {
        self.ensure_not_completed()?;
        if self.started_at.is_none() {
            self.started_at = Some(at);
        }
        Ok(())
    }

    /// Enter `Completed` with the given outcome.
    pub fn complete(
        &mut self,
        at: DateTime<Utc>,
        outcome: CommandOutcome,
    ) -> Result<(), CommandStateError> {
        self.ensure_not_completed()?;
        if self.started_at.is_none() {
            self.started_at = Some(at);
        }
        self.completed_at = Some(at);
        self.outcome = Some(outcome);
        Ok(())
    }

    pub fn complete_with_result(
        &mut self,
        at: DateTime<Utc>,
        result: Option<Bookmark>,
    ) -> Result<(), CommandStateError> {
        self.complete(at, CommandOutcome::Success(result))
    }

    pub fn complete_with_exception(
        &mut self,
        at: DateTime<Utc>,
        exception: impl Into<String>,
    ) -> Result<(), CommandStateError> {
        self.complete(at, CommandOutcome::Failure(exception.into()))
    }

    fn ensure_not_completed(&self) -> Result<(), CommandStateError> {
        if self.is_completed() {
            Err(CommandStateError::AlreadyCompleted(self.interaction_id))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 14, 30, 0).unwrap()
    }

    fn approve_dto() -> CommandDto {
        CommandDto::action_invocation(
            InteractionId::new(),
            "alice",
            test_time(),
            vec![Bookmark::new("Invoice", "INV-1")],
            MemberId::new("Invoice", "approve"),
            vec![],
        )
    }

    #[test]
    fn from_dto_copies_identity_and_target() {
        let dto = approve_dto();
        let command = Command::from_dto(
            dto.clone(),
            ExecutorKind::Background,
            CommandPersistence::Persisted,
        );

        assert_eq!(command.interaction_id(), dto.interaction_id);
        assert_eq!(command.username(), "alice");
        assert_eq!(command.target(), Some(&Bookmark::new("Invoice", "INV-1")));
        assert_eq!(command.member_identifier().unwrap().to_string(), "Invoice#approve");
        assert_eq!(command.state(), CommandState::Pending);
    }

    #[test]
    fn lifecycle_runs_pending_running_completed() {
        let mut command =
            Command::from_dto(approve_dto(), ExecutorKind::Background, CommandPersistence::Persisted);

        command.start(test_time()).unwrap();
        assert_eq!(command.state(), CommandState::Running);

        // Inherited start time is kept.
        command.start(test_time() + Duration::seconds(5)).unwrap();
        assert_eq!(command.started_at(), Some(test_time()));

        let done = test_time() + Duration::seconds(10);
        command
            .complete_with_result(done, Some(Bookmark::new("Invoice", "INV-1")))
            .unwrap();
        assert_eq!(command.state(), CommandState::Completed);
        assert_eq!(command.completed_at(), Some(done));
        assert_eq!(command.result(), Some(&Bookmark::new("Invoice", "INV-1")));
        assert_eq!(command.exception(), None);
    }

    #[test]
    fn completed_commands_are_immutable() {
        let mut command =
            Command::from_dto(approve_dto(), ExecutorKind::Background, CommandPersistence::Persisted);
        command.complete_with_exception(test_time(), "boom").unwrap();

        let id = command.interaction_id();
        assert_eq!(
            command.complete_with_result(test_time(), None),
            Err(CommandStateError::AlreadyCompleted(id))
        );
        assert_eq!(command.start(test_time()), Err(CommandStateError::AlreadyCompleted(id)));
        assert_eq!(
            command.set_dto(approve_dto(), CommandPersistence::Persisted),
            Err(CommandStateError::AlreadyCompleted(id))
        );

        assert_eq!(command.exception(), Some("boom"));
        assert_eq!(command.result(), None);
    }

    #[test]
    fn completing_without_start_stamps_both() {
        let mut command =
            Command::from_dto(approve_dto(), ExecutorKind::Background, CommandPersistence::Persisted);
        command.complete_with_result(test_time(), None).unwrap();

        assert_eq!(command.started_at(), Some(test_time()));
        assert_eq!(command.completed_at(), Some(test_time()));
    }

    #[test]
    fn foreground_commands_are_kept_only_when_hinted() {
        let mut command = Command::for_interaction(InteractionId::new(), "alice", test_time());
        assert_eq!(command.executor(), ExecutorKind::Foreground);
        assert!(!command.should_persist());

        command.hint_persist();
        assert!(command.should_persist());
    }

    #[test]
    fn background_commands_are_always_kept() {
        for persistence in [CommandPersistence::NotPersisted, CommandPersistence::IfHinted] {
            let command = Command::from_dto(approve_dto(), ExecutorKind::Background, persistence);
            assert!(command.should_persist(), "{persistence:?}");
        }
    }

    #[test]
    fn persistence_policy_honours_hints() {
        let mut command = Command::for_interaction(InteractionId::new(), "alice", test_time());
        command
            .set_dto(approve_dto(), CommandPersistence::IfHinted)
            .unwrap();
        assert!(!command.should_persist());

        command.hint_persist();
        assert!(command.should_persist());

        command
            .set_dto(approve_dto(), CommandPersistence::NotPersisted)
            .unwrap();
        assert!(!command.should_persist());
    }
}

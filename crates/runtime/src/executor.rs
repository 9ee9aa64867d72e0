//! Replays captured commands against the current state of their targets.
//!
//! ## Execution flow
//!
//! ```text
//! Command (Pending)
//!   ↓ start, run as the original user (per SudoPolicy)
//! 1. Unit of work   resolve targets → resolve member (mixins included) → rebuild args
//!                   → invoke per target → commit
//!                   business failure: roll back the domain changes, keep going
//!   ↓
//! 2. Bookkeeping    complete(result | exception) → persist the command
//!   ↓
//! 3. Fresh record   only if the commit or the bookkeeping failed: reload the command by
//!                   id, record the failure, persist best-effort
//! ```
//!
//! Failures never escape [`CommandExecutor::execute`]; they end up as the command's
//! exception text.

use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn};

use reify_commands::{ArgumentDto, Command, CommandDto, CommandOutcome, CommandStateError, DtoError, Interaction, MemberInteraction, ParamDto};
use reify_core::{Bookmark, Clock, DomainError, InteractionId, SudoPolicy, SystemClock, UserMemento};
use reify_metamodel::{Arg, MemberId, Metamodel, MetamodelError, ObjectArg};

use crate::persistence::{CommandRepository, ObjectStore, RepositoryError};
use crate::transaction::{Transaction, TransactionError};

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("command {0} carries no descriptor")]
    MissingDescriptor(InteractionId),

    #[error("descriptor names no target")]
    NoTargets,

    #[error("unknown target {0}")]
    UnknownTarget(Bookmark),

    #[error("unknown object {0} passed as argument")]
    UnknownReference(Bookmark),

    #[error("unknown action '{member}' on type '{type_name}'")]
    UnknownAction { type_name: String, member: String },

    #[error("unknown property '{member}' on type '{type_name}'")]
    UnknownProperty { type_name: String, member: String },

    #[error("property {0} is not editable")]
    ReadOnlyProperty(MemberId),

    #[error("argument mismatch for '{member}': {reason}")]
    ArgumentMismatch { member: String, reason: String },

    /// The member itself failed.
    #[error("{member} failed on {target}")]
    Business {
        member: MemberId,
        target: Bookmark,
        #[source]
        source: DomainError,
    },

    #[error("unit of work failed")]
    Transaction(#[from] TransactionError),

    #[error("unreadable descriptor")]
    Memento(#[from] DtoError),

    #[error("failed to record command outcome")]
    Bookkeeping(#[from] RepositoryError),

    #[error(transparent)]
    State(#[from] CommandStateError),

    #[error(transparent)]
    Metamodel(MetamodelError),
}

impl From<MetamodelError> for ExecutionError {
    fn from(value: MetamodelError) -> Self {
        match value {
            MetamodelError::UnknownAction { type_name, member } => {
                ExecutionError::UnknownAction { type_name, member }
            }
            MetamodelError::UnknownProperty { type_name, member } => {
                ExecutionError::UnknownProperty { type_name, member }
            }
            MetamodelError::ArgumentMismatch { member, reason } => {
                ExecutionError::ArgumentMismatch { member, reason }
            }
            other => ExecutionError::Metamodel(other),
        }
    }
}

/// Render an error and its whole source chain as one line of diagnostic text.
pub fn failure_text(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Result of the protected unit of work.
enum Attempt {
    Succeeded(Option<Bookmark>),
    /// Resolution or business failure; domain changes were rolled back.
    Failed(ExecutionError),
    /// The member ran, but its changes could not be committed.
    CommitFailed(TransactionError),
}

/// Executes commands from their descriptors.
pub struct CommandExecutor {
    metamodel: Arc<Metamodel>,
    store: Arc<dyn ObjectStore>,
    repository: Arc<dyn CommandRepository>,
    clock: Arc<dyn Clock>,
    sudo_policy: SudoPolicy,
}

impl CommandExecutor {
    pub fn new(
        metamodel: Arc<Metamodel>,
        store: Arc<dyn ObjectStore>,
        repository: Arc<dyn CommandRepository>,
    ) -> Self {
        Self {
            metamodel,
            store,
            repository,
            clock: Arc::new(SystemClock),
            sudo_policy: SudoPolicy::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sudo_policy(mut self, policy: SudoPolicy) -> Self {
        self.sudo_policy = policy;
        self
    }

    pub fn sudo_policy(&self) -> SudoPolicy {
        self.sudo_policy
    }

    /// Execute `command` and record how it ended on it (and in the repository).
    ///
    /// Always leaves the command completed. Already completed commands are left alone.
    pub fn execute(&self, command: &mut Command) -> CommandOutcome {
        let id = command.interaction_id();
        let member = command
            .member_identifier()
            .map(ToString::to_string)
            .unwrap_or_default();
        let user = self.run_as(command.username());
        let span = info_span!("execute_command", interaction_id = %id, member = %member, run_as = %user.name);
        let _guard = span.enter();

        let started = self.clock.now();
        let mut interaction = Interaction::with_command(command.clone(), user, started);
        if let Err(err) = interaction.command_mut().start(started) {
            warn!(error = %err, "not executing");
            return command
                .outcome()
                .cloned()
                .unwrap_or(CommandOutcome::Success(None));
        }
        interaction.begin_execution(started);

        // 1. Protected unit of work.
        let attempt = match interaction.command().dto() {
            Some(dto) => self.attempt(id, dto, interaction.user()),
            None => Attempt::Failed(ExecutionError::MissingDescriptor(id)),
        };
        interaction.end_execution(self.clock.now());
        let completed_at = interaction
            .execution()
            .and_then(|e| e.completed_at)
            .unwrap_or_else(|| self.clock.now());

        let outcome = match attempt {
            Attempt::Succeeded(result) => {
                info!(result = ?result.as_ref().map(ToString::to_string), "command succeeded");
                CommandOutcome::Success(result)
            }
            Attempt::Failed(err) => {
                let text = failure_text(&err);
                warn!(error = %text, "command failed");
                CommandOutcome::Failure(text)
            }
            Attempt::CommitFailed(err) => {
                let text = failure_text(&ExecutionError::Transaction(err));
                error!(error = %text, "commit failed, recording the failure separately");
                let outcome = CommandOutcome::Failure(text);
                *command = self.record_afresh(interaction.close(), outcome.clone(), completed_at);
                return outcome;
            }
        };

        // 2. Bookkeeping.
        match self.bookkeep(&mut interaction, completed_at, outcome.clone()) {
            Ok(()) => *command = interaction.close(),
            Err(err) => {
                error!(error = %failure_text(&err), "bookkeeping failed, recording the outcome separately");
                *command = self.record_afresh(interaction.close(), outcome.clone(), completed_at);
            }
        }
        outcome
    }

    /// Re-run a descriptor without any command bookkeeping (diagnostics).
    pub fn execute_dto(&self, dto: &CommandDto) -> Result<Option<Bookmark>, ExecutionError> {
        let user = self.run_as(&dto.user);
        match self.attempt(dto.interaction_id, dto, &user) {
            Attempt::Succeeded(result) => Ok(result),
            Attempt::Failed(err) => Err(err),
            Attempt::CommitFailed(err) => Err(err.into()),
        }
    }

    /// [`execute_dto`](Self::execute_dto) on a serialized descriptor.
    pub fn execute_json(&self, raw: &str) -> Result<Option<Bookmark>, ExecutionError> {
        let dto = CommandDto::from_json(raw)?;
        self.execute_dto(&dto)
    }

    fn run_as(&self, username: &str) -> UserMemento {
        match self.sudo_policy {
            SudoPolicy::Switch => UserMemento::new(username),
            SudoPolicy::NoSwitch => UserMemento::system(),
        }
    }

    fn attempt(&self, id: InteractionId, dto: &CommandDto, user: &UserMemento) -> Attempt {
        let mut tx = Transaction::begin(id, self.store.as_ref());
        match self.apply(&mut tx, dto, user) {
            Ok(result) => match tx.commit() {
                Ok(_) => Attempt::Succeeded(result),
                Err(err) => Attempt::CommitFailed(err),
            },
            Err(err) => {
                if let Err(rollback) = tx.rollback() {
                    debug!(error = %rollback, "rollback skipped");
                }
                Attempt::Failed(err)
            }
        }
    }

    fn apply(
        &self,
        tx: &mut Transaction<'_>,
        dto: &CommandDto,
        user: &UserMemento,
    ) -> Result<Option<Bookmark>, ExecutionError> {
        if dto.targets.is_empty() {
            return Err(ExecutionError::NoTargets);
        }

        // Resolve every target before touching any of them.
        let mut target_types = Vec::with_capacity(dto.targets.len());
        for bookmark in &dto.targets {
            let object = tx
                .get(bookmark)
                .map_err(|e| missing_as(e, ExecutionError::UnknownTarget))?;
            target_types.push(object.object_type().to_string());
        }

        let mut result = None;
        for (bookmark, target_type) in dto.targets.iter().zip(&target_types) {
            result = match &dto.member {
                MemberInteraction::ActionInvocation {
                    member_identifier,
                    parameters,
                } => self.invoke_action(tx, bookmark, target_type, member_identifier, parameters, user)?,
                MemberInteraction::PropertyEdit {
                    member_identifier,
                    new_value,
                } => {
                    self.edit_property(tx, bookmark, target_type, member_identifier, new_value, user)?;
                    None
                }
            };
        }
        Ok(result)
    }

    fn invoke_action(
        &self,
        tx: &mut Transaction<'_>,
        bookmark: &Bookmark,
        target_type: &str,
        member: &MemberId,
        parameters: &[ParamDto],
        user: &UserMemento,
    ) -> Result<Option<Bookmark>, ExecutionError> {
        let resolved = self.metamodel.action_for(target_type, member)?;
        if let Some(mixin) = resolved.mixin {
            debug!(mixin, target = %bookmark, "invoking mixin action on its mixee");
        }

        let args = parameters
            .iter()
            .map(|p| reconstruct(tx, &p.value))
            .collect::<Result<Vec<_>, _>>()?;
        resolved.action.check_args(&args)?;

        let target = tx
            .get_mut(bookmark)
            .map_err(|e| missing_as(e, ExecutionError::UnknownTarget))?;
        resolved
            .action
            .invoke(target, &args, user)
            .map_err(|source| ExecutionError::Business {
                member: member.clone(),
                target: bookmark.clone(),
                source,
            })
    }

    fn edit_property(
        &self,
        tx: &mut Transaction<'_>,
        bookmark: &Bookmark,
        target_type: &str,
        member: &MemberId,
        new_value: &ArgumentDto,
        user: &UserMemento,
    ) -> Result<(), ExecutionError> {
        let property = self.metamodel.property_for(target_type, member)?;
        if !property.is_editable() {
            return Err(ExecutionError::ReadOnlyProperty(member.clone()));
        }

        let value = reconstruct(tx, new_value)?;
        property.check_value(&value)?;

        let target = tx
            .get_mut(bookmark)
            .map_err(|e| missing_as(e, ExecutionError::UnknownTarget))?;
        match property.set(target, &value, user) {
            Some(applied) => applied.map_err(|source| ExecutionError::Business {
                member: member.clone(),
                target: bookmark.clone(),
                source,
            }),
            None => Err(ExecutionError::ReadOnlyProperty(member.clone())),
        }
    }

    fn bookkeep(
        &self,
        interaction: &mut Interaction,
        completed_at: chrono::DateTime<chrono::Utc>,
        outcome: CommandOutcome,
    ) -> Result<(), ExecutionError> {
        let command = interaction.command_mut();
        command.complete(completed_at, outcome)?;
        if command.should_persist() {
            self.repository.persist(command)?;
        }
        Ok(())
    }

    /// Record `outcome` on the stored copy of the command, independently of the unit of
    /// work that failed. Best effort: failures are logged, never raised.
    fn record_afresh(
        &self,
        current: Command,
        outcome: CommandOutcome,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Command {
        let id = current.interaction_id();
        let started = current.started_at().unwrap_or(at);

        let mut fresh = match self.repository.find(id) {
            Ok(Some(stored)) if stored.is_completed() => {
                warn!(interaction_id = %id, "command already completed in storage");
                return stored;
            }
            Ok(Some(stored)) => stored,
            Ok(None) => current,
            Err(err) => {
                error!(interaction_id = %id, error = %err, "could not reload command");
                current
            }
        };

        if !fresh.is_completed() {
            let recorded = fresh
                .start(started)
                .and_then(|()| fresh.complete(at, outcome));
            if let Err(err) = recorded {
                error!(interaction_id = %id, error = %err, "could not complete command");
            }
        }
        if fresh.should_persist() {
            if let Err(err) = self.repository.persist(&fresh) {
                error!(interaction_id = %id, error = %err, "could not record command outcome");
            }
        }
        fresh
    }
}

fn reconstruct(tx: &mut Transaction<'_>, value: &ArgumentDto) -> Result<Arg, ExecutionError> {
    match value {
        ArgumentDto::Value(v) => Ok(Arg::Value(v.clone())),
        ArgumentDto::Reference(bookmark) => tx
            .snapshot(bookmark)
            .map(|object| Arg::Object(ObjectArg::new(object)))
            .map_err(|e| missing_as(e, ExecutionError::UnknownReference)),
    }
}

fn missing_as(err: TransactionError, missing: fn(Bookmark) -> ExecutionError) -> ExecutionError {
    match err {
        TransactionError::UnknownObject(bookmark) => missing(bookmark),
        other => ExecutionError::Transaction(other),
    }
}

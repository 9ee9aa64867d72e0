//! Foreground interactions: open one per user request, close it when the request ends.
//!
//! An interaction owns one foreground command. Invoking an action through
//! [`InteractionService::invoke`] runs it right away and records it on that command,
//! with the action's persistence policy deciding whether `close` keeps it.

use std::sync::Arc;

use tracing::{debug, warn};

use reify_commands::{Command, CommandDto, CommandOutcome, CommandStateError, Interaction, JsonMementoCodec, MementoCodec};
use reify_core::{Bookmark, Clock, DomainError, DomainObject, InteractionId, SystemClock, UserMemento};
use reify_metamodel::{Arg, MemberId, MemberKind, Metamodel, MetamodelError};

use crate::background::{InterceptError, describe_args};
use crate::executor::failure_text;
use crate::persistence::{CommandRepository, RepositoryError};

#[derive(Debug, thiserror::Error)]
pub enum InteractionError {
    #[error("unknown member '{member}' on type '{type_name}'")]
    UnknownMember { type_name: String, member: String },
    #[error("{member} is a {kind:?}; only actions can be invoked")]
    NotAnAction { member: MemberId, kind: MemberKind },
    #[error(transparent)]
    Capture(#[from] InterceptError),
    #[error(transparent)]
    Arguments(#[from] MetamodelError),
    #[error("{member} failed on {target}")]
    Business {
        member: MemberId,
        target: Bookmark,
        #[source]
        source: DomainError,
    },
    #[error(transparent)]
    State(#[from] CommandStateError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct InteractionService {
    metamodel: Arc<Metamodel>,
    repository: Arc<dyn CommandRepository>,
    codec: Arc<dyn MementoCodec>,
    clock: Arc<dyn Clock>,
}

impl InteractionService {
    pub fn new(metamodel: Arc<Metamodel>, repository: Arc<dyn CommandRepository>) -> Self {
        Self {
            metamodel,
            repository,
            codec: Arc::new(JsonMementoCodec),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn MementoCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Start a new interaction, with a fresh foreground command, for `user`.
    pub fn open(&self, user: UserMemento) -> Interaction {
        let now = self.clock.now();
        let interaction = Interaction::open(InteractionId::new(), user, now);
        debug!(interaction_id = %interaction.id(), user = %interaction.user().name, "interaction opened");
        interaction
    }

    /// Run the action `member` on `target` now, as the interaction's user, and record it
    /// as the interaction's foreground command.
    ///
    /// The command takes the action's persistence policy. A failing action completes the
    /// command with its failure text; the target is left however the action left it.
    pub fn invoke<T: DomainObject>(
        &self,
        interaction: &mut Interaction,
        target: &mut T,
        member: &str,
        args: &[Arg],
    ) -> Result<Option<Bookmark>, InteractionError> {
        let type_name = target.object_type().to_string();
        let found = self
            .metamodel
            .find_member(&type_name, member)
            .ok_or_else(|| InteractionError::UnknownMember {
                type_name: type_name.clone(),
                member: member.to_string(),
            })?;
        let action = found.as_action().ok_or_else(|| InteractionError::NotAnAction {
            member: found.id().clone(),
            kind: found.kind(),
        })?;
        action.check_args(args)?;

        let dto = CommandDto::action_invocation(
            interaction.id(),
            interaction.user().name.clone(),
            interaction.started_at(),
            vec![target.bookmark()],
            found.id().clone(),
            describe_args(self.codec.as_ref(), &found, args)?,
        );
        interaction.command_mut().set_dto(dto, action.persistence())?;

        let started = self.clock.now();
        interaction.command_mut().start(started)?;
        interaction.begin_execution(started);
        let invoked = action.invoke(target, args, interaction.user());
        let completed = self.clock.now();
        interaction.end_execution(completed);

        match invoked {
            Ok(result) => {
                interaction.command_mut().complete_with_result(completed, result.clone())?;
                debug!(interaction_id = %interaction.id(), member = %found.id(), "foreground action completed");
                Ok(result)
            }
            Err(source) => {
                let err = InteractionError::Business {
                    member: found.id().clone(),
                    target: target.bookmark(),
                    source,
                };
                let text = failure_text(&err);
                warn!(interaction_id = %interaction.id(), error = %text, "foreground action failed");
                interaction.command_mut().complete_with_exception(completed, text)?;
                Err(err)
            }
        }
    }

    /// End `interaction`, completing its command and persisting it if it should be kept.
    ///
    /// A command that was never given a different outcome completes successfully with no
    /// result.
    pub fn close(&self, interaction: Interaction) -> Result<Command, InteractionError> {
        let started = interaction.started_at();
        let mut command = interaction.close();
        if !command.is_completed() {
            command.start(started)?;
            command.complete(self.clock.now(), CommandOutcome::Success(None))?;
        }

        if command.should_persist() {
            self.repository.persist(&command)?;
            debug!(interaction_id = %command.interaction_id(), "foreground command persisted");
        }
        Ok(command)
    }
}

//! Per-interaction execution context.
//!
//! An [`Interaction`] lives for exactly one unit of work and is handed to collaborators by
//! `&mut` reference. There is no ambient "current interaction": whoever opens one owns it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use reify_core::{InteractionId, UserMemento};

use crate::command::Command;

/// First value returned by [`Interaction::next`] for any counter.
pub const SEQUENCE_BASE: u32 = 0;

/// Timing of the member execution nested inside an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Execution {
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct Interaction {
    id: InteractionId,
    user: UserMemento,
    started_at: DateTime<Utc>,
    command: Command,
    sequences: HashMap<String, u32>,
    execution: Option<Execution>,
}

impl Interaction {
    /// Open an interaction with a fresh foreground command.
    pub fn open(id: InteractionId, user: UserMemento, at: DateTime<Utc>) -> Self {
        let command = Command::for_interaction(id, user.name.clone(), at);
        Self::with_command(command, user, at)
    }

    /// Open an interaction around an existing command (replay of a background command).
    pub fn with_command(command: Command, user: UserMemento, at: DateTime<Utc>) -> Self {
        Self {
            id: command.interaction_id(),
            user,
            started_at: at,
            command,
            sequences: HashMap::new(),
            execution: None,
        }
    }

    pub fn id(&self) -> InteractionId {
        self.id
    }

    /// The identity this unit of work runs as.
    pub fn user(&self) -> &UserMemento {
        &self.user
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn command_mut(&mut self) -> &mut Command {
        &mut self.command
    }

    /// The value [`next`](Self::next) would return, without consuming it.
    pub fn peek(&self, counter: &str) -> u32 {
        self.sequences.get(counter).copied().unwrap_or(SEQUENCE_BASE)
    }

    /// Next ordinal of the named counter: `SEQUENCE_BASE`, then +1 on every call.
    pub fn next(&mut self, counter: &str) -> u32 {
        let slot = self
            .sequences
            .entry(counter.to_string())
            .or_insert(SEQUENCE_BASE);
        let value = *slot;
        *slot += 1;
        value
    }

    /// Mark the start of the nested member execution. Only the first call counts.
    pub fn begin_execution(&mut self, at: DateTime<Utc>) {
        if self.execution.is_none() {
            self.execution = Some(Execution {
                started_at: at,
                completed_at: None,
            });
        }
    }

    pub fn end_execution(&mut self, at: DateTime<Utc>) {
        if let Some(execution) = self.execution.as_mut() {
            execution.completed_at.get_or_insert(at);
        }
    }

    pub fn execution(&self) -> Option<&Execution> {
        self.execution.as_ref()
    }

    /// End the interaction, handing back its command.
    pub fn close(self) -> Command {
        self.command
    }
}

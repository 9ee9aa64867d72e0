//! `reify-commands`: commands, their descriptors, and the per-interaction context.
//!
//! A [`Command`] is the record of one business-member invocation: who asked for it, what
//! it targets, and (once executed) when it ran and how it ended. Its [`CommandDto`] is the
//! replayable part, referentially independent of any live object graph.
//!
//! This crate has no storage and no threads; the runtime crate drives it.

pub mod codec;
pub mod command;
pub mod dto;
pub mod error;
pub mod interaction;

pub use codec::{JsonMementoCodec, MementoCodec};
pub use command::{Command, CommandOutcome, CommandState, ExecutorKind};
pub use dto::{
    ArgumentDto, CommandDto, DTO_MAJOR_VERSION, DTO_MINOR_VERSION, InteractionType,
    MemberInteraction, ParamDto,
};
pub use error::{CommandStateError, DtoError};
pub use interaction::{Execution, Interaction, SEQUENCE_BASE};

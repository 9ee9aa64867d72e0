//! `reify-core`: primitives shared by the command capture & replay pipeline.
//!
//! This crate contains **pure** building blocks (no storage, no threads): identifiers,
//! object references, inline values and the trait every domain object implements.

pub mod bookmark;
pub mod clock;
pub mod error;
pub mod id;
pub mod object;
pub mod user;
pub mod value;

pub use bookmark::Bookmark;
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::InteractionId;
pub use object::{DomainObject, downcast_mut, downcast_ref};
pub use user::{SYSTEM_USER, SudoPolicy, UserMemento};
pub use value::{Value, ValueKind};

//! `reify-metamodel`: the registry describing which members a domain type exposes.
//!
//! Rust has no runtime reflection, so member lookup by string identifier goes through an
//! explicit table built once at startup: type name → ordered map of member name → invocable
//! descriptor. Both the interception proxy and the command executor query it.

pub mod arg;
pub mod error;
pub mod member;
pub mod mixin;
pub mod registry;
pub mod spec;

pub use arg::{Arg, ObjectArg};
pub use error::MetamodelError;
pub use member::{
    ActionHandler, CommandPersistence, Member, MemberId, MemberKind, ObjectAction,
    ObjectCollection, ObjectProperty, ParamKind, ParamSpec, PropertySetter,
};
pub use mixin::{MixinResolver, MixinSpec, ResolvedAction};
pub use registry::{MemberRef, Metamodel};
pub use spec::{ObjectSpec, SpecBuilder};

//! Mixins: actions contributed to a type from outside its own declaration.
//!
//! A mixin has its own nominal identity (`"Invoice_remind#act"`), which is what a
//! descriptor records. At invocation time the real receiver is the mixee (the invoice),
//! so the executor has to map the nominal identifier back to an action that runs
//! against the mixee. That mapping is the [`MixinResolver`] seam.

use reify_core::{Bookmark, DomainObject, DomainResult, UserMemento};

use crate::arg::Arg;
use crate::member::{CommandPersistence, MemberId, ObjectAction, ParamSpec};
use crate::spec::typed_handler;

/// Method name used for a mixin's single action when none is given.
pub const DEFAULT_MIXIN_METHOD: &str = "act";

#[derive(Debug, Clone)]
pub struct MixinSpec {
    mixee_type: String,
    contributed_as: String,
    action: ObjectAction,
}

impl MixinSpec {
    /// Contribute an action named `contributed_as` to `T` (registered as `mixee_type`).
    ///
    /// The nominal identifier is `"<mixin_type>#act"`.
    pub fn action<T, F>(
        mixin_type: &str,
        mixee_type: &str,
        contributed_as: &str,
        params: Vec<ParamSpec>,
        body: F,
    ) -> Self
    where
        T: DomainObject,
        F: Fn(&mut T, &[Arg], &UserMemento) -> DomainResult<Option<Bookmark>> + Send + Sync + 'static,
    {
        let id = MemberId::new(mixin_type, DEFAULT_MIXIN_METHOD);
        let handler = typed_handler::<T, F>(mixee_type.to_string(), body);
        Self {
            mixee_type: mixee_type.to_string(),
            contributed_as: contributed_as.to_string(),
            action: ObjectAction::new(id, params, CommandPersistence::Persisted, handler),
        }
    }

    pub fn mixin_type(&self) -> &str {
        self.action.id().type_name()
    }

    pub fn mixee_type(&self) -> &str {
        &self.mixee_type
    }

    pub fn contributed_as(&self) -> &str {
        &self.contributed_as
    }

    /// Nominal identifier recorded in descriptors.
    pub fn id(&self) -> &MemberId {
        self.action.id()
    }

    /// The action as it runs against the mixee.
    pub fn contributed_action(&self) -> &ObjectAction {
        &self.action
    }
}

/// An action ready to run against a particular target.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedAction<'a> {
    pub action: &'a ObjectAction,
    /// Set when the action was contributed by a mixin (its type name).
    pub mixin: Option<&'a str>,
}

/// Given a nominal action identifier and the runtime type of a candidate target,
/// return the action that really applies to that target, if any.
pub trait MixinResolver {
    fn resolve_mixin(&self, nominal: &MemberId, target_type: &str) -> Option<ResolvedAction<'_>>;
}

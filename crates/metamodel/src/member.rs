//! Member descriptors: actions, properties and collections.

use core::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use reify_core::{Bookmark, DomainObject, DomainResult, UserMemento, Value, ValueKind};

use crate::arg::Arg;
use crate::error::MetamodelError;

/// Identifies a member on a type: `"Invoice#approve"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemberId {
    type_name: String,
    member: String,
}

impl MemberId {
    pub fn new(type_name: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            member: member.into(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn member(&self) -> &str {
        &self.member
    }
}

impl core::fmt::Display for MemberId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}#{}", self.type_name, self.member)
    }
}

impl FromStr for MemberId {
    type Err = MetamodelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('#') {
            Some((t, m)) if !t.is_empty() && !m.is_empty() && !m.contains('#') => {
                Ok(Self::new(t, m))
            }
            _ => Err(MetamodelError::InvalidMemberId(s.to_string())),
        }
    }
}

impl TryFrom<String> for MemberId {
    type Error = MetamodelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MemberId> for String {
    fn from(value: MemberId) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    Action,
    Property,
    Collection,
}

/// Whether commands for an action are kept once they complete.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandPersistence {
    #[default]
    Persisted,
    /// Only if something hinted that the command is worth keeping (e.g. it spawned
    /// background work that points back at it).
    IfHinted,
    NotPersisted,
}

/// Declared type of a parameter, property or new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// Carried inline.
    Value(ValueKind),
    /// A reference to a domain object of the named type.
    Reference(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub optional: bool,
}

impl ParamSpec {
    pub fn value(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Value(kind),
            optional: false,
        }
    }

    pub fn reference(name: impl Into<String>, object_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Reference(object_type.into()),
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Check an inline value against this parameter.
    pub fn accepts_value(&self, value: &Value) -> Result<(), String> {
        if value.is_null() {
            return if self.optional {
                Ok(())
            } else {
                Err(format!("parameter '{}' is mandatory", self.name))
            };
        }
        match &self.kind {
            ParamKind::Value(kind) if value.conforms_to(*kind) => Ok(()),
            ParamKind::Value(kind) => Err(format!(
                "parameter '{}' expects {kind}, got {}",
                self.name,
                value.kind().map(|k| k.to_string()).unwrap_or_default()
            )),
            ParamKind::Reference(t) => Err(format!(
                "parameter '{}' expects a reference to {t}, got an inline value",
                self.name
            )),
        }
    }

    /// Check an object reference against this parameter.
    pub fn accepts_reference(&self, bookmark: &Bookmark) -> Result<(), String> {
        match &self.kind {
            ParamKind::Reference(t) if t == bookmark.object_type() => Ok(()),
            ParamKind::Reference(t) => Err(format!(
                "parameter '{}' expects a reference to {t}, got {bookmark}",
                self.name
            )),
            ParamKind::Value(kind) => Err(format!(
                "parameter '{}' expects {kind}, got reference {bookmark}",
                self.name
            )),
        }
    }

    pub fn accepts(&self, arg: &Arg) -> Result<(), String> {
        match arg {
            Arg::Value(v) => self.accepts_value(v),
            Arg::Object(o) => self.accepts_reference(o.bookmark()),
        }
    }
}

/// Action body. Receives the (mutable) target, the arguments and the user the member runs
/// as, and returns the bookmark of the returned object, if any.
pub type ActionHandler = Arc<
    dyn Fn(&mut dyn DomainObject, &[Arg], &UserMemento) -> DomainResult<Option<Bookmark>>
        + Send
        + Sync,
>;

/// Property setter used when replaying a property edit.
pub type PropertySetter =
    Arc<dyn Fn(&mut dyn DomainObject, &Arg, &UserMemento) -> DomainResult<()> + Send + Sync>;

#[derive(Clone)]
pub struct ObjectAction {
    id: MemberId,
    params: Vec<ParamSpec>,
    persistence: CommandPersistence,
    handler: ActionHandler,
}

impl ObjectAction {
    pub fn new(
        id: MemberId,
        params: Vec<ParamSpec>,
        persistence: CommandPersistence,
        handler: ActionHandler,
    ) -> Self {
        Self {
            id,
            params,
            persistence,
            handler,
        }
    }

    pub fn id(&self) -> &MemberId {
        &self.id
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn persistence(&self) -> CommandPersistence {
        self.persistence
    }

    /// Verify count and types of `args` against the declared parameters.
    pub fn check_args(&self, args: &[Arg]) -> Result<(), MetamodelError> {
        if args.len() != self.params.len() {
            return Err(MetamodelError::argument_mismatch(
                &self.id,
                format!("expected {} arguments, got {}", self.params.len(), args.len()),
            ));
        }
        for (param, arg) in self.params.iter().zip(args) {
            param
                .accepts(arg)
                .map_err(|reason| MetamodelError::argument_mismatch(&self.id, reason))?;
        }
        Ok(())
    }

    /// Run the action against `target` on behalf of `user`.
    pub fn invoke(
        &self,
        target: &mut dyn DomainObject,
        args: &[Arg],
        user: &UserMemento,
    ) -> DomainResult<Option<Bookmark>> {
        (self.handler)(target, args, user)
    }
}

impl core::fmt::Debug for ObjectAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ObjectAction")
            .field("id", &self.id)
            .field("params", &self.params)
            .field("persistence", &self.persistence)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct ObjectProperty {
    id: MemberId,
    kind: ParamKind,
    setter: Option<PropertySetter>,
}

impl ObjectProperty {
    pub fn new(id: MemberId, kind: ParamKind, setter: Option<PropertySetter>) -> Self {
        Self { id, kind, setter }
    }

    pub fn id(&self) -> &MemberId {
        &self.id
    }

    pub fn kind(&self) -> &ParamKind {
        &self.kind
    }

    pub fn is_editable(&self) -> bool {
        self.setter.is_some()
    }

    /// Check a candidate new value. Properties are always nullable.
    pub fn check_value(&self, value: &Arg) -> Result<(), MetamodelError> {
        let slot = ParamSpec {
            name: self.id.member().to_string(),
            kind: self.kind.clone(),
            optional: true,
        };
        slot.accepts(value)
            .map_err(|reason| MetamodelError::argument_mismatch(&self.id, reason))
    }

    /// Apply a new value. `None` when the property is read-only.
    pub fn set(
        &self,
        target: &mut dyn DomainObject,
        value: &Arg,
        user: &UserMemento,
    ) -> Option<DomainResult<()>> {
        self.setter.as_ref().map(|set| set(target, value, user))
    }
}

impl core::fmt::Debug for ObjectProperty {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ObjectProperty")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("editable", &self.is_editable())
            .finish()
    }
}

/// Collections are metadata only; the pipeline never invokes them.
#[derive(Debug, Clone)]
pub struct ObjectCollection {
    id: MemberId,
    element_type: String,
}

impl ObjectCollection {
    pub fn new(id: MemberId, element_type: impl Into<String>) -> Self {
        Self {
            id,
            element_type: element_type.into(),
        }
    }

    pub fn id(&self) -> &MemberId {
        &self.id
    }

    pub fn element_type(&self) -> &str {
        &self.element_type
    }
}

#[derive(Debug, Clone)]
pub enum Member {
    Action(ObjectAction),
    Property(ObjectProperty),
    Collection(ObjectCollection),
}

impl Member {
    pub fn kind(&self) -> MemberKind {
        match self {
            Member::Action(_) => MemberKind::Action,
            Member::Property(_) => MemberKind::Property,
            Member::Collection(_) => MemberKind::Collection,
        }
    }

    pub fn id(&self) -> &MemberId {
        match self {
            Member::Action(a) => a.id(),
            Member::Property(p) => p.id(),
            Member::Collection(c) => c.id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_id_parses_type_and_member() {
        let id: MemberId = "Invoice#approve".parse().unwrap();
        assert_eq!(id.type_name(), "Invoice");
        assert_eq!(id.member(), "approve");
        assert_eq!(id.to_string(), "Invoice#approve");
    }

    #[test]
    fn member_id_rejects_malformed_input() {
        for raw in ["Invoice", "#approve", "Invoice#", "a#b#c"] {
            assert!(raw.parse::<MemberId>().is_err(), "{raw:?}");
        }
    }

    #[test]
    fn member_id_serializes_as_string() {
        let id = MemberId::new("Order", "applyDiscount");
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json, serde_json::json!("Order#applyDiscount"));

        let back: MemberId = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<MemberId>("\"nope\"").is_err());
    }

    #[test]
    fn mandatory_parameter_rejects_null() {
        let param = ParamSpec::value("percent", ValueKind::Double);
        assert!(param.accepts_value(&Value::Null).is_err());
        assert!(param.clone().optional().accepts_value(&Value::Null).is_ok());
    }

    #[test]
    fn reference_parameter_checks_target_type() {
        let param = ParamSpec::reference("customer", "Customer");
        assert!(param.accepts_reference(&Bookmark::new("Customer", "C-1")).is_ok());
        assert!(param.accepts_reference(&Bookmark::new("Invoice", "I-1")).is_err());
        assert!(param.accepts_value(&Value::from("C-1")).is_err());
    }
}

//! The metamodel registry: built once at startup, queried by string key afterwards.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::error::MetamodelError;
use crate::member::{
    Member, MemberId, MemberKind, ObjectAction, ObjectCollection, ObjectProperty, ParamSpec,
};
use crate::mixin::{MixinResolver, MixinSpec, ResolvedAction};
use crate::spec::ObjectSpec;

/// A member as seen from a concrete type: declared on it, or contributed by a mixin.
#[derive(Debug, Clone, Copy)]
pub enum MemberRef<'a> {
    Action(&'a ObjectAction),
    Mixin(&'a MixinSpec),
    Property(&'a ObjectProperty),
    Collection(&'a ObjectCollection),
}

impl<'a> MemberRef<'a> {
    pub fn kind(&self) -> MemberKind {
        match self {
            MemberRef::Action(_) | MemberRef::Mixin(_) => MemberKind::Action,
            MemberRef::Property(_) => MemberKind::Property,
            MemberRef::Collection(_) => MemberKind::Collection,
        }
    }

    /// Identifier to record in a descriptor (the nominal id for mixins).
    pub fn id(&self) -> &'a MemberId {
        match self {
            MemberRef::Action(a) => a.id(),
            MemberRef::Mixin(m) => m.id(),
            MemberRef::Property(p) => p.id(),
            MemberRef::Collection(c) => c.id(),
        }
    }

    /// The invocable action, if this member is one.
    pub fn as_action(&self) -> Option<&'a ObjectAction> {
        match self {
            MemberRef::Action(a) => Some(a),
            MemberRef::Mixin(m) => Some(m.contributed_action()),
            _ => None,
        }
    }

    pub fn params(&self) -> &'a [ParamSpec] {
        self.as_action().map(ObjectAction::params).unwrap_or(&[])
    }
}

/// Registry of object specifications and mixins.
#[derive(Debug, Default)]
pub struct Metamodel {
    specs: HashMap<String, ObjectSpec>,
    mixins: HashMap<MemberId, MixinSpec>,
    /// mixee type → contributed name → nominal mixin id
    contributions: HashMap<String, BTreeMap<String, MemberId>>,
}

impl Metamodel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: ObjectSpec) -> Result<(), MetamodelError> {
        let type_name = spec.type_name().to_string();
        if self.specs.contains_key(&type_name) {
            return Err(MetamodelError::DuplicateType(type_name));
        }
        debug!(type_name = %type_name, "registered object spec");
        self.specs.insert(type_name, spec);
        Ok(())
    }

    /// Register a mixin. Its mixee must already be registered and must not declare a
    /// member under the contributed name.
    pub fn register_mixin(&mut self, mixin: MixinSpec) -> Result<(), MetamodelError> {
        let spec = self
            .specs
            .get(mixin.mixee_type())
            .ok_or_else(|| MetamodelError::UnknownType(mixin.mixee_type().to_string()))?;

        let contributed = self
            .contributions
            .get(mixin.mixee_type())
            .is_some_and(|c| c.contains_key(mixin.contributed_as()));
        if spec.member(mixin.contributed_as()).is_some() || contributed {
            return Err(MetamodelError::DuplicateMember {
                type_name: mixin.mixee_type().to_string(),
                member: mixin.contributed_as().to_string(),
            });
        }
        if self.mixins.contains_key(mixin.id()) {
            return Err(MetamodelError::DuplicateType(mixin.mixin_type().to_string()));
        }

        debug!(
            mixin = %mixin.id(),
            mixee = mixin.mixee_type(),
            contributed_as = mixin.contributed_as(),
            "registered mixin"
        );
        self.contributions
            .entry(mixin.mixee_type().to_string())
            .or_default()
            .insert(mixin.contributed_as().to_string(), mixin.id().clone());
        self.mixins.insert(mixin.id().clone(), mixin);
        Ok(())
    }

    pub fn spec_for(&self, type_name: &str) -> Option<&ObjectSpec> {
        self.specs.get(type_name)
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.specs.contains_key(type_name)
    }

    /// Look up a member by the name it has on `type_name`, including mixin contributions.
    ///
    /// `None` means the name is not a domain member at all.
    pub fn find_member(&self, type_name: &str, name: &str) -> Option<MemberRef<'_>> {
        if let Some(member) = self.specs.get(type_name)?.member(name) {
            return Some(match member {
                Member::Action(a) => MemberRef::Action(a),
                Member::Property(p) => MemberRef::Property(p),
                Member::Collection(c) => MemberRef::Collection(c),
            });
        }
        let nominal = self.contributions.get(type_name)?.get(name)?;
        self.mixins.get(nominal).map(MemberRef::Mixin)
    }

    /// Resolve the action a descriptor names against the runtime type of its target.
    ///
    /// Declared actions are matched directly; otherwise the identifier is treated as a
    /// nominal mixin id and redirected to the mixee.
    pub fn action_for(
        &self,
        target_type: &str,
        id: &MemberId,
    ) -> Result<ResolvedAction<'_>, MetamodelError> {
        let spec = self
            .spec_for(target_type)
            .ok_or_else(|| MetamodelError::UnknownType(target_type.to_string()))?;

        if id.type_name() == target_type {
            if let Some(action) = spec.action(id.member()) {
                return Ok(ResolvedAction {
                    action,
                    mixin: None,
                });
            }
        }

        self.resolve_mixin(id, target_type)
            .ok_or_else(|| MetamodelError::UnknownAction {
                type_name: target_type.to_string(),
                member: id.to_string(),
            })
    }

    /// Resolve the property a descriptor names against the runtime type of its target.
    pub fn property_for(
        &self,
        target_type: &str,
        id: &MemberId,
    ) -> Result<&ObjectProperty, MetamodelError> {
        let spec = self
            .spec_for(target_type)
            .ok_or_else(|| MetamodelError::UnknownType(target_type.to_string()))?;

        spec.property(id.member())
            .filter(|_| id.type_name() == target_type)
            .ok_or_else(|| MetamodelError::UnknownProperty {
                type_name: target_type.to_string(),
                member: id.to_string(),
            })
    }
}

impl MixinResolver for Metamodel {
    fn resolve_mixin(&self, nominal: &MemberId, target_type: &str) -> Option<ResolvedAction<'_>> {
        let mixin = self.mixins.get(nominal)?;
        if mixin.mixee_type() != target_type {
            return None;
        }
        Some(ResolvedAction {
            action: mixin.contributed_action(),
            mixin: Some(mixin.mixin_type()),
        })
    }
}

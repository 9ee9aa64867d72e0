//! Per-type specifications and their typed builder.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use reify_core::{Bookmark, DomainError, DomainObject, DomainResult, UserMemento, downcast_mut};

use crate::arg::Arg;
use crate::error::MetamodelError;
use crate::member::{
    ActionHandler, CommandPersistence, Member, MemberId, ObjectAction, ObjectCollection,
    ObjectProperty, ParamKind, ParamSpec, PropertySetter,
};

/// Everything the pipeline knows about one domain type.
#[derive(Debug, Clone)]
pub struct ObjectSpec {
    type_name: String,
    members: BTreeMap<String, Member>,
}

impl ObjectSpec {
    /// Start describing the domain type `T`, registered under `type_name`.
    pub fn builder<T: DomainObject>(type_name: impl Into<String>) -> SpecBuilder<T> {
        SpecBuilder {
            type_name: type_name.into(),
            members: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    /// Members ordered by name.
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    pub fn action(&self, name: &str) -> Option<&ObjectAction> {
        match self.members.get(name) {
            Some(Member::Action(a)) => Some(a),
            _ => None,
        }
    }

    pub fn property(&self, name: &str) -> Option<&ObjectProperty> {
        match self.members.get(name) {
            Some(Member::Property(p)) => Some(p),
            _ => None,
        }
    }
}

/// Typed builder: handlers receive `&mut T`, the downcast happens once here.
///
/// Bodies also get the user the member runs as; most ignore it.
pub struct SpecBuilder<T> {
    type_name: String,
    members: Vec<Member>,
    _marker: PhantomData<fn(T)>,
}

impl<T: DomainObject> SpecBuilder<T> {
    /// Declare an action whose commands are persisted.
    pub fn action<F>(self, name: &str, params: Vec<ParamSpec>, body: F) -> Self
    where
        F: Fn(&mut T, &[Arg], &UserMemento) -> DomainResult<Option<Bookmark>> + Send + Sync + 'static,
    {
        self.action_with_persistence(name, params, CommandPersistence::Persisted, body)
    }

    pub fn action_with_persistence<F>(
        mut self,
        name: &str,
        params: Vec<ParamSpec>,
        persistence: CommandPersistence,
        body: F,
    ) -> Self
    where
        F: Fn(&mut T, &[Arg], &UserMemento) -> DomainResult<Option<Bookmark>> + Send + Sync + 'static,
    {
        let id = MemberId::new(&self.type_name, name);
        let handler = typed_handler::<T, F>(self.type_name.clone(), body);
        self.members
            .push(Member::Action(ObjectAction::new(id, params, persistence, handler)));
        self
    }

    /// Declare an editable property.
    pub fn property<F>(mut self, name: &str, kind: ParamKind, set: F) -> Self
    where
        F: Fn(&mut T, &Arg, &UserMemento) -> DomainResult<()> + Send + Sync + 'static,
    {
        let id = MemberId::new(&self.type_name, name);
        let type_name = self.type_name.clone();
        let setter: PropertySetter = Arc::new(
            move |target: &mut dyn DomainObject, value: &Arg, user: &UserMemento| {
                let typed = downcast_mut::<T>(target).ok_or_else(|| wrong_type(&type_name))?;
                set(typed, value, user)
            },
        );
        self.members
            .push(Member::Property(ObjectProperty::new(id, kind, Some(setter))));
        self
    }

    pub fn read_only_property(mut self, name: &str, kind: ParamKind) -> Self {
        let id = MemberId::new(&self.type_name, name);
        self.members
            .push(Member::Property(ObjectProperty::new(id, kind, None)));
        self
    }

    pub fn collection(mut self, name: &str, element_type: &str) -> Self {
        let id = MemberId::new(&self.type_name, name);
        self.members
            .push(Member::Collection(ObjectCollection::new(id, element_type)));
        self
    }

    pub fn build(self) -> Result<ObjectSpec, MetamodelError> {
        let mut members = BTreeMap::new();
        for member in self.members {
            let name = member.id().member().to_string();
            if members.contains_key(&name) {
                return Err(MetamodelError::DuplicateMember {
                    type_name: self.type_name,
                    member: name,
                });
            }
            members.insert(name, member);
        }
        Ok(ObjectSpec {
            type_name: self.type_name,
            members,
        })
    }
}

pub(crate) fn typed_handler<T, F>(type_name: String, body: F) -> ActionHandler
where
    T: DomainObject,
    F: Fn(&mut T, &[Arg], &UserMemento) -> DomainResult<Option<Bookmark>> + Send + Sync + 'static,
{
    Arc::new(move |target: &mut dyn DomainObject, args: &[Arg], user: &UserMemento| {
        let typed = downcast_mut::<T>(target).ok_or_else(|| wrong_type(&type_name))?;
        body(typed, args, user)
    })
}

fn wrong_type(type_name: &str) -> DomainError {
    DomainError::validation(format!("target is not a {type_name}"))
}

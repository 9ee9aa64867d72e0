//! Interception proxy: captures action calls as background commands instead of running them.
//!
//! ```text
//! proxy.invoke("approve", args)
//!   ↓ metamodel lookup on the target's type
//!   ├─ not a member          → PassThrough (caller runs it directly)
//!   ├─ property / collection → InterceptError::UnsupportedMemberKind
//!   └─ action (or mixin)     → CommandDto → scheduler(dto, interaction id, next("bg"))
//! ```
//!
//! Read access goes straight to the wrapped object through `Deref`.

use std::ops::Deref;
use std::sync::Arc;

use tracing::{info, trace};

use reify_commands::{ArgumentDto, CommandDto, Interaction, JsonMementoCodec, MementoCodec, ParamDto};
use reify_core::{Bookmark, Clock, DomainObject, InteractionId, SystemClock};
use reify_metamodel::{Arg, MemberId, MemberKind, MemberRef, Metamodel};

use crate::persistence::{BackgroundCommandScheduler, RepositoryError};

/// Counter used to order the background commands spawned by one interaction.
pub const BACKGROUND_COUNTER: &str = "bg";

/// What happened to an intercepted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intercepted {
    /// Captured; the real result will only exist once the command runs.
    Scheduled { id: InteractionId, sequence: u32 },
    /// Not a domain member; the caller should invoke it directly.
    PassThrough,
}

#[derive(Debug, thiserror::Error)]
pub enum InterceptError {
    #[error("{member} is a {kind:?}; only actions can be executed in the background")]
    UnsupportedMemberKind { member: MemberId, kind: MemberKind },
    #[error("argument '{param}' of {member} cannot be captured inline")]
    NotCapturable { member: MemberId, param: String },
    #[error("no target to invoke on")]
    NoTargets,
    #[error("bulk targets must share one type, found {expected} and {found}")]
    MixedTargetTypes { expected: String, found: String },
    #[error("failed to schedule background command: {0}")]
    Schedule(#[from] RepositoryError),
}

/// Factory for background proxies.
pub struct BackgroundService {
    metamodel: Arc<Metamodel>,
    scheduler: Arc<dyn BackgroundCommandScheduler>,
    codec: Arc<dyn MementoCodec>,
    clock: Arc<dyn Clock>,
}

impl BackgroundService {
    pub fn new(metamodel: Arc<Metamodel>, scheduler: Arc<dyn BackgroundCommandScheduler>) -> Self {
        Self {
            metamodel,
            scheduler,
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

    /// Wrap `target` so that action calls are scheduled rather than executed.
    pub fn proxy<'a, T: DomainObject>(&'a self, target: &'a T) -> BackgroundProxy<'a, T> {
        BackgroundProxy {
            service: self,
            target,
        }
    }

    /// Schedule one command applying `member` to every target in turn.
    pub fn invoke_bulk(
        &self,
        interaction: &mut Interaction,
        targets: &[&dyn DomainObject],
        member: &str,
        args: &[Arg],
    ) -> Result<Intercepted, InterceptError> {
        self.capture(interaction, targets, member, args)
    }

    fn capture(
        &self,
        interaction: &mut Interaction,
        targets: &[&dyn DomainObject],
        member_name: &str,
        args: &[Arg],
    ) -> Result<Intercepted, InterceptError> {
        let first = targets.first().ok_or(InterceptError::NoTargets)?;
        let target_type = first.object_type();
        if let Some(other) = targets.iter().find(|t| t.object_type() != target_type) {
            return Err(InterceptError::MixedTargetTypes {
                expected: target_type.to_string(),
                found: other.object_type().to_string(),
            });
        }

        let Some(member) = self.metamodel.find_member(target_type, member_name) else {
            trace!(target_type, member = member_name, "not a domain member, passing through");
            return Ok(Intercepted::PassThrough);
        };
        if member.kind() != MemberKind::Action {
            return Err(InterceptError::UnsupportedMemberKind {
                member: member.id().clone(),
                kind: member.kind(),
            });
        }

        let parameters = describe_args(self.codec.as_ref(), &member, args)?;

        let bookmarks: Vec<Bookmark> = targets.iter().map(|t| t.bookmark()).collect();
        let dto = CommandDto::action_invocation(
            InteractionId::new(),
            interaction.user().name.clone(),
            self.clock.now(),
            bookmarks,
            member.id().clone(),
            parameters,
        );

        // Only a scheduled command consumes a sequence number.
        let sequence = interaction.peek(BACKGROUND_COUNTER);
        let id = self.scheduler.schedule(dto, interaction.id(), sequence)?;
        interaction.next(BACKGROUND_COUNTER);
        // The originating command is now referenced by its child.
        interaction.command_mut().hint_persist();

        info!(
            interaction_id = %id,
            parent = %interaction.id(),
            sequence,
            member = %member.id(),
            targets = targets.len(),
            "captured background command"
        );
        Ok(Intercepted::Scheduled { id, sequence })
    }
}

/// Describe `args` as descriptor parameters: objects by reference, values inline.
pub(crate) fn describe_args(
    codec: &dyn MementoCodec,
    member: &MemberRef<'_>,
    args: &[Arg],
) -> Result<Vec<ParamDto>, InterceptError> {
    let params = member.params();
    args.iter()
        .enumerate()
        .map(|(i, arg)| {
            let name = params
                .get(i)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| format!("arg{i}"));
            let value = match arg {
                Arg::Object(object) => ArgumentDto::Reference(object.bookmark().clone()),
                Arg::Value(value) if codec.can_inline(value) => ArgumentDto::Value(value.clone()),
                Arg::Value(_) => {
                    return Err(InterceptError::NotCapturable {
                        member: member.id().clone(),
                        param: name,
                    });
                }
            };
            Ok(ParamDto { name, value })
        })
        .collect()
}

/// A domain object whose actions are captured instead of executed.
///
/// Dereferences to the wrapped object for everything else.
pub struct BackgroundProxy<'a, T> {
    service: &'a BackgroundService,
    target: &'a T,
}

impl<T: DomainObject> BackgroundProxy<'_, T> {
    /// Invoke `member` by name.
    ///
    /// Nothing is executed: an action becomes a pending background command and the call
    /// returns immediately.
    pub fn invoke(
        &self,
        interaction: &mut Interaction,
        member: &str,
        args: &[Arg],
    ) -> Result<Intercepted, InterceptError> {
        let target: &dyn DomainObject = self.target;
        self.service.capture(interaction, &[target], member, args)
    }

    pub fn target(&self) -> &T {
        self.target
    }
}

impl<T> Deref for BackgroundProxy<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.target
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use reify_commands::MemberInteraction;
    use reify_core::{FixedClock, UserMemento, Value};
    use reify_demo::{Customer, Invoice, Order};

    use super::*;
    use crate::persistence::{CommandRepository, InMemoryCommandRepository};

    /// Refuses the first `refusals` schedules, then delegates.
    struct RefusingScheduler {
        inner: Arc<InMemoryCommandRepository>,
        refusals: std::sync::Mutex<usize>,
    }

    impl BackgroundCommandScheduler for RefusingScheduler {
        fn schedule(
            &self,
            dto: CommandDto,
            parent: InteractionId,
            sequence: u32,
        ) -> Result<InteractionId, RepositoryError> {
            let mut refusals = self.refusals.lock().unwrap();
            if *refusals > 0 {
                *refusals -= 1;
                return Err(RepositoryError::Storage("queue unavailable".to_string()));
            }
            self.inner.schedule(dto, parent, sequence)
        }
    }

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 14, 30, 0).unwrap()
    }

    fn service(repo: Arc<InMemoryCommandRepository>) -> BackgroundService {
        let metamodel = Arc::new(reify_demo::metamodel().unwrap());
        BackgroundService::new(metamodel, repo).with_clock(Arc::new(FixedClock::new(test_time())))
    }

    fn interaction() -> Interaction {
        Interaction::open(InteractionId::new(), UserMemento::new("alice"), test_time())
    }

    #[test]
    fn reads_go_through_to_the_target() {
        let repo = InMemoryCommandRepository::arc();
        let service = service(repo);
        let invoice = Invoice::new("INV-1", 99.0);

        let proxy = service.proxy(&invoice);
        assert_eq!(proxy.number, "INV-1");
        assert_eq!(*proxy.target(), invoice);
    }

    #[test]
    fn unknown_members_pass_through() {
        let repo = InMemoryCommandRepository::arc();
        let service = service(repo.clone());
        let invoice = Invoice::new("INV-1", 99.0);
        let mut interaction = interaction();

        let outcome = service
            .proxy(&invoice)
            .invoke(&mut interaction, "toString", &[])
            .unwrap();

        assert_eq!(outcome, Intercepted::PassThrough);
        assert!(repo.is_empty());
        assert!(!interaction.command().persist_hint());
    }

    #[test]
    fn mixed_arguments_are_captured_per_argument() {
        let repo = InMemoryCommandRepository::arc();
        let service = service(repo.clone());
        let invoice = Invoice::new("INV-1", 99.0);
        let customer = Customer::new("C-1", "Acme");
        let mut interaction = interaction();

        let Intercepted::Scheduled { id, .. } = service
            .proxy(&invoice)
            .invoke(
                &mut interaction,
                "assignCustomer",
                &[Arg::Object(reify_metamodel::ObjectArg::new(Arc::new(customer)))],
            )
            .unwrap()
        else {
            panic!("expected a scheduled command");
        };

        let command = repo.find(id).unwrap().unwrap();
        let dto = command.dto().unwrap();
        let MemberInteraction::ActionInvocation { parameters, .. } = &dto.member else {
            panic!("expected an action invocation");
        };
        assert_eq!(parameters[0].name, "customer");
        assert_eq!(
            parameters[0].value,
            ArgumentDto::Reference(Bookmark::new("Customer", "C-1"))
        );
        assert_eq!(dto.user, "alice");
        assert_eq!(dto.timestamp, test_time());
        assert!(interaction.command().persist_hint());
    }

    #[test]
    fn uncapturable_values_are_refused() {
        let repo = InMemoryCommandRepository::arc();
        let service = service(repo.clone());
        let order = Order::new("SO-1", 10.0);
        let mut interaction = interaction();

        let err = service
            .proxy(&order)
            .invoke(&mut interaction, "applyDiscount", &[Arg::from(Value::Double(f64::NAN))])
            .unwrap_err();

        assert!(matches!(err, InterceptError::NotCapturable { ref param, .. } if param == "percent"));
        assert!(repo.is_empty());
    }

    #[test]
    fn bulk_targets_share_a_type() {
        let repo = InMemoryCommandRepository::arc();
        let service = service(repo.clone());
        let invoice = Invoice::new("INV-1", 99.0);
        let order = Order::new("SO-1", 10.0);
        let mut interaction = interaction();

        let targets: [&dyn DomainObject; 2] = [&invoice, &order];
        let err = service
            .invoke_bulk(&mut interaction, &targets, "approve", &[])
            .unwrap_err();
        assert!(matches!(err, InterceptError::MixedTargetTypes { .. }));

        let err = service
            .invoke_bulk(&mut interaction, &[], "approve", &[])
            .unwrap_err();
        assert!(matches!(err, InterceptError::NoTargets));
    }

    #[test]
    fn failed_schedules_do_not_use_up_a_sequence_number() {
        let repo = InMemoryCommandRepository::arc();
        let scheduler = Arc::new(RefusingScheduler {
            inner: repo.clone(),
            refusals: std::sync::Mutex::new(1),
        });
        let metamodel = Arc::new(reify_demo::metamodel().unwrap());
        let service = BackgroundService::new(metamodel, scheduler);
        let invoice = Invoice::new("INV-1", 99.0);
        let mut interaction = interaction();

        let err = service
            .proxy(&invoice)
            .invoke(&mut interaction, "approve", &[])
            .unwrap_err();
        assert!(matches!(err, InterceptError::Schedule(_)));
        assert!(!interaction.command().persist_hint());

        let outcome = service
            .proxy(&invoice)
            .invoke(&mut interaction, "approve", &[])
            .unwrap();
        assert!(matches!(outcome, Intercepted::Scheduled { sequence: 0, .. }));
        assert_eq!(repo.len(), 1);
    }
}

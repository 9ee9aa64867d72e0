//! Invoices, plus the `remind` action contributed to them by a mixin.

use serde::{Deserialize, Serialize};

use reify_core::{Bookmark, DomainError, DomainObject, ValueKind};
use reify_metamodel::{
    CommandPersistence, MetamodelError, MixinSpec, ObjectSpec, ParamKind, ParamSpec,
};

use crate::customer::{self, Customer};
use crate::{arg, domain_object};

pub const TYPE: &str = "Invoice";

/// Mixin type contributing `remind` to invoices.
pub const REMIND_MIXIN: &str = "Invoice_remind";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub number: String,
    pub amount: f64,
    pub approved: bool,
    /// Who the approval ran as.
    pub approved_by: Option<String>,
    pub customer: Option<Bookmark>,
    pub notes: Option<String>,
    /// Channels reminders were sent through, oldest first.
    pub reminders: Vec<String>,
}

impl Invoice {
    pub fn new(number: impl Into<String>, amount: f64) -> Self {
        Self {
            number: number.into(),
            amount,
            approved: false,
            approved_by: None,
            customer: None,
            notes: None,
            reminders: Vec::new(),
        }
    }
}

domain_object!(Invoice, TYPE, number);

pub fn spec() -> Result<ObjectSpec, MetamodelError> {
    ObjectSpec::builder::<Invoice>(TYPE)
        // Returns the invoice itself.
        .action("approve", vec![], |invoice, _, user| {
            if invoice.approved {
                return Err(DomainError::invariant(format!(
                    "invoice {} is already approved",
                    invoice.number
                )));
            }
            invoice.approved = true;
            invoice.approved_by = Some(user.name.clone());
            Ok(Some(invoice.bookmark()))
        })
        .action(
            "assignCustomer",
            vec![ParamSpec::reference("customer", customer::TYPE)],
            |invoice, args, _| {
                let customer = arg(args, 0)?.as_object::<Customer>()?;
                if customer.blocked {
                    return Err(DomainError::validation(format!(
                        "customer {} is blocked",
                        customer.id
                    )));
                }
                invoice.customer = Some(customer.bookmark());
                Ok(Some(invoice.bookmark()))
            },
        )
        .action_with_persistence(
            "annotate",
            vec![ParamSpec::value("note", ValueKind::Text).optional()],
            CommandPersistence::IfHinted,
            |invoice, args, _| {
                invoice.notes = arg(args, 0)?.as_opt_text()?.map(str::to_string);
                Ok(None)
            },
        )
        .property(
            "customer",
            ParamKind::Reference(customer::TYPE.to_string()),
            |invoice, value, _| {
                invoice.customer = value.bookmark().cloned();
                Ok(())
            },
        )
        .property("notes", ParamKind::Value(ValueKind::Text), |invoice, value, _| {
            invoice.notes = value.as_opt_text()?.map(str::to_string);
            Ok(())
        })
        .read_only_property("number", ParamKind::Value(ValueKind::Text))
        .read_only_property("amount", ParamKind::Value(ValueKind::Double))
        .collection("lines", "InvoiceLine")
        .build()
}

/// `Invoice#remind`, contributed by the `Invoice_remind` mixin. Void.
pub fn remind_mixin() -> MixinSpec {
    MixinSpec::action::<Invoice, _>(
        REMIND_MIXIN,
        TYPE,
        "remind",
        vec![ParamSpec::value("channel", ValueKind::Text)],
        |invoice, args, _| {
            if !invoice.approved {
                return Err(DomainError::invariant(format!(
                    "invoice {} is not approved yet",
                    invoice.number
                )));
            }
            let channel = arg(args, 0)?.as_text()?;
            invoice.reminders.push(channel.to_string());
            Ok(None)
        },
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use reify_core::UserMemento;
    use reify_metamodel::{Arg, ObjectArg};

    use super::*;

    fn alice() -> UserMemento {
        UserMemento::new("alice")
    }

    #[test]
    fn approve_returns_the_invoice_and_refuses_twice() {
        let spec = spec().unwrap();
        let approve = spec.action("approve").unwrap();
        let mut invoice = Invoice::new("INV-1", 120.0);

        let result = approve.invoke(&mut invoice, &[], &alice()).unwrap();
        assert_eq!(result, Some(Bookmark::new(TYPE, "INV-1")));
        assert!(invoice.approved);
        assert_eq!(invoice.approved_by.as_deref(), Some("alice"));

        assert!(matches!(
            approve.invoke(&mut invoice, &[], &alice()),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn blocked_customers_cannot_be_assigned() {
        let spec = spec().unwrap();
        let assign = spec.action("assignCustomer").unwrap();
        let mut invoice = Invoice::new("INV-1", 120.0);
        let mut customer = Customer::new("C-1", "Acme");
        customer.blocked = true;

        let args = [Arg::Object(ObjectArg::new(Arc::new(customer)))];
        assert!(matches!(
            assign.invoke(&mut invoice, &args, &alice()),
            Err(DomainError::Validation(_))
        ));
        assert_eq!(invoice.customer, None);
    }

    #[test]
    fn reminders_need_approval() {
        let mixin = remind_mixin();
        let mut invoice = Invoice::new("INV-1", 120.0);
        let args = [Arg::from(reify_core::Value::from("email"))];

        assert!(mixin.contributed_action().invoke(&mut invoice, &args, &alice()).is_err());

        invoice.approved = true;
        mixin.contributed_action().invoke(&mut invoice, &args, &alice()).unwrap();
        assert_eq!(invoice.reminders, vec!["email".to_string()]);
    }
}

//! `reify-demo`: a small invoicing domain wired into the metamodel.
//!
//! Used by the runtime tests and by the worker binary.

use tracing::info;

use reify_core::{DomainError, DomainResult};
use reify_metamodel::{Arg, Metamodel, MetamodelError};

pub mod customer;
pub mod invoice;
pub mod order;

pub use customer::Customer;
pub use invoice::Invoice;
pub use order::Order;

/// Register every demo type and mixin.
pub fn register(metamodel: &mut Metamodel) -> Result<(), MetamodelError> {
    metamodel.register(customer::spec()?)?;
    metamodel.register(invoice::spec()?)?;
    metamodel.register(order::spec()?)?;
    metamodel.register_mixin(invoice::remind_mixin())?;
    info!(types = 3, mixins = 1, "demo domain registered");
    Ok(())
}

/// A fresh metamodel containing the demo domain.
pub fn metamodel() -> Result<Metamodel, MetamodelError> {
    let mut metamodel = Metamodel::new();
    register(&mut metamodel)?;
    Ok(metamodel)
}

pub(crate) fn arg(args: &[Arg], index: usize) -> DomainResult<&Arg> {
    args.get(index)
        .ok_or_else(|| DomainError::validation(format!("missing argument #{index}")))
}

/// Implements the [`reify_core::DomainObject`] plumbing for a demo type.
macro_rules! domain_object {
    ($ty:ty, $type_name:expr, $id:ident) => {
        impl reify_core::DomainObject for $ty {
            fn object_type(&self) -> &str {
                $type_name
            }

            fn object_id(&self) -> String {
                self.$id.clone()
            }

            fn clone_object(&self) -> Box<dyn reify_core::DomainObject> {
                Box::new(self.clone())
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                self
            }
        }
    };
}

pub(crate) use domain_object;

use serde::{Deserialize, Serialize};

use reify_core::{DomainError, DomainObject, ValueKind};
use reify_metamodel::{MetamodelError, ObjectSpec, ParamKind, ParamSpec};

use crate::{arg, domain_object};

pub const TYPE: &str = "Order";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub number: String,
    pub total: f64,
    pub discount_percent: f64,
    pub cancelled: bool,
}

impl Order {
    pub fn new(number: impl Into<String>, total: f64) -> Self {
        Self {
            number: number.into(),
            total,
            discount_percent: 0.0,
            cancelled: false,
        }
    }

    pub fn discounted_total(&self) -> f64 {
        self.total * (100.0 - self.discount_percent) / 100.0
    }
}

domain_object!(Order, TYPE, number);

pub fn spec() -> Result<ObjectSpec, MetamodelError> {
    ObjectSpec::builder::<Order>(TYPE)
        .action(
            "applyDiscount",
            vec![ParamSpec::value("percent", ValueKind::Double)],
            |order, args, _| {
                let percent = arg(args, 0)?.as_f64()?;
                if !(0.0..=100.0).contains(&percent) {
                    return Err(DomainError::validation(format!(
                        "discount must be between 0 and 100, got {percent}"
                    )));
                }
                if order.cancelled {
                    return Err(DomainError::invariant(format!(
                        "order {} is cancelled",
                        order.number
                    )));
                }
                order.discount_percent = percent;
                Ok(Some(order.bookmark()))
            },
        )
        .action("cancel", vec![], |order, _, _| {
            order.cancelled = true;
            Ok(None)
        })
        .read_only_property("total", ParamKind::Value(ValueKind::Double))
        .build()
}

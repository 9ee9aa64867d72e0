use serde::{Deserialize, Serialize};

use reify_core::{DomainError, ValueKind};
use reify_metamodel::{MetamodelError, ObjectSpec, ParamKind};

use crate::domain_object;

pub const TYPE: &str = "Customer";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub blocked: bool,
}

impl Customer {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            blocked: false,
        }
    }
}

domain_object!(Customer, TYPE, id);

pub fn spec() -> Result<ObjectSpec, MetamodelError> {
    ObjectSpec::builder::<Customer>(TYPE)
        .action("block", vec![], |customer, _, _| {
            customer.blocked = true;
            Ok(None)
        })
        .property("name", ParamKind::Value(ValueKind::Text), |customer, value, _| {
            let name = value
                .as_opt_text()?
                .ok_or_else(|| DomainError::validation("customer name is mandatory"))?;
            customer.name = name.to_string();
            Ok(())
        })
        .read_only_property("id", ParamKind::Value(ValueKind::Text))
        .build()
}

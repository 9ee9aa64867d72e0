//! Live arguments handed to member handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use reify_core::{Bookmark, DomainError, DomainObject, DomainResult, Value, downcast_ref};

/// A referenced domain object, resolved for the duration of one invocation.
///
/// Handlers get read-only access to referenced objects; only the invocation target is
/// mutable.
#[derive(Debug, Clone)]
pub struct ObjectArg {
    bookmark: Bookmark,
    object: Arc<dyn DomainObject>,
}

impl ObjectArg {
    pub fn new(object: Arc<dyn DomainObject>) -> Self {
        Self {
            bookmark: object.bookmark(),
            object,
        }
    }

    pub fn bookmark(&self) -> &Bookmark {
        &self.bookmark
    }

    pub fn object(&self) -> &dyn DomainObject {
        self.object.as_ref()
    }
}

/// One argument of an action invocation (or the new value of a property edit).
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    Object(ObjectArg),
}

impl Arg {
    pub fn null() -> Self {
        Arg::Value(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Arg::Value(Value::Null))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Arg::Value(v) => Some(v),
            Arg::Object(_) => None,
        }
    }

    pub fn bookmark(&self) -> Option<&Bookmark> {
        match self {
            Arg::Object(o) => Some(o.bookmark()),
            Arg::Value(_) => None,
        }
    }

    pub fn as_bool(&self) -> DomainResult<bool> {
        match self {
            Arg::Value(Value::Bool(b)) => Ok(*b),
            other => Err(mismatch("bool", other)),
        }
    }

    pub fn as_i64(&self) -> DomainResult<i64> {
        match self {
            Arg::Value(Value::Int(i)) => Ok(*i),
            other => Err(mismatch("int", other)),
        }
    }

    pub fn as_f64(&self) -> DomainResult<f64> {
        match self {
            Arg::Value(Value::Double(d)) => Ok(*d),
            other => Err(mismatch("double", other)),
        }
    }

    pub fn as_text(&self) -> DomainResult<&str> {
        match self {
            Arg::Value(Value::Text(s)) => Ok(s),
            other => Err(mismatch("text", other)),
        }
    }

    /// `None` for a null argument, otherwise the text.
    pub fn as_opt_text(&self) -> DomainResult<Option<&str>> {
        if self.is_null() {
            return Ok(None);
        }
        self.as_text().map(Some)
    }

    pub fn as_timestamp(&self) -> DomainResult<DateTime<Utc>> {
        match self {
            Arg::Value(Value::Timestamp(t)) => Ok(*t),
            other => Err(mismatch("timestamp", other)),
        }
    }

    pub fn as_uuid(&self) -> DomainResult<Uuid> {
        match self {
            Arg::Value(Value::Uuid(u)) => Ok(*u),
            other => Err(mismatch("uuid", other)),
        }
    }

    /// Typed read-only view of a referenced object.
    pub fn as_object<T: DomainObject>(&self) -> DomainResult<&T> {
        match self {
            Arg::Object(o) => downcast_ref::<T>(o.object()).ok_or_else(|| {
                DomainError::validation(format!(
                    "argument {} is not of the expected type",
                    o.bookmark()
                ))
            }),
            other => Err(mismatch("object reference", other)),
        }
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

fn mismatch(expected: &str, found: &Arg) -> DomainError {
    let found = match found {
        Arg::Value(Value::Null) => "null".to_string(),
        Arg::Value(v) => v.kind().map(|k| k.to_string()).unwrap_or_default(),
        Arg::Object(o) => format!("reference to {}", o.bookmark()),
    };
    DomainError::validation(format!("expected {expected} argument, found {found}"))
}

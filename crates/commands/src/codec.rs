//! Decides whether an argument value can travel inline in a descriptor.

use reify_core::Value;

/// Pluggable "can this value be set directly in the memento" predicate.
///
/// Values the codec refuses cannot be captured; domain objects never go through it,
/// they always become references.
pub trait MementoCodec: Send + Sync {
    fn can_inline(&self, value: &Value) -> bool;
}

/// Accepts a value iff it survives a JSON round trip unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMementoCodec;

impl MementoCodec for JsonMementoCodec {
    fn can_inline(&self, value: &Value) -> bool {
        // NaN and infinities serialize to `null` and would come back as something else.
        if let Value::Double(d) = value {
            if !d.is_finite() {
                return false;
            }
        }
        serde_json::to_string(value)
            .and_then(|raw| serde_json::from_str::<Value>(&raw))
            .is_ok_and(|back| &back == value)
    }
}

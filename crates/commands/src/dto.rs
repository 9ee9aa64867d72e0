//! The invocation descriptor ("command memento").
//!
//! Wire shape (JSON):
//!
//! ```text
//! {
//!   "majorVersion": "2", "minorVersion": "0",
//!   "interactionId": "...", "user": "alice", "timestamp": "...",
//!   "targets": [{"objectType": "Invoice", "identifier": "INV-7"}],
//!   "member": {
//!     "interactionType": "ACTION_INVOCATION",
//!     "memberIdentifier": "Order#applyDiscount",
//!     "parameters": [{"name": "percent", "value": {"value": {"type": "double", "value": 12.5}}}]
//!   }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reify_core::{Bookmark, InteractionId, Value};
use reify_metamodel::MemberId;

use crate::error::DtoError;

pub const DTO_MAJOR_VERSION: &str = "2";
pub const DTO_MINOR_VERSION: &str = "0";

/// A single argument (or new property value): inline, or a reference to a domain object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentDto {
    Value(Value),
    Reference(Bookmark),
}

impl ArgumentDto {
    pub fn null() -> Self {
        ArgumentDto::Value(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamDto {
    pub name: String,
    pub value: ArgumentDto,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionType {
    ActionInvocation,
    PropertyEdit,
}

/// What the descriptor asks to do to its targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "interactionType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemberInteraction {
    #[serde(rename_all = "camelCase")]
    ActionInvocation {
        member_identifier: MemberId,
        parameters: Vec<ParamDto>,
    },
    #[serde(rename_all = "camelCase")]
    PropertyEdit {
        member_identifier: MemberId,
        new_value: ArgumentDto,
    },
}

impl MemberInteraction {
    pub fn member_identifier(&self) -> &MemberId {
        match self {
            MemberInteraction::ActionInvocation {
                member_identifier, ..
            }
            | MemberInteraction::PropertyEdit {
                member_identifier, ..
            } => member_identifier,
        }
    }

    pub fn interaction_type(&self) -> InteractionType {
        match self {
            MemberInteraction::ActionInvocation { .. } => InteractionType::ActionInvocation,
            MemberInteraction::PropertyEdit { .. } => InteractionType::PropertyEdit,
        }
    }
}

/// Immutable, serializable record of "which member, on which targets, with which
/// arguments, invoked by whom, when".
///
/// More than one target means a bulk invocation: the member is applied to each target
/// in turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandDto {
    pub major_version: String,
    pub minor_version: String,
    pub interaction_id: InteractionId,
    pub user: String,
    pub timestamp: DateTime<Utc>,
    pub targets: Vec<Bookmark>,
    pub member: MemberInteraction,
}

impl CommandDto {
    pub fn action_invocation(
        interaction_id: InteractionId,
        user: impl Into<String>,
        timestamp: DateTime<Utc>,
        targets: Vec<Bookmark>,
        member_identifier: MemberId,
        parameters: Vec<ParamDto>,
    ) -> Self {
        Self::with_member(
            interaction_id,
            user.into(),
            timestamp,
            targets,
            MemberInteraction::ActionInvocation {
                member_identifier,
                parameters,
            },
        )
    }

    pub fn property_edit(
        interaction_id: InteractionId,
        user: impl Into<String>,
        timestamp: DateTime<Utc>,
        targets: Vec<Bookmark>,
        member_identifier: MemberId,
        new_value: ArgumentDto,
    ) -> Self {
        Self::with_member(
            interaction_id,
            user.into(),
            timestamp,
            targets,
            MemberInteraction::PropertyEdit {
                member_identifier,
                new_value,
            },
        )
    }

    fn with_member(
        interaction_id: InteractionId,
        user: String,
        timestamp: DateTime<Utc>,
        targets: Vec<Bookmark>,
        member: MemberInteraction,
    ) -> Self {
        Self {
            major_version: DTO_MAJOR_VERSION.to_string(),
            minor_version: DTO_MINOR_VERSION.to_string(),
            interaction_id,
            user,
            timestamp,
            targets,
            member,
        }
    }

    pub fn member_identifier(&self) -> &MemberId {
        self.member.member_identifier()
    }

    pub fn interaction_type(&self) -> InteractionType {
        self.member.interaction_type()
    }

    pub fn to_json(&self) -> Result<String, DtoError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a descriptor, refusing major versions this build does not understand.
    pub fn from_json(raw: &str) -> Result<Self, DtoError> {
        let dto: CommandDto = serde_json::from_str(raw)?;
        if dto.major_version != DTO_MAJOR_VERSION {
            return Err(DtoError::UnsupportedVersion {
                found: format!("{}.{}", dto.major_version, dto.minor_version),
                expected: DTO_MAJOR_VERSION.to_string(),
            });
        }
        Ok(dto)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use proptest::prelude::*;

    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 14, 30, 0).unwrap()
    }

    fn discount_dto(percent: f64) -> CommandDto {
        CommandDto::action_invocation(
            InteractionId::new(),
            "alice",
            test_time(),
            vec![Bookmark::new("Order", "SO-1")],
            MemberId::new("Order", "applyDiscount"),
            vec![ParamDto {
                name: "percent".to_string(),
                value: ArgumentDto::Value(Value::Double(percent)),
            }],
        )
    }

    #[test]
    fn wire_shape_is_tagged_by_interaction_type() {
        let dto = discount_dto(12.5);
        let json: serde_json::Value = serde_json::from_str(&dto.to_json().unwrap()).unwrap();

        assert_eq!(json["majorVersion"], "2");
        assert_eq!(json["member"]["interactionType"], "ACTION_INVOCATION");
        assert_eq!(json["member"]["memberIdentifier"], "Order#applyDiscount");
        assert_eq!(
            json["member"]["parameters"][0]["value"]["value"],
            serde_json::json!({"type": "double", "value": 12.5})
        );
        assert_eq!(json["targets"][0]["objectType"], "Order");
    }

    #[test]
    fn property_edit_round_trips() {
        let dto = CommandDto::property_edit(
            InteractionId::new(),
            "bob",
            test_time(),
            vec![Bookmark::new("Invoice", "INV-1")],
            MemberId::new("Invoice", "customer"),
            ArgumentDto::Reference(Bookmark::new("Customer", "C-9")),
        );

        let back = CommandDto::from_json(&dto.to_json().unwrap()).unwrap();
        assert_eq!(back, dto);
        assert_eq!(back.interaction_type(), InteractionType::PropertyEdit);
    }

    #[test]
    fn newer_major_versions_are_refused() {
        let mut dto = discount_dto(1.0);
        dto.major_version = "3".to_string();

        let err = CommandDto::from_json(&dto.to_json().unwrap()).unwrap_err();
        assert!(matches!(err, DtoError::UnsupportedVersion { found, .. } if found == "3.0"));
    }

    #[test]
    fn malformed_member_identifier_is_a_parse_error() {
        let raw = discount_dto(1.0)
            .to_json()
            .unwrap()
            .replace("Order#applyDiscount", "applyDiscount");
        assert!(matches!(CommandDto::from_json(&raw), Err(DtoError::Json(_))));
    }

    fn arb_argument() -> impl Strategy<Value = ArgumentDto> {
        prop_oneof![
            Just(ArgumentDto::null()),
            any::<bool>().prop_map(|b| ArgumentDto::Value(Value::Bool(b))),
            any::<i64>().prop_map(|i| ArgumentDto::Value(Value::Int(i))),
            any::<f64>()
                .prop_filter("finite", |d| d.is_finite())
                .prop_map(|d| ArgumentDto::Value(Value::Double(d))),
            ".{0,24}".prop_map(|s| ArgumentDto::Value(Value::Text(s))),
            any::<u128>().prop_map(|u| ArgumentDto::Value(Value::Uuid(uuid::Uuid::from_u128(u)))),
            ("[A-Z][a-z]{1,8}", "[A-Za-z0-9:-]{1,12}")
                .prop_map(|(t, id)| ArgumentDto::Reference(Bookmark::new(t, id))),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: every supported argument survives the JSON descriptor unchanged,
        /// including exact double precision.
        #[test]
        fn arguments_survive_serialization(args in prop::collection::vec(arb_argument(), 0..6)) {
            let parameters = args
                .iter()
                .enumerate()
                .map(|(i, value)| ParamDto { name: format!("p{i}"), value: value.clone() })
                .collect();
            let dto = CommandDto::action_invocation(
                InteractionId::new(),
                "alice",
                test_time(),
                vec![Bookmark::new("Order", "SO-1")],
                MemberId::new("Order", "anything"),
                parameters,
            );

            let back = CommandDto::from_json(&dto.to_json().unwrap()).unwrap();
            prop_assert_eq!(back, dto);
        }
    }
}

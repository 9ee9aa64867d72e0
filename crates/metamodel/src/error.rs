use thiserror::Error;

/// Metamodel lookup / registration failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetamodelError {
    #[error("unknown type '{0}'")]
    UnknownType(String),

    #[error("unknown action '{member}' on type '{type_name}'")]
    UnknownAction { type_name: String, member: String },

    #[error("unknown property '{member}' on type '{type_name}'")]
    UnknownProperty { type_name: String, member: String },

    #[error("type '{type_name}' already declares a member named '{member}'")]
    DuplicateMember { type_name: String, member: String },

    #[error("type '{0}' is already registered")]
    DuplicateType(String),

    #[error("invalid member identifier: {0}")]
    InvalidMemberId(String),

    /// Argument count or types do not match the member's declared signature.
    #[error("argument mismatch for '{member}': {reason}")]
    ArgumentMismatch { member: String, reason: String },
}

impl MetamodelError {
    pub fn argument_mismatch(member: impl ToString, reason: impl Into<String>) -> Self {
        Self::ArgumentMismatch {
            member: member.to_string(),
            reason: reason.into(),
        }
    }
}

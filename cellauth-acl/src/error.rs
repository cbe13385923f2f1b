use thiserror::Error;

use crate::privilege::AclLevel;

/// Structural defects found when an ACL is set, or failures decoding one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AclError {
    #[error("ace #{index} is malformed: {reason}")]
    MalformedAce { index: usize, reason: String },

    #[error("unknown {level} privilege '{name}'")]
    UnknownPrivilege { name: String, level: AclLevel },

    #[error("ace #{index} has no principal")]
    MissingPrincipal { index: usize },

    #[error("invalid ACL document: {0}")]
    Format(String),
}

impl AclError {
    pub fn format(message: impl Into<String>) -> Self {
        AclError::Format(message.into())
    }
}

impl From<quick_xml::Error> for AclError {
    fn from(error: quick_xml::Error) -> Self {
        AclError::Format(format!("xml: {error}"))
    }
}

impl From<quick_xml::events::attributes::AttrError> for AclError {
    fn from(error: quick_xml::events::attributes::AttrError) -> Self {
        AclError::Format(format!("xml attribute: {error}"))
    }
}

impl From<serde_json::Error> for AclError {
    fn from(error: serde_json::Error) -> Self {
        AclError::Format(format!("json: {error}"))
    }
}

//! Protocol error taxonomy reported back to the assistant

use serde_json::{Value, json};
use thiserror::Error;

use super::response::{Generation, Header, directive};

/// Namespace every error envelope is reported under
pub const ERROR_NAMESPACE: &str = "Alexa.ConnectedHome.Control";

/// Errors rendered as structured error responses
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DirectiveError {
    /// The directive references an unknown device
    #[error("unsupported target")]
    UnsupportedTarget,

    /// Unknown namespace/name pair, or no backend mapping
    #[error("unsupported operation")]
    UnsupportedOperation,

    /// Absolute value outside the declared bounds
    #[error("value out of range [{min}, {max}]")]
    ValueOutOfRange { min: f64, max: f64 },

    /// Authentication failed
    #[error("invalid access token")]
    InvalidAccessToken,

    /// Unrecognised top-level namespace
    #[error("unexpected information received: {faulting}")]
    UnexpectedInformationReceived { faulting: String },
}

impl DirectiveError {
    /// Wire name of the error
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::UnsupportedTarget => "UnsupportedTargetError",
            Self::UnsupportedOperation => "UnsupportedOperationError",
            Self::ValueOutOfRange { .. } => "ValueOutOfRangeError",
            Self::InvalidAccessToken => "InvalidAccessTokenError",
            Self::UnexpectedInformationReceived { .. } => "UnexpectedInformationReceivedError",
        }
    }

    fn payload(&self) -> Value {
        match self {
            Self::ValueOutOfRange { min, max } => {
                json!({ "minimumValue": min, "maximumValue": max })
            }
            Self::UnexpectedInformationReceived { faulting } => {
                json!({ "faultingParameter": faulting })
            }
            _ => json!({}),
        }
    }

    /// Render the error envelope
    #[must_use]
    pub fn to_response(&self) -> Value {
        let header = Header::new(Generation::V2, ERROR_NAMESPACE, self.name());
        directive(&header, self.payload())
    }
}

//! Wire protocol: inbound shapes, response envelopes and error taxonomy

mod error;
pub mod response;
pub mod skill;
pub mod smarthome;

pub use error::{DirectiveError, ERROR_NAMESPACE};
pub use response::{Generation, Header, Property};
pub use skill::{SkillEnvelope, SkillRequest, SkillResponse};
pub use smarthome::{DirectiveV2, DirectiveV3};

use serde_json::Value;

use crate::error::{Error, Result};

/// An inbound request, classified once at ingress
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Flat `{header, payload}` smart-home directive
    SmartHomeV2(DirectiveV2),
    /// Nested `{directive: {header, endpoint, payload}}` smart-home directive
    SmartHomeV3(DirectiveV3),
    /// Conversational `{session, context, request}` request
    Skill(Box<SkillEnvelope>),
}

impl Inbound {
    /// Classify and parse a request body
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] when the body matches no known shape.
    pub fn parse(mut value: Value) -> Result<Self> {
        if value.get("request").is_some() {
            return Ok(Self::Skill(Box::new(serde_json::from_value(value)?)));
        }
        if let Some(directive) = value.get_mut("directive") {
            return Ok(Self::SmartHomeV3(serde_json::from_value(directive.take())?));
        }
        if value.get("header").is_some() {
            return Ok(Self::SmartHomeV2(serde_json::from_value(value)?));
        }
        Err(Error::Malformed(
            "expected one of `request`, `directive` or `header`".to_string(),
        ))
    }

    /// Request namespace, when the request is a directive
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::SmartHomeV2(d) => Some(&d.header.namespace),
            Self::SmartHomeV3(d) => Some(&d.header.namespace),
            Self::Skill(_) => None,
        }
    }
}

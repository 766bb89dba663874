//! Conversational skill request and response shapes

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A full skill request envelope
#[derive(Debug, Clone, Deserialize)]
pub struct SkillEnvelope {
    #[serde(default)]
    pub session: Option<Session>,
    #[serde(default)]
    pub context: Option<Context>,
    pub request: SkillRequest,
}

impl SkillEnvelope {
    /// Conversation id, `None` when no session or an empty id was sent
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session
            .as_ref()
            .map(|s| s.session_id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// Declared skill application id
    #[must_use]
    pub fn application_id(&self) -> Option<&str> {
        self.session
            .as_ref()
            .and_then(|s| s.application.as_ref())
            .map(|a| a.application_id.as_str())
    }

    /// Id of the echo device that heard the utterance
    #[must_use]
    pub fn echo_id(&self) -> Option<&str> {
        self.system()
            .and_then(|s| s.device.as_ref())
            .map(|d| d.device_id.as_str())
    }

    /// Bearer token from the system context or the session
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.system_user()
            .and_then(|u| u.access_token.as_deref())
            .or_else(|| self.session_user().and_then(|u| u.access_token.as_deref()))
    }

    /// Consent token for user permissions
    #[must_use]
    pub fn consent_token(&self) -> Option<&str> {
        self.system_user()
            .and_then(User::consent_token)
            .or_else(|| self.session_user().and_then(User::consent_token))
    }

    fn system(&self) -> Option<&SystemContext> {
        self.context.as_ref().and_then(|c| c.system.as_ref())
    }

    fn system_user(&self) -> Option<&User> {
        self.system().and_then(|s| s.user.as_ref())
    }

    fn session_user(&self) -> Option<&User> {
        self.session.as_ref().and_then(|s| s.user.as_ref())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub new: bool,
    pub session_id: String,
    #[serde(default)]
    pub application: Option<Application>,
    #[serde(default)]
    pub user: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub application_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub permissions: Option<Value>,
}

impl User {
    fn consent_token(&self) -> Option<&str> {
        self.permissions
            .as_ref()
            .and_then(|p| p.get("consentToken"))
            .and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Context {
    #[serde(rename = "System", default)]
    pub system: Option<SystemContext>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemContext {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub device: Option<EchoDevice>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EchoDevice {
    pub device_id: String,
}

/// Request body, discriminated by `type`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum SkillRequest {
    LaunchRequest,
    IntentRequest { intent: Intent },
    SessionEndedRequest,
    #[serde(other)]
    Other,
}

impl SkillRequest {
    /// Wire name of the request type
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::LaunchRequest => "LaunchRequest",
            Self::IntentRequest { .. } => "IntentRequest",
            Self::SessionEndedRequest => "SessionEndedRequest",
            Self::Other => "Unknown",
        }
    }
}

/// Spoken intent with its slots
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Intent {
    pub name: String,
    #[serde(default)]
    pub slots: BTreeMap<String, Slot>,
}

impl Intent {
    /// Non-empty value of slot `name`
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<&str> {
        self.slots
            .get(name)
            .and_then(|s| s.value.as_deref())
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Slot {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

/// Skill response envelope
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillResponse {
    pub version: &'static str,
    pub session_attributes: BTreeMap<String, Value>,
    pub response: ResponseBody,
}

impl SkillResponse {
    /// Plain-text answer
    #[must_use]
    pub fn say(text: impl Into<String>, end_session: bool) -> Self {
        Self {
            version: "1.0",
            session_attributes: BTreeMap::new(),
            response: ResponseBody {
                output_speech: OutputSpeech::plain(text),
                reprompt: None,
                card: None,
                should_end_session: end_session,
            },
        }
    }

    #[must_use]
    pub fn with_reprompt(mut self, text: impl Into<String>) -> Self {
        self.response.reprompt = Some(Reprompt {
            output_speech: OutputSpeech::plain(text),
        });
        self
    }

    #[must_use]
    pub fn with_card(mut self, title: impl Into<String>, content: impl Into<String>) -> Self {
        self.response.card = Some(Card::Simple {
            title: title.into(),
            content: content.into(),
        });
        self
    }

    /// Spoken text (plain or SSML)
    #[must_use]
    pub fn speech(&self) -> &str {
        match &self.response.output_speech {
            OutputSpeech::PlainText { text } => text,
            OutputSpeech::Ssml { ssml } => ssml,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    pub output_speech: OutputSpeech,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reprompt: Option<Reprompt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card: Option<Card>,
    pub should_end_session: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum OutputSpeech {
    PlainText { text: String },
    #[serde(rename = "SSML")]
    Ssml { ssml: String },
}

impl OutputSpeech {
    #[must_use]
    pub fn plain(text: impl Into<String>) -> Self {
        Self::PlainText { text: text.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reprompt {
    pub output_speech: OutputSpeech,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Card {
    Simple { title: String, content: String },
}

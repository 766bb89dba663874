//! Smart-home directive shapes (flat v2 and nested v3)

use serde::Deserialize;
use serde_json::{Value, json};

/// Request header shared by both generations
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestHeader {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub correlation_token: Option<String>,
}

/// Endpoint reference of a v3 directive
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[serde(default)]
    pub scope: Value,
    #[serde(default)]
    pub endpoint_id: Option<String>,
    #[serde(default)]
    pub cookie: Value,
}

/// Nested v3 directive
#[derive(Debug, Clone, Deserialize)]
pub struct DirectiveV3 {
    pub header: RequestHeader,
    #[serde(default)]
    pub endpoint: Option<Endpoint>,
    #[serde(default)]
    pub payload: Value,
}

impl DirectiveV3 {
    /// Backend device named by the endpoint cookie, lower-cased
    #[must_use]
    pub fn target_device(&self) -> Option<String> {
        self.endpoint
            .as_ref()
            .and_then(|e| e.cookie.get("device"))
            .and_then(Value::as_str)
            .map(str::to_lowercase)
    }

    /// `{scope, endpointId}` echoed back in responses
    #[must_use]
    pub fn endpoint_echo(&self) -> Value {
        self.endpoint.as_ref().map_or_else(
            || json!({}),
            |e| json!({ "scope": e.scope, "endpointId": e.endpoint_id }),
        )
    }

    /// Bearer token from the endpoint scope
    #[must_use]
    pub fn endpoint_token(&self) -> Option<&str> {
        self.endpoint
            .as_ref()
            .and_then(|e| e.scope.get("token"))
            .and_then(Value::as_str)
    }

    /// Bearer token from the payload scope (discovery, grants)
    #[must_use]
    pub fn payload_token(&self) -> Option<&str> {
        self.payload.pointer("/scope/token").and_then(Value::as_str)
    }

    /// Whether this is the grant-issuing authorization directive
    #[must_use]
    pub fn is_accept_grant(&self) -> bool {
        self.header.namespace == "Alexa.Authorization" && self.header.name == "AcceptGrant"
    }

    #[must_use]
    pub fn correlation_token(&self) -> Option<&str> {
        self.header.correlation_token.as_deref()
    }
}

/// Flat v2 directive
#[derive(Debug, Clone, Deserialize)]
pub struct DirectiveV2 {
    pub header: RequestHeader,
    #[serde(default)]
    pub payload: Value,
}

impl DirectiveV2 {
    /// Legacy bearer token carried in the payload
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.payload.get("accessToken").and_then(Value::as_str)
    }

    /// Backend device named by the appliance details, lower-cased
    #[must_use]
    pub fn target_device(&self) -> Option<String> {
        self.payload
            .pointer("/appliance/additionalApplianceDetails/device")
            .and_then(Value::as_str)
            .map(str::to_lowercase)
    }
}

/// Number at a JSON pointer, accepting numeric strings
#[must_use]
pub fn number_at(value: &Value, pointer: &str) -> Option<f64> {
    match value.pointer(pointer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v3_accessors() {
        let directive: DirectiveV3 = serde_json::from_value(json!({
            "header": {
                "namespace": "Alexa.PowerController",
                "name": "TurnOn",
                "payloadVersion": "3",
                "messageId": "1",
                "correlationToken": "corr"
            },
            "endpoint": {
                "scope": { "type": "BearerToken", "token": "tok" },
                "endpointId": "WZ_Lamp",
                "cookie": { "device": "WZ_Lamp" }
            },
            "payload": {}
        }))
        .unwrap();

        assert_eq!(directive.target_device().as_deref(), Some("wz_lamp"));
        assert_eq!(directive.endpoint_token(), Some("tok"));
        assert_eq!(directive.correlation_token(), Some("corr"));
        assert_eq!(directive.endpoint_echo()["endpointId"], "WZ_Lamp");
        assert!(!directive.is_accept_grant());
    }

    #[test]
    fn v2_accessors() {
        let directive: DirectiveV2 = serde_json::from_value(json!({
            "header": { "namespace": "Alexa.ConnectedHome.Control", "name": "TurnOnRequest" },
            "payload": {
                "accessToken": "tok",
                "appliance": { "additionalApplianceDetails": { "device": "Lamp" } }
            }
        }))
        .unwrap();

        assert_eq!(directive.access_token(), Some("tok"));
        assert_eq!(directive.target_device().as_deref(), Some("lamp"));
    }

    #[test]
    fn number_at_accepts_strings() {
        let value = json!({ "a": { "value": "21.5" }, "b": 3 });
        assert_eq!(number_at(&value, "/a/value"), Some(21.5));
        assert_eq!(number_at(&value, "/b"), Some(3.0));
        assert_eq!(number_at(&value, "/c"), None);
    }
}

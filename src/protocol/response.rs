//! Response envelopes for both smart-home API generations

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

/// Uncertainty window reported with every property
pub const UNCERTAINTY_MS: u32 = 500;

/// API generation of a directive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    V2,
    V3,
}

impl Generation {
    /// Version tag carried in response headers
    #[must_use]
    pub const fn payload_version(self) -> &'static str {
        match self {
            Self::V2 => "2",
            Self::V3 => "3",
        }
    }
}

/// Response header
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub namespace: String,
    pub name: String,
    pub payload_version: &'static str,
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_token: Option<String>,
}

impl Header {
    /// Header with a fresh message id
    #[must_use]
    pub fn new(generation: Generation, namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            payload_version: generation.payload_version(),
            message_id: Uuid::new_v4().to_string(),
            correlation_token: None,
        }
    }

    /// Echo the request's correlation token
    #[must_use]
    pub fn correlated(mut self, token: Option<&str>) -> Self {
        self.correlation_token = token.map(ToString::to_string);
        self
    }
}

/// A reported property in a v3 context
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub namespace: String,
    pub name: String,
    pub value: Value,
    pub time_of_sample: String,
    pub uncertainty_in_milliseconds: u32,
}

impl Property {
    /// Property sampled now
    #[must_use]
    pub fn now(namespace: &str, name: &str, value: Value) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            value,
            time_of_sample: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            uncertainty_in_milliseconds: UNCERTAINTY_MS,
        }
    }
}

/// `{header, payload}` envelope
#[must_use]
pub fn directive(header: &Header, payload: Value) -> Value {
    json!({ "header": header, "payload": payload })
}

/// `{event: {header, payload}}` envelope without context
#[must_use]
pub fn bare_event(header: &Header, payload: Value) -> Value {
    json!({ "event": { "header": header, "payload": payload } })
}

/// `{context, event: {header, endpoint, payload}}` envelope
#[must_use]
pub fn event(header: &Header, endpoint: Value, properties: &[Property]) -> Value {
    json!({
        "context": { "properties": properties },
        "event": {
            "header": header,
            "endpoint": endpoint,
            "payload": {},
        },
    })
}

/// Temperature value object in Celsius
#[must_use]
pub fn celsius(value: f64) -> Value {
    json!({ "value": number(value), "scale": "CELSIUS" })
}

/// JSON number, integral values without a fraction
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v3_header_carries_correlation_token() {
        let header = Header::new(Generation::V3, "Alexa", "Response").correlated(Some("abc"));
        let value = serde_json::to_value(&header).unwrap();

        assert_eq!(value["payloadVersion"], "3");
        assert_eq!(value["correlationToken"], "abc");
        assert_eq!(value["messageId"].as_str().unwrap().len(), 36);
    }

    #[test]
    fn v2_header_omits_correlation_token() {
        let header = Header::new(Generation::V2, "Alexa.ConnectedHome.Control", "X");
        let value = serde_json::to_value(&header).unwrap();

        assert_eq!(value["payloadVersion"], "2");
        assert!(value.get("correlationToken").is_none());
    }

    #[test]
    fn integral_numbers_drop_the_fraction() {
        assert_eq!(number(100.0), json!(100));
        assert_eq!(number(21.5), json!(21.5));
        assert_eq!(celsius(21.0), json!({ "value": 21, "scale": "CELSIUS" }));
    }

    #[test]
    fn event_envelope_shape() {
        let header = Header::new(Generation::V3, "Alexa", "Response");
        let prop = Property::now("Alexa.PowerController", "powerState", json!("ON"));
        let value = event(&header, json!({"endpointId": "lamp"}), &[prop]);

        let props = value["context"]["properties"].as_array().unwrap();
        assert_eq!(props.len(), 1);
        assert_eq!(props[0]["uncertaintyInMilliseconds"], 500);
        assert!(props[0]["timeOfSample"].as_str().unwrap().ends_with('Z'));
        assert_eq!(value["event"]["endpoint"]["endpointId"], "lamp");
        assert_eq!(value["event"]["payload"], json!({}));
    }
}

//! Conversational skill integration tests over HTTP

use serde_json::{Value, json};

mod common;
use common::{APPLICATION_ID, harness, harness_with};

fn envelope(session: &str, request: Value) -> Value {
    json!({
        "version": "1.0",
        "session": {
            "new": false,
            "sessionId": session,
            "application": { "applicationId": APPLICATION_ID }
        },
        "context": {
            "System": {
                "application": { "applicationId": APPLICATION_ID },
                "device": { "deviceId": "echo-1" }
            }
        },
        "request": request
    })
}

fn intent(session: &str, name: &str, slots: &[(&str, &str)]) -> Value {
    let slots: serde_json::Map<String, Value> = slots
        .iter()
        .map(|(n, v)| ((*n).to_string(), json!({ "name": n, "value": v })))
        .collect();
    envelope(
        session,
        json!({ "type": "IntentRequest", "intent": { "name": name, "slots": slots } }),
    )
}

#[tokio::test]
async fn test_launch_opens_a_session() {
    let harness = harness();
    let (_, body) = harness
        .post(&envelope("s1", json!({ "type": "LaunchRequest" })))
        .await;

    assert_eq!(body["version"], "1.0");
    assert_eq!(body["response"]["outputSpeech"]["type"], "PlainText");
    assert!(!body["response"]["outputSpeech"]["text"].as_str().unwrap().is_empty());
    assert!(body["response"]["reprompt"].is_object());
    assert_eq!(body["response"]["shouldEndSession"], false);

    let writes = harness.backend.reading_writes();
    assert!(writes.contains(&"setreading alexa intent LaunchRequest".to_string()));
    assert!(writes.contains(&"setreading alexa echoId echo-1".to_string()));
}

#[tokio::test]
async fn test_switch_intent_controls_the_device() {
    let harness = harness();
    let (_, body) = harness
        .post(&intent("s1", "OnIntent", &[("Device", "stehlampe"), ("On_Value", "an")]))
        .await;

    assert_eq!(harness.backend.commands(), vec!["set wz_lampe on"]);
    assert!(
        body["response"]["outputSpeech"]["text"]
            .as_str()
            .unwrap()
            .contains("stehlampe")
    );
    assert_eq!(body["response"]["shouldEndSession"], true);
}

#[tokio::test]
async fn test_session_survives_between_requests() {
    let harness = harness();
    harness
        .post(&envelope("s1", json!({ "type": "LaunchRequest" })))
        .await;

    let (_, body) = harness
        .post(&intent("s1", "OnIntent", &[("Device", "deckenlampe"), ("On_Value", "aus")]))
        .await;

    assert_eq!(harness.backend.commands(), vec!["set k_lampe off"]);
    assert_eq!(body["response"]["shouldEndSession"], false);
}

#[tokio::test]
async fn test_application_room_scopes_categories() {
    let application = format!("{APPLICATION_ID}:küche");
    let harness = harness_with(&[application.as_str()], &[]);

    harness
        .post(&intent("s1", "OnIntent", &[("Device", "licht"), ("On_Value", "an")]))
        .await;

    assert_eq!(harness.backend.commands(), vec!["set k_lampe on"]);
}

#[tokio::test]
async fn test_unknown_device_changes_nothing() {
    let harness = harness();
    let (_, body) = harness
        .post(&intent("s1", "OnIntent", &[("Device", "toaster"), ("On_Value", "an")]))
        .await;

    assert!(harness.backend.commands().is_empty());
    assert!(body["response"]["outputSpeech"]["text"].is_string());
}

//! Shared test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tokio::sync::RwLock;
use tower::ServiceExt;

use voice_bridge::api::{ApiState, router};
use voice_bridge::backend::{Backend, Connection, Connections};
use voice_bridge::intent::{IntentEngine, MemorySessionStore};
use voice_bridge::registry::{Characteristic, CommandMapping, Device, DeviceRegistry};
use voice_bridge::router::DirectiveRouter;
use voice_bridge::security::{AllowList, AuthGate, TokenInfo, TokenIntrospector};
use voice_bridge::{Bridge, Error};

/// Token accepted by [`ScriptedIntrospector`]
pub const TOKEN: &str = "Atza|good-token";
/// Audience the accepted token was issued to
pub const CLIENT_ID: &str = "amzn1.application-oa2-client.test";
/// Hub device receiving side-channel readings
pub const ASSISTANT_DEVICE: &str = "alexa";
/// Skill application id allowed by default
pub const APPLICATION_ID: &str = "amzn1.ask.skill.test";

/// Hub fake recording every command it receives
#[derive(Default)]
pub struct RecordingBackend {
    commands: Mutex<Vec<String>>,
    readings: Mutex<HashMap<String, String>>,
}

impl RecordingBackend {
    /// Commands sent so far, without side-channel reading writes
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| !c.starts_with("setreading"))
            .cloned()
            .collect()
    }

    /// Side-channel reading writes sent so far
    pub fn reading_writes(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with("setreading"))
            .cloned()
            .collect()
    }

    pub fn set(&self, pointer: &str, value: &str) {
        self.readings
            .lock()
            .unwrap()
            .insert(pointer.to_string(), value.to_string());
    }
}

#[async_trait]
impl Backend for RecordingBackend {
    fn cached_value(&self, pointer: &str) -> Option<String> {
        self.readings.lock().unwrap().get(pointer).cloned()
    }

    async fn execute(&self, command: &str) -> voice_bridge::Result<String> {
        self.commands.lock().unwrap().push(command.to_string());
        Ok(String::new())
    }
}

/// Introspector accepting only [`TOKEN`]
#[derive(Default)]
pub struct ScriptedIntrospector {
    pub calls: AtomicUsize,
}

impl ScriptedIntrospector {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenIntrospector for ScriptedIntrospector {
    async fn introspect(&self, token: &str) -> voice_bridge::Result<TokenInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if token == TOKEN {
            Ok(TokenInfo {
                audience: CLIENT_ID.to_string(),
                expires_in: Duration::from_secs(3600),
            })
        } else {
            Err(Error::Auth("invalid_token".to_string()))
        }
    }
}

/// Everything a test needs to drive the bridge over HTTP
pub struct Harness {
    pub router: axum::Router,
    pub backend: Arc<RecordingBackend>,
    pub introspector: Arc<ScriptedIntrospector>,
}

/// Devices every harness starts with
pub fn devices() -> Vec<Device> {
    vec![
        Device::new("wz_lampe", "fhem")
            .with_spoken_names("stehlampe")
            .with_rooms("wohnzimmer")
            .with_type("light")
            .with_mapping(Characteristic::On, CommandMapping::new("wz_lampe", "state"))
            .with_mapping(
                Characteristic::Brightness,
                CommandMapping::new("wz_lampe", "pct").with_bounds(Some(0.0), Some(100.0)),
            ),
        Device::new("k_lampe", "fhem")
            .with_spoken_names("deckenlampe")
            .with_rooms("küche")
            .with_type("light")
            .with_mapping(Characteristic::On, CommandMapping::new("k_lampe", "state")),
        Device::new("heizung_bad", "fhem")
            .with_spoken_names("heizung")
            .with_rooms("bad")
            .with_type("thermostat")
            .with_mapping(
                Characteristic::TargetTemperature,
                CommandMapping::new("heizung_bad", "desired-temp")
                    .with_bounds(Some(15.0), Some(30.0)),
            ),
    ]
}

/// Build a harness with application and client ids as `id[:room]` entries
pub fn harness_with(application_ids: &[&str], client_ids: &[&str]) -> Harness {
    build(application_ids, client_ids, true)
}

/// Harness whose bridge has no backend connection at all
pub fn disconnected_harness() -> Harness {
    build(&[APPLICATION_ID], &[CLIENT_ID], false)
}

fn build(application_ids: &[&str], client_ids: &[&str], connected: bool) -> Harness {
    let backend = Arc::new(RecordingBackend::default());
    let introspector = Arc::new(ScriptedIntrospector::default());

    let mut registry = DeviceRegistry::new();
    for device in devices() {
        registry.register(device);
    }
    let registry = Arc::new(RwLock::new(registry));
    let connections = if connected {
        let mut connection = Connection::new("fhem", backend.clone());
        connection.assistant_device = Some(ASSISTANT_DEVICE.to_string());
        Connections::new(vec![connection])
    } else {
        Connections::default()
    };
    let names = connections.iter().map(|c| c.name().to_string()).collect();

    let application_ids = AllowList::parse(application_ids);
    let gate = AuthGate::new(
        application_ids.clone(),
        AllowList::parse(client_ids),
        introspector.clone(),
    );
    let engine = IntentEngine::new(
        registry.clone(),
        connections.clone(),
        Arc::new(MemorySessionStore::default()),
        application_ids,
    );
    let directives = DirectiveRouter::new(registry.clone(), connections);

    let state = Arc::new(ApiState {
        bridge: Bridge::new(gate, directives, engine),
        registry,
        connections: names,
    });

    Harness {
        router: router(state, Duration::from_secs(5)),
        backend,
        introspector,
    }
}

/// Harness allowing [`APPLICATION_ID`] and [`CLIENT_ID`]
pub fn harness() -> Harness {
    harness_with(&[APPLICATION_ID], &[CLIENT_ID])
}

impl Harness {
    /// POST a raw body to `/`
    pub async fn post_raw(&self, body: impl Into<Body>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap();
        self.send(request).await
    }

    /// POST a JSON document to `/`
    pub async fn post(&self, body: &Value) -> (StatusCode, Value) {
        self.post_raw(body.to_string()).await
    }

    /// GET `uri`
    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

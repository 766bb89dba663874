//! Daemon - the bridge service
//!
//! Wires the configuration into backends, the device registry, the
//! authentication gate and the HTTP server. Keeps reading caches warm by
//! polling and by following each hub's change stream.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;

use crate::api::{ApiServer, ApiState};
use crate::backend::{
    Backend, BackendEvent, Connection, Connections, FhemBackend, Vocabulary, spawn_listener,
};
use crate::bridge::Bridge;
use crate::config::{Config, ConnectionConfig};
use crate::intent::{IntentEngine, MemorySessionStore};
use crate::registry::{Device, DeviceRegistry, SharedRegistry};
use crate::router::DirectiveRouter;
use crate::security::{AllowList, AuthGate, HttpIntrospector};
use crate::Result;

/// Pending backend events before senders wait
const EVENT_BUFFER: usize = 64;

/// One configured hub with the devices it defines
struct Hub {
    name: String,
    backend: Arc<FhemBackend>,
    devices: Vec<Device>,
    refresh: Option<Duration>,
    longpoll: bool,
}

/// The voice bridge daemon
pub struct Daemon {
    addr: SocketAddr,
    request_timeout: Duration,
    registry: SharedRegistry,
    connections: Connections,
    hubs: Vec<Hub>,
    state: Arc<ApiState>,
}

impl Daemon {
    /// Create a new daemon instance
    ///
    /// # Errors
    ///
    /// Returns error if a backend or the token introspector cannot be built
    pub fn new(config: Config) -> Result<Self> {
        let registry: SharedRegistry = Arc::new(RwLock::new(DeviceRegistry::new()));

        let mut hubs = Vec::new();
        let mut connections = Vec::new();
        for settings in config.connections {
            let (hub, connection) = connect(settings)?;
            hubs.push(hub);
            connections.push(connection);
        }
        let connections = Connections::new(connections);

        let application_ids = AllowList::parse(&config.skill.application_ids);
        let gate = AuthGate::new(
            application_ids.clone(),
            AllowList::parse(&config.skill.client_ids),
            Arc::new(HttpIntrospector::new(
                &config.skill.tokeninfo_url,
                config.skill.timeout,
            )?),
        );
        let engine = IntentEngine::new(
            registry.clone(),
            connections.clone(),
            Arc::new(MemorySessionStore::new(config.session_idle)),
            application_ids,
        );
        let router = DirectiveRouter::new(registry.clone(), connections.clone());

        let state = Arc::new(ApiState {
            bridge: Bridge::new(gate, router, engine),
            registry: registry.clone(),
            connections: connections.iter().map(|c| c.name().to_string()).collect(),
        });

        tracing::info!(
            connections = connections.len(),
            application_ids = config.skill.application_ids.len(),
            client_ids = config.skill.client_ids.len(),
            "daemon initialized"
        );

        Ok(Self {
            addr: SocketAddr::new(config.server.bind, config.server.port),
            request_timeout: config.server.request_timeout,
            registry,
            connections,
            hubs,
            state,
        })
    }

    /// Run the daemon until ctrl-c
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP server fails
    pub async fn run(self) -> Result<()> {
        let (events, rx) = mpsc::channel(EVENT_BUFFER);
        let listener = spawn_listener(rx, self.registry.clone(), self.connections.clone());

        let mut tasks = Vec::new();
        for hub in self.hubs {
            let names: Vec<String> = hub.devices.iter().map(|d| d.name.clone()).collect();
            if events
                .send(BackendEvent::ConnectionReloaded {
                    connection: hub.name.clone(),
                    devices: hub.devices.clone(),
                })
                .await
                .is_err()
            {
                tracing::error!(connection = %hub.name, "event listener stopped");
            }
            if hub.longpoll {
                tasks.push(tokio::spawn(hub.backend.clone().watch(
                    hub.name.clone(),
                    hub.devices,
                    events.clone(),
                )));
            }
            tasks.push(spawn_refresh(hub.name, hub.backend, names, hub.refresh));
        }
        drop(events);

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutdown requested");
        };

        let served = ApiServer::new(self.state, self.addr, self.request_timeout)
            .run(shutdown)
            .await;

        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            // cancelled watchers release their event senders
            let _ = task.await;
        }
        if let Err(e) = listener.await {
            tracing::warn!(error = %e, "event listener ended abnormally");
        }
        tracing::info!("voice bridge stopped");
        served
    }
}

/// Build the backend and connection for one configured hub
fn connect(settings: ConnectionConfig) -> Result<(Hub, Connection)> {
    let mut backend = FhemBackend::new(settings.base_url.clone(), settings.timeout)?;
    if let (Some(username), Some(password)) = (settings.username, settings.password) {
        backend = backend.with_basic_auth(username, password);
    }
    let backend = Arc::new(backend);

    let mut connection = Connection::new(&settings.name, backend.clone() as Arc<dyn Backend>);
    connection.confirmation_level = settings.confirmation_level;
    connection.status_level = settings.status_level;
    connection.assistant_device = settings.assistant_device;
    connection.type_aliases = settings.type_aliases;
    connection.echo_rooms = settings.echo_rooms;
    connection.passthrough_intents = settings.passthrough_intents;
    connection.vocabulary = Vocabulary::derive(&settings.spoken);

    tracing::info!(
        connection = %settings.name,
        url = %settings.base_url,
        devices = settings.devices.len(),
        passthrough_intents = connection.passthrough_intents.len(),
        "configured backend connection"
    );

    Ok((
        Hub {
            name: settings.name,
            backend,
            devices: settings.devices,
            refresh: settings.refresh,
            longpoll: settings.longpoll,
        },
        connection,
    ))
}

/// Fetch the readings of every device, once or periodically
fn spawn_refresh(
    connection: String,
    backend: Arc<FhemBackend>,
    devices: Vec<String>,
    every: Option<Duration>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let Some(every) = every else {
            refresh(&connection, &backend, &devices).await;
            return;
        };

        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            refresh(&connection, &backend, &devices).await;
        }
    })
}

async fn refresh(connection: &str, backend: &FhemBackend, devices: &[String]) {
    let mut failed = 0_usize;
    for device in devices {
        if let Err(e) = backend.fetch_readings(device).await {
            failed += 1;
            tracing::debug!(connection, device = %device, error = %e, "failed to fetch readings");
        }
    }
    if failed > 0 {
        tracing::warn!(connection, failed, total = devices.len(), "reading refresh incomplete");
    }
}

/// Render the custom slot types for the configured devices
#[must_use]
pub fn slot_types(config: &Config) -> String {
    let mut registry = DeviceRegistry::new();
    for connection in &config.connections {
        for device in &connection.devices {
            registry.register(device.clone());
        }
    }
    registry.custom_slot_types(
        config
            .connections
            .iter()
            .flat_map(|c| c.type_aliases.values().flatten()),
    )
}

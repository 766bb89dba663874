//! Backend change events and the listener keeping the registry current

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::Connections;
use crate::registry::{Device, SharedRegistry};

/// Change or lifecycle event emitted by a backend
#[derive(Debug, Clone)]
pub enum BackendEvent {
    /// A device was defined or redefined
    DeviceAdded(Box<Device>),
    /// A single device disappeared from a connection
    DeviceRemoved { connection: String, name: String },
    /// A connection reloaded; its devices are replaced wholesale
    ConnectionReloaded {
        connection: String,
        devices: Vec<Device>,
    },
    /// A reading changed
    Reading {
        connection: String,
        pointer: String,
        value: String,
    },
}

/// Apply one event to the registry and reading caches
pub async fn apply(event: BackendEvent, registry: &SharedRegistry, connections: &Connections) {
    match event {
        BackendEvent::DeviceAdded(device) => {
            registry.write().await.register(*device);
        }
        BackendEvent::DeviceRemoved { connection, name } => {
            if registry.write().await.remove_named(&connection, &name).is_some() {
                tracing::info!(%connection, device = %name, "removed device");
            }
        }
        BackendEvent::ConnectionReloaded {
            connection,
            devices,
        } => {
            let mut registry = registry.write().await;
            registry.remove_by_backend(&connection);
            let count = devices.len();
            for device in devices {
                registry.register(device);
            }
            tracing::info!(%connection, devices = count, "connection reloaded");
        }
        BackendEvent::Reading {
            connection,
            pointer,
            value,
        } => match connections.get(&connection) {
            Some(c) => c.backend().observe(&pointer, &value),
            None => tracing::debug!(%connection, %pointer, "reading for unknown connection"),
        },
    }
}

/// Spawn the task consuming backend events until all senders are gone
#[must_use]
pub fn spawn_listener(
    mut events: mpsc::Receiver<BackendEvent>,
    registry: SharedRegistry,
    connections: Connections,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            apply(event, &registry, &connections).await;
        }
        tracing::debug!("backend event channel closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DeviceRegistry;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[tokio::test]
    async fn listener_tracks_device_lifecycle() {
        let registry: SharedRegistry = Arc::new(RwLock::new(DeviceRegistry::new()));
        let (tx, rx) = mpsc::channel(8);
        let handle = spawn_listener(rx, registry.clone(), Connections::default());

        tx.send(BackendEvent::DeviceAdded(Box::new(Device::new("lamp", "fhem"))))
            .await
            .unwrap();
        tx.send(BackendEvent::DeviceAdded(Box::new(Device::new("fan", "fhem"))))
            .await
            .unwrap();
        tx.send(BackendEvent::DeviceRemoved {
            connection: "fhem".to_string(),
            name: "fan".to_string(),
        })
        .await
        .unwrap();
        tx.send(BackendEvent::ConnectionReloaded {
            connection: "fhem".to_string(),
            devices: vec![Device::new("heater", "fhem")],
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();

        let registry = registry.read().await;
        assert_eq!(registry.len(), 1);
        assert!(registry.get("heater").is_some());
    }
}

//! Home-automation backend collaborators
//!
//! A [`Backend`] serves cached readings and executes raw hub commands.
//! Each backend is wrapped in a [`Connection`] carrying the per-hub
//! settings the intent engine consults.

pub mod events;
pub mod fhem;
pub mod vocabulary;

pub use events::{BackendEvent, spawn_listener};
pub use fhem::FhemBackend;
pub use vocabulary::{
    SpokenMapping, Vocabulary, parse_echo_rooms, parse_passthrough_intents, parse_type_aliases,
};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Data source and command sink for one hub
#[async_trait]
pub trait Backend: Send + Sync {
    /// Last known value of a reading pointer (`<device>-<reading>`)
    fn cached_value(&self, pointer: &str) -> Option<String>;

    /// Execute a raw hub command and return its textual result
    async fn execute(&self, command: &str) -> Result<String>;

    /// Record a reading change pushed by the hub
    fn observe(&self, _pointer: &str, _value: &str) {}
}

/// Confirmation verbosity of spoken answers
pub const CONFIRMATION_FULL: u8 = 2;

/// A backend plus its per-connection settings
pub struct Connection {
    name: String,
    backend: Arc<dyn Backend>,
    /// 0 = silent outside a session, 1 = "OK.", 2 = full sentence
    pub confirmation_level: u8,
    /// Reserved for status answer verbosity; no answer reads it yet
    pub status_level: u8,
    /// Hub device receiving side-channel readings
    pub assistant_device: Option<String>,
    /// Category → spoken aliases
    pub type_aliases: BTreeMap<String, Vec<String>>,
    /// Echo device id → room
    pub echo_rooms: BTreeMap<String, String>,
    /// Intent name → backend expression
    pub passthrough_intents: BTreeMap<String, String>,
    pub vocabulary: Vocabulary,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("confirmation_level", &self.confirmation_level)
            .field("assistant_device", &self.assistant_device)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Create a connection with default settings
    #[must_use]
    pub fn new(name: &str, backend: Arc<dyn Backend>) -> Self {
        Self {
            name: name.to_string(),
            backend,
            confirmation_level: CONFIRMATION_FULL,
            status_level: CONFIRMATION_FULL,
            assistant_device: None,
            type_aliases: BTreeMap::new(),
            echo_rooms: BTreeMap::new(),
            passthrough_intents: BTreeMap::new(),
            vocabulary: Vocabulary::default(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Category whose alias list contains `word`
    #[must_use]
    pub fn category_of(&self, word: &str) -> Option<&str> {
        let word = word.to_lowercase();
        self.type_aliases
            .iter()
            .find(|(_, aliases)| aliases.iter().any(|a| *a == word))
            .map(|(t, _)| t.as_str())
    }

    /// Write a side-channel reading on the assistant device
    ///
    /// Failures are logged and otherwise ignored.
    pub async fn set_reading(&self, reading: &str, value: &str) {
        let Some(device) = &self.assistant_device else {
            return;
        };
        let command = format!("setreading {device} {reading} {value}");
        if let Err(e) = self.backend.execute(&command).await {
            tracing::warn!(connection = %self.name, reading, error = %e, "failed to write side-channel reading");
        }
    }
}

/// All configured connections, in configuration order
#[derive(Debug, Clone, Default)]
pub struct Connections {
    inner: Vec<Arc<Connection>>,
}

impl Connections {
    #[must_use]
    pub fn new(connections: Vec<Connection>) -> Self {
        Self {
            inner: connections.into_iter().map(Arc::new).collect(),
        }
    }

    /// Look up a connection by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<Connection>> {
        self.inner.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Connection>> {
        self.inner.iter()
    }

    #[must_use]
    pub fn first(&self) -> Option<&Arc<Connection>> {
        self.inner.first()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Category for a spoken word across all connections
    #[must_use]
    pub fn category_of(&self, word: &str) -> Option<&str> {
        self.inner.iter().find_map(|c| c.category_of(word))
    }

    /// Room configured for an echo device on any connection
    #[must_use]
    pub fn room_of_echo(&self, echo_id: &str) -> Option<&str> {
        self.inner
            .iter()
            .find_map(|c| c.echo_rooms.get(echo_id))
            .map(String::as_str)
    }

    /// All configured type aliases
    pub fn type_aliases(&self) -> impl Iterator<Item = &str> {
        self.inner
            .iter()
            .flat_map(|c| c.type_aliases.values().flatten())
            .map(String::as_str)
    }

    /// Write a side-channel reading on every connection with an assistant device
    pub async fn set_reading(&self, reading: &str, value: &str) {
        for connection in &self.inner {
            connection.set_reading(reading, value).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        commands: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Backend for Recorder {
        fn cached_value(&self, _pointer: &str) -> Option<String> {
            None
        }

        async fn execute(&self, command: &str) -> Result<String> {
            self.commands.lock().unwrap().push(command.to_string());
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn side_channel_requires_assistant_device() {
        let backend = Arc::new(Recorder::default());
        let mut with_device = Connection::new("a", backend.clone());
        with_device.assistant_device = Some("alexa".to_string());
        let without_device = Connection::new("b", backend.clone());

        Connections::new(vec![with_device, without_device])
            .set_reading("echoId", "echo-1")
            .await;

        assert_eq!(
            *backend.commands.lock().unwrap(),
            vec!["setreading alexa echoId echo-1".to_string()]
        );
    }

    #[test]
    fn lookups_across_connections() {
        let backend: Arc<dyn Backend> = Arc::new(Recorder::default());
        let mut first = Connection::new("a", backend.clone());
        first.type_aliases.insert("heater".to_string(), vec!["heizung".to_string()]);
        let mut second = Connection::new("b", backend);
        second.echo_rooms.insert("echo-1".to_string(), "küche".to_string());

        let connections = Connections::new(vec![first, second]);
        assert_eq!(connections.category_of("Heizung"), Some("heater"));
        assert_eq!(connections.room_of_echo("echo-1"), Some("küche"));
        assert_eq!(connections.type_aliases().collect::<Vec<_>>(), vec!["heizung"]);
        assert!(connections.get("b").is_some());
    }
}

//! TOML configuration file loading
//!
//! Supports `~/.config/voice-bridge/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;

use crate::backend::SpokenMapping;
use crate::registry::Exposure;
use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct BridgeConfigFile {
    /// HTTP server
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Skill and smart-home authorization
    #[serde(default)]
    pub skill: SkillFileConfig,

    /// Conversation sessions
    #[serde(default)]
    pub session: SessionFileConfig,

    /// One entry per home-automation hub
    #[serde(default)]
    pub connections: Vec<ConnectionFileConfig>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Port to listen on
    pub port: Option<u16>,

    /// Address to bind, e.g. "127.0.0.1"
    pub bind: Option<String>,

    /// Whole-request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Authorization configuration
#[derive(Debug, Default, Deserialize)]
pub struct SkillFileConfig {
    /// Skill application ids, each optionally `id:room`
    pub application_ids: Option<Vec<String>>,

    /// OAuth client ids accepted as token audience, each optionally `id:room`
    pub client_ids: Option<Vec<String>>,

    /// Token introspection endpoint
    pub tokeninfo_url: Option<String>,

    /// Introspection timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Session configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Seconds after which an idle conversation is forgotten
    pub idle_secs: Option<u64>,
}

/// One backend connection
#[derive(Debug, Default, Deserialize)]
pub struct ConnectionFileConfig {
    /// Connection name; defaults to `fhem`, `fhem2`, ...
    pub name: Option<String>,

    /// Hub web interface, e.g. "http://127.0.0.1:8083"
    pub url: Option<String>,

    /// Web instance name appended to the url (default "fhem")
    pub webname: Option<String>,

    pub username: Option<String>,
    pub password: Option<SecretString>,

    /// Hub request timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Seconds between reading refreshes; 0 disables polling
    pub refresh_secs: Option<u64>,

    /// Follow hub changes through the longpoll stream (default true)
    pub longpoll: Option<bool>,

    pub confirmation_level: Option<u8>,
    /// Reserved; validated but not read by any answer
    pub status_level: Option<u8>,

    /// Hub device receiving side-channel readings
    pub assistant_device: Option<String>,

    /// `type:alias1,alias2` entries
    pub type_aliases: Option<String>,

    /// `echoId:room` entries
    pub echo_rooms: Option<String>,

    /// `expression:utterances` lines
    pub passthrough_intents: Option<String>,

    /// Spoken phrasing per characteristic
    #[serde(default)]
    pub spoken: Vec<SpokenMapping>,

    #[serde(default)]
    pub devices: Vec<DeviceFileConfig>,
}

/// One device of a connection
#[derive(Debug, Default, Deserialize)]
pub struct DeviceFileConfig {
    /// Backend device name
    pub name: String,

    /// Comma-separated spoken names; defaults to the backend name
    pub alexa_name: Option<String>,

    /// Comma-separated rooms
    pub room: Option<String>,

    /// Category, e.g. "light"
    #[serde(rename = "type")]
    pub device_type: Option<String>,

    pub model: Option<String>,

    pub exposure: Option<Exposure>,

    /// Characteristic name → backend binding
    #[serde(default)]
    pub mappings: BTreeMap<String, MappingFileConfig>,
}

/// Binding of a characteristic to a backend reading
#[derive(Debug, Default, Deserialize)]
pub struct MappingFileConfig {
    /// Backend device; defaults to the owning device
    pub device: Option<String>,

    /// Reading reflecting the value (default "state")
    pub reading: Option<String>,

    pub cmd: Option<String>,
    pub cmd_on: Option<String>,
    pub cmd_off: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,

    /// Spoken or API token → backend value
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

/// Load the TOML config file at `path`
///
/// Returns `BridgeConfigFile::default()` if the file doesn't exist.
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_config_file(path: &Path) -> Result<BridgeConfigFile> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(BridgeConfigFile::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/voice-bridge/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voice-bridge").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_file(&dir.path().join("absent.toml")).unwrap();
        assert!(config.connections.is_empty());
        assert_eq!(config.server.port, None);
    }

    #[test]
    fn parses_connections_and_devices() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[server]
port = 3001

[skill]
application_ids = ["amzn1.ask.skill.1:küche"]

[[connections]]
url = "http://hub:8083"
password = "geheim"
confirmation_level = 1
type_aliases = "light:licht,lampe"

[[connections.spoken]]
characteristic = "TargetPosition"
verb = "stelle"
articles = "den;die"

[[connections.devices]]
name = "wz_lampe"
alexa_name = "lampe"
room = "wohnzimmer"
type = "light"

[connections.devices.mappings.On]
cmd_on = "an"
"#
        )
        .unwrap();

        let config = load_config_file(file.path()).unwrap();
        assert_eq!(config.server.port, Some(3001));
        let connection = &config.connections[0];
        assert_eq!(connection.confirmation_level, Some(1));
        assert!(connection.password.is_some());
        assert_eq!(connection.spoken[0].articles, vec!["den", "die"]);
        let device = &connection.devices[0];
        assert_eq!(device.device_type.as_deref(), Some("light"));
        assert_eq!(device.mappings["On"].cmd_on.as_deref(), Some("an"));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[server\nport = ").unwrap();
        assert!(matches!(load_config_file(file.path()), Err(Error::Toml(_))));
    }
}

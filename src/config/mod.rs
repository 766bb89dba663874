//! Configuration management for the voice bridge
//!
//! Precedence is environment > command line > config file > default.

pub mod file;

pub use file::{BridgeConfigFile, config_file_path, load_config_file};

use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::backend::{
    CONFIRMATION_FULL, SpokenMapping, parse_echo_rooms, parse_passthrough_intents, parse_type_aliases,
};
use crate::intent::DEFAULT_SESSION_IDLE;
use crate::registry::{Characteristic, CommandMapping, Device};
use crate::security::DEFAULT_TOKENINFO_URL;
use crate::{Error, Result};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3000;

const DEFAULT_BIND: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_INTROSPECTION_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_REFRESH: Duration = Duration::from_secs(60);
const DEFAULT_HUB_URL: &str = "http://127.0.0.1:8083";
const DEFAULT_WEBNAME: &str = "fhem";

/// Voice bridge configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Authorization configuration
    pub skill: SkillConfig,

    /// Idle time after which a conversation is forgotten
    pub session_idle: Duration,

    /// Backend connections in configuration order
    pub connections: Vec<ConnectionConfig>,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    /// Whole-request timeout
    pub request_timeout: Duration,
}

/// Authorization configuration
#[derive(Debug, Clone)]
pub struct SkillConfig {
    /// `id` or `id:room` entries
    pub application_ids: Vec<String>,
    /// `id` or `id:room` entries
    pub client_ids: Vec<String>,
    pub tokeninfo_url: String,
    pub timeout: Duration,
}

/// One backend connection
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub name: String,
    /// Web interface including the web name, e.g. `http://127.0.0.1:8083/fhem`
    pub base_url: Url,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub timeout: Duration,
    /// Reading refresh interval, `None` when polling is disabled
    pub refresh: Option<Duration>,
    /// Follow the hub's longpoll change stream
    pub longpoll: bool,
    pub confirmation_level: u8,
    /// Reserved for status answer verbosity; no answer reads it yet
    pub status_level: u8,
    pub assistant_device: Option<String>,
    pub type_aliases: BTreeMap<String, Vec<String>>,
    pub echo_rooms: BTreeMap<String, String>,
    pub passthrough_intents: BTreeMap<String, String>,
    pub spoken: Vec<SpokenMapping>,
    pub devices: Vec<Device>,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub bind: Option<IpAddr>,
}

impl Config {
    /// Load configuration from `path` (or the default path) and the environment
    ///
    /// # Errors
    ///
    /// Returns error if the config file cannot be parsed or holds invalid values
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(file::config_file_path);
        let fc = match &path {
            Some(path) => file::load_config_file(path)?,
            None => BridgeConfigFile::default(),
        };
        Self::resolve(fc, overrides, |key| std::env::var(key).ok())
    }

    /// Merge the file, command-line and environment layers
    ///
    /// # Errors
    ///
    /// Returns error if a value is invalid
    pub fn resolve(
        fc: BridgeConfigFile,
        overrides: &Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let port = match env("VOICE_BRIDGE_PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("invalid VOICE_BRIDGE_PORT: {raw}")))?,
            None => overrides.port.or(fc.server.port).unwrap_or(DEFAULT_PORT),
        };
        let bind = match (env("VOICE_BRIDGE_BIND"), overrides.bind) {
            (Some(raw), _) => parse_ip(&raw)?,
            (None, Some(ip)) => ip,
            (None, None) => fc
                .server
                .bind
                .as_deref()
                .map(parse_ip)
                .transpose()?
                .unwrap_or(DEFAULT_BIND),
        };
        let server = ServerConfig {
            bind,
            port,
            request_timeout: fc
                .server
                .timeout_secs
                .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs),
        };

        let skill = SkillConfig {
            application_ids: fc.skill.application_ids.unwrap_or_default(),
            client_ids: fc.skill.client_ids.unwrap_or_default(),
            tokeninfo_url: env("VOICE_BRIDGE_TOKENINFO_URL")
                .or(fc.skill.tokeninfo_url)
                .unwrap_or_else(|| DEFAULT_TOKENINFO_URL.to_string()),
            timeout: fc
                .skill
                .timeout_secs
                .map_or(DEFAULT_INTROSPECTION_TIMEOUT, Duration::from_secs),
        };

        let connections = fc
            .connections
            .into_iter()
            .enumerate()
            .map(|(i, c)| ConnectionConfig::resolve(i, c))
            .collect::<Result<Vec<_>>>()?;

        let config = Self {
            server,
            skill,
            session_idle: fc
                .session
                .idle_secs
                .map_or(DEFAULT_SESSION_IDLE, Duration::from_secs),
            connections,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns error describing the first violated constraint
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.skill.tokeninfo_url)
            .map_err(|e| Error::Config(format!("invalid tokeninfo url: {e}")))?;

        let mut names = BTreeSet::new();
        for connection in &self.connections {
            if !names.insert(connection.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate connection name: {}",
                    connection.name
                )));
            }
            for (what, level) in [
                ("confirmation_level", connection.confirmation_level),
                ("status_level", connection.status_level),
            ] {
                if level > CONFIRMATION_FULL {
                    return Err(Error::Config(format!(
                        "{}: {what} must be 0, 1 or 2, got {level}",
                        connection.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Total number of configured devices
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.connections.iter().map(|c| c.devices.len()).sum()
    }
}

impl ConnectionConfig {
    fn resolve(index: usize, fc: file::ConnectionFileConfig) -> Result<Self> {
        let name = fc.name.unwrap_or_else(|| match index {
            0 => "fhem".to_string(),
            n => format!("fhem{}", n + 1),
        });

        let url = fc.url.as_deref().unwrap_or(DEFAULT_HUB_URL).trim_end_matches('/');
        let webname = fc.webname.as_deref().unwrap_or(DEFAULT_WEBNAME);
        let base_url = Url::parse(&format!("{url}/{webname}"))
            .map_err(|e| Error::Config(format!("{name}: invalid url {url}: {e}")))?;

        let devices = fc
            .devices
            .into_iter()
            .map(|d| device(&name, d))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            base_url,
            username: fc.username,
            password: fc.password,
            timeout: fc.timeout_secs.map_or(DEFAULT_BACKEND_TIMEOUT, Duration::from_secs),
            refresh: match fc.refresh_secs {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => Some(DEFAULT_REFRESH),
            },
            longpoll: fc.longpoll.unwrap_or(true),
            confirmation_level: fc.confirmation_level.unwrap_or(CONFIRMATION_FULL),
            status_level: fc.status_level.unwrap_or(CONFIRMATION_FULL),
            assistant_device: fc.assistant_device,
            type_aliases: fc.type_aliases.as_deref().map(parse_type_aliases).unwrap_or_default(),
            echo_rooms: fc.echo_rooms.as_deref().map(parse_echo_rooms).unwrap_or_default(),
            passthrough_intents: fc
                .passthrough_intents
                .as_deref()
                .map(parse_passthrough_intents)
                .unwrap_or_default(),
            spoken: fc.spoken,
            devices,
            name,
        })
    }
}

/// Build a registry device from its file entry
fn device(connection: &str, fc: file::DeviceFileConfig) -> Result<Device> {
    let mut device = Device::new(&fc.name, connection);
    if let Some(names) = &fc.alexa_name {
        device = device.with_spoken_names(names);
    }
    if let Some(rooms) = &fc.room {
        device = device.with_rooms(rooms);
    }
    if let Some(device_type) = &fc.device_type {
        device = device.with_type(device_type);
    }
    if let Some(exposure) = fc.exposure {
        device = device.with_exposure(exposure);
    }
    device.model = fc.model;

    for (characteristic, m) in fc.mappings {
        if let (Some(min), Some(max)) = (m.min_value, m.max_value)
            && min > max
        {
            return Err(Error::Config(format!(
                "{}: {characteristic} has min_value {min} above max_value {max}",
                fc.name
            )));
        }

        let backend_device = m.device.as_deref().unwrap_or(&fc.name);
        let mut mapping = CommandMapping::new(backend_device, m.reading.as_deref().unwrap_or("state"))
            .with_bounds(m.min_value, m.max_value);
        mapping.cmd = m.cmd;
        mapping.cmd_on = m.cmd_on;
        mapping.cmd_off = m.cmd_off;
        mapping.values = m.values;

        device = match Characteristic::from_name(&characteristic) {
            Some(c) => device.with_mapping(c, mapping),
            None => device.with_custom_mapping(&characteristic, mapping),
        };
    }
    Ok(device)
}

fn parse_ip(raw: &str) -> Result<IpAddr> {
    raw.parse()
        .map_err(|_| Error::Config(format!("invalid bind address: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    fn parse(toml: &str) -> BridgeConfigFile {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn defaults() {
        let config = Config::resolve(BridgeConfigFile::default(), &Overrides::default(), env(&[])).unwrap();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.server.bind, DEFAULT_BIND);
        assert_eq!(config.skill.tokeninfo_url, DEFAULT_TOKENINFO_URL);
        assert_eq!(config.session_idle, DEFAULT_SESSION_IDLE);
        assert!(config.connections.is_empty());
    }

    #[test]
    fn environment_beats_command_line_beats_file() {
        let fc = || parse("[server]\nport = 4000\nbind = \"0.0.0.0\"\n");
        let cli = Overrides {
            port: Some(5000),
            bind: None,
        };

        let config = Config::resolve(fc(), &Overrides::default(), env(&[])).unwrap();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.bind.to_string(), "0.0.0.0");

        let config = Config::resolve(fc(), &cli, env(&[])).unwrap();
        assert_eq!(config.server.port, 5000);

        let config = Config::resolve(
            fc(),
            &cli,
            env(&[("VOICE_BRIDGE_PORT", "6000"), ("VOICE_BRIDGE_BIND", "::1")]),
        )
        .unwrap();
        assert_eq!(config.server.port, 6000);
        assert_eq!(config.server.bind.to_string(), "::1");
    }

    #[test]
    fn invalid_environment_port_is_rejected() {
        let result = Config::resolve(
            BridgeConfigFile::default(),
            &Overrides::default(),
            env(&[("VOICE_BRIDGE_PORT", "many")]),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn connections_get_names_urls_and_devices() {
        let fc = parse(
            r#"
[[connections]]
url = "http://hub:8083/"
type_aliases = "light:licht"
passthrough_intents = "set radio on:radio an"

[[connections.devices]]
name = "WZ_Rollo"
alexa_name = "rollo,rolladen"
room = "Wohnzimmer"

[connections.devices.mappings.TargetPosition]
reading = "pct"
max_value = 100.0

[connections.devices.mappings.Pressure]
reading = "pressure"

[[connections]]
webname = "haus"
longpoll = false
"#,
        );
        let config = Config::resolve(fc, &Overrides::default(), env(&[])).unwrap();

        let first = &config.connections[0];
        assert_eq!(first.name, "fhem");
        assert_eq!(first.base_url.as_str(), "http://hub:8083/fhem");
        assert_eq!(first.type_aliases["light"], vec!["licht"]);
        assert_eq!(first.passthrough_intents["FHEMsetIntent"], "set radio on");
        assert_eq!(first.refresh, Some(DEFAULT_REFRESH));
        assert!(first.longpoll);
        assert_eq!(first.status_level, CONFIRMATION_FULL);

        let rollo = &first.devices[0];
        assert_eq!(rollo.id, "wz_rollo");
        assert_eq!(rollo.primary_name, "rollo");
        assert_eq!(rollo.rooms, vec!["wohnzimmer"]);
        let position = rollo.mapping(Characteristic::TargetPosition).unwrap();
        assert_eq!(position.inform_id, "WZ_Rollo-pct");
        assert_eq!(position.max_value, Some(100.0));
        assert!(rollo.mapping_named("Pressure").is_some());

        let second = &config.connections[1];
        assert_eq!(second.name, "fhem2");
        assert_eq!(second.base_url.as_str(), "http://127.0.0.1:8083/haus");
        assert!(!second.longpoll);
        assert_eq!(config.device_count(), 1);
    }

    #[test]
    fn rejects_invalid_levels_duplicates_and_bounds() {
        let bad_level = parse("[[connections]]\nconfirmation_level = 3\n");
        assert!(Config::resolve(bad_level, &Overrides::default(), env(&[])).is_err());

        let bad_status = parse("[[connections]]\nstatus_level = 5\n");
        assert!(Config::resolve(bad_status, &Overrides::default(), env(&[])).is_err());

        let duplicate = parse("[[connections]]\nname = \"a\"\n[[connections]]\nname = \"a\"\n");
        assert!(Config::resolve(duplicate, &Overrides::default(), env(&[])).is_err());

        let inverted = parse(
            "[[connections]]\n[[connections.devices]]\nname = \"x\"\n\
             [connections.devices.mappings.Volume]\nmin_value = 10.0\nmax_value = 1.0\n",
        );
        assert!(Config::resolve(inverted, &Overrides::default(), env(&[])).is_err());
    }
}

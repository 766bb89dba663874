//! Device and command-mapping types

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static ENDPOINT_UNSAFE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_\-=#;:?@&]").expect("valid regex"));

/// Known device characteristics
///
/// Vendor-defined characteristics that are not listed here live in the
/// device's custom mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Characteristic {
    On,
    Brightness,
    TargetPosition,
    CurrentPosition,
    TargetTemperature,
    CurrentTemperature,
    Hue,
    Saturation,
    CurrentAmbientLightLevel,
    AirQuality,
    CarbonDioxideLevel,
    BatteryLevel,
    StatusLowBattery,
    CurrentDoorState,
    ContactSensorState,
    LockTargetState,
    LockCurrentState,
    Volume,
    ColorTemperature,
    /// Colour temperature in mired
    #[serde(rename = "CT")]
    Ct,
}

impl Characteristic {
    /// Every known characteristic
    pub const ALL: [Self; 20] = [
        Self::On,
        Self::Brightness,
        Self::TargetPosition,
        Self::CurrentPosition,
        Self::TargetTemperature,
        Self::CurrentTemperature,
        Self::Hue,
        Self::Saturation,
        Self::CurrentAmbientLightLevel,
        Self::AirQuality,
        Self::CarbonDioxideLevel,
        Self::BatteryLevel,
        Self::StatusLowBattery,
        Self::CurrentDoorState,
        Self::ContactSensorState,
        Self::LockTargetState,
        Self::LockCurrentState,
        Self::Volume,
        Self::ColorTemperature,
        Self::Ct,
    ];

    /// Canonical name as used in intent names and configuration
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::On => "On",
            Self::Brightness => "Brightness",
            Self::TargetPosition => "TargetPosition",
            Self::CurrentPosition => "CurrentPosition",
            Self::TargetTemperature => "TargetTemperature",
            Self::CurrentTemperature => "CurrentTemperature",
            Self::Hue => "Hue",
            Self::Saturation => "Saturation",
            Self::CurrentAmbientLightLevel => "CurrentAmbientLightLevel",
            Self::AirQuality => "AirQuality",
            Self::CarbonDioxideLevel => "CarbonDioxideLevel",
            Self::BatteryLevel => "BatteryLevel",
            Self::StatusLowBattery => "StatusLowBattery",
            Self::CurrentDoorState => "CurrentDoorState",
            Self::ContactSensorState => "ContactSensorState",
            Self::LockTargetState => "LockTargetState",
            Self::LockCurrentState => "LockCurrentState",
            Self::Volume => "Volume",
            Self::ColorTemperature => "ColorTemperature",
            Self::Ct => "CT",
        }
    }

    /// Look up a characteristic by its canonical name (case-sensitive)
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which assistant surfaces a device is exposed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Exposure {
    /// Smart-home API and conversational skill
    #[default]
    All,
    /// Smart-home API only
    SmartHome,
    /// Conversational skill only
    Skill,
    /// Not exposed at all
    Hidden,
}

impl Exposure {
    /// Visible to the structured smart-home API
    #[must_use]
    pub const fn smart_home(self) -> bool {
        matches!(self, Self::All | Self::SmartHome)
    }

    /// Visible to the conversational skill
    #[must_use]
    pub const fn skill(self) -> bool {
        matches!(self, Self::All | Self::Skill)
    }
}

/// Binding from a characteristic to a backend write target
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandMapping {
    /// Backend reading reflecting the current value
    pub reading: String,
    /// Pointer for the cached reading, `<device>-<reading>`
    pub inform_id: String,
    /// Set command; defaults to the reading name
    pub cmd: Option<String>,
    /// Command used to switch on (power mappings)
    pub cmd_on: Option<String>,
    /// Command used to switch off (power mappings)
    pub cmd_off: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    /// Input token → backend value
    pub values: BTreeMap<String, String>,
}

impl CommandMapping {
    /// Create a mapping for `reading` on backend device `device`
    #[must_use]
    pub fn new(device: &str, reading: &str) -> Self {
        Self {
            reading: reading.to_string(),
            inform_id: format!("{device}-{reading}"),
            ..Self::default()
        }
    }

    /// Set the command verb
    #[must_use]
    pub fn with_cmd(mut self, cmd: &str) -> Self {
        self.cmd = Some(cmd.to_string());
        self
    }

    /// Set inclusive value bounds
    #[must_use]
    pub const fn with_bounds(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_value = min;
        self.max_value = max;
        self
    }

    /// Add a value translation
    #[must_use]
    pub fn with_value(mut self, token: &str, backend: &str) -> Self {
        self.values.insert(token.to_string(), backend.to_string());
        self
    }

    /// Build the backend command that writes `value`
    #[must_use]
    pub fn set_command(&self, device: &str, value: &str) -> String {
        match self.cmd.as_deref() {
            Some(cmd) => format!("set {device} {cmd} {value}"),
            None if self.reading == "state" => format!("set {device} {value}"),
            None => format!("set {device} {} {value}", self.reading),
        }
    }

    /// Build the backend command that switches a power mapping
    #[must_use]
    pub fn power_command(&self, device: &str, on: bool) -> String {
        let word = if on {
            self.cmd_on.as_deref().unwrap_or("on")
        } else {
            self.cmd_off.as_deref().unwrap_or("off")
        };
        format!("set {device} {word}")
    }

    /// Interpret a cached reading as a power state
    #[must_use]
    pub fn reads_as_on(&self, raw: &str) -> bool {
        let raw = raw.trim();
        let off = self.cmd_off.as_deref().unwrap_or("off");
        if raw.is_empty() || raw.eq_ignore_ascii_case(off) || raw.eq_ignore_ascii_case("off") {
            return false;
        }
        raw.parse::<f64>().map_or(true, |n| n != 0.0)
    }
}

/// A device known to the bridge
#[derive(Debug, Clone)]
pub struct Device {
    /// Registry key: lower-cased backend name
    pub id: String,
    /// Backend name as defined on the hub
    pub name: String,
    /// Owning backend connection
    pub connection: String,
    /// Spoken display name (first alias)
    pub primary_name: String,
    /// Every spoken alias, including the primary name
    pub aliases: Vec<String>,
    pub rooms: Vec<String>,
    /// Category tag, e.g. `light`, `blind`, `lock`, `outlet`
    pub device_type: String,
    pub model: Option<String>,
    pub exposure: Exposure,
    mappings: BTreeMap<Characteristic, CommandMapping>,
    custom: BTreeMap<String, CommandMapping>,
}

impl Device {
    /// Create a device named after its backend name
    #[must_use]
    pub fn new(name: &str, connection: &str) -> Self {
        let (primary_name, aliases) = split_names(name);
        Self {
            id: name.to_lowercase(),
            name: name.to_string(),
            connection: connection.to_string(),
            primary_name,
            aliases,
            rooms: Vec::new(),
            device_type: String::new(),
            model: None,
            exposure: Exposure::All,
            mappings: BTreeMap::new(),
            custom: BTreeMap::new(),
        }
    }

    /// Set the spoken names from a comma-separated alias list
    #[must_use]
    pub fn with_spoken_names(mut self, raw: &str) -> Self {
        let (primary, aliases) = split_names(raw);
        self.primary_name = primary;
        self.aliases = aliases;
        self
    }

    /// Set the rooms from a comma-separated list
    #[must_use]
    pub fn with_rooms(mut self, raw: &str) -> Self {
        self.rooms = split_list(raw);
        self
    }

    /// Set the category tag
    #[must_use]
    pub fn with_type(mut self, device_type: &str) -> Self {
        self.device_type = device_type.to_lowercase();
        self
    }

    /// Set the exposure
    #[must_use]
    pub const fn with_exposure(mut self, exposure: Exposure) -> Self {
        self.exposure = exposure;
        self
    }

    /// Attach a mapping for a known characteristic
    #[must_use]
    pub fn with_mapping(mut self, characteristic: Characteristic, mapping: CommandMapping) -> Self {
        self.mappings.insert(characteristic, mapping);
        self
    }

    /// Attach a mapping for a vendor-defined characteristic
    #[must_use]
    pub fn with_custom_mapping(mut self, name: &str, mapping: CommandMapping) -> Self {
        self.custom.insert(name.to_string(), mapping);
        self
    }

    /// Re-apply name and room normalisation
    ///
    /// Idempotent; the registry calls it on every registration so devices
    /// built field-by-field still satisfy the lookup invariants.
    pub fn normalize(&mut self) {
        self.id = self.id.to_lowercase();
        let joined = if self.aliases.is_empty() {
            self.primary_name.clone()
        } else {
            self.aliases.join(",")
        };
        let (primary, aliases) = split_names(&joined);
        self.primary_name = primary;
        self.aliases = aliases;
        self.rooms = split_list(&self.rooms.join(","));
        self.device_type = self.device_type.to_lowercase();
    }

    /// Mapping for a known characteristic
    #[must_use]
    pub fn mapping(&self, characteristic: Characteristic) -> Option<&CommandMapping> {
        self.mappings.get(&characteristic)
    }

    /// Mapping by characteristic name, known or vendor-defined
    #[must_use]
    pub fn mapping_named(&self, name: &str) -> Option<&CommandMapping> {
        Characteristic::from_name(name)
            .and_then(|c| self.mappings.get(&c))
            .or_else(|| self.custom.get(name))
    }

    /// Whether any mapping exists for `characteristic`
    #[must_use]
    pub fn has(&self, characteristic: Characteristic) -> bool {
        self.mappings.contains_key(&characteristic)
    }

    /// All mappings with their characteristic names, known ones first
    pub fn mappings(&self) -> impl Iterator<Item = (&str, &CommandMapping)> {
        self.mappings
            .iter()
            .map(|(c, m)| (c.as_str(), m))
            .chain(self.custom.iter().map(|(n, m)| (n.as_str(), m)))
    }

    /// Case-insensitive alias match
    #[must_use]
    pub fn has_name(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.primary_name == name || self.aliases.iter().any(|a| *a == name)
    }

    /// Whether the device belongs to `room`
    #[must_use]
    pub fn is_in_room(&self, room: &str) -> bool {
        let room = room.to_lowercase();
        self.rooms.iter().any(|r| *r == room)
    }

    /// Whether the device is of category `device_type`
    #[must_use]
    pub fn is_of_type(&self, device_type: &str) -> bool {
        self.device_type.eq_ignore_ascii_case(device_type)
    }

    /// Rooms joined as configured, if any
    #[must_use]
    pub fn room_label(&self) -> Option<String> {
        (!self.rooms.is_empty()).then(|| self.rooms.join(","))
    }

    /// Endpoint identifier safe for the smart-home API
    #[must_use]
    pub fn endpoint_id(&self) -> String {
        ENDPOINT_UNSAFE.replace_all(&self.name, "_").into_owned()
    }
}

/// Lower-case, turn `+` into spaces and split a comma list
fn split_list(raw: &str) -> Vec<String> {
    raw.to_lowercase()
        .replace('+', " ")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Primary display name plus full alias list
fn split_names(raw: &str) -> (String, Vec<String>) {
    let aliases = split_list(raw);
    let primary = aliases.first().cloned().unwrap_or_default();
    (primary, aliases)
}

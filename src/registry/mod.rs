//! Device registry with room index and name resolution

mod device;

pub use device::{Characteristic, CommandMapping, Device, Exposure};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::RwLock;

/// Shared registry handle
pub type SharedRegistry = Arc<RwLock<DeviceRegistry>>;

/// Category words understood without any configured type alias
pub const BUILTIN_CATEGORY_WORDS: [(&str, &str); 11] = [
    ("licht", "light"),
    ("lampe", "light"),
    ("lampen", "light"),
    ("light", "light"),
    ("rolladen", "blind"),
    ("rolläden", "blind"),
    ("rollo", "blind"),
    ("rollos", "blind"),
    ("jalousie", "blind"),
    ("jalousien", "blind"),
    ("blinds", "blind"),
];

/// Look up a built-in category word
#[must_use]
pub fn builtin_category(word: &str) -> Option<&'static str> {
    let word = word.to_lowercase();
    BUILTIN_CATEGORY_WORDS
        .iter()
        .find(|(w, _)| *w == word)
        .map(|(_, t)| *t)
}

/// Outcome of a name lookup
#[derive(Debug)]
pub enum Resolution<'a> {
    NotFound,
    Unique(&'a Device),
    Ambiguous(Vec<&'a Device>),
}

impl<'a> From<Vec<&'a Device>> for Resolution<'a> {
    fn from(mut matches: Vec<&'a Device>) -> Self {
        match matches.len() {
            0 => Self::NotFound,
            1 => Self::Unique(matches.remove(0)),
            _ => Self::Ambiguous(matches),
        }
    }
}

/// Bidirectional room ↔ name index
#[derive(Debug, Default, Clone)]
pub struct RoomIndex {
    names_of_room: BTreeMap<String, BTreeSet<String>>,
    rooms_of_name: BTreeMap<String, Vec<Option<String>>>,
}

impl RoomIndex {
    fn build<'a>(devices: impl Iterator<Item = &'a Device>) -> Self {
        let mut index = Self::default();
        for device in devices {
            for room in &device.rooms {
                index
                    .names_of_room
                    .entry(room.clone())
                    .or_default()
                    .insert(device.primary_name.clone());
            }
            index
                .rooms_of_name
                .entry(device.primary_name.clone())
                .or_default()
                .push(device.room_label());
        }
        index
    }

    /// All known rooms, sorted
    pub fn rooms(&self) -> impl Iterator<Item = &str> {
        self.names_of_room.keys().map(String::as_str)
    }

    /// Display names of the devices in `room`
    pub fn names_in(&self, room: &str) -> impl Iterator<Item = &str> {
        self.names_of_room
            .get(&room.to_lowercase())
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Room labels of every device displayed as `name`
    #[must_use]
    pub fn rooms_of(&self, name: &str) -> &[Option<String>] {
        self.rooms_of_name.get(name).map_or(&[], Vec::as_slice)
    }

    /// Whether more than one device is displayed as `name`
    #[must_use]
    pub fn is_name_shared(&self, name: &str) -> bool {
        self.rooms_of(name).len() > 1
    }
}

/// Registry of all known devices
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, Device>,
    index: RoomIndex,
}

impl DeviceRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a device by id
    ///
    /// Returns `false` when the device is hidden and was not registered.
    pub fn register(&mut self, mut device: Device) -> bool {
        if !device.exposure.smart_home() && !device.exposure.skill() {
            tracing::debug!(device = %device.name, "ignoring device not exposed to the assistant");
            return false;
        }

        device.normalize();
        tracing::info!(
            device = %device.id,
            name = %device.primary_name,
            connection = %device.connection,
            "registered device"
        );
        self.devices.insert(device.id.clone(), device);
        self.rebuild_index();
        true
    }

    /// Remove a device by id
    pub fn remove(&mut self, id: &str) -> Option<Device> {
        let removed = self.devices.remove(&id.to_lowercase());
        if removed.is_some() {
            self.rebuild_index();
        }
        removed
    }

    /// Remove every device of a backend connection
    pub fn remove_by_backend(&mut self, connection: &str) -> usize {
        let before = self.devices.len();
        self.devices.retain(|_, d| d.connection != connection);
        let removed = before - self.devices.len();
        if removed > 0 {
            tracing::info!(connection, removed, "removed devices of connection");
            self.rebuild_index();
        }
        removed
    }

    /// Remove a single backend device of a connection
    pub fn remove_named(&mut self, connection: &str, name: &str) -> Option<Device> {
        let id = name.to_lowercase();
        if self
            .devices
            .get(&id)
            .is_some_and(|d| d.connection == connection)
        {
            self.remove(&id)
        } else {
            None
        }
    }

    /// Get a device by id (case-insensitive)
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Device> {
        self.devices.get(&id.to_lowercase())
    }

    /// Iterate all devices in id order
    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// Devices exposed to the smart-home API
    pub fn smart_home_devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values().filter(|d| d.exposure.smart_home())
    }

    /// Devices exposed to the conversational skill
    pub fn skill_devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values().filter(|d| d.exposure.skill())
    }

    /// Number of devices
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Current room index
    #[must_use]
    pub const fn index(&self) -> &RoomIndex {
        &self.index
    }

    /// Resolve a spoken device name, optionally within a room
    #[must_use]
    pub fn resolve(&self, name: &str, room: Option<&str>) -> Resolution<'_> {
        self.skill_devices()
            .filter(|d| d.has_name(name))
            .filter(|d| room.is_none_or(|r| d.is_in_room(r)))
            .collect::<Vec<_>>()
            .into()
    }

    /// Devices of a category, optionally within a room
    #[must_use]
    pub fn resolve_category(&self, device_type: &str, room: Option<&str>) -> Vec<&Device> {
        self.skill_devices()
            .filter(|d| d.is_of_type(device_type))
            .filter(|d| room.is_none_or(|r| d.is_in_room(r)))
            .collect()
    }

    /// Render the custom slot-type values for the skill interaction model
    #[must_use]
    pub fn custom_slot_types<I>(&self, type_aliases: I) -> String
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut out = String::from("Custom Slot Types:\n  FHEM_Device");
        let mut seen = BTreeSet::new();
        let mut push = |name: &str| {
            if seen.insert(name.to_string()) {
                out.push_str("\n    ");
                out.push_str(name);
            }
        };

        for name in self.devices.values().flat_map(|d| &d.aliases) {
            push(name);
        }
        for name in type_aliases {
            push(name.as_ref());
        }
        for name in ["lampe", "licht", "lampen", "rolläden", "jalousien", "rollos"] {
            push(name);
        }

        out.push_str("\n  FHEM_Room");
        for room in self.index.rooms() {
            out.push_str("\n    ");
            out.push_str(room);
        }
        out
    }

    fn rebuild_index(&mut self) {
        self.index = RoomIndex::build(self.devices.values());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lamp(name: &str, room: &str) -> Device {
        Device::new(name, "fhem")
            .with_spoken_names("lamp")
            .with_rooms(room)
            .with_type("light")
            .with_mapping(Characteristic::On, CommandMapping::new(name, "state"))
    }

    #[test]
    fn register_and_get() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.register(lamp("K_Lamp", "kitchen")));

        assert_eq!(registry.len(), 1);
        assert!(registry.get("k_lamp").is_some());
        assert!(registry.get("K_LAMP").is_some());
    }

    #[test]
    fn hidden_devices_are_not_registered() {
        let mut registry = DeviceRegistry::new();
        let hidden = lamp("x", "kitchen").with_exposure(Exposure::Hidden);

        assert!(!registry.register(hidden));
        assert!(registry.is_empty());
    }

    #[test]
    fn resolve_reports_ambiguity_across_rooms() {
        let mut registry = DeviceRegistry::new();
        registry.register(lamp("k_lamp", "kitchen"));
        registry.register(lamp("o_lamp", "office"));

        assert!(matches!(
            registry.resolve("Lamp", None),
            Resolution::Ambiguous(ref v) if v.len() == 2
        ));
        assert!(matches!(
            registry.resolve("lamp", Some("kitchen")),
            Resolution::Unique(d) if d.id == "k_lamp"
        ));
        assert!(matches!(registry.resolve("lamp", Some("garage")), Resolution::NotFound));
    }

    #[test]
    fn room_index_tracks_shared_names() {
        let mut registry = DeviceRegistry::new();
        registry.register(lamp("k_lamp", "kitchen"));
        registry.register(lamp("o_lamp", "office"));

        assert!(registry.index().is_name_shared("lamp"));
        assert_eq!(registry.index().rooms().collect::<Vec<_>>(), vec!["kitchen", "office"]);

        registry.remove("o_lamp");
        assert!(!registry.index().is_name_shared("lamp"));
        assert_eq!(registry.index().names_in("kitchen").collect::<Vec<_>>(), vec!["lamp"]);
    }

    #[test]
    fn remove_by_backend_evicts_only_that_connection() {
        let mut registry = DeviceRegistry::new();
        registry.register(lamp("a", "kitchen"));
        registry.register(Device::new("b", "other").with_rooms("office"));

        assert_eq!(registry.remove_by_backend("fhem"), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.index().names_in("kitchen").next().is_none());
    }

    #[test]
    fn remove_named_checks_connection() {
        let mut registry = DeviceRegistry::new();
        registry.register(lamp("a", "kitchen"));

        assert!(registry.remove_named("other", "a").is_none());
        assert!(registry.remove_named("fhem", "A").is_some());
    }

    #[test]
    fn category_resolution() {
        let mut registry = DeviceRegistry::new();
        registry.register(lamp("a", "kitchen"));
        registry.register(lamp("b", "office"));

        assert_eq!(builtin_category("Lampen"), Some("light"));
        assert_eq!(registry.resolve_category("light", None).len(), 2);
        assert_eq!(registry.resolve_category("light", Some("office")).len(), 1);
    }

    #[test]
    fn slot_types_list_names_and_rooms() {
        let mut registry = DeviceRegistry::new();
        registry.register(lamp("a", "kitchen"));

        let out = registry.custom_slot_types(["leuchte", "lampe"]);
        assert!(out.starts_with("Custom Slot Types:\n  FHEM_Device\n    lamp"));
        assert!(out.contains("\n    leuchte"));
        assert_eq!(out.matches("\n    lampe\n").count(), 1);
        assert!(out.ends_with("FHEM_Room\n    kitchen"));
    }
}

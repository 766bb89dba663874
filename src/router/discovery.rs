//! Device discovery for both API generations
//!
//! Capabilities are derived solely from which characteristics a device
//! maps; devices without any resulting capability are not listed.

use serde_json::{Value, json};

use super::{DirectiveRouter, namespace};
use crate::protocol::response::{bare_event, directive};
use crate::protocol::{DirectiveError, DirectiveV2, DirectiveV3, Generation, Header};
use crate::registry::{Characteristic, Device};

fn capability(interface: &str, properties: &[&str], retrievable: bool) -> Value {
    let supported: Vec<Value> = properties.iter().map(|p| json!({ "name": p })).collect();
    json!({
        "type": "AlexaInterface",
        "interface": interface,
        "version": "3",
        "properties": {
            "supported": supported,
            "proactivelyReported": false,
            "retrievable": retrievable,
        },
    })
}

/// Display category implied by the device's type tag
fn type_category(device: &Device) -> Option<&'static str> {
    if device.is_of_type("outlet") {
        Some("SMARTPLUG")
    } else if device.is_of_type("light") {
        Some("LIGHT")
    } else if device.is_of_type("lock") {
        Some("SMARTLOCK")
    } else {
        None
    }
}

fn description(device: &Device) -> String {
    match device.room_label() {
        Some(rooms) => format!("n: {}, r: {rooms}", device.name),
        None => format!("n: {}", device.name),
    }
}

fn model_name(device: &Device) -> String {
    format!("FHEM{}", device.model.as_deref().unwrap_or("<unknown>"))
}

/// Capability list of a v3 endpoint plus its display categories
#[must_use]
pub fn capabilities_v3(device: &Device) -> (Vec<Value>, Vec<&'static str>) {
    let mut capabilities = Vec::new();
    let mut categories: Vec<&'static str> = type_category(device).into_iter().collect();

    if device.has(Characteristic::Brightness) {
        capabilities.push(capability(namespace::BRIGHTNESS, &["brightness"], true));
    }
    if device.has(Characteristic::TargetPosition) {
        capabilities.push(capability(namespace::PERCENTAGE, &["percentage"], true));
    }
    if device.has(Characteristic::Volume) {
        categories.push("OTHER");
        capabilities.push(capability(namespace::SPEAKER, &["volume"], true));
    }
    if device.has(Characteristic::Hue) {
        capabilities.push(capability(namespace::COLOR, &["color"], false));
    }
    if device.has(Characteristic::ColorTemperature) || device.has(Characteristic::Ct) {
        capabilities.push(capability(
            namespace::COLOR_TEMPERATURE,
            &["colorTemperatureInKelvin"],
            true,
        ));
    }
    if device.has(Characteristic::On) {
        capabilities.push(capability(namespace::POWER, &["powerState"], true));
        if categories.is_empty() {
            categories.push("SWITCH");
        }
    }
    if device.has(Characteristic::TargetTemperature) {
        capabilities.push(capability(
            namespace::THERMOSTAT,
            &["targetSetpoint", "thermostatMode"],
            true,
        ));
        categories.push("THERMOSTAT");
    }
    if device.has(Characteristic::CurrentTemperature) {
        capabilities.push(capability(namespace::TEMPERATURE_SENSOR, &["temperature"], true));
        if categories.is_empty() {
            categories.push("TEMPERATURE_SENSOR");
        }
    }
    if device.has(Characteristic::LockTargetState) {
        capabilities.push(capability(namespace::LOCK, &["lockState"], true));
    }

    (capabilities, categories)
}

/// v3 endpoint description, `None` when the device has no capability
#[must_use]
pub fn endpoint_v3(device: &Device) -> Option<Value> {
    let (capabilities, categories) = capabilities_v3(device);
    if capabilities.is_empty() {
        tracing::debug!(device = %device.id, "no capabilities, not discovered");
        return None;
    }

    Some(json!({
        "endpointId": device.endpoint_id(),
        "manufacturerName": format!("FHEM{}", device.device_type),
        "modelName": model_name(device),
        "version": "<unknown>",
        "friendlyName": device.primary_name,
        "description": description(device),
        "displayCategories": categories,
        "cookie": { "device": device.name },
        "capabilities": capabilities,
    }))
}

/// Actions and appliance types of a v2 appliance
#[must_use]
pub fn actions_v2(device: &Device) -> (Vec<&'static str>, Vec<&'static str>) {
    let mut actions = Vec::new();
    let mut types: Vec<&'static str> = type_category(device).into_iter().collect();

    if device.has(Characteristic::On) {
        actions.extend(["turnOn", "turnOff"]);
        types.push("SWITCH");
    }
    if device.has(Characteristic::Brightness)
        || device.has(Characteristic::TargetPosition)
        || device.has(Characteristic::Volume)
    {
        actions.extend([
            "setPercentage",
            "incrementPercentage",
            "decrementPercentage",
        ]);
    }
    if device.has(Characteristic::TargetTemperature) {
        actions.extend([
            "setTargetTemperature",
            "incrementTargetTemperature",
            "decrementTargetTemperature",
            "getTargetTemperature",
        ]);
        types.push("THERMOSTAT");
    }
    if device.has(Characteristic::CurrentTemperature) {
        actions.push("getTemperatureReading");
    }
    if device.has(Characteristic::Hue) {
        actions.push("setColor");
    }
    if device.has(Characteristic::ColorTemperature) || device.has(Characteristic::Ct) {
        actions.extend([
            "setColorTemperature",
            "incrementColorTemperature",
            "decrementColorTemperature",
        ]);
    }
    if device.has(Characteristic::LockTargetState) {
        actions.push("setLockState");
    }
    if device.has(Characteristic::LockCurrentState) {
        actions.push("getLockState");
    }

    (actions, types)
}

/// v2 appliance description, `None` when the device has no action
#[must_use]
pub fn appliance_v2(device: &Device) -> Option<Value> {
    let (actions, types) = actions_v2(device);
    if actions.is_empty() {
        return None;
    }

    Some(json!({
        "applianceId": device.endpoint_id(),
        "manufacturerName": format!("FHEM{}", device.device_type),
        "modelName": model_name(device),
        "version": "<unknown>",
        "friendlyName": device.primary_name,
        "friendlyDescription": description(device),
        "isReachable": true,
        "actions": actions,
        "applianceTypes": types,
        "additionalApplianceDetails": { "device": device.name },
    }))
}

impl DirectiveRouter {
    pub(super) async fn discover_v3(
        &self,
        request: &DirectiveV3,
        room: Option<&str>,
    ) -> Result<Value, DirectiveError> {
        if request.header.name != "Discover" {
            return Err(DirectiveError::UnsupportedOperation);
        }

        let devices = self.devices_in(room).await;
        let endpoints: Vec<Value> = devices.iter().filter_map(endpoint_v3).collect();
        tracing::info!(endpoints = endpoints.len(), room = ?room, "discovery");

        let header = Header::new(Generation::V3, namespace::DISCOVERY, "Discover.Response");
        Ok(bare_event(&header, json!({ "endpoints": endpoints })))
    }

    pub(super) async fn discover_v2(
        &self,
        request: &DirectiveV2,
        room: Option<&str>,
    ) -> Result<Value, DirectiveError> {
        if request.header.name != "DiscoverAppliancesRequest" {
            return Err(DirectiveError::UnsupportedOperation);
        }

        let devices = self.devices_in(room).await;
        let appliances: Vec<Value> = devices.iter().filter_map(appliance_v2).collect();
        tracing::info!(appliances = appliances.len(), room = ?room, "discovery");

        let header = Header::new(
            Generation::V2,
            namespace::V2_DISCOVERY,
            "DiscoverAppliancesResponse",
        );
        Ok(directive(&header, json!({ "discoveredAppliances": appliances })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CommandMapping;

    fn names(capabilities: &[Value]) -> Vec<&str> {
        capabilities
            .iter()
            .map(|c| c["interface"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn power_capability_iff_on_mapping() {
        let switch = Device::new("plug", "fhem")
            .with_mapping(Characteristic::On, CommandMapping::new("plug", "state"));
        let sensor = Device::new("thermo", "fhem").with_mapping(
            Characteristic::CurrentTemperature,
            CommandMapping::new("thermo", "temperature"),
        );

        let (caps, categories) = capabilities_v3(&switch);
        assert_eq!(names(&caps), vec![namespace::POWER]);
        assert_eq!(categories, vec!["SWITCH"]);

        let (caps, categories) = capabilities_v3(&sensor);
        assert!(!names(&caps).contains(&namespace::POWER));
        assert_eq!(categories, vec!["TEMPERATURE_SENSOR"]);
    }

    #[test]
    fn devices_without_capabilities_are_skipped() {
        let bare = Device::new("dummy", "fhem");
        assert!(endpoint_v3(&bare).is_none());
        assert!(appliance_v2(&bare).is_none());
    }

    #[test]
    fn light_endpoint_shape() {
        let lamp = Device::new("WZ Lamp", "fhem")
            .with_spoken_names("Stehlampe")
            .with_rooms("Wohnzimmer")
            .with_type("light")
            .with_mapping(Characteristic::On, CommandMapping::new("WZ Lamp", "state"))
            .with_mapping(Characteristic::Brightness, CommandMapping::new("WZ Lamp", "pct"));

        let endpoint = endpoint_v3(&lamp).unwrap();
        assert_eq!(endpoint["endpointId"], "WZ_Lamp");
        assert_eq!(endpoint["friendlyName"], "stehlampe");
        assert_eq!(endpoint["description"], "n: WZ Lamp, r: wohnzimmer");
        assert_eq!(endpoint["manufacturerName"], "FHEMlight");
        assert_eq!(endpoint["modelName"], "FHEM<unknown>");
        assert_eq!(endpoint["cookie"]["device"], "WZ Lamp");
        assert_eq!(endpoint["displayCategories"], json!(["LIGHT"]));
        assert_eq!(
            names(endpoint["capabilities"].as_array().unwrap()),
            vec![namespace::BRIGHTNESS, namespace::POWER]
        );
    }

    #[test]
    fn thermostat_actions_v2() {
        let heater = Device::new("heater", "fhem").with_mapping(
            Characteristic::TargetTemperature,
            CommandMapping::new("heater", "desired-temp"),
        );
        let (actions, types) = actions_v2(&heater);
        assert!(actions.contains(&"setTargetTemperature"));
        assert!(actions.contains(&"getTargetTemperature"));
        assert_eq!(types, vec!["THERMOSTAT"]);
    }
}

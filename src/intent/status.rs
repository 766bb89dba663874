//! Spoken device status

use super::phrases::{decimal_comma, in_room};
use crate::registry::{Characteristic, CommandMapping, Device};

/// State parts of a device in fixed order, `None` when nothing is readable
///
/// `read` returns the cached reading of a mapping. Characteristics
/// without a cached reading are left out.
pub fn describe(device: &Device, read: impl Fn(&CommandMapping) -> Option<String>) -> Option<String> {
    let value = |c: Characteristic| device.mapping(c).and_then(&read);
    let mut parts = Vec::new();

    if let Some(mapping) = device.mapping(Characteristic::On)
        && let Some(raw) = read(mapping)
    {
        let state = if mapping.reads_as_on(&raw) { "an" } else { "aus" };
        parts.push(format!("ist {state}"));
    }
    if let Some(v) = value(Characteristic::CurrentTemperature) {
        parts.push(format!("misst {} Grad", decimal_comma(&v)));
    }
    if let Some(v) = value(Characteristic::TargetTemperature) {
        parts.push(format!("steht auf {} Grad", decimal_comma(&v)));
    }
    if let Some(v) = value(Characteristic::TargetPosition).or_else(|| value(Characteristic::CurrentPosition)) {
        parts.push(format!("steht auf {v} Prozent"));
    }
    if let Some(v) = value(Characteristic::CurrentAmbientLightLevel) {
        parts.push(format!("misst {v} Lux"));
    }
    if let Some(v) = value(Characteristic::AirQuality) {
        parts.push(format!("misst Luftqualität {v}"));
    }
    if let Some(v) = value(Characteristic::CarbonDioxideLevel) {
        parts.push(format!("misst {v} ppm co2"));
    }
    if let Some(v) = value(Characteristic::BatteryLevel) {
        parts.push(format!("der Batteriestand ist {}", decimal_comma(&v)));
    } else if let Some(v) = value(Characteristic::StatusLowBattery) {
        let level = if v == "ok" { "in ordnung" } else { "niedrig" };
        parts.push(format!("der Batteriestand ist {level}"));
    }
    if let Some(v) = value(Characteristic::CurrentDoorState).or_else(|| value(Characteristic::ContactSensorState)) {
        let state = if v == "open" { "geöffnet" } else { "geschlossen" };
        parts.push(format!("ist {state}"));
    }
    if let Some(v) = value(Characteristic::Volume) {
        parts.push(format!("steht auf {v} Prozent"));
    }

    if parts.is_empty() {
        parts.extend(
            device
                .mappings()
                .filter_map(|(_, mapping)| read(mapping))
                .map(|v| format!("hat den status {v}")),
        );
    }

    (!parts.is_empty()).then(|| parts.join(" und "))
}

/// Full status sentence of one device
///
/// The room is named when the caller asked for one, or when the display
/// name alone does not identify the device.
pub fn status_sentence(
    device: &Device,
    state: Option<String>,
    room: Option<&str>,
    shared_name: bool,
) -> String {
    let Some(state) = state else {
        return format!("Ich kann das Gerät mit Namen {} nicht abfragen.", device.primary_name);
    };

    let label = device.room_label();
    let room = room.or_else(|| label.as_deref().filter(|_| shared_name));
    format!("{} {state}", in_room(&device.primary_name, room))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn thermostat() -> Device {
        Device::new("wz_heizung", "fhem")
            .with_spoken_names("heizung")
            .with_rooms("wohnzimmer")
            .with_mapping(
                Characteristic::CurrentTemperature,
                CommandMapping::new("wz_heizung", "measured-temp"),
            )
            .with_mapping(
                Characteristic::TargetTemperature,
                CommandMapping::new("wz_heizung", "desired-temp"),
            )
            .with_mapping(
                Characteristic::StatusLowBattery,
                CommandMapping::new("wz_heizung", "battery"),
            )
    }

    fn reader(values: &[(&str, &str)]) -> impl Fn(&CommandMapping) -> Option<String> {
        let values: HashMap<String, String> = values
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |m: &CommandMapping| values.get(&m.inform_id).cloned()
    }

    #[test]
    fn parts_in_fixed_order() {
        let read = reader(&[
            ("wz_heizung-measured-temp", "21.5"),
            ("wz_heizung-desired-temp", "22"),
            ("wz_heizung-battery", "ok"),
        ]);
        assert_eq!(
            describe(&thermostat(), read).as_deref(),
            Some("misst 21,5 Grad und steht auf 22 Grad und der Batteriestand ist in ordnung")
        );
    }

    #[test]
    fn unread_characteristics_are_skipped() {
        let read = reader(&[("wz_heizung-battery", "low")]);
        assert_eq!(
            describe(&thermostat(), read).as_deref(),
            Some("der Batteriestand ist niedrig")
        );
    }

    #[test]
    fn power_state_and_fallback() {
        let lamp = Device::new("lamp", "fhem")
            .with_mapping(Characteristic::On, CommandMapping::new("lamp", "state"));
        assert_eq!(
            describe(&lamp, reader(&[("lamp-state", "off")])).as_deref(),
            Some("ist aus")
        );

        let sensor = Device::new("sensor", "fhem")
            .with_custom_mapping("Pressure", CommandMapping::new("sensor", "pressure"));
        assert_eq!(
            describe(&sensor, reader(&[("sensor-pressure", "1013")])).as_deref(),
            Some("hat den status 1013")
        );
        assert_eq!(describe(&sensor, reader(&[])), None);
    }

    #[test]
    fn sentence_names_the_room_when_needed() {
        let device = thermostat();
        let state = || Some("misst 20 Grad".to_string());

        assert_eq!(status_sentence(&device, state(), None, false), "heizung misst 20 Grad");
        assert_eq!(
            status_sentence(&device, state(), None, true),
            "heizung im Raum wohnzimmer misst 20 Grad"
        );
        assert_eq!(
            status_sentence(&device, state(), Some("büro"), false),
            "heizung im Raum büro misst 20 Grad"
        );
        assert_eq!(
            status_sentence(&device, None, None, false),
            "Ich kann das Gerät mit Namen heizung nicht abfragen."
        );
    }
}

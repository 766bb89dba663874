//! v2 control, query and system handlers

use serde_json::{Value, json};

use super::{DirectiveRouter, Target, namespace, required};
use crate::normalize::{Bounds, fraction_to_percent, percent_to_fraction};
use crate::protocol::response::{directive, number};
use crate::protocol::{DirectiveError, DirectiveV2, Generation, Header};
use crate::registry::Characteristic;

const PERCENT_MAPPINGS: [Characteristic; 3] = [
    Characteristic::Brightness,
    Characteristic::TargetPosition,
    Characteristic::Volume,
];

fn reply(ns: &str, name: &str, payload: Value) -> Value {
    directive(&Header::new(Generation::V2, ns, name), payload)
}

fn confirmation(name: &str, payload: Value) -> Value {
    reply(namespace::V2_CONTROL, name, payload)
}

/// `HealthCheckRequest`
pub(super) fn system(request: &DirectiveV2) -> Result<Value, DirectiveError> {
    if request.header.name != "HealthCheckRequest" {
        return Err(DirectiveError::UnsupportedOperation);
    }
    Ok(reply(
        namespace::V2_SYSTEM,
        "HealthCheckResponse",
        json!({ "description": "The system is currently healthy", "isHealthy": true }),
    ))
}

impl DirectiveRouter {
    pub(super) async fn control_v2(&self, request: &DirectiveV2) -> Result<Value, DirectiveError> {
        let target = self.target(request.target_device()).await?;
        let payload = &request.payload;

        match request.header.name.as_str() {
            "TurnOnRequest" => {
                target.power(true).await?;
                Ok(confirmation("TurnOnConfirmation", json!({})))
            }
            "TurnOffRequest" => {
                target.power(false).await?;
                Ok(confirmation("TurnOffConfirmation", json!({})))
            }
            "SetPercentageRequest" => {
                let (_, mapping) = target.first_mapping(&PERCENT_MAPPINGS)?;
                let value = required(payload, "/percentageState/value")?;
                target.set_number(mapping, value, None).await?;
                Ok(confirmation("SetPercentageConfirmation", json!({})))
            }
            "IncrementPercentageRequest" => {
                let delta = required(payload, "/deltaPercentage/value")?;
                adjust_percentage(&target, delta).await?;
                Ok(confirmation("IncrementPercentageConfirmation", json!({})))
            }
            "DecrementPercentageRequest" => {
                let delta = required(payload, "/deltaPercentage/value")?;
                adjust_percentage(&target, -delta).await?;
                Ok(confirmation("DecrementPercentageConfirmation", json!({})))
            }
            "SetTargetTemperatureRequest" => {
                let value = required(payload, "/targetTemperature/value")?;
                set_target_temperature(&target, |_| Ok(value), "SetTargetTemperatureConfirmation")
                    .await
            }
            "IncrementTargetTemperatureRequest" => {
                let delta = required(payload, "/deltaTemperature/value")?;
                set_target_temperature(
                    &target,
                    |current| current.map(|c| c + delta).ok_or(DirectiveError::UnsupportedOperation),
                    "IncrementTargetTemperatureConfirmation",
                )
                .await
            }
            "DecrementTargetTemperatureRequest" => {
                let delta = required(payload, "/deltaTemperature/value")?;
                set_target_temperature(
                    &target,
                    |current| current.map(|c| c - delta).ok_or(DirectiveError::UnsupportedOperation),
                    "DecrementTargetTemperatureConfirmation",
                )
                .await
            }
            "SetColorRequest" => set_color(&target, payload).await,
            "SetColorTemperatureRequest" => {
                let value = required(payload, "/colorTemperature/value")?;
                set_color_temperature(&target, value, "SetColorTemperatureConfirmation").await
            }
            "IncrementColorTemperatureRequest" => {
                let value = target.current_kelvin()? + 500.0;
                set_color_temperature(&target, value, "IncrementColorTemperatureConfirmation").await
            }
            "DecrementColorTemperatureRequest" => {
                let value = target.current_kelvin()? - 500.0;
                set_color_temperature(&target, value, "DecrementColorTemperatureConfirmation").await
            }
            "SetLockStateRequest" => {
                let mapping = target.mapping(Characteristic::LockTargetState)?;
                let (token, state) = match payload.pointer("/lockState/value").and_then(Value::as_str) {
                    Some("UNLOCKED") => ("UNSECURED", "UNLOCKED"),
                    _ => ("SECURED", "LOCKED"),
                };
                target.set_token(mapping, token).await?;
                Ok(confirmation(
                    "SetLockStateConfirmation",
                    json!({ "lockState": { "value": state } }),
                ))
            }
            _ => Err(DirectiveError::UnsupportedOperation),
        }
    }

    pub(super) async fn query_v2(&self, request: &DirectiveV2) -> Result<Value, DirectiveError> {
        let target = self.target(request.target_device()).await?;

        let (name, payload) = match request.header.name.as_str() {
            "GetLockStateRequest" => {
                target.mapping(Characteristic::LockCurrentState)?;
                let state = target.lock_state().unwrap_or("UNLOCKED");
                ("GetLockStateResponse", json!({ "lockState": { "value": state } }))
            }
            "GetTemperatureReadingRequest" => {
                let mapping = target.mapping(Characteristic::CurrentTemperature)?;
                let value = target.cached_number(mapping).map(number);
                (
                    "GetTemperatureReadingResponse",
                    json!({ "temperatureReading": { "value": value } }),
                )
            }
            "GetTargetTemperatureRequest" => {
                let mapping = target.mapping(Characteristic::TargetTemperature)?;
                let value = target.cached_number(mapping).map(number);
                (
                    "GetTargetTemperatureResponse",
                    json!({ "targetTemperature": { "value": value } }),
                )
            }
            _ => return Err(DirectiveError::UnsupportedOperation),
        };
        Ok(reply(namespace::V2_QUERY, name, payload))
    }
}

/// Relative percentage change
///
/// Leaving 0–100 clamps for target-position devices and is out of range
/// for everything else.
async fn adjust_percentage(target: &Target, delta: f64) -> Result<(), DirectiveError> {
    let (_, mapping) = target.first_mapping(&PERCENT_MAPPINGS)?;
    let value = target.current(mapping)? + delta;

    if !Bounds::PERCENT.contains(value) && !target.device.has(Characteristic::TargetPosition) {
        return Err(DirectiveError::ValueOutOfRange {
            min: Bounds::PERCENT.min,
            max: Bounds::PERCENT.max,
        });
    }
    target.set_number(mapping, value, Some(Bounds::PERCENT)).await?;
    Ok(())
}

/// Absolute or relative target temperature, rejected outside the bounds
async fn set_target_temperature(
    target: &Target,
    compute: impl FnOnce(Option<f64>) -> Result<f64, DirectiveError>,
    name: &str,
) -> Result<Value, DirectiveError> {
    let mapping = target.mapping(Characteristic::TargetTemperature)?;
    let previous = target.cached_number(mapping);
    let value = compute(previous)?;

    let bounds = Bounds::TARGET_TEMPERATURE.narrowed_by(mapping);
    if !bounds.contains(value) {
        return Err(DirectiveError::ValueOutOfRange {
            min: bounds.min,
            max: bounds.max,
        });
    }

    let value = target.set_number(mapping, value, None).await?;
    Ok(confirmation(
        name,
        json!({
            "targetTemperature": { "value": number(value) },
            "previousState": { "targetTemperature": { "value": previous.map(number) } },
        }),
    ))
}

async fn set_color(target: &Target, payload: &Value) -> Result<Value, DirectiveError> {
    let hue = required(payload, "/color/hue")?;
    let saturation = fraction_to_percent(required(payload, "/color/saturation")?);
    let brightness = fraction_to_percent(required(payload, "/color/brightness")?);

    let hue = target
        .set_number(target.mapping(Characteristic::Hue)?, hue, None)
        .await?;
    let saturation = match target.device.mapping(Characteristic::Saturation) {
        Some(m) => target.set_number(m, saturation, Some(Bounds::PERCENT)).await?,
        None => saturation,
    };
    let brightness = match target.device.mapping(Characteristic::Brightness) {
        Some(m) => target.set_number(m, brightness, Some(Bounds::PERCENT)).await?,
        None => brightness,
    };

    Ok(confirmation(
        "SetColorConfirmation",
        json!({ "achievedState": { "color": {
            "hue": number(hue),
            "saturation": percent_to_fraction(saturation),
            "brightness": percent_to_fraction(brightness),
        } } }),
    ))
}

async fn set_color_temperature(
    target: &Target,
    kelvin: f64,
    name: &str,
) -> Result<Value, DirectiveError> {
    let kelvin = target.set_kelvin(kelvin).await?;
    Ok(confirmation(
        name,
        json!({ "achievedState": { "colorTemperature": { "value": number(kelvin) } } }),
    ))
}

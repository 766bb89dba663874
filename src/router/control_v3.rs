//! v3 controller, state-report and authorization handlers

use serde_json::{Value, json};

use super::{DirectiveRouter, namespace, required};
use crate::normalize::{Bounds, fraction_to_percent, mired_to_kelvin, percent_to_fraction};
use crate::protocol::response::{bare_event, celsius, event, number};
use crate::protocol::{DirectiveError, DirectiveV3, Generation, Header, Property};
use crate::registry::Characteristic;

/// `Alexa/Response` event carrying the changed properties
fn response(directive: &DirectiveV3, properties: &[Property]) -> Value {
    let header = Header::new(Generation::V3, namespace::ALEXA, "Response")
        .correlated(directive.correlation_token());
    event(&header, directive.endpoint_echo(), properties)
}

impl DirectiveRouter {
    pub(super) async fn power(&self, directive: &DirectiveV3) -> Result<Value, DirectiveError> {
        let target = self.target(directive.target_device()).await?;
        let on = match directive.header.name.as_str() {
            "TurnOn" => true,
            "TurnOff" => false,
            _ => return Err(DirectiveError::UnsupportedOperation),
        };

        target.power(on).await?;
        let state = if on { "ON" } else { "OFF" };
        Ok(response(
            directive,
            &[Property::now(namespace::POWER, "powerState", json!(state))],
        ))
    }

    pub(super) async fn brightness(&self, directive: &DirectiveV3) -> Result<Value, DirectiveError> {
        let target = self.target(directive.target_device()).await?;
        let mapping = target.mapping(Characteristic::Brightness)?;

        let value = match directive.header.name.as_str() {
            "SetBrightness" => required(&directive.payload, "/brightness")?,
            "AdjustBrightness" => {
                target.current(mapping)? + required(&directive.payload, "/brightnessDelta")?
            }
            _ => return Err(DirectiveError::UnsupportedOperation),
        };

        let value = target.set_number(mapping, value, Some(Bounds::PERCENT)).await?;
        Ok(response(
            directive,
            &[Property::now(namespace::BRIGHTNESS, "brightness", number(value))],
        ))
    }

    pub(super) async fn color(&self, directive: &DirectiveV3) -> Result<Value, DirectiveError> {
        let target = self.target(directive.target_device()).await?;
        if directive.header.name != "SetColor" {
            return Err(DirectiveError::UnsupportedOperation);
        }

        let payload = &directive.payload;
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

        let color = json!({
            "hue": number(hue),
            "saturation": percent_to_fraction(saturation),
            "brightness": percent_to_fraction(brightness),
        });
        Ok(response(
            directive,
            &[Property::now(namespace::COLOR, "color", color)],
        ))
    }

    pub(super) async fn color_temperature(
        &self,
        directive: &DirectiveV3,
    ) -> Result<Value, DirectiveError> {
        let target = self.target(directive.target_device()).await?;

        let kelvin = match directive.header.name.as_str() {
            "SetColorTemperature" => required(&directive.payload, "/colorTemperatureInKelvin")?,
            "IncreaseColorTemperature" => target.current_kelvin()? + 1000.0,
            "DecreaseColorTemperature" => target.current_kelvin()? - 1000.0,
            _ => return Err(DirectiveError::UnsupportedOperation),
        };

        let kelvin = target.set_kelvin(kelvin).await?;
        Ok(response(
            directive,
            &[Property::now(
                namespace::COLOR_TEMPERATURE,
                "colorTemperatureInKelvin",
                number(kelvin),
            )],
        ))
    }

    pub(super) async fn percentage(&self, directive: &DirectiveV3) -> Result<Value, DirectiveError> {
        let target = self.target(directive.target_device()).await?;
        let (_, mapping) = target.first_mapping(&[
            Characteristic::Brightness,
            Characteristic::TargetPosition,
            Characteristic::Volume,
        ])?;

        let value = match directive.header.name.as_str() {
            "SetPercentage" => required(&directive.payload, "/percentage")?,
            "AdjustPercentage" => {
                target.current(mapping)? + required(&directive.payload, "/percentageDelta")?
            }
            _ => return Err(DirectiveError::UnsupportedOperation),
        };

        let value = target.set_number(mapping, value, Some(Bounds::PERCENT)).await?;
        Ok(response(
            directive,
            &[Property::now(namespace::PERCENTAGE, "percentage", number(value))],
        ))
    }

    pub(super) async fn thermostat(&self, directive: &DirectiveV3) -> Result<Value, DirectiveError> {
        let target = self.target(directive.target_device()).await?;
        let mapping = target.mapping(Characteristic::TargetTemperature)?;

        let value = match directive.header.name.as_str() {
            "SetTargetTemperature" => required(&directive.payload, "/targetSetpoint/value")?,
            "AdjustTargetTemperature" => {
                target.current(mapping)?
                    + required(&directive.payload, "/targetSetpointDelta/value")?
            }
            _ => return Err(DirectiveError::UnsupportedOperation),
        };

        let value = target.set_number(mapping, value, None).await?;
        Ok(response(
            directive,
            &[Property::now(namespace::THERMOSTAT, "targetSetpoint", celsius(value))],
        ))
    }

    pub(super) async fn speaker(&self, directive: &DirectiveV3) -> Result<Value, DirectiveError> {
        let target = self.target(directive.target_device()).await?;
        let mapping = target.mapping(Characteristic::Volume)?;

        let value = match directive.header.name.as_str() {
            "SetVolume" => required(&directive.payload, "/volume")?,
            "AdjustVolume" => target.current(mapping)? + required(&directive.payload, "/volume")?,
            _ => return Err(DirectiveError::UnsupportedOperation),
        };

        let value = target.set_number(mapping, value, Some(Bounds::PERCENT)).await?;
        Ok(response(
            directive,
            &[Property::now(namespace::SPEAKER, "volume", number(value))],
        ))
    }

    pub(super) async fn lock(&self, directive: &DirectiveV3) -> Result<Value, DirectiveError> {
        let target = self.target(directive.target_device()).await?;
        let mapping = target.mapping(Characteristic::LockTargetState)?;

        let (token, state) = match directive.header.name.as_str() {
            "Lock" => ("SECURED", "LOCKED"),
            "Unlock" => ("UNSECURED", "UNLOCKED"),
            _ => return Err(DirectiveError::UnsupportedOperation),
        };

        target.set_token(mapping, token).await?;
        Ok(response(
            directive,
            &[Property::now(namespace::LOCK, "lockState", json!(state))],
        ))
    }

    /// `ReportState`: every property with a cached reading
    pub(super) async fn report_state(&self, directive: &DirectiveV3) -> Result<Value, DirectiveError> {
        if directive.header.name != "ReportState" {
            return Err(DirectiveError::UnsupportedOperation);
        }
        let target = self.target(directive.target_device()).await?;
        let device = &target.device;
        let mut properties = Vec::new();

        if let Some(mapping) = device.mapping(Characteristic::On)
            && let Some(raw) = target.cached(mapping)
        {
            let state = if mapping.reads_as_on(&raw) { "ON" } else { "OFF" };
            properties.push(Property::now(namespace::POWER, "powerState", json!(state)));
        }
        if let Some(value) = device
            .mapping(Characteristic::Brightness)
            .and_then(|m| target.cached_number(m))
        {
            properties.push(Property::now(
                namespace::BRIGHTNESS,
                "brightness",
                number(value.trunc()),
            ));
        }
        let kelvin = device
            .mapping(Characteristic::ColorTemperature)
            .and_then(|m| target.cached_number(m))
            .or_else(|| {
                device
                    .mapping(Characteristic::Ct)
                    .and_then(|m| target.cached_number(m))
                    .map(mired_to_kelvin)
            });
        if let Some(kelvin) = kelvin {
            properties.push(Property::now(
                namespace::COLOR_TEMPERATURE,
                "colorTemperatureInKelvin",
                number(kelvin),
            ));
        }
        if let Some(value) = device
            .mapping(Characteristic::TargetPosition)
            .and_then(|m| target.cached_number(m))
        {
            properties.push(Property::now(namespace::PERCENTAGE, "percentage", number(value)));
        }
        if let Some(value) = device
            .mapping(Characteristic::TargetTemperature)
            .and_then(|m| target.cached_number(m))
        {
            properties.push(Property::now(namespace::THERMOSTAT, "targetSetpoint", celsius(value)));
        }
        if let Some(value) = device
            .mapping(Characteristic::CurrentTemperature)
            .and_then(|m| target.cached_number(m))
        {
            properties.push(Property::now(
                namespace::TEMPERATURE_SENSOR,
                "temperature",
                celsius(value),
            ));
        }
        if let Some(state) = target.lock_state() {
            properties.push(Property::now(namespace::LOCK, "lockState", json!(state)));
        }

        tracing::debug!(device = %device.id, properties = properties.len(), "state report");
        let header = Header::new(Generation::V3, namespace::ALEXA, "StateReport")
            .correlated(directive.correlation_token());
        Ok(event(&header, directive.endpoint_echo(), &properties))
    }

    /// `AcceptGrant`: record the grant on the hub and acknowledge
    pub(super) async fn authorization(
        &self,
        directive: &DirectiveV3,
    ) -> Result<Value, DirectiveError> {
        if !directive.is_accept_grant() {
            return Err(DirectiveError::UnsupportedOperation);
        }

        tracing::info!("accepted authorization grant");
        self.connections
            .set_reading(".Alexa.Authorization", &directive.payload.to_string())
            .await;

        let header = Header::new(
            Generation::V3,
            namespace::AUTHORIZATION,
            "AcceptGrant.Response",
        );
        Ok(bare_event(&header, json!({})))
    }
}

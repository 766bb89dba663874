//! Directive router for both smart-home API generations
//!
//! Dispatch is by exact `(namespace, name)` pair. Handlers return
//! `Result<Value, DirectiveError>`; [`DirectiveRouter::route_v2`] and
//! [`DirectiveRouter::route_v3`] render every error into its envelope.

mod control_v2;
mod control_v3;
pub mod discovery;

use std::sync::Arc;

use serde_json::Value;

use crate::backend::{Connection, Connections};
use crate::normalize::{Bounds, format_number, kelvin_to_mired, mired_to_kelvin, normalize};
use crate::protocol::smarthome::number_at;
use crate::protocol::{DirectiveError, DirectiveV2, DirectiveV3};
use crate::registry::{Characteristic, CommandMapping, Device, SharedRegistry};

/// Request and response namespaces
pub mod namespace {
    pub const V2_DISCOVERY: &str = "Alexa.ConnectedHome.Discovery";
    pub const V2_SYSTEM: &str = "Alexa.ConnectedHome.System";
    pub const V2_CONTROL: &str = "Alexa.ConnectedHome.Control";
    pub const V2_QUERY: &str = "Alexa.ConnectedHome.Query";

    pub const ALEXA: &str = "Alexa";
    pub const AUTHORIZATION: &str = "Alexa.Authorization";
    pub const DISCOVERY: &str = "Alexa.Discovery";
    pub const POWER: &str = "Alexa.PowerController";
    pub const BRIGHTNESS: &str = "Alexa.BrightnessController";
    pub const COLOR: &str = "Alexa.ColorController";
    pub const COLOR_TEMPERATURE: &str = "Alexa.ColorTemperatureController";
    pub const PERCENTAGE: &str = "Alexa.PercentageController";
    pub const THERMOSTAT: &str = "Alexa.ThermostatController";
    pub const SPEAKER: &str = "Alexa.Speaker";
    pub const LOCK: &str = "Alexa.LockController";
    pub const TEMPERATURE_SENSOR: &str = "Alexa.TemperatureSensor";
}

/// Stateless dispatcher over the shared registry and connections
#[derive(Clone)]
pub struct DirectiveRouter {
    registry: SharedRegistry,
    connections: Connections,
}

impl DirectiveRouter {
    #[must_use]
    pub const fn new(registry: SharedRegistry, connections: Connections) -> Self {
        Self {
            registry,
            connections,
        }
    }

    /// Route a flat v2 directive
    ///
    /// `room` restricts discovery to the room bound to the caller.
    pub async fn route_v2(&self, directive: &DirectiveV2, room: Option<&str>) -> Value {
        let header = &directive.header;
        tracing::debug!(namespace = %header.namespace, name = %header.name, "routing v2 directive");

        let result = match header.namespace.as_str() {
            namespace::V2_DISCOVERY => self.discover_v2(directive, room).await,
            namespace::V2_SYSTEM => control_v2::system(directive),
            namespace::V2_CONTROL => self.control_v2(directive).await,
            namespace::V2_QUERY => self.query_v2(directive).await,
            other => Err(DirectiveError::UnexpectedInformationReceived {
                faulting: other.to_string(),
            }),
        };
        respond(&header.name, result)
    }

    /// Route a nested v3 directive
    pub async fn route_v3(&self, directive: &DirectiveV3, room: Option<&str>) -> Value {
        let header = &directive.header;
        tracing::debug!(namespace = %header.namespace, name = %header.name, "routing v3 directive");

        let result = match header.namespace.as_str() {
            namespace::ALEXA => self.report_state(directive).await,
            namespace::AUTHORIZATION => self.authorization(directive).await,
            namespace::DISCOVERY => self.discover_v3(directive, room).await,
            namespace::POWER => self.power(directive).await,
            namespace::BRIGHTNESS => self.brightness(directive).await,
            namespace::COLOR => self.color(directive).await,
            namespace::COLOR_TEMPERATURE => self.color_temperature(directive).await,
            namespace::PERCENTAGE => self.percentage(directive).await,
            namespace::THERMOSTAT => self.thermostat(directive).await,
            namespace::SPEAKER => self.speaker(directive).await,
            namespace::LOCK => self.lock(directive).await,
            other => Err(DirectiveError::UnexpectedInformationReceived {
                faulting: other.to_string(),
            }),
        };
        respond(&header.name, result)
    }

    /// Resolve the device a directive targets
    async fn target(&self, device: Option<String>) -> Result<Target, DirectiveError> {
        let id = device.ok_or(DirectiveError::UnsupportedTarget)?;
        let device = self
            .registry
            .read()
            .await
            .get(&id)
            .filter(|d| d.exposure.smart_home())
            .cloned()
            .ok_or_else(|| {
                tracing::warn!(device = %id, "directive for unknown device");
                DirectiveError::UnsupportedTarget
            })?;

        let connection = self
            .connections
            .get(&device.connection)
            .cloned()
            .ok_or_else(|| {
                tracing::warn!(device = %id, connection = %device.connection, "device without connection");
                DirectiveError::UnsupportedTarget
            })?;

        Ok(Target { device, connection })
    }

    /// Smart-home devices, optionally restricted to a room
    async fn devices_in(&self, room: Option<&str>) -> Vec<Device> {
        self.registry
            .read()
            .await
            .smart_home_devices()
            .filter(|d| {
                let visible = room.is_none_or(|r| d.is_in_room(r));
                if !visible {
                    tracing::debug!(device = %d.id, room = ?room, "not listed for caller room");
                }
                visible
            })
            .cloned()
            .collect()
    }
}

fn respond(name: &str, result: Result<Value, DirectiveError>) -> Value {
    result.unwrap_or_else(|e| {
        tracing::warn!(directive = name, error = %e, "directive failed");
        e.to_response()
    })
}

/// Numeric payload field, reported as unexpected information when absent
fn required(payload: &Value, pointer: &str) -> Result<f64, DirectiveError> {
    number_at(payload, pointer).ok_or_else(|| DirectiveError::UnexpectedInformationReceived {
        faulting: pointer.trim_start_matches('/').replace('/', "."),
    })
}

/// A resolved device together with its owning connection
struct Target {
    device: Device,
    connection: Arc<Connection>,
}

impl Target {
    fn mapping(&self, characteristic: Characteristic) -> Result<&CommandMapping, DirectiveError> {
        self.device.mapping(characteristic).ok_or_else(|| {
            tracing::debug!(device = %self.device.id, %characteristic, "no mapping");
            DirectiveError::UnsupportedOperation
        })
    }

    /// First mapped characteristic of `candidates`
    fn first_mapping(
        &self,
        candidates: &[Characteristic],
    ) -> Result<(Characteristic, &CommandMapping), DirectiveError> {
        candidates
            .iter()
            .find_map(|c| self.device.mapping(*c).map(|m| (*c, m)))
            .ok_or(DirectiveError::UnsupportedOperation)
    }

    fn cached(&self, mapping: &CommandMapping) -> Option<String> {
        self.connection.backend().cached_value(&mapping.inform_id)
    }

    /// Cached reading as a number, ignoring a trailing unit
    fn cached_number(&self, mapping: &CommandMapping) -> Option<f64> {
        self.cached(mapping)?.split_whitespace().next()?.parse().ok()
    }

    /// Current value required by a relative adjustment
    fn current(&self, mapping: &CommandMapping) -> Result<f64, DirectiveError> {
        self.cached_number(mapping).ok_or_else(|| {
            tracing::warn!(device = %self.device.id, reading = %mapping.reading, "no cached value to adjust");
            DirectiveError::UnsupportedOperation
        })
    }

    /// Colour-temperature mapping, in Kelvin or in mired
    fn color_temperature_mapping(&self) -> Result<(bool, &CommandMapping), DirectiveError> {
        let (characteristic, mapping) =
            self.first_mapping(&[Characteristic::ColorTemperature, Characteristic::Ct])?;
        Ok((characteristic == Characteristic::Ct, mapping))
    }

    fn current_kelvin(&self) -> Result<f64, DirectiveError> {
        let (mired, mapping) = self.color_temperature_mapping()?;
        let current = self.current(mapping)?;
        Ok(if mired {
            mired_to_kelvin(current)
        } else {
            current
        })
    }

    async fn execute(&self, command: &str) {
        tracing::info!(device = %self.device.id, command, "sending command");
        if let Err(e) = self.connection.backend().execute(command).await {
            tracing::error!(device = %self.device.id, error = %e, "backend command failed");
        }
    }

    async fn power(&self, on: bool) -> Result<(), DirectiveError> {
        let mapping = self.mapping(Characteristic::On)?;
        self.execute(&mapping.power_command(&self.device.name, on)).await;
        Ok(())
    }

    /// Normalize and write a number, returning the value actually written
    async fn set_number(
        &self,
        mapping: &CommandMapping,
        value: f64,
        api: Option<Bounds>,
    ) -> Result<f64, DirectiveError> {
        let normalized = normalize(Some(mapping), &format_number(value), api)?;
        self.execute(&mapping.set_command(&self.device.name, &normalized.to_backend()))
            .await;
        Ok(normalized.as_number().unwrap_or(value))
    }

    /// Normalize and write a token through the translation table
    async fn set_token(&self, mapping: &CommandMapping, token: &str) -> Result<(), DirectiveError> {
        let normalized = normalize(Some(mapping), token, None)?;
        self.execute(&mapping.set_command(&self.device.name, &normalized.to_backend()))
            .await;
        Ok(())
    }

    /// Clamp to the supported Kelvin range and write, in mired if needed
    async fn set_kelvin(&self, kelvin: f64) -> Result<f64, DirectiveError> {
        let kelvin = Bounds::KELVIN.clamp(kelvin);
        let (mired, mapping) = self.color_temperature_mapping()?;
        if !mired {
            return self.set_number(mapping, kelvin, Some(Bounds::KELVIN)).await;
        }

        let wanted = kelvin_to_mired(kelvin);
        let written = self.set_number(mapping, wanted, None).await?;
        Ok(if (written - wanted).abs() < f64::EPSILON {
            kelvin
        } else {
            mired_to_kelvin(written)
        })
    }

    /// Lock reading interpreted as the wire lock state
    fn lock_state(&self) -> Option<&'static str> {
        let mapping = self.device.mapping(Characteristic::LockCurrentState)?;
        let raw = self.cached(mapping)?;
        Some(if raw == "SECURED" || raw.eq_ignore_ascii_case("locked") {
            "LOCKED"
        } else {
            "UNLOCKED"
        })
    }
}

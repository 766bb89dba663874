//! Per-characteristic value translation and clamping

use crate::protocol::DirectiveError;
use crate::registry::CommandMapping;

/// Inclusive numeric bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    /// Bounds for percentage-style values
    pub const PERCENT: Self = Self::new(0.0, 100.0);

    /// Supported colour-temperature range in Kelvin
    pub const KELVIN: Self = Self::new(2000.0, 6500.0);

    /// Default thermostat range in °C
    pub const TARGET_TEMPERATURE: Self = Self::new(15.0, 30.0);

    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Clamp `value` into the bounds
    #[must_use]
    pub const fn clamp(self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    /// Whether `value` lies inside the bounds
    #[must_use]
    pub fn contains(self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    /// Device bounds of a mapping, falling back to `self` per side
    #[must_use]
    pub fn narrowed_by(self, mapping: &CommandMapping) -> Self {
        Self::new(
            mapping.min_value.unwrap_or(self.min),
            mapping.max_value.unwrap_or(self.max),
        )
    }
}

/// A value ready to be written to the backend
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Number(f64),
    Text(String),
}

impl Normalized {
    /// Numeric value, if any
    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    /// Backend representation
    #[must_use]
    pub fn to_backend(&self) -> String {
        match self {
            Self::Number(n) => format_number(*n),
            Self::Text(t) => t.clone(),
        }
    }
}

/// Translate and clamp a raw value for `mapping`
///
/// Order: translation table, then the caller's API bound, then the
/// device bound. The device bound is applied last so it wins on conflict.
///
/// # Errors
///
/// Returns [`DirectiveError::UnsupportedOperation`] when `mapping` is absent.
pub fn normalize(
    mapping: Option<&CommandMapping>,
    raw: &str,
    api: Option<Bounds>,
) -> Result<Normalized, DirectiveError> {
    let mapping = mapping.ok_or(DirectiveError::UnsupportedOperation)?;

    let translated = mapping.values.get(raw).map_or(raw, String::as_str);
    Ok(match translated.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Normalized::Number(clamp_number(mapping, n, api)),
        _ => Normalized::Text(translated.to_string()),
    })
}

/// Clamp a number to the API bound and then to the device bound
#[must_use]
pub fn clamp_number(mapping: &CommandMapping, value: f64, api: Option<Bounds>) -> f64 {
    let mut value = api.map_or(value, |b| b.clamp(value));
    if let Some(min) = mapping.min_value {
        value = value.max(min);
    }
    if let Some(max) = mapping.max_value {
        value = value.min(max);
    }
    value
}

/// Kelvin to mired, rounded to the nearest integer
#[must_use]
pub fn kelvin_to_mired(kelvin: f64) -> f64 {
    (1_000_000.0 / kelvin).round()
}

/// Mired to Kelvin, rounded to the nearest integer
#[must_use]
pub fn mired_to_kelvin(mired: f64) -> f64 {
    (1_000_000.0 / mired).round()
}

/// 0–1 fraction to 0–100 percent
#[must_use]
pub fn fraction_to_percent(fraction: f64) -> f64 {
    fraction * 100.0
}

/// 0–100 percent to 0–1 fraction
#[must_use]
pub fn percent_to_fraction(percent: f64) -> f64 {
    percent / 100.0
}

/// Render a number without a trailing `.0` for integral values
#[must_use]
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounded(min: f64, max: f64) -> CommandMapping {
        CommandMapping::new("lamp", "pct").with_bounds(Some(min), Some(max))
    }

    #[test]
    fn clamps_out_of_range_to_device_bounds() {
        let mapping = bounded(10.0, 90.0);
        for raw in ["-50", "0", "9.99", "91", "150", "1e6"] {
            let value = normalize(Some(&mapping), raw, None).unwrap().as_number().unwrap();
            assert!((10.0..=90.0).contains(&value), "{raw} -> {value}");
        }
        assert_eq!(normalize(Some(&mapping), "150", None).unwrap(), Normalized::Number(90.0));
        assert_eq!(normalize(Some(&mapping), "-3", None).unwrap(), Normalized::Number(10.0));
        assert_eq!(normalize(Some(&mapping), "42", None).unwrap(), Normalized::Number(42.0));
    }

    #[test]
    fn device_bound_wins_over_api_bound() {
        let mapping = CommandMapping::new("vol", "volume").with_bounds(None, Some(60.0));
        let value = normalize(Some(&mapping), "150", Some(Bounds::PERCENT)).unwrap();
        assert_eq!(value, Normalized::Number(60.0));

        let wide = bounded(0.0, 255.0);
        let value = normalize(Some(&wide), "150", Some(Bounds::PERCENT)).unwrap();
        assert_eq!(value, Normalized::Number(100.0));
    }

    #[test]
    fn translation_table_applies_first() {
        let mapping = CommandMapping::new("blind", "pct")
            .with_value("auf", "100")
            .with_value("halb", "half");

        assert_eq!(normalize(Some(&mapping), "auf", None).unwrap(), Normalized::Number(100.0));
        assert_eq!(
            normalize(Some(&mapping), "halb", None).unwrap(),
            Normalized::Text("half".to_string())
        );
    }

    #[test]
    fn missing_mapping_is_unsupported() {
        assert_eq!(
            normalize(None, "1", None),
            Err(DirectiveError::UnsupportedOperation)
        );
    }

    #[test]
    fn mired_round_trip_over_supported_range() {
        for mired in 154..=500 {
            let mired = f64::from(mired);
            assert_eq!(kelvin_to_mired(mired_to_kelvin(mired)), mired);
        }
        assert_eq!(kelvin_to_mired(2000.0), 500.0);
        assert_eq!(kelvin_to_mired(6500.0), 154.0);
    }

    #[test]
    fn fraction_scaling() {
        assert!((fraction_to_percent(0.5) - 50.0).abs() < f64::EPSILON);
        assert!((percent_to_fraction(25.0) - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(100.0), "100");
        assert_eq!(format_number(21.5), "21.5");
        assert_eq!(format_number(-2.0), "-2");
    }
}

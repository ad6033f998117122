//! Thermistor resistance to temperature conversion.
//!
//! Resistance is converted with the Steinhart-Hart equation
//! (<https://en.wikipedia.org/wiki/Steinhart%E2%80%93Hart_equation>) and the
//! resulting Celsius value is classified into a [`SensorStatus`] band.

use crate::model::{NormalizedReading, SensorReading, SensorStatus};

// Steinhart-Hart coefficients
const A: f64 = 0.001129148;
const B: f64 = 0.000234125;
const C: f64 = 0.0000000876741;

const KELVIN_OFFSET: f64 = 273.15;

pub const MIN_RESISTANCE: f64 = 1.0;
pub const MAX_RESISTANCE: f64 = 20_000.0;

const TOO_LOW_BELOW: f64 = 20.0;
const OK_BELOW: f64 = 100.0;
const TOO_HIGH_BELOW: f64 = 250.0;

/// Whether a raw reading is physically plausible for the thermistor.
pub fn is_in_range(r: f64) -> bool {
    (MIN_RESISTANCE..=MAX_RESISTANCE).contains(&r)
}

/// Temperature in Celsius for resistance `r`. Callers check [`is_in_range`] first.
pub fn compute_temperature(r: f64) -> f64 {
    let log_r = r.ln();
    let kelvin = 1.0 / (A + B * log_r + C * log_r.powi(3));
    kelvin - KELVIN_OFFSET
}

pub fn classify(celsius: f64) -> SensorStatus {
    if celsius < TOO_LOW_BELOW {
        SensorStatus::TooLow
    } else if celsius < OK_BELOW {
        SensorStatus::Ok
    } else if celsius < TOO_HIGH_BELOW {
        SensorStatus::TooHigh
    } else {
        SensorStatus::Critical
    }
}

/// Converts and classifies a reading. Returns `None` when the raw value is out of range.
pub fn normalize(reading: &SensorReading) -> Option<NormalizedReading> {
    if !is_in_range(reading.raw_value) {
        return None;
    }

    let temperature_celsius = compute_temperature(reading.raw_value);

    Some(NormalizedReading {
        sensor_id: reading.sensor_id.clone(),
        location_id: reading.location_id.clone(),
        temperature_celsius,
        status: classify(temperature_celsius),
        timestamp: reading.timestamp,
    })
}

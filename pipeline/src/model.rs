use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Raw event as sent to the sensor Lambda.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorEvent {
    #[serde(deserialize_with = "id_from_json")]
    pub sensor_id: String,
    #[serde(deserialize_with = "id_from_json")]
    pub location_id: String,
    #[serde(deserialize_with = "float_from_json")]
    pub value: f64,
}

/// A single thermistor reading, stamped at receipt.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub sensor_id: String,
    pub location_id: String,
    pub raw_value: f64,
    pub timestamp: DateTime<Utc>,
}

impl SensorReading {
    pub fn from_event(event: SensorEvent, timestamp: DateTime<Utc>) -> Self {
        Self {
            sensor_id: event.sensor_id,
            location_id: event.location_id,
            raw_value: event.value,
            timestamp,
        }
    }
}

/// Sensor registry entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorRecord {
    pub sensor_id: String,
    pub working_ok: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorStatus {
    #[serde(rename = "TEMPERATURE_TOO_LOW")]
    TooLow,
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "TEMPERATURE_TOO_HIGH")]
    TooHigh,
    #[serde(rename = "TEMPERATURE_CRITICAL")]
    Critical,
}

impl SensorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStatus::TooLow => "TEMPERATURE_TOO_LOW",
            SensorStatus::Ok => "OK",
            SensorStatus::TooHigh => "TEMPERATURE_TOO_HIGH",
            SensorStatus::Critical => "TEMPERATURE_CRITICAL",
        }
    }

    /// Distance from the healthy band. `TooLow` and `TooHigh` sit one step
    /// away on either side, `Critical` two steps above.
    pub fn severity(&self) -> u8 {
        match self {
            SensorStatus::Ok => 0,
            SensorStatus::TooLow | SensorStatus::TooHigh => 1,
            SensorStatus::Critical => 2,
        }
    }
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified reading, as forwarded to the queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedReading {
    pub sensor_id: String,
    pub location_id: String,
    #[serde(rename = "temperature")]
    pub temperature_celsius: f64,
    pub status: SensorStatus,
    pub timestamp: DateTime<Utc>,
}

/// A row collected by the receiver, either from a queue message or a bulk CSV file.
/// Timestamps stay as text until the reporter parses them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadingRow {
    #[serde(deserialize_with = "id_from_json")]
    pub location_id: String,
    pub temperature: f64,
    pub timestamp: String,
}

/// The per-location record shape carried in a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchRow {
    pub temperature: f64,
    pub timestamp: String,
}

impl From<ReadingRow> for BatchRow {
    fn from(row: ReadingRow) -> Self {
        Self {
            temperature: row.temperature,
            timestamp: row.timestamp,
        }
    }
}

/// Response envelope shared by the sensor and receiver handlers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvocationResponse {
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl InvocationResponse {
    pub fn ok(body: String) -> Self {
        Self {
            status_code: 200,
            body: Some(body),
        }
    }

    pub fn no_content() -> Self {
        Self {
            status_code: 204,
            body: None,
        }
    }

    pub fn bad_request(error_code: &str) -> Self {
        Self {
            status_code: 400,
            body: Some(serde_json::json!({ "error": error_code }).to_string()),
        }
    }
}

// Sensor and location ids arrive as JSON strings or integers depending on the producer.
fn id_from_json<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Integer(n) => n.to_string(),
        Id::Float(n) => n.to_string(),
    })
}

fn float_from_json<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Value {
        Number(f64),
        Text(String),
    }

    let n = match Value::deserialize(deserializer)? {
        Value::Number(n) => n,
        Value::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid number {:?}: {}", text, e)))?,
    };

    // `str::parse` accepts "NaN" and "inf"; neither is a reading.
    if !n.is_finite() {
        return Err(serde::de::Error::custom(format!("value {} is not a finite number", n)));
    }
    Ok(n)
}

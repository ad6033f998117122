use crate::errors::{Error, Result};
use crate::forwarder::forward;
use crate::model::{InvocationResponse, SensorEvent, SensorReading};
use crate::normalize::{is_in_range, normalize};
use crate::notify::{Notifier, ALERT_SUBJECT};
use crate::queue::EventQueue;
use crate::registry::SensorRegistry;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const INVALID_REQUEST: &str = "INVALID_REQUEST";

#[derive(Clone)]
pub struct SensorDeps {
    pub registry: Arc<dyn SensorRegistry>,
    pub queue: Arc<dyn EventQueue>,
    pub notifier: Arc<dyn Notifier>,
}

/// Handles one reading from a sensor.
///
/// - malformed event: 400, plus a best-effort alert
/// - out-of-range value: the sensor is marked as not working, 204
/// - sensor already marked as not working: 204
/// - otherwise the reading is forwarded and returned with 200
///
/// Registry, queue and serialization failures are returned as errors.
pub async fn handle(
    deps: &SensorDeps,
    event: Value,
    received_at: DateTime<Utc>,
) -> Result<InvocationResponse> {
    info!("Received event: {}", event);

    let event = match parse_event(event) {
        Ok(event) => event,
        Err(e) => return Ok(reject(deps.notifier.as_ref(), &e).await),
    };
    let reading = SensorReading::from_event(event, received_at);
    let sensor_id = reading.sensor_id.as_str();

    if !deps.registry.exists(sensor_id).await? && deps.registry.put(sensor_id, true).await? {
        info!("Registered new sensor {}", sensor_id);
    }

    if !is_in_range(reading.raw_value) {
        warn!(
            "Sensor {} reported implausible value {}, marking it as not working",
            sensor_id, reading.raw_value
        );
        deps.registry.update(sensor_id, false).await?;
        return Ok(InvocationResponse::no_content());
    }

    let record = deps.registry.get(sensor_id).await?.ok_or_else(|| {
        Error::Registry(format!("sensor {} vanished from the registry", sensor_id))
    })?;
    if !record.working_ok {
        info!("Ignoring reading from sensor {} marked as not working", sensor_id);
        return Ok(InvocationResponse::no_content());
    }

    let Some(normalized) = normalize(&reading) else {
        return Ok(InvocationResponse::no_content());
    };
    debug!(
        "Sensor {} at {:.2}°C is {}",
        sensor_id, normalized.temperature_celsius, normalized.status
    );

    forward(deps.queue.as_ref(), deps.notifier.as_ref(), &normalized).await?;

    Ok(InvocationResponse::ok(serde_json::to_string(&normalized)?))
}

fn parse_event(event: Value) -> Result<SensorEvent> {
    let event: SensorEvent = serde_json::from_value(event)
        .map_err(|e| Error::Input(format!("malformed sensor event: {}", e)))?;

    if event.sensor_id.is_empty() {
        return Err(Error::Input("sensor_id cannot be empty".to_string()));
    }
    if event.location_id.is_empty() {
        return Err(Error::Input("location_id cannot be empty".to_string()));
    }

    Ok(event)
}

async fn reject(notifier: &dyn Notifier, err: &Error) -> InvocationResponse {
    error!("Error processing event: {}", err);

    if let Err(e) = notifier
        .publish(ALERT_SUBJECT, &format!("Error processing event: {}!", err))
        .await
    {
        warn!("Could not deliver error alert: {}", e);
    }

    InvocationResponse::bad_request(INVALID_REQUEST)
}

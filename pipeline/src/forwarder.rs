use crate::errors::Result;
use crate::model::{NormalizedReading, SensorStatus};
use crate::notify::{Notifier, ALERT_SUBJECT};
use crate::queue::EventQueue;
use tracing::{debug, info, warn};

/// Enqueues a classified reading and raises an alert for critical ones.
///
/// A failed enqueue is returned to the caller. A failed alert is logged and
/// dropped; the reading has already been forwarded at that point.
pub async fn forward(
    queue: &dyn EventQueue,
    notifier: &dyn Notifier,
    reading: &NormalizedReading,
) -> Result<()> {
    let body = serde_json::to_string(reading)?;
    queue.send(&body).await?;
    debug!("Forwarded reading from sensor {}", reading.sensor_id);

    if reading.status == SensorStatus::Critical {
        let message = alert_message(reading);
        match notifier.publish(ALERT_SUBJECT, &message).await {
            Ok(()) => info!("Raised critical alert for sensor {}", reading.sensor_id),
            Err(e) => warn!(
                "Could not deliver critical alert for sensor {}: {}",
                reading.sensor_id, e
            ),
        }
    }

    Ok(())
}

fn alert_message(reading: &NormalizedReading) -> String {
    format!(
        "Sensor {} at location {} reported {:.2}°C ({}) at {}",
        reading.sensor_id,
        reading.location_id,
        reading.temperature_celsius,
        reading.status,
        reading.timestamp.to_rfc3339()
    )
}

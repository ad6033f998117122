use crate::errors::{Error, Result};
use crate::model::SensorRecord;
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

const KEY_ATTRIBUTE: &str = "sensor_id";
const WORKING_OK_ATTRIBUTE: &str = "working_ok";

/// Key-value store of sensor health, keyed by sensor id.
///
/// Records are never deleted. There is no locking across calls: two
/// invocations for the same sensor may interleave between `update` and `get`.
/// `put` is create-only, so seeding never overwrites a flag that another
/// invocation has already cleared.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SensorRegistry: Send + Sync {
    async fn exists(&self, sensor_id: &str) -> Result<bool>;

    async fn get(&self, sensor_id: &str) -> Result<Option<SensorRecord>>;

    /// Create the record if absent. Returns `false` when it already existed.
    async fn put(&self, sensor_id: &str, working_ok: bool) -> Result<bool>;

    /// Overwrite the health flag.
    async fn update(&self, sensor_id: &str, working_ok: bool) -> Result<()>;
}

pub struct DynamoDbRegistry {
    client: aws_sdk_dynamodb::Client,
    table: String,
}

impl DynamoDbRegistry {
    pub fn new(client: aws_sdk_dynamodb::Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }

    fn key(sensor_id: &str) -> AttributeValue {
        AttributeValue::S(sensor_id.to_string())
    }
}

#[async_trait]
impl SensorRegistry for DynamoDbRegistry {
    async fn exists(&self, sensor_id: &str) -> Result<bool> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key(KEY_ATTRIBUTE, Self::key(sensor_id))
            .projection_expression(KEY_ATTRIBUTE)
            .send()
            .await
            .map_err(|e| Error::Registry(format!("failed to look up sensor {}: {}", sensor_id, e)))?;

        Ok(output.item().is_some())
    }

    async fn get(&self, sensor_id: &str) -> Result<Option<SensorRecord>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key(KEY_ATTRIBUTE, Self::key(sensor_id))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| Error::Registry(format!("failed to read sensor {}: {}", sensor_id, e)))?;

        let Some(item) = output.item() else {
            return Ok(None);
        };

        let working_ok = item
            .get(WORKING_OK_ATTRIBUTE)
            .and_then(|value| value.as_bool().ok())
            .copied()
            .ok_or_else(|| {
                Error::Registry(format!(
                    "sensor {} has no boolean {} attribute",
                    sensor_id, WORKING_OK_ATTRIBUTE
                ))
            })?;

        Ok(Some(SensorRecord {
            sensor_id: sensor_id.to_string(),
            working_ok,
        }))
    }

    async fn put(&self, sensor_id: &str, working_ok: bool) -> Result<bool> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table)
            .item(KEY_ATTRIBUTE, Self::key(sensor_id))
            .item(WORKING_OK_ATTRIBUTE, AttributeValue::Bool(working_ok))
            .condition_expression("attribute_not_exists(#id)")
            .expression_attribute_names("#id", KEY_ATTRIBUTE)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_conditional_check_failed_exception() {
                    debug!("Sensor {} already registered", sensor_id);
                    Ok(false)
                } else {
                    Err(Error::Registry(format!(
                        "failed to register sensor {}: {}",
                        sensor_id, service_error
                    )))
                }
            }
        }
    }

    async fn update(&self, sensor_id: &str, working_ok: bool) -> Result<()> {
        self.client
            .update_item()
            .table_name(&self.table)
            .key(KEY_ATTRIBUTE, Self::key(sensor_id))
            .update_expression("SET #ok = :w")
            .expression_attribute_names("#ok", WORKING_OK_ATTRIBUTE)
            .expression_attribute_values(":w", AttributeValue::Bool(working_ok))
            .send()
            .await
            .map_err(|e| Error::Registry(format!("failed to update sensor {}: {}", sensor_id, e)))?;

        Ok(())
    }
}

/// Process-local registry for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    records: Mutex<HashMap<String, bool>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records<I, S>(records: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        Self {
            records: Mutex::new(records.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        }
    }

    pub fn snapshot(&self) -> HashMap<String, bool> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, bool>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SensorRegistry for InMemoryRegistry {
    async fn exists(&self, sensor_id: &str) -> Result<bool> {
        Ok(self.lock().contains_key(sensor_id))
    }

    async fn get(&self, sensor_id: &str) -> Result<Option<SensorRecord>> {
        Ok(self.lock().get(sensor_id).map(|&working_ok| SensorRecord {
            sensor_id: sensor_id.to_string(),
            working_ok,
        }))
    }

    async fn put(&self, sensor_id: &str, working_ok: bool) -> Result<bool> {
        let mut records = self.lock();
        if records.contains_key(sensor_id) {
            return Ok(false);
        }
        records.insert(sensor_id.to_string(), working_ok);
        Ok(true)
    }

    async fn update(&self, sensor_id: &str, working_ok: bool) -> Result<()> {
        self.lock().insert(sensor_id.to_string(), working_ok);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_is_create_only() {
        let registry = InMemoryRegistry::new();

        assert!(registry.put("1", true).await.unwrap());
        registry.update("1", false).await.unwrap();

        // A second seeding attempt must not re-enable the sensor.
        assert!(!registry.put("1", true).await.unwrap());
        assert_eq!(
            registry.get("1").await.unwrap(),
            Some(SensorRecord {
                sensor_id: "1".to_string(),
                working_ok: false
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_sensor() {
        let registry = InMemoryRegistry::new();

        assert!(!registry.exists("missing").await.unwrap());
        assert_eq!(registry.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_seeded_records() {
        let registry = InMemoryRegistry::with_records([("7", false)]);

        assert!(registry.exists("7").await.unwrap());
        assert_eq!(registry.snapshot().get("7"), Some(&false));
    }
}

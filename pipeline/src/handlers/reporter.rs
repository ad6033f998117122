use crate::errors::{Error, Result};
use crate::model::BatchRow;
use crate::report::aggregate_by_minute;
use crate::storage::{decode_batch_csv, ObjectLocation, ObjectStore};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "source")]
pub enum ReporterEvent {
    #[serde(rename = "EVENT")]
    Inline { batch: Vec<BatchRow> },
    /// `batch` holds an `s3://` reference written by the receiver.
    #[serde(rename = "S3")]
    Stored { batch: String },
}

#[derive(Clone)]
pub struct ReporterDeps {
    pub store: Arc<dyn ObjectStore>,
}

/// Aggregates one batch into a per-minute series.
pub async fn handle(deps: &ReporterDeps, event: Value) -> Result<BTreeMap<String, f64>> {
    info!("Received event: {}", event_summary(&event));

    let event: ReporterEvent = serde_json::from_value(event)
        .map_err(|e| Error::Input(format!("can't parse reporter event: {}", e)))?;

    let rows = match event {
        ReporterEvent::Inline { batch } => batch,
        ReporterEvent::Stored { batch } => {
            let location: ObjectLocation = batch.parse()?;
            let bytes = deps.store.get_object(&location).await?;
            decode_batch_csv(&bytes)?
        }
    };

    let series = aggregate_by_minute(&rows)?;
    info!("Aggregated {} rows into {} minutes", rows.len(), series.len());
    Ok(series)
}

/// The event without its (possibly very long) `batch` value.
fn event_summary(event: &Value) -> Value {
    match event {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| key.as_str() != "batch")
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

use crate::batching::{build_batches, plan_payload, BatchPayload, BatchResponse, SpillTarget};
use crate::config::ReceiverConfig;
use crate::errors::{Error, Result};
use crate::model::{InvocationResponse, ReadingRow};
use crate::queue::{drain, EventQueue};
use crate::storage::{decode_readings_csv, ObjectLocation, ObjectStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "source")]
pub enum ReceiverEvent {
    /// Read a complete CSV file from the input bucket.
    #[serde(rename = "S3")]
    Bulk { key: String },
    /// Drain the reading queue.
    #[serde(rename = "SQS")]
    Queue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReceiverOutput {
    Batches(BatchResponse),
    Status(InvocationResponse),
}

#[derive(Clone)]
pub struct ReceiverDeps {
    pub config: ReceiverConfig,
    pub queue: Arc<dyn EventQueue>,
    pub store: Arc<dyn ObjectStore>,
}

/// Collects readings, groups them per location and returns the batches
/// inline or, when too large for the orchestrator, as storage references.
pub async fn handle(deps: &ReceiverDeps, event: Value, invocation_id: &str) -> Result<ReceiverOutput> {
    info!("Received event: {}", event);

    let event: ReceiverEvent = match serde_json::from_value(event) {
        Ok(event) => event,
        Err(e) => {
            error!("Unknown or malformed receiver event: {}", e);
            return Ok(ReceiverOutput::Status(InvocationResponse::bad_request(
                "UNKNOWN_SOURCE",
            )));
        }
    };

    let rows = collect_rows(deps, &event).await?;
    if rows.is_empty() {
        warn!("Did not receive any data from {:?}", event);
        return Ok(ReceiverOutput::Status(InvocationResponse::no_content()));
    }

    let row_count = rows.len();
    let batches = build_batches(rows, deps.config.max_batch_rows);
    info!("Created {} batches from {} rows", batches.len(), row_count);

    let target = SpillTarget {
        bucket: &deps.config.payload_bucket,
        prefix: &deps.config.payload_prefix,
        invocation_id,
    };
    let payload = plan_payload(
        deps.store.as_ref(),
        &target,
        batches,
        deps.config.max_payload_size,
    )
    .await?;

    if let BatchPayload::Stored(references) = &payload {
        info!("Forwarding {} batch references", references.len());
    }

    Ok(ReceiverOutput::Batches(BatchResponse {
        status_code: 200,
        payload,
    }))
}

async fn collect_rows(deps: &ReceiverDeps, event: &ReceiverEvent) -> Result<Vec<ReadingRow>> {
    match event {
        ReceiverEvent::Bulk { key } => {
            let location = ObjectLocation::new(&deps.config.input_bucket, key);
            info!("Reading bulk input from {}", location);
            let bytes = deps.store.get_object(&location).await?;
            decode_readings_csv(&bytes)
                .map_err(|e| Error::Input(format!("malformed input file {}: {}", location, e)))
        }
        ReceiverEvent::Queue => {
            let drained = drain::<ReadingRow, _>(deps.queue.as_ref()).await?;
            info!(
                "Received {} messages from the queue ({:?})",
                drained.items.len(),
                drained.ended_by
            );
            if drained.rejected > 0 {
                error!(
                    "{} queue messages could not be parsed and were left for redelivery",
                    drained.rejected
                );
            }
            Ok(drained.items)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batching::MAX_PAYLOAD_SIZE;
    use crate::queue::InMemoryQueue;
    use crate::storage::{decode_batch_csv, InMemoryObjectStore};
    use serde_json::json;

    fn config(max_payload_size: usize) -> ReceiverConfig {
        ReceiverConfig {
            queue_url: "https://sqs.example/readings".to_string(),
            input_bucket: "input-bucket".to_string(),
            payload_bucket: "payload-bucket".to_string(),
            payload_prefix: String::new(),
            max_payload_size,
            max_batch_rows: None,
        }
    }

    fn deps(
        max_payload_size: usize,
    ) -> (ReceiverDeps, Arc<InMemoryQueue>, Arc<InMemoryObjectStore>) {
        let queue = Arc::new(InMemoryQueue::new());
        let store = Arc::new(InMemoryObjectStore::new());
        let deps = ReceiverDeps {
            config: config(max_payload_size),
            queue: queue.clone(),
            store: store.clone(),
        };
        (deps, queue, store)
    }

    fn reading_message(location_id: &str, temperature: f64, timestamp: &str) -> String {
        json!({
            "sensor_id": "1",
            "location_id": location_id,
            "temperature": temperature,
            "status": "OK",
            "timestamp": timestamp,
        })
        .to_string()
    }

    #[test]
    fn test_event_discriminator() {
        let bulk: ReceiverEvent =
            serde_json::from_value(json!({"source": "S3", "key": "input.csv"})).unwrap();
        assert_eq!(
            bulk,
            ReceiverEvent::Bulk {
                key: "input.csv".to_string()
            }
        );

        let queue: ReceiverEvent = serde_json::from_value(json!({"source": "SQS"})).unwrap();
        assert_eq!(queue, ReceiverEvent::Queue);

        assert!(serde_json::from_value::<ReceiverEvent>(json!({"source": "FTP"})).is_err());
        assert!(serde_json::from_value::<ReceiverEvent>(json!({"source": "S3"})).is_err());
    }

    #[tokio::test]
    async fn test_unknown_source_is_bad_request() {
        let (deps, queue, _) = deps(MAX_PAYLOAD_SIZE);

        let output = handle(&deps, json!({"source": "FTP"}), "inv").await.unwrap();

        assert_eq!(
            output,
            ReceiverOutput::Status(InvocationResponse::bad_request("UNKNOWN_SOURCE"))
        );
        assert_eq!(queue.delete_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_queue_is_no_content() {
        let (deps, queue, _) = deps(MAX_PAYLOAD_SIZE);

        let output = handle(&deps, json!({"source": "SQS"}), "inv").await.unwrap();

        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            json!({"status_code": 204})
        );
        assert_eq!(queue.delete_count(), 0);
    }

    #[tokio::test]
    async fn test_queue_mode_groups_inline() {
        let (deps, queue, store) = deps(MAX_PAYLOAD_SIZE);
        queue
            .send(&reading_message("B", 80.0, "2025-01-01T00:12:00Z"))
            .await
            .unwrap();
        queue
            .send(&reading_message("A", 30.0, "2025-01-01T00:12:30Z"))
            .await
            .unwrap();
        queue
            .send(&reading_message("B", 90.0, "2025-01-01T00:13:00Z"))
            .await
            .unwrap();

        let output = handle(&deps, json!({"source": "SQS"}), "inv").await.unwrap();

        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            json!({
                "status_code": 200,
                "source": "EVENT",
                "batches": [
                    [{"temperature": 30.0, "timestamp": "2025-01-01T00:12:30Z"}],
                    [
                        {"temperature": 80.0, "timestamp": "2025-01-01T00:12:00Z"},
                        {"temperature": 90.0, "timestamp": "2025-01-01T00:13:00Z"}
                    ]
                ]
            })
        );
        assert_eq!(queue.delete_count(), 3);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_message_does_not_lose_earlier_readings() {
        let (deps, queue, _) = deps(MAX_PAYLOAD_SIZE);
        for (temperature, timestamp) in [
            (21.0, "2025-01-01T00:12:00Z"),
            (22.0, "2025-01-01T00:12:10Z"),
            (23.0, "2025-01-01T00:12:20Z"),
        ] {
            queue
                .send(&reading_message("A", temperature, timestamp))
                .await
                .unwrap();
        }
        queue.send(r#"{"garbage": 1}"#).await.unwrap();

        let output = handle(&deps, json!({"source": "SQS"}), "inv").await.unwrap();

        let output = serde_json::to_value(&output).unwrap();
        assert_eq!(output["status_code"], 200);
        assert_eq!(output["batches"][0].as_array().unwrap().len(), 3);
        assert_eq!(queue.delete_count(), 3);
        assert_eq!(queue.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_bulk_mode_spills_when_over_limit() {
        let (deps, _, store) = deps(200);
        let input = "sensor_id,location_id,temperature,timestamp\n\
                     1,1,120.5,2025-01-01T00:12:00\n\
                     2,2,80.25,2025-01-01T00:12:10\n\
                     3,1,121.0,2025-01-01T00:13:00\n\
                     4,3,60.0,2025-01-01T00:14:00\n";
        store
            .put_object(
                &ObjectLocation::new("input-bucket", "dump.csv"),
                input.as_bytes().to_vec(),
            )
            .await
            .unwrap();

        let output = handle(&deps, json!({"source": "S3", "key": "dump.csv"}), "inv-7")
            .await
            .unwrap();

        let ReceiverOutput::Batches(BatchResponse {
            status_code: 200,
            payload: BatchPayload::Stored(references),
        }) = output
        else {
            panic!("expected stored batches, got {:?}", output);
        };
        assert_eq!(references.len(), 3);
        assert_eq!(references[0], "s3://payload-bucket/inv-7/batch-0.csv");

        let first = decode_batch_csv(
            &store
                .get_object(&references[0].parse().unwrap())
                .await
                .unwrap(),
        )
        .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].temperature, 121.0);
    }

    #[tokio::test]
    async fn test_missing_bulk_file_propagates() {
        let (deps, _, _) = deps(MAX_PAYLOAD_SIZE);

        let result = handle(&deps, json!({"source": "S3", "key": "missing.csv"}), "inv").await;

        assert!(matches!(result, Err(Error::Storage(_))));
    }
}

use chrono::{Duration, TimeZone, Utc};
use rand::Rng;
use sensor_pipeline::batching::MAX_PAYLOAD_SIZE;
use sensor_pipeline::config::ReceiverConfig;
use sensor_pipeline::handlers::receiver::{self, ReceiverDeps, ReceiverOutput};
use sensor_pipeline::handlers::reporter::{self, ReporterDeps};
use sensor_pipeline::handlers::sensor::{self, SensorDeps};
use sensor_pipeline::notify::RecordingNotifier;
use sensor_pipeline::queue::{EventQueue, InMemoryQueue};
use sensor_pipeline::registry::InMemoryRegistry;
use sensor_pipeline::storage::{InMemoryObjectStore, ObjectLocation, ObjectStore};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

struct Pipeline {
    registry: Arc<InMemoryRegistry>,
    queue: Arc<InMemoryQueue>,
    store: Arc<InMemoryObjectStore>,
    notifier: Arc<RecordingNotifier>,
}

impl Pipeline {
    fn new() -> Self {
        Self {
            registry: Arc::new(InMemoryRegistry::new()),
            queue: Arc::new(InMemoryQueue::new()),
            store: Arc::new(InMemoryObjectStore::new()),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }

    fn sensor(&self) -> SensorDeps {
        SensorDeps {
            registry: self.registry.clone(),
            queue: self.queue.clone(),
            notifier: self.notifier.clone(),
        }
    }

    fn receiver(&self) -> ReceiverDeps {
        ReceiverDeps {
            config: ReceiverConfig {
                queue_url: "https://sqs.example/readings".to_string(),
                input_bucket: "input-bucket".to_string(),
                payload_bucket: "payload-bucket".to_string(),
                payload_prefix: "batches/".to_string(),
                max_payload_size: MAX_PAYLOAD_SIZE,
                max_batch_rows: None,
            },
            queue: self.queue.clone(),
            store: self.store.clone(),
        }
    }

    fn reporter(&self) -> ReporterDeps {
        ReporterDeps {
            store: self.store.clone(),
        }
    }
}

fn random_rows(num_rows: usize, num_locations: usize) -> Vec<Value> {
    let mut rng = rand::thread_rng();
    let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

    (0..num_rows)
        .map(|i| {
            // Every location gets at least one row.
            let location = if i < num_locations {
                i
            } else {
                rng.gen_range(0..num_locations)
            };
            let timestamp = start + Duration::milliseconds(rng.gen_range(0..3_600_000));
            json!({
                "sensor_id": rng.gen_range(0..1_000).to_string(),
                "location_id": format!("loc-{:03}", location),
                "temperature": rng.gen_range(20.0..250.0),
                "status": "OK",
                "timestamp": timestamp.to_rfc3339(),
            })
        })
        .collect()
}

#[tokio::test]
async fn sensor_readings_flow_through_to_minute_report() {
    let pipeline = Pipeline::new();
    let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 12, 5).unwrap();

    let events = [
        (json!({"sensor_id": "1", "location_id": "A", "value": 2000}), t0),
        (
            json!({"sensor_id": "2", "location_id": "A", "value": 10000}),
            t0 + Duration::seconds(20),
        ),
        // Out of range: sensor 3 is disabled and nothing is forwarded.
        (
            json!({"sensor_id": "3", "location_id": "A", "value": 25000}),
            t0 + Duration::seconds(30),
        ),
        (
            json!({"sensor_id": "3", "location_id": "A", "value": 2000}),
            t0 + Duration::seconds(40),
        ),
        (
            json!({"sensor_id": "1", "location_id": "A", "value": 2000}),
            t0 + Duration::minutes(2),
        ),
        (
            json!({"sensor_id": "4", "location_id": "B", "value": 5000}),
            t0 + Duration::seconds(10),
        ),
    ];

    let mut status_codes = Vec::new();
    for (event, at) in events {
        let response = sensor::handle(&pipeline.sensor(), event, at).await.unwrap();
        status_codes.push(response.status_code);
    }
    assert_eq!(status_codes, vec![200, 200, 204, 204, 200, 200]);
    assert_eq!(pipeline.registry.snapshot().get("3"), Some(&false));
    assert_eq!(pipeline.queue.pending().len(), 4);

    let output = receiver::handle(&pipeline.receiver(), json!({"source": "SQS"}), "run-1")
        .await
        .unwrap();
    let output = serde_json::to_value(&output).unwrap();
    assert_eq!(output["status_code"], 200);
    assert_eq!(output["source"], "EVENT");
    let batches = output["batches"].as_array().unwrap();
    assert_eq!(batches.len(), 2);
    assert!(pipeline.queue.pending().is_empty());

    // Location A: two readings in 00:12, none in 00:13, one in 00:14.
    let report = reporter::handle(
        &pipeline.reporter(),
        json!({"source": "EVENT", "batch": batches[0].clone()}),
    )
    .await
    .unwrap();

    let keys: Vec<&str> = report.keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        vec![
            "2025-01-01T00:12:00",
            "2025-01-01T00:13:00",
            "2025-01-01T00:14:00"
        ]
    );
    assert_eq!(report["2025-01-01T00:13:00"], 0.0);
    assert!(report["2025-01-01T00:12:00"] > 20.0);
}

#[tokio::test]
async fn large_backlog_switches_to_storage_references() {
    let pipeline = Pipeline::new();
    let rows = random_rows(4_000, 100);
    for row in &rows {
        pipeline.queue.send(&row.to_string()).await.unwrap();
    }

    let output = receiver::handle(&pipeline.receiver(), json!({"source": "SQS"}), "run-2")
        .await
        .unwrap();

    let output = serde_json::to_value(&output).unwrap();
    assert_eq!(output["status_code"], 200);
    assert_eq!(output["source"], "S3");
    let references: Vec<String> = output["batches"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r.as_str().unwrap().to_string())
        .collect();
    assert_eq!(references.len(), 100);
    assert_eq!(pipeline.store.len(), 100);
    assert!(references
        .iter()
        .all(|r| r.starts_with("s3://payload-bucket/batches/run-2/")));

    // Every stored batch can be reported, and together they hold every reading.
    let mut seen = HashSet::new();
    for reference in &references {
        let location: ObjectLocation = reference.parse().unwrap();
        let stored = pipeline.store.get_object(&location).await.unwrap();
        let mut reader = csv::Reader::from_reader(stored.as_slice());
        for record in reader.records() {
            let record = record.unwrap();
            let temperature: f64 = record[0].parse().unwrap();
            seen.insert((format!("{:.6}", temperature), record[1].to_string()));
        }

        let report = reporter::handle(
            &pipeline.reporter(),
            json!({"source": "S3", "batch": reference}),
        )
        .await
        .unwrap();
        assert!(!report.is_empty());
    }

    let expected: HashSet<(String, String)> = rows
        .iter()
        .map(|row| {
            (
                format!("{:.6}", row["temperature"].as_f64().unwrap()),
                row["timestamp"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn moderate_backlog_stays_inline() {
    let pipeline = Pipeline::new();
    for row in random_rows(1_000, 100) {
        pipeline.queue.send(&row.to_string()).await.unwrap();
    }

    let output = receiver::handle(&pipeline.receiver(), json!({"source": "SQS"}), "run-3")
        .await
        .unwrap();

    let ReceiverOutput::Batches(response) = output else {
        panic!("expected batches");
    };
    let output = serde_json::to_value(&response).unwrap();
    assert_eq!(output["source"], "EVENT");
    assert_eq!(output["batches"].as_array().unwrap().len(), 100);
    assert!(pipeline.store.is_empty());
}

#[tokio::test]
async fn repeated_polling_of_empty_queue_is_harmless() {
    let pipeline = Pipeline::new();

    for _ in 0..3 {
        let output = receiver::handle(&pipeline.receiver(), json!({"source": "SQS"}), "run-4")
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            json!({"status_code": 204})
        );
    }
    assert_eq!(pipeline.queue.delete_count(), 0);
}

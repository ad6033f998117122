use crate::errors::Result;
use crate::model::{BatchRow, ReadingRow};
use crate::storage::{encode_batch_csv, ObjectLocation, ObjectStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Hard payload ceiling of the downstream orchestrator (256 KB).
pub const MAX_PAYLOAD_SIZE: usize = 262_144;

/// Headroom kept below the ceiling.
pub fn payload_buffer(max_payload: usize) -> usize {
    max_payload / 10
}

/// What the receiver hands to the orchestrator: either the batches
/// themselves or references to their stored copies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "source", content = "batches")]
pub enum BatchPayload {
    #[serde(rename = "EVENT")]
    Inline(Vec<Vec<BatchRow>>),
    #[serde(rename = "S3")]
    Stored(Vec<String>),
}

/// Receiver output as seen by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchResponse {
    pub status_code: u16,
    #[serde(flatten)]
    pub payload: BatchPayload,
}

/// Groups rows by location id, keyed in ascending location order.
pub fn group_by_location(rows: Vec<ReadingRow>) -> BTreeMap<String, Vec<BatchRow>> {
    let mut groups: BTreeMap<String, Vec<BatchRow>> = BTreeMap::new();
    for row in rows {
        let location_id = row.location_id.clone();
        groups.entry(location_id).or_default().push(row.into());
    }
    groups
}

/// One batch per location, optionally split into chunks of at most `max_rows`.
pub fn build_batches(rows: Vec<ReadingRow>, max_rows: Option<usize>) -> Vec<Vec<BatchRow>> {
    let groups = group_by_location(rows);
    debug!("Grouped rows into {} locations", groups.len());

    let mut batches = Vec::with_capacity(groups.len());
    for (_, rows) in groups {
        match max_rows {
            Some(n) if n > 0 && rows.len() > n => {
                batches.extend(rows.chunks(n).map(|chunk| chunk.to_vec()));
            }
            _ => batches.push(rows),
        }
    }
    batches
}

/// Byte length of the inline response for `batches`.
pub fn inline_payload_size(batches: &[Vec<BatchRow>]) -> Result<usize> {
    #[derive(Serialize)]
    struct InlineView<'a> {
        status_code: u16,
        source: &'static str,
        batches: &'a [Vec<BatchRow>],
    }

    let encoded = serde_json::to_vec(&InlineView {
        status_code: 200,
        source: "EVENT",
        batches,
    })?;
    Ok(encoded.len())
}

/// True when the inline response would not fit under `max_payload` minus the buffer.
pub fn exceeds_limit(payload_size: usize, max_payload: usize) -> bool {
    payload_size > max_payload - payload_buffer(max_payload)
}

/// Where spilled batches are written.
#[derive(Debug, Clone)]
pub struct SpillTarget<'a> {
    pub bucket: &'a str,
    pub prefix: &'a str,
    pub invocation_id: &'a str,
}

impl SpillTarget<'_> {
    pub fn location(&self, index: usize) -> ObjectLocation {
        ObjectLocation::new(
            self.bucket,
            format!("{}{}/batch-{}.csv", self.prefix, self.invocation_id, index),
        )
    }
}

/// Writes each batch to object storage as CSV and returns the references in batch order.
pub async fn spill(
    store: &dyn ObjectStore,
    target: &SpillTarget<'_>,
    batches: &[Vec<BatchRow>],
) -> Result<Vec<String>> {
    let mut references = Vec::with_capacity(batches.len());
    for (index, batch) in batches.iter().enumerate() {
        let location = target.location(index);
        store.put_object(&location, encode_batch_csv(batch)?).await?;
        debug!("Stored batch {} ({} rows) at {}", index, batch.len(), location);
        references.push(location.to_string());
    }
    Ok(references)
}

/// Chooses inline or stored delivery for `batches` and performs any spill.
pub async fn plan_payload(
    store: &dyn ObjectStore,
    target: &SpillTarget<'_>,
    batches: Vec<Vec<BatchRow>>,
    max_payload: usize,
) -> Result<BatchPayload> {
    let size = inline_payload_size(&batches)?;

    if !exceeds_limit(size, max_payload) {
        debug!("Inline payload of {} bytes fits under {}", size, max_payload);
        return Ok(BatchPayload::Inline(batches));
    }

    info!(
        "Payload of {} bytes exceeds limit of {} bytes, storing {} batches",
        size,
        max_payload - payload_buffer(max_payload),
        batches.len()
    );
    let references = spill(store, target, &batches).await?;
    Ok(BatchPayload::Stored(references))
}

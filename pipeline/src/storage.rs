use crate::errors::{Error, Result};
use crate::model::{BatchRow, ReadingRow};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

const SCHEME: &str = "s3://";

/// Bucket and key of an object, written as `s3://bucket/key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", SCHEME, self.bucket, self.key)
    }
}

impl FromStr for ObjectLocation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix(SCHEME)
            .ok_or_else(|| Error::Input(format!("object reference {:?} must start with s3://", s)))?;

        match rest.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
                Ok(Self::new(bucket, key))
            }
            _ => Err(Error::Input(format!(
                "object reference {:?} must name a bucket and a key",
                s
            ))),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, location: &ObjectLocation, body: Vec<u8>) -> Result<()>;

    async fn get_object(&self, location: &ObjectLocation) -> Result<Vec<u8>>;
}

pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, location: &ObjectLocation, body: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| Error::Storage(format!("failed to write {}: {}", location, e)))?;

        Ok(())
    }

    async fn get_object(&self, location: &ObjectLocation) -> Result<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("failed to read {}: {}", location, e)))?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| Error::Storage(format!("failed to stream {}: {}", location, e)))?;

        Ok(bytes.into_bytes().to_vec())
    }
}

/// Process-local object store for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<ObjectLocation, Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ObjectLocation, Vec<u8>>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_object(&self, location: &ObjectLocation, body: Vec<u8>) -> Result<()> {
        self.lock().insert(location.clone(), body);
        Ok(())
    }

    async fn get_object(&self, location: &ObjectLocation) -> Result<Vec<u8>> {
        self.lock()
            .get(location)
            .cloned()
            .ok_or_else(|| Error::Storage(format!("no such object {}", location)))
    }
}

/// Encodes a batch as CSV with a `temperature,timestamp` header.
pub fn encode_batch_csv(rows: &[BatchRow]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))
}

pub fn decode_batch_csv(bytes: &[u8]) -> Result<Vec<BatchRow>> {
    let mut reader = csv::Reader::from_reader(bytes);
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<BatchRow>, _>>()
        .map_err(Error::from)
}

/// Decodes a bulk input file. Columns beyond `location_id`, `temperature`
/// and `timestamp` (e.g. `sensor_id`, `status`) are ignored.
pub fn decode_readings_csv(bytes: &[u8]) -> Result<Vec<ReadingRow>> {
    let mut reader = csv::Reader::from_reader(bytes);
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<ReadingRow>, _>>()
        .map_err(Error::from)
}

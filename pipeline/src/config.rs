use crate::batching::MAX_PAYLOAD_SIZE;
use crate::errors::{Error, Result};
use std::collections::HashMap;
use std::env;

/// Environment variables, captured once per process.
#[derive(Debug, Clone, Default)]
pub struct Env(HashMap<String, String>);

impl Env {
    pub fn from_process() -> Self {
        Self(env::vars().collect())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    fn required(&self, name: &str) -> Result<String> {
        self.0
            .get(name)
            .filter(|value| !value.is_empty())
            .cloned()
            .ok_or_else(|| Error::Config(format!("{} must be configured", name)))
    }

    fn optional(&self, name: &str) -> Option<String> {
        self.0.get(name).filter(|value| !value.is_empty()).cloned()
    }

    fn parsed<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(name)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| Error::Config(format!("{}={:?} is invalid: {}", name, raw, e)))
            })
            .transpose()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorConfig {
    pub registry_table: String,
    pub queue_url: String,
    pub alert_topic_arn: String,
}

impl SensorConfig {
    pub fn from_env(env: &Env) -> Result<Self> {
        Ok(Self {
            registry_table: env.required("SENSOR_REGISTRY_TABLE")?,
            queue_url: env.required("SQS_URL")?,
            alert_topic_arn: env.required("SNS_TOPIC_ARN")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverConfig {
    pub queue_url: String,
    pub input_bucket: String,
    pub payload_bucket: String,
    pub payload_prefix: String,
    pub max_payload_size: usize,
    pub max_batch_rows: Option<usize>,
}

impl ReceiverConfig {
    pub fn from_env(env: &Env) -> Result<Self> {
        let max_payload_size = env.parsed("MAX_PAYLOAD_SIZE")?.unwrap_or(MAX_PAYLOAD_SIZE);
        if max_payload_size == 0 {
            return Err(Error::Config("MAX_PAYLOAD_SIZE must be positive".to_string()));
        }

        let max_batch_rows = env.parsed("MAX_BATCH_ROWS")?;
        if max_batch_rows == Some(0) {
            return Err(Error::Config("MAX_BATCH_ROWS must be positive".to_string()));
        }

        Ok(Self {
            queue_url: env.required("SQS_URL")?,
            input_bucket: env.required("INPUT_BUCKET")?,
            payload_bucket: env.required("PAYLOAD_BUCKET")?,
            payload_prefix: env.optional("PAYLOAD_PREFIX").unwrap_or_default(),
            max_payload_size,
            max_batch_rows,
        })
    }
}

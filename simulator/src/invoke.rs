use anyhow::{anyhow, bail, Context, Result};
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;
use sensor_pipeline::model::{InvocationResponse, NormalizedReading, SensorEvent};
use serde::Serialize;

/// One line of the optional CSV dump.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DumpRow {
    pub n: u64,
    pub status_code: u16,
    pub sensor_id: String,
    pub location_id: String,
    pub temperature: Option<f64>,
    pub status: Option<String>,
    pub timestamp: Option<String>,
}

/// Synchronously invokes the sensor function and returns its response envelope.
pub async fn invoke_sensor(
    client: &aws_sdk_lambda::Client,
    function_name: &str,
    event: &SensorEvent,
) -> Result<InvocationResponse> {
    let payload = serde_json::to_vec(event)?;

    let output = client
        .invoke()
        .function_name(function_name)
        .invocation_type(InvocationType::RequestResponse)
        .payload(Blob::new(payload))
        .send()
        .await
        .with_context(|| format!("failed to invoke {}", function_name))?;

    if let Some(function_error) = output.function_error() {
        bail!("{} failed: {}", function_name, function_error);
    }

    let body = output
        .payload()
        .ok_or_else(|| anyhow!("{} returned no payload", function_name))?;
    serde_json::from_slice(body.as_ref()).context("unexpected response payload")
}

/// Accepts 200 and 204 responses, anything else is an error.
pub fn accept(n: u64, event: &SensorEvent, response: &InvocationResponse) -> Result<DumpRow> {
    let mut row = DumpRow {
        n,
        status_code: response.status_code,
        sensor_id: event.sensor_id.clone(),
        location_id: event.location_id.clone(),
        temperature: None,
        status: None,
        timestamp: None,
    };

    match response.status_code {
        200 => {
            let body = response
                .body
                .as_deref()
                .ok_or_else(|| anyhow!("200 response without body"))?;
            let reading: NormalizedReading =
                serde_json::from_str(body).context("unexpected response body")?;
            row.temperature = Some(reading.temperature_celsius);
            row.status = Some(reading.status.to_string());
            row.timestamp = Some(reading.timestamp.to_rfc3339());
            Ok(row)
        }
        204 => Ok(row),
        other => bail!("got unexpected status {}: {:?}", other, response.body),
    }
}

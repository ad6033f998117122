use lambda_runtime::{service_fn, Error, LambdaEvent};
use sensor_pipeline::config::{Env, ReceiverConfig};
use sensor_pipeline::handlers::receiver::{handle, ReceiverDeps};
use sensor_pipeline::logging;
use sensor_pipeline::queue::SqsQueue;
use sensor_pipeline::storage::S3ObjectStore;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    logging::init();

    let config = ReceiverConfig::from_env(&Env::from_process())?;
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    info!(
        "Input bucket: {}, payload bucket: {}, payload limit: {} bytes",
        config.input_bucket, config.payload_bucket, config.max_payload_size
    );

    let deps = ReceiverDeps {
        queue: Arc::new(SqsQueue::new(
            aws_sdk_sqs::Client::new(&aws_config),
            config.queue_url.clone(),
        )),
        store: Arc::new(S3ObjectStore::new(aws_sdk_s3::Client::new(&aws_config))),
        config,
    };

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let deps = deps.clone();
        async move {
            let invocation_id = uuid::Uuid::new_v4().to_string();
            handle(&deps, event.payload, &invocation_id)
                .await
                .map_err(Error::from)
        }
    }))
    .await
}

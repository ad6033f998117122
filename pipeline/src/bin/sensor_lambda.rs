use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use sensor_pipeline::config::{Env, SensorConfig};
use sensor_pipeline::handlers::sensor::{handle, SensorDeps};
use sensor_pipeline::logging;
use sensor_pipeline::notify::SnsNotifier;
use sensor_pipeline::queue::SqsQueue;
use sensor_pipeline::registry::DynamoDbRegistry;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Error> {
    logging::init();

    let config = SensorConfig::from_env(&Env::from_process())?;
    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    info!("Sensor registry table: {}", config.registry_table);
    info!("Reading queue: {}", config.queue_url);

    let deps = SensorDeps {
        registry: Arc::new(DynamoDbRegistry::new(
            aws_sdk_dynamodb::Client::new(&aws_config),
            config.registry_table,
        )),
        queue: Arc::new(SqsQueue::new(
            aws_sdk_sqs::Client::new(&aws_config),
            config.queue_url,
        )),
        notifier: Arc::new(SnsNotifier::new(
            aws_sdk_sns::Client::new(&aws_config),
            config.alert_topic_arn,
        )),
    };

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let deps = deps.clone();
        async move {
            handle(&deps, event.payload, Utc::now())
                .await
                .map_err(Error::from)
        }
    }))
    .await
}

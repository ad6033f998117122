use lambda_runtime::{service_fn, Error, LambdaEvent};
use sensor_pipeline::handlers::reporter::{handle, ReporterDeps};
use sensor_pipeline::logging;
use sensor_pipeline::storage::S3ObjectStore;
use serde_json::Value;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Error> {
    logging::init();

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let deps = ReporterDeps {
        store: Arc::new(S3ObjectStore::new(aws_sdk_s3::Client::new(&aws_config))),
    };

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let deps = deps.clone();
        async move { handle(&deps, event.payload).await.map_err(Error::from) }
    }))
    .await
}

mod event;
mod invoke;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use event::random_event;
use invoke::{accept, invoke_sensor, DumpRow};
use rand::Rng;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Sends random thermistor readings to the sensor function.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    #[arg(long, env = "SENSOR_FUNCTION_NAME", default_value = "sensor-lambda")]
    function_name: String,

    #[arg(long, env = "LOCATIONS", default_value_t = 10)]
    locations: u32,

    /// Sensors per location
    #[arg(long, env = "SENSORS", default_value_t = 5)]
    sensors: u32,

    #[arg(long, default_value_t = 60.0)]
    total_runtime_seconds: f64,

    #[arg(long, default_value_t = 1.0)]
    min_delay_seconds: f64,

    #[arg(long, default_value_t = 1.0)]
    max_delay_seconds: f64,

    #[arg(long, default_value_t = 20.0)]
    min_value: f64,

    #[arg(long, default_value_t = 250.0)]
    max_value: f64,

    /// Write every response to this CSV file
    #[arg(long)]
    dump: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    ensure!(args.locations > 0 && args.sensors > 0, "need at least one location and sensor");
    ensure!(
        args.min_delay_seconds > 0.0 && args.min_delay_seconds <= args.max_delay_seconds,
        "delays must be positive and min <= max"
    );
    ensure!(args.min_value < args.max_value, "min value must be below max value");

    let max_requests =
        (args.total_runtime_seconds / args.min_delay_seconds).ceil().max(0.0) as u64;

    info!("Starting sensor simulator against {}", args.function_name);
    info!(
        "Locations: {}, sensors per location: {}, up to {} requests over {}s",
        args.locations, args.sensors, max_requests, args.total_runtime_seconds
    );

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let client = aws_sdk_lambda::Client::new(&aws_config);

    let mut rng = rand::thread_rng();
    let mut dump: Vec<DumpRow> = Vec::new();
    let runtime = Duration::from_secs_f64(args.total_runtime_seconds);
    let start = Instant::now();
    let mut sent = 0u64;

    for n in 0..max_requests {
        if start.elapsed() > runtime {
            info!("Exit loop after {} seconds", args.total_runtime_seconds);
            break;
        }

        let event = random_event(
            &mut rng,
            args.locations,
            args.sensors,
            args.min_value..args.max_value,
        );
        let response = invoke_sensor(&client, &args.function_name, &event).await?;
        let row = accept(n, &event, &response)?;
        info!(
            "#{} sensor {} @ {}: {} {:?}",
            n, row.sensor_id, row.location_id, row.status_code, row.status
        );
        if row.status_code == 204 {
            warn!("Sensor {} reading was suppressed", row.sensor_id);
        }
        sent += 1;

        if args.dump.is_some() {
            dump.push(row);
        }

        let delay = rng.gen_range(args.min_delay_seconds..=args.max_delay_seconds);
        tokio::time::sleep(Duration::from_secs_f64(delay)).await;
    }

    info!("Sent {} readings in {:.1}s", sent, start.elapsed().as_secs_f64());

    if let Some(path) = args.dump {
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("cannot create {}", path.display()))?;
        for row in &dump {
            writer.serialize(row)?;
        }
        writer.flush()?;
        info!("Wrote {} rows to {}", dump.len(), path.display());
    }

    Ok(())
}

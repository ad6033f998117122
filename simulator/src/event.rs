use rand::Rng;
use sensor_pipeline::model::SensorEvent;
use std::ops::Range;

/// Random reading for a random sensor. Sensor ids are unique across
/// locations: `location * sensors_per_location + sensor`.
pub fn random_event<R: Rng>(
    rng: &mut R,
    locations: u32,
    sensors_per_location: u32,
    values: Range<f64>,
) -> SensorEvent {
    let location = rng.gen_range(0..locations);
    let sensor = rng.gen_range(0..sensors_per_location);

    SensorEvent {
        sensor_id: (location * sensors_per_location + sensor).to_string(),
        location_id: location.to_string(),
        value: rng.gen_range(values),
    }
}

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::desk::telemetry::Reading;

/// Produces a reading on every telemetry tick while a device is connected.
pub trait SampleSource: Send {
    /// `None` skips this tick.
    fn next_reading(&mut self) -> Option<Reading>;
}

/// Random readings for running without a sensor: 22-37 °C and 30-70 %RH, so both the
/// temperature rule and the humidity band edge are exercised now and then.
pub struct SyntheticSource {
    rng: StdRng,
}

impl SyntheticSource {
    pub fn new() -> Self {
        SyntheticSource { rng: StdRng::from_entropy() }
    }

    pub fn with_seed(seed: u64) -> Self {
        SyntheticSource { rng: StdRng::seed_from_u64(seed) }
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for SyntheticSource {
    fn next_reading(&mut self) -> Option<Reading> {
        Some(Reading {
            temperature: self.rng.gen_range(22.0..37.0),
            humidity: self.rng.gen_range(30.0..70.0),
        })
    }
}

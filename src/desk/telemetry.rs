use std::collections::VecDeque;
use std::time::SystemTime;

use crate::error::TelemetryParseError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    // °C
    pub temperature: f64,
    // %RH
    pub humidity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub temperature: f64,
    pub humidity: f64,
    pub timestamp: SystemTime,
}

impl TelemetrySample {
    pub fn new(reading: Reading, timestamp: SystemTime) -> Self {
        TelemetrySample {
            temperature: reading.temperature,
            humidity: reading.humidity,
            timestamp,
        }
    }
}

/// Bounded, arrival-ordered sample history. The oldest sample is evicted on overflow.
#[derive(Debug, Clone)]
pub struct TelemetryHistory {
    samples: VecDeque<TelemetrySample>,
    capacity: usize,
}

impl TelemetryHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        TelemetryHistory {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: TelemetrySample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn latest(&self) -> Option<&TelemetrySample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TelemetrySample> {
        self.samples.iter()
    }

    pub fn to_vec(&self) -> Vec<TelemetrySample> {
        self.samples.iter().copied().collect()
    }
}

fn parse_number(key: &'static str, value: Option<&str>) -> Result<f64, TelemetryParseError> {
    let value = value.ok_or(TelemetryParseError::MissingField(key))?;
    value
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
        .ok_or_else(|| TelemetryParseError::InvalidNumber { key, value: value.to_string() })
}

/// Parse one record of the form `TEMP:<f>,HUM:<f>`. Keys are case-insensitive, unknown keys
/// are ignored.
pub fn parse_record(record: &str) -> Result<Reading, TelemetryParseError> {
    let mut temperature = None;
    let mut humidity = None;

    for pair in record.trim().split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }

        let (key, value) = pair
            .split_once(':')
            .ok_or_else(|| TelemetryParseError::MalformedPair(pair.to_string()))?;
        let value = value.trim();

        match key.trim().to_ascii_uppercase().as_str() {
            "TEMP" => temperature = Some(value),
            "HUM" => humidity = Some(value),
            _ => {},
        }
    }

    Ok(Reading {
        temperature: parse_number("TEMP", temperature)?,
        humidity: parse_number("HUM", humidity)?,
    })
}

/// Split an inbound data event into records (one per line) and parse each of them.
pub fn parse_records(data: &str) -> Vec<Result<Reading, TelemetryParseError>> {
    data.split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(parse_record)
        .collect()
}

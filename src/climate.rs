//! Humidity/temperature sampler for the external single-wire sensor.
//!
//! The sensor talks a request/response protocol: a start pulse triggers a
//! conversion, then the sensor clocks out 40 bits that end in a checksum.
//! The bus timing lives in the driver behind [`ClimateSensor`]; this module
//! only sequences the two phases and classifies failures.

use crate::log::{info, warn};

/// Why a measurement produced no data.
///
/// Both cases are recoverable. The cycle carries on without the readings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// The sensor never answered (missing sensor or bad wiring)
    Timeout,
    /// The sensor answered but the transmission was corrupted
    BadChecksum,
}

impl core::fmt::Display for SensorError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SensorError::Timeout => f.write_str("sensor not responding"),
            SensorError::BadChecksum => f.write_str("bad checksum"),
        }
    }
}

/// Driver interface of the external sensor.
pub trait ClimateSensor {
    /// Triggers a conversion without waiting for it.
    fn start_measurement(&mut self);

    /// Waits for the response of the conversion started by
    /// [`start_measurement`](Self::start_measurement), bounded by the
    /// protocol timeout, and validates its checksum.
    ///
    /// Returns `(relative humidity %, temperature °C)`.
    fn finish_measurement_blocking(&mut self) -> Result<(f32, f32), SensorError>;
}

/// One successful measurement.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClimateMeasurement {
    /// Relative humidity in percent
    pub humidity: f32,
    /// Temperature in degrees Celsius
    pub temperature: f32,
}

/// Runs the start/finish protocol against a [`ClimateSensor`].
pub struct ClimateSampler<S> {
    sensor: S,
}

impl<S: ClimateSensor> ClimateSampler<S> {
    /// Creates a sampler over the sensor.
    ///
    /// # Arguments
    ///
    /// * `sensor` - Humidity/temperature sensor driver
    pub fn new(sensor: S) -> Self {
        Self { sensor }
    }

    /// Takes one measurement.
    pub fn measure(&mut self) -> Result<ClimateMeasurement, SensorError> {
        self.sensor.start_measurement();

        match self.sensor.finish_measurement_blocking() {
            Ok((humidity, temperature)) => {
                info!("climate: {} C, {} % humidity", temperature, humidity);
                Ok(ClimateMeasurement {
                    humidity,
                    temperature,
                })
            }
            Err(SensorError::Timeout) => {
                warn!("climate: sensor not responding, please check your wiring");
                Err(SensorError::Timeout)
            }
            Err(SensorError::BadChecksum) => {
                warn!("climate: bad checksum");
                Err(SensorError::BadChecksum)
            }
        }
    }

    /// Gives the sensor back.
    pub fn release(self) -> S {
        self.sensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct ScriptedSensor {
        result: Option<Result<(f32, f32), SensorError>>,
        started: bool,
        calls: u32,
    }

    impl ClimateSensor for ScriptedSensor {
        fn start_measurement(&mut self) {
            self.started = true;
        }

        fn finish_measurement_blocking(&mut self) -> Result<(f32, f32), SensorError> {
            assert!(self.started, "finish without start");
            self.started = false;
            self.calls += 1;
            self.result.unwrap_or(Err(SensorError::Timeout))
        }
    }

    #[test]
    fn successful_measurement() {
        let mut sampler = ClimateSampler::new(ScriptedSensor {
            result: Some(Ok((55.0, 22.1))),
            ..Default::default()
        });

        let measurement = sampler.measure().unwrap();
        assert_eq!(measurement.humidity, 55.0);
        assert_eq!(measurement.temperature, 22.1);
    }

    #[test]
    fn timeout_is_reported() {
        let mut sampler = ClimateSampler::new(ScriptedSensor {
            result: Some(Err(SensorError::Timeout)),
            ..Default::default()
        });

        assert_eq!(sampler.measure(), Err(SensorError::Timeout));
    }

    #[test]
    fn bad_checksum_is_reported() {
        let mut sampler = ClimateSampler::new(ScriptedSensor {
            result: Some(Err(SensorError::BadChecksum)),
            ..Default::default()
        });

        assert_eq!(sampler.measure(), Err(SensorError::BadChecksum));
    }

    #[test]
    fn every_measure_starts_a_new_conversion() {
        let mut sampler = ClimateSampler::new(ScriptedSensor {
            result: Some(Ok((40.0, 20.0))),
            ..Default::default()
        });

        for _ in 0..3 {
            sampler.measure().unwrap();
        }
        assert_eq!(sampler.release().calls, 3);
    }
}

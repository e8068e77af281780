//! Sensor drivers for the node core.

use defmt::warn;
use dht_sensor::{DhtError, DhtReading, dht22};
use embassy_rp::adc::{Adc, Blocking, Channel};
use embassy_rp::gpio::OutputOpenDrain;
use embassy_time::Delay;

use sensor_node::climate::{ClimateSensor, SensorError};
use sensor_node::die_temp::DieTemperatureAdc;

/// On-die temperature diode on ADC input 4.
pub struct RpDieTemperature {
    adc: Adc<'static, Blocking>,
    channel: Channel<'static>,
    /// Last good conversion, reported again if one fails
    last: u16,
}

impl RpDieTemperature {
    pub fn new(adc: Adc<'static, Blocking>, channel: Channel<'static>) -> Self {
        Self {
            adc,
            channel,
            last: 0,
        }
    }
}

impl DieTemperatureAdc for RpDieTemperature {
    fn select_temperature_input(&mut self) {
        // The HAL writes AINSEL from `channel` on every conversion.
    }

    fn read_raw(&mut self) -> u16 {
        match self.adc.blocking_read(&mut self.channel) {
            Ok(raw) => {
                self.last = raw;
                raw
            }
            Err(_) => {
                warn!("adc: conversion failed, reusing {}", self.last);
                self.last
            }
        }
    }
}

/// DHT22 on a single open-drain GPIO.
///
/// The bit-banged transfer is blocking, so the start request is only
/// latched here and the whole exchange runs in
/// [`finish_measurement_blocking`](ClimateSensor::finish_measurement_blocking).
pub struct Dht22 {
    pin: OutputOpenDrain<'static>,
    delay: Delay,
    requested: bool,
}

impl Dht22 {
    pub fn new(pin: OutputOpenDrain<'static>, delay: Delay) -> Self {
        Self {
            pin,
            delay,
            requested: false,
        }
    }
}

impl ClimateSensor for Dht22 {
    fn start_measurement(&mut self) {
        self.requested = true;
    }

    fn finish_measurement_blocking(&mut self) -> Result<(f32, f32), SensorError> {
        if !core::mem::take(&mut self.requested) {
            return Err(SensorError::Timeout);
        }

        match dht22::Reading::read(&mut self.delay, &mut self.pin) {
            Ok(reading) => Ok((reading.relative_humidity, reading.temperature)),
            Err(DhtError::ChecksumMismatch) => Err(SensorError::BadChecksum),
            Err(DhtError::Timeout) | Err(DhtError::PinError(_)) => Err(SensorError::Timeout),
        }
    }
}

//! Hardware abstraction and peripheral initialization.
//!
//! This module defines the pin mappings and builds the drivers the node
//! core runs on, for a Raspberry Pi Pico with a Waveshare SX1262 LoRa
//! module and a DHT22 on a free GPIO.
//!
//! # Pin Assignments
//!
//! ## SX1262 radio (SPI1)
//! - **GP10**: SCK
//! - **GP11**: MOSI
//! - **GP12**: MISO
//! - **GP3**: NSS - Active-low chip select
//! - **GP15**: RESET - Active-low radio reset
//! - **GP2**: BUSY - Radio busy flag
//! - **GP20**: DIO1 - Radio interrupt line
//!
//! ## Sensors
//! - **GP14**: DHT22 data (open drain, pull-up on the sensor module)
//! - **ADC4**: On-die temperature diode
//!
//! ## Output
//! - **GP25**: On-board LED, driven by downlinks

mod lorawan;
mod sensors;

use embassy_rp::adc::{self, Adc, Channel};
use embassy_rp::gpio::{Input, Level, Output, OutputOpenDrain, Pull};
use embassy_rp::spi::{self, Spi};
use embassy_time::Delay;
use embedded_hal_bus::spi::ExclusiveDevice;

pub use lorawan::LorawanNode;
pub use sensors::{Dht22, RpDieTemperature};

use lorawan::RadioParts;

/// SPI clock for the radio; the SX1262 accepts up to 16 MHz.
const RADIO_SPI_FREQUENCY: u32 = 8_000_000;

/// Top-level peripheral container for the sensor node.
///
/// Owns every driver the cycle needs, already configured.
pub struct Peripherals {
    /// LoRaWAN stack on the SX1262 (radio brought up by `init`)
    pub lorawan: LorawanNode,
    /// RP2040 on-die temperature sensor
    pub die_temperature: RpDieTemperature,
    /// External humidity/temperature sensor
    pub dht22: Dht22,
    /// On-board LED
    pub led: Output<'static>,
}

impl Peripherals {
    /// Initializes all peripherals from the RP2040 peripheral singleton.
    ///
    /// # Initial GPIO States
    ///
    /// - GP3 (NSS): High (radio deselected)
    /// - GP15 (RESET): High (radio out of reset)
    /// - GP14 (DHT22): High (bus idle)
    /// - GP25 (LED): Low
    pub fn new(p: embassy_rp::Peripherals) -> Self {
        let mut spi_config = spi::Config::default();
        spi_config.frequency = RADIO_SPI_FREQUENCY;

        let spi = Spi::new(
            p.SPI1, p.PIN_10, p.PIN_11, p.PIN_12, p.DMA_CH0, p.DMA_CH1, spi_config,
        );
        let nss = Output::new(p.PIN_3, Level::High);
        let spi = defmt::unwrap!(ExclusiveDevice::new(spi, nss, Delay));

        let radio = RadioParts {
            spi,
            reset: Output::new(p.PIN_15, Level::High),
            busy: Input::new(p.PIN_2, Pull::None),
            dio1: Input::new(p.PIN_20, Pull::None),
        };

        let adc = Adc::new_blocking(p.ADC, adc::Config::default());
        let channel = Channel::new_temp_sensor(p.ADC_TEMP_SENSOR);

        Self {
            lorawan: LorawanNode::new(radio),
            die_temperature: RpDieTemperature::new(adc, channel),
            dht22: Dht22::new(OutputOpenDrain::new(p.PIN_14, Level::High), Delay),
            led: Output::new(p.PIN_25, Level::Low),
        }
    }
}

//! Firmware for a battery-powered LoRaWAN environmental sensor node.
//!
//! # Overview
//!
//! This firmware turns a Raspberry Pi Pico into a field sensor that:
//! - Joins a LoRaWAN network over OTAA and stays joined
//! - Every 5 minutes reports the die temperature and a DHT22 reading
//! - Listens for a downlink after each uplink and drives the LED from it
//!
//! # Hardware
//!
//! - **MCU**: RP2040 (dual Cortex-M0+, only core 0 used)
//! - **Radio**: Semtech SX1262 on SPI1 (Waveshare Pico-LoRa-SX1262)
//! - **Sensors**: DHT22 humidity/temperature, RP2040 on-die diode
//! - **Output**: On-board LED on GP25
//!
//! # Start-up
//!
//! 1. Initialize peripherals and drivers
//! 2. Bring up the radio and load region/credentials (fatal on failure)
//! 3. Send the join request and wait for the accept, without limit
//! 4. Enter the measurement cycle, which never returns
//!
//! # Module Organization
//!
//! - [`hardware`] - Pin mappings and driver construction
//! - [`credentials`] - Region and OTAA keys of this node
//!
//! The cycle itself lives in the `sensor_node` library.

#![no_std]
#![no_main]

mod credentials;
mod hardware;

use defmt::{error, info};
use embassy_executor::Spawner;
use embassy_time::Delay;
#[cfg(feature = "debug-mode")]
use embassy_time::Timer;
use {defmt_rtt as _, panic_probe as _};

use hardware::Peripherals;
use sensor_node::actuator::ControlActuator;
use sensor_node::climate::ClimateSampler;
use sensor_node::config::NodeConfig;
use sensor_node::cycle::CycleController;
use sensor_node::die_temp::DieTemperatureSampler;
use sensor_node::session::NetworkSession;

/// Main entry point for the sensor node firmware.
///
/// # Spawned Tasks
///
/// None. The whole cycle runs in this task; every wait in it is an
/// `.await` on a bounded call, so the executor sleeps in between.
#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    let p = embassy_rp::init(Default::default());

    // Give a debugger or RTT console time to attach before the first
    // messages scroll by.
    #[cfg(feature = "debug-mode")]
    {
        info!("Waiting 3 seconds for debugger connection...");
        Timer::after_secs(3).await;
    }

    info!("Pico LoRaWAN - OTAA - Temperature + Humidity + LED");

    let peripherals = Peripherals::new(p);

    let mut node = CycleController::new(
        DieTemperatureSampler::new(peripherals.die_temperature),
        ClimateSampler::new(peripherals.dht22),
        NetworkSession::new(peripherals.lorawan),
        ControlActuator::new(peripherals.led),
        Delay,
        NodeConfig::default(),
    );

    let settings = credentials::network_settings();
    match node.start(&settings).await {
        Ok(slices) => info!("Joined after {} service slices", slices),
        Err(_) => {
            error!("LoRaWAN start-up failed, halting");
            loop {
                cortex_m::asm::wfi();
            }
        }
    }

    node.run().await
}

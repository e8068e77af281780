//! Core of the LoRaWAN environmental sensor node.
//!
//! # Overview
//!
//! The node wakes every five minutes and:
//! - samples the RP2040 on-die temperature sensor
//! - measures humidity and temperature on an external DHT22
//! - packs the readings into a channel-tagged binary frame (11 bytes when
//!   everything succeeded)
//! - sends the frame as an unconfirmed LoRaWAN uplink on port 2
//! - listens 30 seconds for a downlink and applies its first byte to the
//!   on-board LED
//!
//! Everything in this crate is hardware-agnostic. Drivers plug in through
//! small traits ([`die_temp::DieTemperatureAdc`], [`climate::ClimateSensor`],
//! [`session::LorawanStack`]) and the `embedded-hal` output pin and async
//! delay traits, which keeps the whole cycle testable on the host. The
//! firmware binary (`--features firmware`) wires them to the board.
//!
//! # Uplink payload
//!
//! ```text
//! 01 67 TT TT   channel 1, die temperature, 0.1 °C, i16 BE
//! 02 67 tt tt   channel 2, DHT22 temperature, 0.1 °C, i16 BE
//! 03 68 hh      channel 3, DHT22 humidity, 0.5 %, u8
//! ```
//!
//! When the DHT22 fails only the first record is sent.
//!
//! # Module Organization
//!
//! - [`die_temp`] - On-die temperature conversion
//! - [`climate`] - External humidity/temperature sensor sequencing
//! - [`telemetry`] - Frame encoder
//! - [`poll`] - Bounded polling of a serviced stack
//! - [`session`] - LoRaWAN join/uplink/downlink session
//! - [`actuator`] - Downlink-driven output
//! - [`cycle`] - The periodic controller tying it together
//! - [`config`] - Constants, timings and network settings

#![cfg_attr(not(test), no_std)]

mod log;

pub mod actuator;
pub mod climate;
pub mod config;
pub mod cycle;
pub mod die_temp;
pub mod poll;
pub mod session;
pub mod telemetry;

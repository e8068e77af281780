//! LoRaWAN stack on the SX1262.
//!
//! The MAC is `lorawan-device`'s async Class A device on top of a
//! `lora-phy` SX1262 driver. Class A only listens in the two receive
//! windows that follow an uplink, so a downlink, if any, is captured while
//! sending and handed out by the next `wait_for_event`/`receive` pair.

use defmt::{info, warn};
use embassy_rp::clocks::RoscRng;
use embassy_rp::gpio::{Input, Output};
use embassy_rp::peripherals::SPI1;
use embassy_rp::spi::{Async, Spi};
use embassy_time::{Delay, Duration, Instant, Timer};
use embedded_hal_bus::spi::ExclusiveDevice;
use heapless::Vec;
use lora_phy::LoRa;
use lora_phy::iv::GenericSx126xInterfaceVariant;
use lora_phy::lorawan_radio::LorawanRadio;
use lora_phy::sx126x::{self, Sx126x, Sx1262, TcxoCtrlVoltage};
use lorawan_device::async_device::{Device, JoinMode, JoinResponse, radio};
use lorawan_device::default_crypto::DefaultFactory;
use lorawan_device::region::{self, Subband};
use lorawan_device::{AppEui, AppKey, DevEui};

use sensor_node::config::{
    JOIN_BACKOFF_INITIAL, JOIN_BACKOFF_MAX, MAX_DOWNLINK_LEN, NetworkSettings, Region,
};
use sensor_node::poll::{Backoff, Service};
use sensor_node::session::{LorawanStack, StackEvent};

/// Transmit power cap in dBm.
const MAX_TX_POWER: u8 = 14;

type RadioSpi = ExclusiveDevice<Spi<'static, SPI1, Async>, Output<'static>, Delay>;
type RadioKind = Sx126x<RadioSpi, GenericSx126xInterfaceVariant<Output<'static>, Input<'static>>, Sx1262>;
type Radio = LorawanRadio<RadioKind, Delay, MAX_TX_POWER>;
type MacDevice = Device<Radio, DefaultFactory, LoraTimer, RoscRng>;

/// Radio wiring handed over before the stack is initialized.
pub struct RadioParts {
    pub spi: RadioSpi,
    pub reset: Output<'static>,
    pub busy: Input<'static>,
    pub dio1: Input<'static>,
}

/// Stack failures.
#[derive(Debug, defmt::Format)]
pub enum StackError {
    /// `init` called twice
    AlreadyInitialized,
    /// Used before `init` succeeded
    NotInitialized,
    /// The SX1262 did not come up
    Radio,
    /// Sub-band not understood by the MAC
    Subband(u8),
    /// The MAC failed the uplink
    Send,
    /// The join exchange failed at the radio level
    Join,
}

/// `lorawan-device` timer on top of embassy-time.
pub struct LoraTimer {
    start: Instant,
}

impl LoraTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl radio::Timer for LoraTimer {
    fn reset(&mut self) {
        self.start = Instant::now();
    }

    async fn at(&mut self, millis: u64) {
        Timer::at(self.start + Duration::from_millis(millis)).await;
    }

    async fn delay_ms(&mut self, millis: u64) {
        Timer::after_millis(millis).await;
    }
}

/// [`LorawanStack`] implementation for the board.
pub struct LorawanNode {
    parts: Option<RadioParts>,
    device: Option<MacDevice>,
    join_mode: Option<JoinMode>,
    join_requested: bool,
    join_backoff: Backoff,
    joined: bool,
    downlink: Option<(Vec<u8, MAX_DOWNLINK_LEN>, u8)>,
}

impl LorawanNode {
    pub fn new(parts: RadioParts) -> Self {
        Self {
            parts: Some(parts),
            device: None,
            join_mode: None,
            join_requested: false,
            join_backoff: Backoff::new(JOIN_BACKOFF_INITIAL, JOIN_BACKOFF_MAX),
            joined: false,
            downlink: None,
        }
    }

    /// Moves a downlink received during the last exchange into `downlink`.
    fn capture_downlink(&mut self) {
        let Some(device) = self.device.as_mut() else {
            return;
        };

        if let Some(downlink) = device.take_downlink() {
            let len = downlink.data.len().min(MAX_DOWNLINK_LEN);
            let mut bytes = Vec::new();
            let _ = bytes.extend_from_slice(&downlink.data[..len]);
            self.downlink = Some((bytes, downlink.fport));
        }
    }
}

fn mac_region(region: Region) -> region::Region {
    match region {
        Region::AS923 => region::Region::AS923_1,
        Region::AU915 => region::Region::AU915,
        Region::EU868 => region::Region::EU868,
        Region::IN865 => region::Region::IN865,
        Region::US915 => region::Region::US915,
    }
}

fn mac_subband(subband: u8) -> Option<Subband> {
    Some(match subband {
        1 => Subband::_1,
        2 => Subband::_2,
        3 => Subband::_3,
        4 => Subband::_4,
        5 => Subband::_5,
        6 => Subband::_6,
        7 => Subband::_7,
        8 => Subband::_8,
        _ => return None,
    })
}

impl Service for LorawanNode {
    type Error = StackError;

    async fn service(&mut self, slice: Duration) -> Result<(), StackError> {
        if !self.join_requested || self.joined {
            Timer::after(slice).await;
            return Ok(());
        }

        // Keep the regional duty cycle between unanswered join requests.
        if !self.join_backoff.ready() {
            Timer::after(slice).await;
            self.join_backoff.elapse(slice);
            return Ok(());
        }

        let device = self.device.as_mut().ok_or(StackError::NotInitialized)?;
        let mode = self.join_mode.as_ref().ok_or(StackError::NotInitialized)?;

        match device.join(mode).await {
            Ok(JoinResponse::JoinSuccess) => {
                self.joined = true;
                self.join_backoff.reset();
                Ok(())
            }
            Ok(JoinResponse::NoJoinAccept) => {
                self.join_backoff.failed();
                info!(
                    "lorawan: no join accept, retrying in {} s",
                    self.join_backoff.remaining().as_secs()
                );
                Ok(())
            }
            Err(_) => {
                self.join_backoff.failed();
                Err(StackError::Join)
            }
        }
    }
}

impl LorawanStack for LorawanNode {
    async fn init(&mut self, settings: &NetworkSettings) -> Result<(), StackError> {
        let parts = self.parts.take().ok_or(StackError::AlreadyInitialized)?;

        let config = sx126x::Config {
            chip: Sx1262,
            tcxo_ctrl: Some(TcxoCtrlVoltage::Ctrl1V7),
            use_dcdc: true,
            rx_boost: false,
        };
        let iv = GenericSx126xInterfaceVariant::new(parts.reset, parts.dio1, parts.busy, None, None)
            .map_err(|_| StackError::Radio)?;
        let lora = LoRa::new(Sx126x::new(parts.spi, iv, config), true, Delay)
            .await
            .map_err(|_| StackError::Radio)?;
        let radio: Radio = lora.into();

        let mut region = region::Configuration::new(mac_region(settings.region));
        if let Some(subband) = settings.subband {
            let bias = mac_subband(subband).ok_or(StackError::Subband(subband))?;
            region.set_join_bias(bias);
        }

        let credentials = &settings.credentials;
        self.join_mode = Some(JoinMode::OTAA {
            deveui: DevEui::from(credentials.dev_eui),
            appeui: AppEui::from(credentials.app_eui),
            appkey: AppKey::from(credentials.app_key),
        });
        self.device = Some(Device::new(region, radio, LoraTimer::new(), RoscRng));

        info!("lorawan: radio up");
        Ok(())
    }

    fn join(&mut self) {
        self.join_requested = true;
    }

    fn is_joined(&self) -> bool {
        self.joined
    }

    async fn send_unconfirmed(&mut self, payload: &[u8], port: u8) -> Result<(), StackError> {
        let device = self.device.as_mut().ok_or(StackError::NotInitialized)?;

        let result = device.send(payload, port, false).await;
        self.capture_downlink();

        match result {
            Ok(_) => Ok(()),
            Err(_) => {
                warn!("lorawan: uplink rejected by the MAC");
                Err(StackError::Send)
            }
        }
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Option<(usize, u8)> {
        let (bytes, port) = self.downlink.take()?;
        let len = bytes.len().min(buffer.len());
        buffer[..len].copy_from_slice(&bytes[..len]);
        Some((len, port))
    }

    async fn wait_for_event(&mut self, timeout: Duration) -> Option<StackEvent> {
        if self.downlink.is_some() {
            return Some(StackEvent::Downlink);
        }

        // No receive window is open outside an uplink in Class A; the
        // window is plain listening time.
        Timer::after(timeout).await;
        self.downlink.as_ref().map(|_| StackEvent::Downlink)
    }
}

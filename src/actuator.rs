//! Downlink-controlled digital output.
//!
//! The first byte of a downlink is the new output level. The byte is kept
//! as received (a non-zero value is not folded to 1) and the pin is driven
//! high whenever it is non-zero. Empty downlinks leave everything as it was.

use embedded_hal::digital::v2::{OutputPin, PinState};

use crate::log::{info, warn};
use crate::session::DownlinkMessage;

/// Drives one output pin from downlinks.
pub struct ControlActuator<P> {
    pin: P,
    level: u8,
}

impl<P: OutputPin> ControlActuator<P> {
    /// Takes the pin and drives it low.
    pub fn new(mut pin: P) -> Self {
        if pin.set_low().is_err() {
            warn!("actuator: failed to reset output");
        }
        Self { pin, level: 0 }
    }

    /// Last level applied, 0 until the first non-empty downlink.
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Whether the output is currently driven high.
    pub fn is_active(&self) -> bool {
        self.level != 0
    }

    /// Applies `downlink` to the output.
    ///
    /// Returns the new level, or `None` if the downlink was empty.
    pub fn apply(&mut self, downlink: &DownlinkMessage) -> Option<u8> {
        let level = *downlink.as_bytes().first()?;

        self.level = level;
        if self.pin.set_state(PinState::from(level != 0)).is_err() {
            warn!("actuator: failed to drive output");
        }

        info!("actuator: output level set to {=u8:#x}", level);

        Some(level)
    }

    /// Gives the pin back.
    pub fn release(self) -> P {
        self.pin
    }
}

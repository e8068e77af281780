//! Node configuration.
//!
//! Timing and port constants used by the cycle, plus the network settings
//! handed to the LoRaWAN stack at start-up. The constants are the deployed
//! defaults; [`NodeConfig`] exists so they can be shortened in tests.

use embassy_time::Duration;

/// Application port used for telemetry uplinks.
pub const UPLINK_PORT: u8 = 2;

/// Time between the end of one cycle and the start of the next.
pub const CYCLE_PERIOD: Duration = Duration::from_secs(5 * 60);

/// How long the node listens for a downlink after each uplink.
pub const DOWNLINK_WINDOW: Duration = Duration::from_secs(30);

/// Length of one stack service slice while waiting for the join accept.
pub const JOIN_POLL_SLICE: Duration = Duration::from_millis(1000);

/// Wait after the first unanswered join request. Doubles per retry.
pub const JOIN_BACKOFF_INITIAL: Duration = Duration::from_secs(15);

/// Longest wait between two join requests.
pub const JOIN_BACKOFF_MAX: Duration = Duration::from_secs(10 * 60);

/// Largest downlink payload the node will accept.
pub const MAX_DOWNLINK_LEN: usize = 242;

/// Per-cycle timing and addressing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeConfig {
    /// Port the telemetry frame is sent on
    pub uplink_port: u8,
    /// Sleep between cycles
    pub cycle_period: Duration,
    /// Downlink listen window after each uplink
    pub downlink_window: Duration,
    /// Service slice used while joining
    pub join_slice: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            uplink_port: UPLINK_PORT,
            cycle_period: CYCLE_PERIOD,
            downlink_window: DOWNLINK_WINDOW,
            join_slice: JOIN_POLL_SLICE,
        }
    }
}

/// LoRaWAN regional parameter set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Region {
    AS923,
    AU915,
    EU868,
    IN865,
    US915,
}

impl Region {
    /// Whether the region splits its uplink channels into sub-bands.
    pub fn uses_subbands(self) -> bool {
        matches!(self, Region::US915 | Region::AU915)
    }
}

/// OTAA join credentials.
///
/// EUIs are stored LSB first, the key MSB first, matching how network
/// servers usually display them for copy and paste.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Credentials {
    pub dev_eui: [u8; 8],
    pub app_eui: [u8; 8],
    pub app_key: [u8; 16],
}

/// Everything the stack needs to initialise and join.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NetworkSettings {
    pub region: Region,
    pub credentials: Credentials,
    /// Channel sub-band (1-8) for regions that use them; `None` lets the
    /// stack scan every channel.
    pub subband: Option<u8>,
}

impl NetworkSettings {
    /// Checks the settings before they reach the radio.
    ///
    /// A sub-band only makes sense for US915/AU915 and must be 1-8.
    pub fn validate(&self) -> Result<(), SettingsError> {
        match self.subband {
            None => Ok(()),
            Some(_) if !self.region.uses_subbands() => Err(SettingsError::SubbandNotSupported),
            Some(1..=8) => Ok(()),
            Some(_) => Err(SettingsError::SubbandOutOfRange),
        }
    }
}

/// Rejected network settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SettingsError {
    /// A sub-band was given for a region without sub-bands
    SubbandNotSupported,
    /// Sub-band outside 1-8
    SubbandOutOfRange,
}

impl core::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SettingsError::SubbandNotSupported => f.write_str("region has no channel sub-bands"),
            SettingsError::SubbandOutOfRange => f.write_str("sub-band must be between 1 and 8"),
        }
    }
}

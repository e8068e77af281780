//! Region and OTAA credentials of this node.
//!
//! Copy the values from the device page of the network server. EUIs are
//! LSB first, the AppKey MSB first.

use sensor_node::config::{Credentials, NetworkSettings, Region};

/// Regional parameters the node operates under.
const LORAWAN_REGION: Region = Region::US915;

/// Channel sub-band for US915/AU915 (TTN and Helium use 2).
const LORAWAN_SUBBAND: Option<u8> = Some(2);

const LORAWAN_DEVICE_EUI: [u8; 8] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
const LORAWAN_APP_EUI: [u8; 8] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
const LORAWAN_APP_KEY: [u8; 16] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

pub fn network_settings() -> NetworkSettings {
    NetworkSettings {
        region: LORAWAN_REGION,
        credentials: Credentials {
            dev_eui: LORAWAN_DEVICE_EUI,
            app_eui: LORAWAN_APP_EUI,
            app_key: LORAWAN_APP_KEY,
        },
        subband: LORAWAN_SUBBAND,
    }
}

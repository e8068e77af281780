//! Telemetry frame encoder.
//!
//! Readings are packed into channel-tagged records, the compact layout
//! popularised by Cayenne LPP:
//!
//! ```text
//! temperature: [channel][0x67][i16 BE, 0.1 °C per step]   4 bytes
//! humidity:    [channel][0x68][u8, 0.5 % per step]         3 bytes
//! ```
//!
//! Records are concatenated in the order the readings are given. There is
//! no frame header, length or checksum; the radio link frames and protects
//! the payload.
//!
//! Scaled values are truncated toward zero and saturate at the edges of
//! their field, so an out-of-range reading encodes as the field minimum or
//! maximum instead of wrapping. NaN encodes as zero.

use heapless::Vec;

use crate::log::debug;

/// Type code of a temperature record.
pub const TEMPERATURE_TYPE: u8 = 0x67;

/// Type code of a relative humidity record.
pub const HUMIDITY_TYPE: u8 = 0x68;

/// Largest frame the encoder will build, the smallest payload every region
/// accepts at its slowest data rate.
pub const MAX_FRAME_LEN: usize = 51;

/// Most readings a single cycle carries.
pub const MAX_READINGS: usize = 8;

/// What a reading measures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadingKind {
    /// Degrees Celsius
    Temperature,
    /// Relative humidity in percent
    Humidity,
}

impl ReadingKind {
    /// Type byte that follows the channel id in a record.
    pub fn type_code(self) -> u8 {
        match self {
            ReadingKind::Temperature => TEMPERATURE_TYPE,
            ReadingKind::Humidity => HUMIDITY_TYPE,
        }
    }

    /// Encoded size of one record of this kind, header included.
    pub fn record_len(self) -> usize {
        match self {
            ReadingKind::Temperature => 4,
            ReadingKind::Humidity => 3,
        }
    }
}

/// A single measurement tagged with the channel it is reported on.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reading {
    /// Application channel id, assigned by the caller
    pub channel: u8,
    pub kind: ReadingKind,
    pub value: f32,
}

impl Reading {
    /// Creates a temperature reading.
    ///
    /// # Arguments
    ///
    /// * `channel` - Channel id the record is tagged with
    /// * `celsius` - Temperature in degrees Celsius
    pub fn temperature(channel: u8, celsius: f32) -> Self {
        Self {
            channel,
            kind: ReadingKind::Temperature,
            value: celsius,
        }
    }

    /// Creates a relative humidity reading.
    ///
    /// # Arguments
    ///
    /// * `channel` - Channel id the record is tagged with
    /// * `percent` - Relative humidity, 0 to 100
    pub fn humidity(channel: u8, percent: f32) -> Self {
        Self {
            channel,
            kind: ReadingKind::Humidity,
            value: percent,
        }
    }
}

/// Readings collected during one cycle.
pub type Readings = Vec<Reading, MAX_READINGS>;

/// Encoded uplink payload.
///
/// Built once per cycle and moved into the session when sent.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TelemetryFrame {
    bytes: Vec<u8, MAX_FRAME_LEN>,
}

impl TelemetryFrame {
    /// Payload bytes as handed to the radio.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Why a set of readings could not be encoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    /// Two readings share a channel id
    DuplicateChannel(u8),
    /// The records do not fit in [`MAX_FRAME_LEN`] bytes
    FrameFull,
}

impl core::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EncodeError::DuplicateChannel(channel) => {
                write!(f, "channel {} used more than once", channel)
            }
            EncodeError::FrameFull => write!(f, "frame exceeds {} bytes", MAX_FRAME_LEN),
        }
    }
}

/// Scales a temperature to 0.1 °C steps, truncating toward zero.
pub fn temperature_field(celsius: f32) -> i16 {
    // `as` truncates, saturates at the i16 bounds and maps NaN to 0.
    (celsius * 10.0) as i16
}

/// Scales a relative humidity to 0.5 % steps, truncating toward zero.
pub fn humidity_field(percent: f32) -> u8 {
    (percent * 2.0) as u8
}

/// Encodes `readings` into a frame, one record per reading, in order.
pub fn encode(readings: &[Reading]) -> Result<TelemetryFrame, EncodeError> {
    let mut bytes: Vec<u8, MAX_FRAME_LEN> = Vec::new();

    for (index, reading) in readings.iter().enumerate() {
        if readings[..index].iter().any(|r| r.channel == reading.channel) {
            return Err(EncodeError::DuplicateChannel(reading.channel));
        }

        if bytes.len() + reading.kind.record_len() > MAX_FRAME_LEN {
            return Err(EncodeError::FrameFull);
        }

        let mut record: Vec<u8, 4> = Vec::new();
        // Capacity 4 always holds the largest record.
        let _ = record.extend_from_slice(&[reading.channel, reading.kind.type_code()]);
        match reading.kind {
            ReadingKind::Temperature => {
                let _ = record.extend_from_slice(&temperature_field(reading.value).to_be_bytes());
            }
            ReadingKind::Humidity => {
                let _ = record.push(humidity_field(reading.value));
            }
        }

        debug!("telemetry: record {=[u8]:02x}", &record[..]);

        // Room was checked against `record_len` above.
        let _ = bytes.extend_from_slice(&record);
    }

    Ok(TelemetryFrame { bytes })
}

//! The sense-encode-transmit-receive cycle.
//!
//! [`CycleController`] owns every component of the node and runs the same
//! sequence once per period:
//!
//! 1. read the die temperature (cannot fail)
//! 2. measure humidity and temperature on the external sensor (may fail)
//! 3. encode whatever was measured
//! 4. send the frame as an unconfirmed uplink
//! 5. listen for a downlink and apply it to the output
//! 6. sleep until the next period
//!
//! Failures in steps 2 to 5 are logged and the cycle moves on, so every
//! iteration reaches its sleep exactly once. Nothing in the loop ever
//! re-joins the network.

use embedded_hal::digital::v2::OutputPin;
use embedded_hal_async::delay::DelayNs;

use crate::actuator::ControlActuator;
use crate::climate::{ClimateMeasurement, ClimateSampler, ClimateSensor, SensorError};
use crate::config::{NetworkSettings, NodeConfig};
use crate::die_temp::{DieTemperatureAdc, DieTemperatureSampler};
use crate::log::{error, info, warn};
use crate::poll::PollPolicy;
use crate::session::{LorawanStack, NetworkSession, SessionError};
use crate::telemetry::{Reading, Readings, encode};

/// Channel of the on-die temperature record.
pub const DIE_TEMPERATURE_CHANNEL: u8 = 1;

/// Channel of the external sensor's temperature record.
pub const SENSOR_TEMPERATURE_CHANNEL: u8 = 2;

/// Channel of the external sensor's humidity record.
pub const HUMIDITY_CHANNEL: u8 = 3;

/// What happened to the cycle's uplink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UplinkOutcome {
    /// Handed to the stack successfully (delivery is not confirmed)
    Sent,
    /// The stack reported a failure
    Failed,
    /// The readings could not be encoded, nothing was sent
    NotEncoded,
}

/// Summary of one cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CycleReport {
    /// 1-based cycle counter
    pub cycle: u32,
    pub die_temperature: f32,
    pub climate: Result<ClimateMeasurement, SensorError>,
    /// Number of readings that went into the frame
    pub readings: usize,
    /// Encoded frame size in bytes, 0 when encoding failed
    pub frame_len: usize,
    pub uplink: UplinkOutcome,
    /// Port of the downlink received this cycle, if any
    pub downlink_port: Option<u8>,
    /// Output level applied this cycle, if any
    pub applied_level: Option<u8>,
}

/// Builds the cycle's reading set from the measurements that succeeded.
pub fn collect_readings(
    die_temperature: f32,
    climate: &Result<ClimateMeasurement, SensorError>,
) -> Readings {
    let mut readings = Readings::new();

    // Capacity covers the three fixed channels.
    let _ = readings.push(Reading::temperature(DIE_TEMPERATURE_CHANNEL, die_temperature));
    if let Ok(measurement) = climate {
        let _ = readings.push(Reading::temperature(
            SENSOR_TEMPERATURE_CHANNEL,
            measurement.temperature,
        ));
        let _ = readings.push(Reading::humidity(HUMIDITY_CHANNEL, measurement.humidity));
    }

    readings
}

/// Owns the node's components and runs the periodic cycle.
pub struct CycleController<A, H, S, P, D> {
    die: DieTemperatureSampler<A>,
    climate: ClimateSampler<H>,
    session: NetworkSession<S>,
    actuator: ControlActuator<P>,
    delay: D,
    config: NodeConfig,
    cycles: u32,
}

impl<A, H, S, P, D> CycleController<A, H, S, P, D>
where
    A: DieTemperatureAdc,
    H: ClimateSensor,
    S: LorawanStack,
    P: OutputPin,
    D: DelayNs,
{
    /// Creates the controller from its parts.
    ///
    /// # Arguments
    ///
    /// * `die` - Die temperature sampler
    /// * `climate` - Humidity/temperature sampler
    /// * `session` - Network session, not yet initialised
    /// * `actuator` - Output driven by downlinks
    /// * `delay` - Sleep used between cycles
    /// * `config` - Port and timing
    pub fn new(
        die: DieTemperatureSampler<A>,
        climate: ClimateSampler<H>,
        session: NetworkSession<S>,
        actuator: ControlActuator<P>,
        delay: D,
        config: NodeConfig,
    ) -> Self {
        Self {
            die,
            climate,
            session,
            actuator,
            delay,
            config,
            cycles: 0,
        }
    }

    pub fn session(&self) -> &NetworkSession<S> {
        &self.session
    }

    pub fn actuator(&self) -> &ControlActuator<P> {
        &self.actuator
    }

    /// Cycles run so far.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Initialises the stack and waits, without limit, for the join.
    ///
    /// An error here is fatal for the node: the session is halted and the
    /// caller is expected to park.
    pub async fn start(&mut self, settings: &NetworkSettings) -> Result<u32, SessionError<S::Error>> {
        self.session.initialize(settings).await?;
        self.session
            .join_and_wait(PollPolicy::unbounded(self.config.join_slice))
            .await
    }

    /// Runs one cycle from sampling to actuation, without the sleep.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycles = self.cycles.wrapping_add(1);
        let cycle = self.cycles;

        let die_temperature = self.die.read_die_temperature();
        info!("cycle {}: internal temperature {} C", cycle, die_temperature);

        let climate = self.climate.measure();
        if let Err(err) = &climate {
            warn!("cycle {}: skipping external sensor readings ({})", cycle, err);
        }

        let readings = collect_readings(die_temperature, &climate);

        let (frame_len, uplink) = match encode(&readings) {
            Ok(frame) => {
                let frame_len = frame.len();
                match self.session.send(frame, self.config.uplink_port).await {
                    Ok(()) => {
                        info!("cycle {}: uplink sent", cycle);
                        (frame_len, UplinkOutcome::Sent)
                    }
                    Err(SessionError::NotJoined) => {
                        warn!("cycle {}: uplink skipped, not joined", cycle);
                        (frame_len, UplinkOutcome::Failed)
                    }
                    Err(_) => {
                        warn!("cycle {}: uplink failed", cycle);
                        (frame_len, UplinkOutcome::Failed)
                    }
                }
            }
            Err(err) => {
                error!("cycle {}: cannot encode readings: {}", cycle, err);
                (0, UplinkOutcome::NotEncoded)
            }
        };

        let downlink = self.session.await_downlink(self.config.downlink_window).await;
        let applied_level = downlink
            .as_ref()
            .and_then(|message| self.actuator.apply(message));

        CycleReport {
            cycle,
            die_temperature,
            climate,
            readings: readings.len(),
            frame_len,
            uplink,
            downlink_port: downlink.map(|message| message.port),
            applied_level,
        }
    }

    /// Runs one cycle and then sleeps for the configured period.
    pub async fn step(&mut self) -> CycleReport {
        let report = self.run_cycle().await;

        let period_ms = u32::try_from(self.config.cycle_period.as_millis()).unwrap_or(u32::MAX);
        info!("cycle {}: sleeping {} ms", report.cycle, period_ms);
        self.delay.delay_ms(period_ms).await;

        report
    }

    /// Runs the cycle forever.
    pub async fn run(&mut self) -> ! {
        loop {
            self.step().await;
        }
    }
}

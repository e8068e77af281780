//! End-to-end runs of the node cycle against scripted hardware.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use embassy_futures::block_on;
use embassy_time::Duration;
use embedded_hal::digital::v2::OutputPin;
use embedded_hal_async::delay::DelayNs;

use sensor_node::actuator::ControlActuator;
use sensor_node::climate::{ClimateSampler, ClimateSensor, SensorError};
use sensor_node::config::{Credentials, NetworkSettings, NodeConfig, Region};
use sensor_node::cycle::{CycleController, UplinkOutcome};
use sensor_node::die_temp::{DieTemperatureAdc, DieTemperatureSampler};
use sensor_node::poll::Service;
use sensor_node::session::{LorawanStack, NetworkSession, SessionError, SessionState, StackEvent};

/// Every call the node makes into its hardware, in order.
#[derive(Clone, Debug, PartialEq)]
enum Call {
    Init,
    Join,
    IsJoined(bool),
    Service(u64),
    Adc,
    StartMeasurement,
    FinishMeasurement,
    Send(Vec<u8>, u8),
    WaitForEvent(u64),
    Receive,
    Pin(bool),
    Sleep(u32),
}

type Log = Rc<RefCell<Vec<Call>>>;

struct FakeStack {
    log: Log,
    fail_init: bool,
    fail_send: bool,
    join_requested: bool,
    slices_to_join: u32,
    slices: u32,
    downlinks: VecDeque<Option<(Vec<u8>, u8)>>,
    pending: Option<(Vec<u8>, u8)>,
}

impl FakeStack {
    fn new(log: &Log) -> Self {
        Self {
            log: log.clone(),
            fail_init: false,
            fail_send: false,
            join_requested: false,
            slices_to_join: 3,
            slices: 0,
            downlinks: VecDeque::new(),
            pending: None,
        }
    }
}

impl Service for FakeStack {
    type Error = &'static str;

    async fn service(&mut self, slice: Duration) -> Result<(), Self::Error> {
        self.log.borrow_mut().push(Call::Service(slice.as_millis()));
        if self.join_requested {
            self.slices += 1;
        }
        Ok(())
    }
}

impl LorawanStack for FakeStack {
    async fn init(&mut self, _settings: &NetworkSettings) -> Result<(), Self::Error> {
        self.log.borrow_mut().push(Call::Init);
        if self.fail_init { Err("no radio") } else { Ok(()) }
    }

    fn join(&mut self) {
        self.log.borrow_mut().push(Call::Join);
        self.join_requested = true;
    }

    fn is_joined(&self) -> bool {
        let joined = self.join_requested && self.slices >= self.slices_to_join;
        self.log.borrow_mut().push(Call::IsJoined(joined));
        joined
    }

    async fn send_unconfirmed(&mut self, payload: &[u8], port: u8) -> Result<(), Self::Error> {
        self.log.borrow_mut().push(Call::Send(payload.to_vec(), port));
        if self.fail_send { Err("channel busy") } else { Ok(()) }
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Option<(usize, u8)> {
        self.log.borrow_mut().push(Call::Receive);
        let (payload, port) = self.pending.take()?;
        buffer[..payload.len()].copy_from_slice(&payload);
        Some((payload.len(), port))
    }

    async fn wait_for_event(&mut self, timeout: Duration) -> Option<StackEvent> {
        self.log.borrow_mut().push(Call::WaitForEvent(timeout.as_millis()));
        self.pending = self.downlinks.pop_front().flatten();
        self.pending.as_ref().map(|_| StackEvent::Downlink)
    }
}

struct FakeAdc {
    log: Log,
    code: u16,
}

impl DieTemperatureAdc for FakeAdc {
    fn select_temperature_input(&mut self) {}

    fn read_raw(&mut self) -> u16 {
        self.log.borrow_mut().push(Call::Adc);
        self.code
    }
}

struct FakeDht {
    log: Log,
    results: VecDeque<Result<(f32, f32), SensorError>>,
}

impl ClimateSensor for FakeDht {
    fn start_measurement(&mut self) {
        self.log.borrow_mut().push(Call::StartMeasurement);
    }

    fn finish_measurement_blocking(&mut self) -> Result<(f32, f32), SensorError> {
        self.log.borrow_mut().push(Call::FinishMeasurement);
        self.results.pop_front().unwrap_or(Err(SensorError::Timeout))
    }
}

struct FakeLed {
    log: Log,
}

impl OutputPin for FakeLed {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Infallible> {
        self.log.borrow_mut().push(Call::Pin(false));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.log.borrow_mut().push(Call::Pin(true));
        Ok(())
    }
}

struct FakeDelay {
    log: Log,
}

impl DelayNs for FakeDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.log.borrow_mut().push(Call::Sleep(ns / 1_000_000));
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.log.borrow_mut().push(Call::Sleep(ms));
    }
}

type Node = CycleController<FakeAdc, FakeDht, FakeStack, FakeLed, FakeDelay>;

/// ADC code for the die temperature used in these tests: 876 counts,
/// 27.04 °C, encoded as 270 (0x010E).
const DIE_CODE: u16 = 876;
const DIE_RECORD: [u8; 4] = [0x01, 0x67, 0x01, 0x0E];

fn settings() -> NetworkSettings {
    NetworkSettings {
        region: Region::EU868,
        credentials: Credentials {
            dev_eui: [0x70, 0xB3, 0xD5, 0x7E, 0xD0, 0x00, 0x00, 0x01],
            app_eui: [0; 8],
            app_key: [0x2B; 16],
        },
        subband: None,
    }
}

fn node(log: &Log, stack: FakeStack, dht: Vec<Result<(f32, f32), SensorError>>) -> Node {
    CycleController::new(
        DieTemperatureSampler::new(FakeAdc {
            log: log.clone(),
            code: DIE_CODE,
        }),
        ClimateSampler::new(FakeDht {
            log: log.clone(),
            results: dht.into(),
        }),
        NetworkSession::new(stack),
        ControlActuator::new(FakeLed { log: log.clone() }),
        FakeDelay { log: log.clone() },
        NodeConfig::default(),
    )
}

fn take(log: &Log) -> Vec<Call> {
    std::mem::take(&mut *log.borrow_mut())
}

#[test]
fn join_then_two_identical_cycles() {
    let log: Log = Rc::default();
    let mut node = node(
        &log,
        FakeStack::new(&log),
        vec![Ok((55.0, 22.1)), Ok((55.0, 22.1))],
    );

    // Led reset when the actuator takes the pin.
    assert_eq!(take(&log), vec![Call::Pin(false)]);

    let slices = block_on(node.start(&settings())).unwrap();
    assert_eq!(slices, 3);
    assert_eq!(node.session().state(), SessionState::Joined);
    assert_eq!(
        take(&log),
        vec![
            Call::Init,
            Call::Join,
            Call::IsJoined(false),
            Call::Service(1000),
            Call::IsJoined(false),
            Call::Service(1000),
            Call::IsJoined(false),
            Call::Service(1000),
            Call::IsJoined(true),
        ]
    );

    let mut frame = DIE_RECORD.to_vec();
    frame.extend_from_slice(&[0x02, 0x67, 0x00, 0xDD, 0x03, 0x68, 0x6E]);
    let expected = vec![
        Call::Adc,
        Call::StartMeasurement,
        Call::FinishMeasurement,
        Call::Send(frame, 2),
        Call::WaitForEvent(30_000),
        Call::Sleep(300_000),
    ];

    for cycle in 1..=2 {
        let report = block_on(node.step());
        assert_eq!(report.cycle, cycle);
        assert_eq!(report.readings, 3);
        assert_eq!(report.frame_len, 11);
        assert_eq!(report.uplink, UplinkOutcome::Sent);
        assert_eq!(report.downlink_port, None);
        assert_eq!(take(&log), expected);
    }

    assert_eq!(node.cycles(), 2);
}

#[test]
fn sensor_timeout_sends_die_temperature_only() {
    let log: Log = Rc::default();
    let mut node = node(&log, FakeStack::new(&log), vec![Err(SensorError::Timeout)]);
    block_on(node.start(&settings())).unwrap();
    take(&log);

    let report = block_on(node.step());
    assert_eq!(report.climate, Err(SensorError::Timeout));
    assert_eq!(report.readings, 1);
    assert_eq!(report.uplink, UplinkOutcome::Sent);
    assert_eq!(
        take(&log),
        vec![
            Call::Adc,
            Call::StartMeasurement,
            Call::FinishMeasurement,
            Call::Send(DIE_RECORD.to_vec(), 2),
            Call::WaitForEvent(30_000),
            Call::Sleep(300_000),
        ]
    );
}

#[test]
fn bad_checksum_then_recovery() {
    let log: Log = Rc::default();
    let mut node = node(
        &log,
        FakeStack::new(&log),
        vec![Err(SensorError::BadChecksum), Ok((40.0, -5.0))],
    );
    block_on(node.start(&settings())).unwrap();

    let first = block_on(node.step());
    assert_eq!(first.frame_len, 4);

    take(&log);
    let second = block_on(node.step());
    assert_eq!(second.frame_len, 11);

    let mut frame = DIE_RECORD.to_vec();
    frame.extend_from_slice(&[0x02, 0x67, 0xFF, 0xCE, 0x03, 0x68, 0x50]);
    assert!(take(&log).contains(&Call::Send(frame, 2)));
}

#[test]
fn send_failure_still_waits_for_downlink() {
    let log: Log = Rc::default();
    let mut stack = FakeStack::new(&log);
    stack.fail_send = true;
    stack.downlinks.push_back(Some((vec![0x01], 1)));

    let mut node = node(&log, stack, vec![Ok((50.0, 20.0))]);
    block_on(node.start(&settings())).unwrap();
    take(&log);

    let report = block_on(node.step());
    assert_eq!(report.uplink, UplinkOutcome::Failed);
    assert_eq!(report.applied_level, Some(0x01));

    let calls = take(&log);
    let send = calls.iter().position(|c| matches!(c, Call::Send(..))).unwrap();
    let wait = calls.iter().position(|c| matches!(c, Call::WaitForEvent(_))).unwrap();
    assert!(send < wait);
    assert_eq!(calls.last(), Some(&Call::Sleep(300_000)));
}

#[test]
fn downlinks_drive_the_led() {
    let log: Log = Rc::default();
    let mut stack = FakeStack::new(&log);
    stack.downlinks.extend([
        Some((vec![0x01, 0x99], 10)),
        None,
        Some((vec![], 10)),
        Some((vec![0x00], 3)),
    ]);

    let mut node = node(&log, stack, vec![]);
    block_on(node.start(&settings())).unwrap();
    take(&log);

    let on = block_on(node.step());
    assert_eq!(on.downlink_port, Some(10));
    assert_eq!(on.applied_level, Some(0x01));
    assert!(node.actuator().is_active());
    assert!(take(&log).contains(&Call::Pin(true)));

    let quiet = block_on(node.step());
    assert_eq!(quiet.downlink_port, None);
    assert!(node.actuator().is_active());

    let empty = block_on(node.step());
    assert_eq!(empty.downlink_port, Some(10));
    assert_eq!(empty.applied_level, None);
    assert!(node.actuator().is_active());
    assert!(!take(&log).iter().any(|c| matches!(c, Call::Pin(_))));

    let off = block_on(node.step());
    assert_eq!(off.applied_level, Some(0x00));
    assert!(!node.actuator().is_active());
    assert!(take(&log).contains(&Call::Pin(false)));
}

#[test]
fn init_failure_is_fatal() {
    let log: Log = Rc::default();
    let mut stack = FakeStack::new(&log);
    stack.fail_init = true;

    let mut node = node(&log, stack, vec![]);
    take(&log);

    let result = block_on(node.start(&settings()));
    assert_eq!(result, Err(SessionError::Init("no radio")));
    assert_eq!(node.session().state(), SessionState::Halted);
    assert_eq!(take(&log), vec![Call::Init]);
}

#[test]
fn cycle_before_join_never_sends() {
    let log: Log = Rc::default();
    let mut node = node(&log, FakeStack::new(&log), vec![Ok((50.0, 20.0))]);
    take(&log);

    let report = block_on(node.step());
    assert_eq!(report.uplink, UplinkOutcome::Failed);

    let calls = take(&log);
    assert!(!calls.iter().any(|c| matches!(c, Call::Send(..) | Call::IsJoined(_))));
    assert_eq!(calls.last(), Some(&Call::Sleep(300_000)));
}

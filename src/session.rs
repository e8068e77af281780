//! LoRaWAN session handling.
//!
//! [`NetworkSession`] owns the join state of the node and drives the stack
//! through start-up, the join wait, unconfirmed uplinks and the downlink
//! listen window. The stack itself (MAC, crypto, radio) sits behind
//! [`LorawanStack`].
//!
//! # State machine
//!
//! ```text
//! Uninitialized --initialize ok--> Initializing --join_and_wait--> Joining --joined--> Joined
//!       |
//!       +--initialize err--> Halted
//! ```
//!
//! `Joined` is never left; the node does not re-join. `Halted` is terminal.

use embassy_time::Duration;
use heapless::Vec;

use crate::config::{MAX_DOWNLINK_LEN, NetworkSettings, SettingsError};
use crate::log::{error, info, warn};
use crate::poll::{PollOutcome, PollPolicy, Service, poll_until};
use crate::telemetry::TelemetryFrame;

/// Something the stack reported while the node was listening.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StackEvent {
    /// A downlink was received and can be fetched with `receive`
    Downlink,
}

/// Interface of the LoRaWAN stack.
///
/// Servicing the protocol ([`Service::service`]) and waiting for something
/// to happen ([`wait_for_event`](Self::wait_for_event)) are separate calls.
#[allow(async_fn_in_trait)]
pub trait LorawanStack: Service {
    /// Brings up the radio and loads region and credentials.
    async fn init(&mut self, settings: &NetworkSettings) -> Result<(), Self::Error>;

    /// Issues an OTAA join request. Progress happens in `service`.
    fn join(&mut self);

    fn is_joined(&self) -> bool;

    /// Queues and transmits an unconfirmed uplink.
    async fn send_unconfirmed(&mut self, payload: &[u8], port: u8) -> Result<(), Self::Error>;

    /// Copies a pending downlink into `buffer`, returning its length and port.
    fn receive(&mut self, buffer: &mut [u8]) -> Option<(usize, u8)>;

    /// Services the stack for up to `timeout`, returning early with the
    /// first event it reports.
    async fn wait_for_event(&mut self, timeout: Duration) -> Option<StackEvent>;
}

/// Join state of the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    Uninitialized,
    /// Stack initialised, no join request sent yet
    Initializing,
    /// Join request sent, waiting for the accept
    Joining,
    Joined,
    /// Stack initialisation failed; nothing else will be attempted
    Halted,
}

/// Session failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionError<E> {
    /// Operation not allowed in the current state
    InvalidState(SessionState),
    /// Settings rejected before reaching the stack
    Settings(SettingsError),
    /// Stack initialisation failed (fatal)
    Init(E),
    /// A bounded join wait ran out of slices
    JoinTimeout,
    /// Uplink attempted before the join completed
    NotJoined,
    /// The stack refused or failed the uplink
    Send(E),
}

impl<E: core::fmt::Debug> core::fmt::Display for SessionError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SessionError::InvalidState(state) => write!(f, "not allowed in state {:?}", state),
            SessionError::Settings(err) => write!(f, "invalid settings: {}", err),
            SessionError::Init(err) => write!(f, "stack init failed: {:?}", err),
            SessionError::JoinTimeout => f.write_str("join not accepted in time"),
            SessionError::NotJoined => f.write_str("not joined"),
            SessionError::Send(err) => write!(f, "uplink failed: {:?}", err),
        }
    }
}

/// A received downlink.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DownlinkMessage {
    pub port: u8,
    pub bytes: Vec<u8, MAX_DOWNLINK_LEN>,
}

impl DownlinkMessage {
    /// Builds a message, truncating payloads longer than
    /// [`MAX_DOWNLINK_LEN`].
    pub fn new(port: u8, payload: &[u8]) -> Self {
        let len = payload.len().min(MAX_DOWNLINK_LEN);
        let mut bytes = Vec::new();
        // Cannot fail, `len` is within capacity.
        let _ = bytes.extend_from_slice(&payload[..len]);
        Self { port, bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Owns the stack and its join state.
pub struct NetworkSession<S> {
    stack: S,
    state: SessionState,
    rx_buffer: [u8; MAX_DOWNLINK_LEN],
}

impl<S: LorawanStack> NetworkSession<S> {
    /// Wraps a stack that has not been initialised yet.
    pub fn new(stack: S) -> Self {
        Self {
            stack,
            state: SessionState::Uninitialized,
            rx_buffer: [0; MAX_DOWNLINK_LEN],
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_joined(&self) -> bool {
        self.state == SessionState::Joined
    }

    /// Borrow the stack, mainly for inspection in tests.
    pub fn stack(&self) -> &S {
        &self.stack
    }

    /// Initialises the stack.
    ///
    /// A failure is fatal: the session moves to [`SessionState::Halted`]
    /// and refuses everything afterwards.
    pub async fn initialize(
        &mut self,
        settings: &NetworkSettings,
    ) -> Result<(), SessionError<S::Error>> {
        if self.state != SessionState::Uninitialized {
            return Err(SessionError::InvalidState(self.state));
        }

        info!("session: initializing LoRaWAN ({})", settings.region);

        if let Err(err) = settings.validate() {
            error!("session: invalid settings: {}", err);
            self.state = SessionState::Halted;
            return Err(SessionError::Settings(err));
        }

        self.state = SessionState::Initializing;
        match self.stack.init(settings).await {
            Ok(()) => {
                info!("session: stack initialized");
                Ok(())
            }
            Err(err) => {
                error!("session: stack initialization failed");
                self.state = SessionState::Halted;
                Err(SessionError::Init(err))
            }
        }
    }

    /// Sends a join request and services the stack until it reports the
    /// node joined.
    ///
    /// With [`PollPolicy::unbounded`] this waits forever. Returns the number
    /// of service slices the join took.
    pub async fn join_and_wait(&mut self, policy: PollPolicy) -> Result<u32, SessionError<S::Error>> {
        match self.state {
            SessionState::Initializing | SessionState::Joining => {}
            SessionState::Joined => return Ok(0),
            state => return Err(SessionError::InvalidState(state)),
        }

        info!("session: joining LoRaWAN network...");
        self.stack.join();
        self.state = SessionState::Joining;

        match poll_until(&mut self.stack, policy, |stack| stack.is_joined()).await {
            PollOutcome::Ready { slices } => {
                self.state = SessionState::Joined;
                info!("session: joined successfully after {} slices", slices);
                Ok(slices)
            }
            PollOutcome::TimedOut { slices } => {
                warn!("session: no join accept after {} slices", slices);
                Err(SessionError::JoinTimeout)
            }
        }
    }

    /// Sends `frame` as an unconfirmed uplink on `port`.
    ///
    /// The frame is consumed whether or not the send succeeds; there is no
    /// retry.
    pub async fn send(
        &mut self,
        frame: TelemetryFrame,
        port: u8,
    ) -> Result<(), SessionError<S::Error>> {
        if self.state != SessionState::Joined {
            return Err(SessionError::NotJoined);
        }

        info!("session: sending {} bytes on port {}", frame.len(), port);

        self.stack
            .send_unconfirmed(frame.as_bytes(), port)
            .await
            .map_err(SessionError::Send)
    }

    /// Listens for up to `timeout` and returns the downlink received in
    /// that window, if any. No downlink is a normal outcome.
    pub async fn await_downlink(&mut self, timeout: Duration) -> Option<DownlinkMessage> {
        if self.state != SessionState::Joined {
            return None;
        }

        self.stack.wait_for_event(timeout).await?;

        let (len, port) = self.stack.receive(&mut self.rx_buffer)?;
        let message = DownlinkMessage::new(port, &self.rx_buffer[..len.min(MAX_DOWNLINK_LEN)]);

        info!(
            "session: received a {} byte message on port {}: {=[u8]:02x}",
            message.len(),
            message.port,
            message.as_bytes()
        );

        Some(message)
    }
}

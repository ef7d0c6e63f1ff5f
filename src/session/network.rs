//! SIM readiness, network registration and signal quality.

use log::{debug, info};

use crate::clock::Monotonic;
use crate::error::{ModemError, Result};
use crate::modem::{Modem, ResponseText};
use crate::transport::Transport;

use super::format_command;

/// Network registration state as reported by `AT+CREG?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    NotRegistered,
    RegisteredHome,
    Searching,
    Denied,
    Unknown,
    RegisteredRoaming,
}

impl RegistrationStatus {
    fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::NotRegistered,
            1 => Self::RegisteredHome,
            2 => Self::Searching,
            3 => Self::Denied,
            4 => Self::Unknown,
            5 => Self::RegisteredRoaming,
            _ => return None,
        })
    }

    /// Registered on the home network or roaming.
    pub fn is_registered(self) -> bool {
        matches!(self, Self::RegisteredHome | Self::RegisteredRoaming)
    }
}

/// Human-readable bucket for a signal strength reading.
pub fn describe_signal(dbm: i16) -> &'static str {
    match dbm {
        d if d > -73 => "excellent",
        d if d > -83 => "good",
        d if d > -93 => "fair",
        d if d >= -109 => "marginal",
        _ => "no signal",
    }
}

/// SIM and registration workflow over a borrowed engine.
pub struct NetworkSession<'a, T: Transport, C: Monotonic> {
    modem: &'a mut Modem<T, C>,
}

impl<'a, T: Transport, C: Monotonic> NetworkSession<'a, T, C> {
    pub fn new(modem: &'a mut Modem<T, C>) -> Self {
        Self { modem }
    }

    /// SIM check, optional PIN entry, then wait for registration.
    pub fn bring_up(&mut self, pin: Option<&str>, timeout_ms: u32) -> Result<RegistrationStatus> {
        self.ensure_sim_ready(pin)?;
        let status = self.wait_for_network(timeout_ms)?;
        info!("network registration complete: {status:?}");
        Ok(status)
    }

    /// Verify the SIM is usable, entering `pin` if the card asks for one.
    /// Also switches the SMS path to text mode so later message traffic
    /// stays line-oriented.
    pub fn ensure_sim_ready(&mut self, pin: Option<&str>) -> Result<()> {
        let mut text = ResponseText::new();
        self.query_into("AT+CPIN?", &mut text)?;

        if text.contains("SIM PIN") {
            let pin = pin.ok_or(ModemError::SimLocked)?;
            debug!("SIM locked, presenting PIN");
            let cmd = format_command(format_args!("AT+CPIN=\"{pin}\""))?;
            self.simple(&cmd)?;
        } else if !text.contains("READY") {
            return Err(ModemError::SimUnavailable);
        }

        self.simple("AT+CMGF=1")
    }

    /// One registration probe via `AT+CREG?`.
    pub fn registration_status(&mut self) -> Result<RegistrationStatus> {
        let mut text = ResponseText::new();
        self.query_into("AT+CREG?", &mut text)?;
        parse_registration(&text).ok_or(ModemError::UnexpectedResponse)
    }

    /// Poll registration until the modem reports home or roaming
    /// registration. `Denied` is terminal and fails immediately.
    pub fn wait_for_network(&mut self, timeout_ms: u32) -> Result<RegistrationStatus> {
        let deadline = self.modem.now_ms() + u64::from(timeout_ms);
        loop {
            let status = self.registration_status()?;
            if status.is_registered() {
                return Ok(status);
            }
            if status == RegistrationStatus::Denied {
                return Err(ModemError::NotRegistered);
            }
            if self.modem.now_ms() >= deadline {
                return Err(ModemError::Timeout);
            }
            let pause = self.modem.config().registration_poll_ms;
            self.modem.sleep_ms(pause);
        }
    }

    /// Received signal strength in dBm, or `None` while the modem has
    /// no measurement (`rssi` 99).
    pub fn signal_quality_dbm(&mut self) -> Result<Option<i16>> {
        let mut text = ResponseText::new();
        self.query_into("AT+CSQ", &mut text)?;
        parse_signal(&text).ok_or(ModemError::UnexpectedResponse)
    }

    fn simple(&mut self, command: &str) -> Result<()> {
        let timeout = self.modem.config().command_timeout_ms;
        self.modem.send(command)?;
        self.modem.wait_for_response(timeout).into_result()
    }

    fn query_into(&mut self, command: &str, out: &mut ResponseText) -> Result<()> {
        let timeout = self.modem.config().command_timeout_ms;
        self.modem.send(command)?;
        self.modem
            .wait_for_response_into(timeout, out)
            .into_result()
    }
}

fn parse_registration(text: &str) -> Option<RegistrationStatus> {
    let rest = text.split_once("+CREG:")?.1;
    let stat = rest.split(',').nth(1)?.trim();
    RegistrationStatus::from_code(stat.parse().ok()?)
}

fn parse_signal(text: &str) -> Option<Option<i16>> {
    let rest = text.split_once("+CSQ:")?.1;
    let rssi: u8 = rest.split(',').next()?.trim().parse().ok()?;
    match rssi {
        99 => Some(None),
        0..=31 => Some(Some(i16::from(rssi) * 2 - 113)),
        _ => None,
    }
}

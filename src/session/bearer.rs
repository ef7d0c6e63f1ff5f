//! Packet-data bearer lifecycle.

use log::info;

use crate::clock::Monotonic;
use crate::error::{ModemError, Result};
use crate::modem::{Modem, ResponseText};
use crate::transport::Transport;

use super::format_command;

/// Packet-data attach/detach workflow over a borrowed engine.
pub struct BearerSession<'a, T: Transport, C: Monotonic> {
    modem: &'a mut Modem<T, C>,
}

impl<'a, T: Transport, C: Monotonic> BearerSession<'a, T, C> {
    pub fn new(modem: &'a mut Modem<T, C>) -> Self {
        Self { modem }
    }

    /// Attach to the packet service and activate the default context.
    ///
    /// Runs the four-step sequence in order, stopping at the first
    /// command the modem rejects: service attach, context definition,
    /// task start with credentials, context activation. `user` and
    /// `password` may be empty for networks that do not authenticate.
    pub fn attach(&mut self, apn: &str, user: &str, password: &str) -> Result<()> {
        self.simple("AT+CGATT=1")?;

        let define = format_command(format_args!("AT+CGDCONT=1,\"IP\",\"{apn}\""))?;
        self.simple(&define)?;

        let start = format_command(format_args!("AT+CSTT=\"{apn}\",\"{user}\",\"{password}\""))?;
        self.simple(&start)?;

        self.simple("AT+CGACT=1,1")?;
        info!("bearer attached, APN \"{apn}\"");
        Ok(())
    }

    /// Deactivate the context and detach from the packet service.
    pub fn detach(&mut self) -> Result<()> {
        self.simple("AT+CGACT=0,1")?;
        self.simple("AT+CGATT=0")
    }

    /// Local address assigned to the active context.
    pub fn ip_address(&mut self) -> Result<[u8; 4]> {
        let mut text = ResponseText::new();
        let timeout = self.modem.config().command_timeout_ms;
        self.modem.send("AT+CGPADDR=1")?;
        self.modem
            .wait_for_response_into(timeout, &mut text)
            .into_result()?;
        parse_address_report(&text).ok_or(ModemError::UnexpectedResponse)
    }

    fn simple(&mut self, command: &str) -> Result<()> {
        let timeout = self.modem.config().command_timeout_ms;
        self.modem.send(command)?;
        self.modem.wait_for_response(timeout).into_result()
    }
}

/// Extract the quoted address from `+CGPADDR: 1,"<ip>"`.
fn parse_address_report(text: &str) -> Option<[u8; 4]> {
    let rest = text.split_once("+CGPADDR:")?.1;
    let quoted = rest.split_once('"')?.1;
    let (ip, _) = quoted.split_once('"')?;
    parse_ipv4(ip)
}

fn parse_ipv4(text: &str) -> Option<[u8; 4]> {
    let mut octets = [0u8; 4];
    let mut parts = text.trim().split('.');
    for slot in &mut octets {
        *slot = parts.next()?.trim().parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(octets)
}

//! Commands that can be sent to the module.
//!
//! The module accepts `AT` commands terminated with CRLF:
//! - Basic probe and mode commands
//! - Network join and configuration queries
//! - Server and per-connection commands

use crate::codec::StreamCursor;
use crate::error::{AtError, AtResult};
use crate::frame::ConnectionId;

/// WiFi operating mode (`AT+CWMODE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiMode {
    /// Station (client) mode.
    Station,
    /// Soft access point mode.
    AccessPoint,
    /// Station and access point at once.
    Both,
}

impl WifiMode {
    /// Get the numeric code used in commands.
    pub fn code(&self) -> u8 {
        match self {
            WifiMode::Station => 1,
            WifiMode::AccessPoint => 2,
            WifiMode::Both => 3,
        }
    }

    /// Parse a mode from its numeric code.
    pub fn from_code(code: u8) -> Option<WifiMode> {
        match code {
            1 => Some(WifiMode::Station),
            2 => Some(WifiMode::AccessPoint),
            3 => Some(WifiMode::Both),
            _ => None,
        }
    }
}

/// Commands understood by the module's AT firmware.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Probe the module (`AT`).
    Probe,

    /// Set the WiFi mode.
    SetMode {
        /// Mode to select.
        mode: WifiMode,
    },

    /// Join an access point.
    JoinNetwork {
        /// Network name.
        ssid: String,
        /// Passphrase.
        password: String,
    },

    /// Enable or disable multiple connections.
    SetMultiplex {
        /// Whether several connection slots are used.
        enabled: bool,
    },

    /// Start a TCP server.
    StartServer {
        /// Listening port.
        port: u16,
    },

    /// Announce a payload on a connection. The module answers with a `>`
    /// prompt and then expects exactly `len` raw bytes.
    Send {
        /// Connection slot.
        id: ConnectionId,
        /// Payload length.
        len: usize,
    },

    /// Close a connection.
    Close {
        /// Connection slot.
        id: ConnectionId,
    },

    /// Query the station hardware address.
    QueryStationMac,

    /// Query the access point hardware address.
    QueryApMac,

    /// Query the local addresses.
    QueryLocalAddress,

    /// Send a raw command string.
    Raw {
        /// The raw command text.
        command: String,
    },
}

impl Command {
    /// Encode the command as a line to send to the module.
    ///
    /// Returns the bytes to send (including the CRLF terminator), or an
    /// error if the text contains a line break.
    pub fn encode(&self) -> AtResult<Vec<u8>> {
        let text = self.to_command_string();
        validate_command_text(&text)?;
        Ok(StreamCursor::encode_command(&text))
    }

    /// Get the command string without the terminator.
    pub fn to_command_string(&self) -> String {
        match self {
            Command::Probe => "AT".to_string(),
            Command::SetMode { mode } => format!("AT+CWMODE={}", mode.code()),
            Command::JoinNetwork { ssid, password } => {
                format!("AT+CWJAP=\"{}\",\"{}\"", ssid, password)
            }
            Command::SetMultiplex { enabled } => format!("AT+CIPMUX={}", u8::from(*enabled)),
            Command::StartServer { port } => format!("AT+CIPSERVER=1,{}", port),
            Command::Send { id, len } => format!("AT+CIPSEND={},{}", id, len),
            Command::Close { id } => format!("AT+CIPCLOSE={}", id),
            Command::QueryStationMac => "AT+CIPSTAMAC?".to_string(),
            Command::QueryApMac => "AT+CIPAPMAC?".to_string(),
            Command::QueryLocalAddress => "AT+CIFSR".to_string(),
            Command::Raw { command } => command.clone(),
        }
    }

    /// Get the response key carrying this command's query result, with the
    /// separator between key and value.
    pub fn result_key(&self) -> Option<(&'static str, char)> {
        match self {
            Command::QueryStationMac => Some(("+CIPSTAMAC", ':')),
            Command::QueryApMac => Some(("+CIPAPMAC", ':')),
            Command::QueryLocalAddress => Some(("+CIFSR:STAIP", ',')),
            _ => None,
        }
    }

    /// Check whether the command carries credentials that must not be logged.
    pub fn is_sensitive(&self) -> bool {
        matches!(self, Command::JoinNetwork { .. })
    }
}

/// Reject command text that would break line framing.
pub fn validate_command_text(text: &str) -> AtResult<()> {
    if text.contains(['\r', '\n']) {
        return Err(AtError::InvalidCommand(format!(
            "command contains a line break: {:?}",
            text
        )));
    }
    Ok(())
}

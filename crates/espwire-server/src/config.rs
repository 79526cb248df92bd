//! Server configuration.
//!
//! Settings come from an optional YAML file and are then overridden by
//! command-line flags. Everything not given keeps its default.
//!
//! ```yaml
//! serial_port: /dev/ttyUSB0
//! baud_rate: 115200
//! ssid: workshop
//! password: "..."
//! listen_port: 80
//! engine:
//!   join_poll_attempts: 300
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use clap::Parser;
use espwire_protocol::EngineConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Baud rate the module ships with.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Port the module listens on unless told otherwise.
pub const DEFAULT_LISTEN_PORT: u16 = 80;

/// Command-line arguments.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "espwire", version, about = "Serve the local time through an ESP8266 module")]
pub struct Args {
    /// YAML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Serial device the module is attached to.
    #[arg(short, long)]
    pub port: Option<String>,

    /// Serial baud rate.
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Reach the module through a TCP serial bridge (host:port) instead.
    #[arg(long)]
    pub tcp: Option<String>,

    /// WiFi network name.
    #[arg(long)]
    pub ssid: Option<String>,

    /// WiFi passphrase.
    #[arg(long)]
    pub password: Option<String>,

    /// Port the module serves on.
    #[arg(short, long)]
    pub listen_port: Option<u16>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// How the host reaches the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// A local serial device.
    Serial { path: String, baud_rate: u32 },
    /// A TCP bridge forwarding the module's UART.
    Tcp { address: String },
}

/// Complete server settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Serial device path.
    pub serial_port: Option<String>,
    /// Serial baud rate.
    pub baud_rate: u32,
    /// TCP bridge address; used instead of the serial device when set.
    pub tcp_bridge: Option<String>,
    /// WiFi network name.
    pub ssid: Option<String>,
    /// WiFi passphrase.
    pub password: Option<String>,
    /// Port the module serves on.
    pub listen_port: u16,
    /// Protocol engine limits and timeouts.
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            serial_port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            tcp_bridge: None,
            ssid: None,
            password: None,
            listen_port: DEFAULT_LISTEN_PORT,
            engine: EngineConfig::default(),
        }
    }
}

// Hand-written so the passphrase never reaches a log line.
impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("serial_port", &self.serial_port)
            .field("baud_rate", &self.baud_rate)
            .field("tcp_bridge", &self.tcp_bridge)
            .field("ssid", &self.ssid)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("listen_port", &self.listen_port)
            .field("engine", &self.engine)
            .finish()
    }
}

impl ServerConfig {
    /// Parse settings from YAML text.
    pub fn from_yaml_str(text: &str, origin: &Path) -> ServerResult<Self> {
        serde_yaml::from_str(text).map_err(|source| ServerError::ConfigParse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load settings from a YAML file.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ServerError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text, path)
    }

    /// Build settings from arguments, reading the config file they name.
    pub fn from_args(args: &Args) -> ServerResult<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply(args);
        Ok(config)
    }

    /// Override settings with every flag given on the command line.
    pub fn apply(&mut self, args: &Args) {
        if let Some(port) = &args.port {
            self.serial_port = Some(port.clone());
        }
        if let Some(baud) = args.baud {
            self.baud_rate = baud;
        }
        if let Some(tcp) = &args.tcp {
            self.tcp_bridge = Some(tcp.clone());
        }
        if let Some(ssid) = &args.ssid {
            self.ssid = Some(ssid.clone());
        }
        if let Some(password) = &args.password {
            self.password = Some(password.clone());
        }
        if let Some(listen_port) = args.listen_port {
            self.listen_port = listen_port;
        }
    }

    /// Get the link to open. A TCP bridge wins over a serial device.
    pub fn link_target(&self) -> ServerResult<LinkTarget> {
        if let Some(address) = &self.tcp_bridge {
            return Ok(LinkTarget::Tcp {
                address: address.clone(),
            });
        }
        match &self.serial_port {
            Some(path) => Ok(LinkTarget::Serial {
                path: path.clone(),
                baud_rate: self.baud_rate,
            }),
            None => Err(ServerError::MissingSetting("serial_port or tcp_bridge")),
        }
    }

    /// Get the network name and passphrase. An absent passphrase joins an
    /// open network.
    pub fn credentials(&self) -> ServerResult<(&str, &str)> {
        let ssid = self
            .ssid
            .as_deref()
            .ok_or(ServerError::MissingSetting("ssid"))?;
        Ok((ssid, self.password.as_deref().unwrap_or("")))
    }
}

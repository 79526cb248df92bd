//! ESP8266 AT Protocol Engine
//!
//! This crate drives a serial-attached ESP8266 WiFi module through its
//! textual AT command set and turns the module's unstructured output into
//! discrete events: command acknowledgements, connection notifications and
//! length-prefixed payload frames.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → module): `AT...` text terminated with `\r\n`
//! - **Responses** (module → host): `\r\n`-terminated lines ending in `OK`
//!   (or `SEND OK` after a transmission)
//! - **Notifications**: `<id>,CONNECT`, `<id>,CLOSED`, `<id>,CONNECT FAIL`
//! - **Frames**: `+IPD,<id>,<len>:` followed by exactly `len` raw bytes, with
//!   no line terminator after the header
//!
//! All of this shares one serial line. A single [`StreamReader`] owns the
//! transport and the byte buffer; the line collectors and the frame
//! extractor are handlers over its consumption loop.
//!
//! # Example
//!
//! ```rust,ignore
//! use espwire_protocol::{Command, Module, WifiMode};
//!
//! let mut module = Module::new(transport);
//! module.execute(&Command::Probe)?;
//! module.execute(&Command::SetMode { mode: WifiMode::Station })?;
//! module.join("ssid", "passphrase")?;
//! module.execute(&Command::SetMultiplex { enabled: true })?;
//! module.execute(&Command::StartServer { port: 80 })?;
//!
//! let frame = module.accept()?;
//! module.send(frame.id, b"HTTP/1.0 200 OK\r\n\r\n")?;
//! module.close(frame.id)?;
//! ```

mod codec;
mod commands;
mod error;
mod frame;
pub mod mock;
mod receiver;
mod request;
mod responses;
mod session;
mod transport;

pub use codec::*;
pub use commands::*;
pub use error::*;
pub use frame::*;
pub use receiver::*;
pub use request::*;
pub use responses::*;
pub use session::*;
pub use transport::*;

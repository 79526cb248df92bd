//! ESP8266 clock server
//!
//! Brings a serial-attached ESP8266 onto a WiFi network and answers every
//! `GET` it receives with the host's local time as plain text.
//!
//! The protocol work lives in [`espwire_protocol`]; this crate adds the
//! links to the hardware, configuration and the serving loop.

pub mod config;
pub mod content;
pub mod error;
pub mod link;
pub mod serve;

pub use config::{Args, LinkTarget, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use serve::{Outcome, Server};

//! The serving loop.
//!
//! Bring-up runs once: probe, station mode, join, address report,
//! multiplexing and server start. After that each connection gets at most
//! one response and is closed, whatever happened.

use std::net::Ipv4Addr;

use espwire_protocol::{
    parse_head, AtError, Clock, Command, ConnectionId, Module, Transport, WifiMode,
};
use tracing::{debug, info, warn};

use crate::content;
use crate::error::{ServerError, ServerResult};

/// What happened to one accepted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A `GET` was answered.
    Served { id: ConnectionId, path: String },
    /// The request was not a `GET` with a path; the connection was closed
    /// without a response.
    Ignored { id: ConnectionId },
}

impl Outcome {
    /// Get the connection the outcome belongs to.
    pub fn id(&self) -> ConnectionId {
        match self {
            Outcome::Served { id, .. } | Outcome::Ignored { id } => *id,
        }
    }
}

/// Serves the clock page through a module.
pub struct Server<T, C> {
    module: Module<T, C>,
}

impl<T: Transport, C: Clock> Server<T, C> {
    /// Wrap a module.
    pub fn new(module: Module<T, C>) -> Self {
        Server { module }
    }

    /// Get the module.
    pub fn module(&self) -> &Module<T, C> {
        &self.module
    }

    /// Consume the server, returning the module.
    pub fn into_module(self) -> Module<T, C> {
        self.module
    }

    /// Bring the module up and start listening on `port`.
    ///
    /// Returns the station address when the module reported one.
    pub fn start(&mut self, ssid: &str, password: &str, port: u16) -> ServerResult<Option<Ipv4Addr>> {
        self.module.execute(&Command::Probe)?;
        info!("module answered probe");

        if let Err(e) = self.module.execute(&Command::SetMode {
            mode: WifiMode::Station,
        }) {
            warn!(error = %e, "station mode not acknowledged, continuing");
        }

        self.module.join(ssid, password)?;
        info!(ssid, "joined network");

        let address = match self.module.local_address() {
            Ok(address) => {
                info!(%address, "station address");
                Some(address)
            }
            Err(e) => {
                warn!(error = %e, "station address unavailable");
                None
            }
        };

        self.module.execute(&Command::SetMultiplex { enabled: true })?;
        self.module.execute(&Command::StartServer { port })?;
        info!(port, "listening");
        Ok(address)
    }

    /// Accept one connection, answer it and close it.
    pub fn serve_one(&mut self) -> ServerResult<Outcome> {
        let frame = match self.module.accept() {
            Ok(frame) => frame,
            Err(AtError::IncompleteFrame { id, expected, payload }) => {
                warn!(%id, expected, received = payload.len(), "truncated request, closing");
                self.close_quietly(id);
                return Err(AtError::IncompleteFrame { id, expected, payload }.into());
            }
            Err(e) => return Err(e.into()),
        };
        let id = frame.id;
        let head = parse_head(&frame.payload);
        debug!(%id, lines = head.lines.len(), "request head");

        let request = head
            .request_line()
            .filter(|line| line.is_get() && !line.path.is_empty());

        let result = match &request {
            Some(line) => self
                .module
                .send(id, &content::respond(&line.path))
                .map(|()| Outcome::Served {
                    id,
                    path: line.path.clone(),
                }),
            None => {
                debug!(%id, "not a GET request, closing");
                Ok(Outcome::Ignored { id })
            }
        };

        self.close_quietly(id);
        result.map_err(Into::into)
    }

    fn close_quietly(&mut self, id: ConnectionId) {
        if let Err(e) = self.module.close(id) {
            warn!(%id, error = %e, "close not acknowledged");
        }
    }

    /// Serve connections until the link itself fails.
    ///
    /// Failures tied to one connection are logged and the loop moves on.
    pub fn run(&mut self) -> ServerResult<()> {
        loop {
            match self.serve_one() {
                Ok(Outcome::Served { id, path }) => info!(%id, path = %path, "served"),
                Ok(Outcome::Ignored { id }) => debug!(%id, "ignored"),
                Err(ServerError::Protocol(AtError::Transport(e))) => {
                    return Err(AtError::Transport(e).into());
                }
                Err(e) => warn!(error = %e, "connection failed"),
            }
        }
    }
}

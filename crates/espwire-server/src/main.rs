//! `espwire` binary.

use std::process::ExitCode;

use clap::Parser;
use espwire_protocol::Module;
use espwire_server::{link, Args, Server, ServerConfig, ServerResult};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "exiting");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(args: &Args) -> ServerResult<()> {
    let config = ServerConfig::from_args(args)?;
    let target = config.link_target()?;
    let (ssid, password) = config.credentials()?;
    info!(?target, listen_port = config.listen_port, "starting espwire");

    let transport = link::open(&target)?;
    let mut server = Server::new(Module::with_config(transport, config.engine.clone()));
    server.start(ssid, password, config.listen_port)?;
    server.run()
}

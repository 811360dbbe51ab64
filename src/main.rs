use clap::Parser;
use std::process::ExitCode;

use zipdrop::args::Args;
use zipdrop::config::ServerConfig;
use zipdrop::logging::setup_logging;
use zipdrop::server::Server;

/// Blocks SIGINT and SIGTERM in the calling thread (and every thread it
/// spawns later) and returns the set, so one thread can wait for them.
#[cfg(unix)]
fn block_shutdown_signals() -> nix::Result<nix::sys::signal::SigSet> {
    use nix::sys::signal::{SigSet, Signal};

    let mut signals = SigSet::empty();
    signals.add(Signal::SIGINT);
    signals.add(Signal::SIGTERM);
    signals.thread_block()?;
    Ok(signals)
}

#[cfg(unix)]
fn shutdown_on_signal(signals: nix::sys::signal::SigSet, handle: zipdrop::server::ShutdownHandle) {
    std::thread::spawn(move || match signals.wait() {
        Ok(signal) => {
            log::info!("Received {:?}", signal);
            handle.shutdown();
        }
        Err(e) => {
            log::error!("Waiting for shutdown signals failed: {}", e);
            // Fall back to the default action in this thread.
            let _ = signals.thread_unblock();
        }
    });
}

fn main() -> ExitCode {
    let args = Args::parse();
    setup_logging(!args.no_logging);

    // Must happen before any thread exists so they all inherit the mask.
    #[cfg(unix)]
    let signals = match block_shutdown_signals() {
        Ok(signals) => Some(signals),
        Err(e) => {
            log::warn!("Cannot handle shutdown signals: {}", e);
            None
        }
    };

    let config = match ServerConfig::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            eprintln!("zipdrop: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let server = match Server::bind(&args.listen_addr, config) {
        Ok(server) => server,
        Err(e) => {
            log::error!("Failed to bind {}: {}", args.listen_addr, e);
            eprintln!("zipdrop: cannot listen on {}: {}", args.listen_addr, e);
            return ExitCode::FAILURE;
        }
    };

    #[cfg(unix)]
    if let Some(signals) = signals {
        match server.shutdown_handle() {
            Ok(handle) => shutdown_on_signal(signals, handle),
            Err(e) => log::warn!("Cannot handle shutdown signals: {}", e),
        }
    }

    match server.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Server stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}

//! csrgen daemon: runs the startup sweep and the queue worker until Ctrl-C.
//!
//! Usage: `csrgen [config.json]`. Without a file the configuration comes from
//! `CSR_JOBS`, `CSR_DB` and `CSR_OPENSSL`. `CSRGEN_LOG_FORMAT=json` switches
//! to JSON log lines.

use std::process::ExitCode;
use std::sync::mpsc;

use log::{error, info, warn};

use csrgen::logging::{self, LogFormat};
use csrgen::{App, AppConfig, CsrgenError};

fn run() -> Result<(), CsrgenError> {
    let format = std::env::var("CSRGEN_LOG_FORMAT")
        .map(|name| LogFormat::from_name(&name))
        .unwrap_or_default();
    logging::init(format)?;

    info!("Starting csrgen v{}", env!("CARGO_PKG_VERSION"));

    let config = match std::env::args_os().nth(1) {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::from_env()?,
    };

    let app = App::with_openssl(&config)?;
    let report = app.sweep_report();
    for folder in &report.orphan_folders {
        warn!("Orphan job folder needs attention: {}", folder.display());
    }

    let (stop_tx, stop_rx) = mpsc::channel();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    }) {
        error!("Failed to install Ctrl-C handler: {}", e);
    }

    // Blocks until the handler fires; a failed install leaves the sender
    // dropped, which ends the wait immediately.
    let _ = stop_rx.recv();
    info!("Shutdown requested");

    app.shutdown()
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Logging may not be up yet.
            eprintln!("csrgen: {}", e);
            ExitCode::FAILURE
        }
    }
}

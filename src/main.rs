use clap::Parser;
use co2_listener::app::{self, Monitor, Options};
use co2_listener::{logging, scanner};
use std::panic::{self, PanicHookInfo};

/// Exit codes for the application
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_PANIC: i32 = 2;
const EXIT_NO_DEVICE: i32 = 3;

/// Resolves on Ctrl+C. If the handler cannot be installed the session runs
/// until the source stops.
async fn ctrl_c() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("received Ctrl+C, shutting down");
}

async fn run(options: Options) -> i32 {
    let source = match scanner::source_for(options.backend, &options.source_config()) {
        Ok(source) => source,
        Err(error) => {
            tracing::error!(%error, "cannot start advertisement source");
            return EXIT_ERROR;
        }
    };

    let sinks = match app::build_sinks(&options) {
        Ok(sinks) => sinks,
        Err(error) => {
            tracing::error!(%error, "invalid sink configuration");
            return EXIT_ERROR;
        }
    };

    let mut monitor = Monitor::new(options.monitor_config());
    match monitor.run(source.as_ref(), &sinks, ctrl_c()).await {
        Ok(_) => EXIT_SUCCESS,
        Err(error) if error.is_no_device() => {
            tracing::error!(%error, "no CO2 meter found");
            EXIT_NO_DEVICE
        }
        Err(error) => {
            tracing::error!(%error, "monitoring failed");
            EXIT_ERROR
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Process managers (e.g. systemd) only see the exit status
    panic::set_hook(Box::new(move |info: &PanicHookInfo| {
        eprintln!("Panic! {}", info);
        std::process::exit(EXIT_PANIC);
    }));

    let options = Options::parse();

    if let Err(error) = logging::init(options.verbose) {
        eprintln!("error: {}", error);
        std::process::exit(EXIT_ERROR);
    }

    std::process::exit(run(options).await);
}

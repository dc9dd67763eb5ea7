//! Relay peer that owns the queue and prints every message it receives.

#[cfg(target_os = "linux")]
fn main() -> std::process::ExitCode {
    use std::process::ExitCode;

    use clap::Parser;
    use ns_launcher::cli::PeerCli;
    use ns_launcher::config::RELAY_BOUNDS;
    use ns_launcher::peer::{run_receiver, ShutdownFlag};
    use ns_launcher::utils::init_debug_logging;

    let cli = PeerCli::parse();
    init_debug_logging(cli.verbose);

    let shutdown = match ShutdownFlag::install() {
        Ok(flag) => flag,
        Err(e) => {
            eprintln!("Error installing signal handlers: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut stdout = std::io::stdout();
    match run_receiver(&cli.queue, RELAY_BOUNDS, &shutdown, &mut stdout) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn main() -> std::process::ExitCode {
    eprintln!("mq-receiver requires Linux POSIX message queues");
    std::process::ExitCode::FAILURE
}

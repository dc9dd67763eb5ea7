//! Relay peer that sends terminal lines to an existing queue.

#[cfg(target_os = "linux")]
fn main() -> std::process::ExitCode {
    use std::process::ExitCode;

    use clap::Parser;
    use ns_launcher::cli::PeerCli;
    use ns_launcher::config::RELAY_BOUNDS;
    use ns_launcher::peer::{run_sender, ShutdownFlag, StdinLines};
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

    let mut input = StdinLines::new();
    let mut stdout = std::io::stdout();
    match run_sender(&cli.queue, RELAY_BOUNDS, &mut input, &shutdown, &mut stdout) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn main() -> std::process::ExitCode {
    eprintln!("mq-sender requires Linux POSIX message queues");
    std::process::ExitCode::FAILURE
}

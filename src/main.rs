//! CLI entry point for the namespace launcher (nslaunch).

use std::process::ExitCode;

use ns_launcher::cli::Cli;
use ns_launcher::utils::init_debug_logging;

#[cfg(target_os = "linux")]
fn main() -> ExitCode {
    use ns_launcher::coordinator::ParentCoordinator;

    let cli = Cli::parse_args();

    let config = match cli.to_configuration() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(1);
        }
    };

    // Initialize logging
    init_debug_logging(config.verbose);

    tracing::debug!(
        "Launching with namespaces [{}], handshake {}, jail {:?}",
        config.capabilities,
        if config.ipc_requested { "on" } else { "off" },
        config.jail_path
    );

    let coordinator = match ParentCoordinator::new(config) {
        Ok(coordinator) => coordinator,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(1);
        }
    };

    match coordinator.run() {
        Ok(report) => {
            if let Some(banner) = report.handshake_banner() {
                println!("{}", banner);
            }
            ExitCode::from(report.exit.code().clamp(0, 255) as u8)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_debug_logging(cli.verbose);
    eprintln!("Error: nslaunch requires Linux namespaces");
    ExitCode::from(1)
}

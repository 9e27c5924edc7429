use std::error::Error;
use tokio::io::AsyncBufReadExt;
use tracing::{info, warn};

mod adapters;
mod auth;
mod config;
mod error;
mod events;
mod line_reader;
mod manager;
mod outbound;
mod profile;
mod replay;

use config::Config;
use events::ConnectionEvent;
use manager::{ConnectionManager, SendOutcome};
use n2k_codec::OutboundMessage;

// ========== Logging Setup ==========

fn init_logging(log_config: &config::LogConfig) -> Result<(), Box<dyn Error>> {
    use tracing_appender::rolling;
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    // Create log directory if it doesn't exist
    std::fs::create_dir_all(&log_config.directory)?;

    // Create daily rolling file appender
    let file_appender = rolling::daily(&log_config.directory, &log_config.file_prefix);

    // Build subscriber with both console and file output
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_timer(fmt::time::OffsetTime::local_rfc_3339().unwrap_or_else(|_| {
            fmt::time::OffsetTime::new(
                time::UtcOffset::UTC,
                time::format_description::well_known::Rfc3339,
            )
        }));

    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_timer(fmt::time::OffsetTime::local_rfc_3339().unwrap_or_else(|_| {
            fmt::time::OffsetTime::new(
                time::UtcOffset::UTC,
                time::format_description::well_known::Rfc3339,
            )
        }));

    // Parse log level from config
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&log_config.level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}

// ========== Main Application ==========

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Check for command-line arguments
    let args: Vec<String> = std::env::args().collect();

    // Check for help flag
    if args.contains(&"--help".to_string()) || args.contains(&"-h".to_string()) {
        println!("NMEA2000 Gateway");
        println!();
        println!("USAGE:");
        println!("    nmea_gateway [OPTIONS]");
        println!();
        println!("OPTIONS:");
        println!("    --profile <id>                       Activate this profile instead of the configured one");
        println!("    --validate-config, --validate, -v    Validate configuration and exit");
        println!("    --help, -h                           Show this help message");
        println!();
        println!("Configuration file: config.json (in current directory)");
        std::process::exit(0);
    }

    let validate_only = args.contains(&"--validate-config".to_string())
        || args.contains(&"--validate".to_string())
        || args.contains(&"-v".to_string());

    let profile_override = args
        .iter()
        .position(|a| a == "--profile")
        .and_then(|i| args.get(i + 1))
        .cloned();

    // Load configuration
    let config = match Config::from_file("config.json") {
        Ok(cfg) => {
            if validate_only {
                println!("✓ Configuration validation successful");
                println!("  Profiles: {}", cfg.profiles.len());
                for profile in &cfg.profiles {
                    match profile.validate() {
                        Ok(()) => println!("    {} ({})", profile.id, profile.name),
                        Err(e) => {
                            eprintln!("✗ Profile '{}' is invalid: {}", profile.id, e);
                            std::process::exit(1);
                        }
                    }
                }
                if let Some(active) = &cfg.active_profile {
                    println!("  Startup profile: {}", active);
                }
                std::process::exit(0);
            }
            cfg
        }
        Err(e) => {
            if validate_only {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
            eprintln!("Warning: Could not load config.json: {}", e);
            eprintln!("Using default configuration");
            Config::default()
        }
    };

    // Initialize logging
    init_logging(&config.logging)?;
    info!("NMEA2000 Gateway starting...");
    info!("Loaded configuration with {} profiles", config.profiles.len());

    let (mut manager, mut events) = ConnectionManager::new();

    // Resolve the startup profile: command line wins over configuration
    let startup = match &profile_override {
        Some(id) => config.profile(id),
        None => config.startup_profile(),
    };

    match startup {
        Some(profile) => {
            info!("Activating startup profile '{}'", profile.id);
            if let Err(e) = manager.activate(profile.clone()).await {
                eprintln!("Failed to activate profile '{}': {}", profile.id, e);
                std::process::exit(1);
            }
        }
        None => {
            warn!("No startup profile selected; waiting for operator input");
        }
    }

    // Pump manager events until shutdown; outbound messages arrive as
    // JSON lines on stdin
    let mut stdin_lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(ConnectionEvent::Connected) => {
                        let name = manager
                            .active_profile()
                            .map(|p| p.name.clone())
                            .unwrap_or_default();
                        info!("Transport connected: {}", name);
                    }
                    Some(ConnectionEvent::Disconnected) => info!("Transport disconnected"),
                    Some(ConnectionEvent::RawMessage(line)) => println!("{}", line),
                    Some(ConnectionEvent::SyntheticMessage(line)) => println!("{}", line),
                    Some(ConnectionEvent::Error(e)) => warn!("Transport error: {}", e),
                    None => break,
                }
            }
            line = stdin_lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(text)) if !text.trim().is_empty() => {
                        dispatch_outbound(&mut manager, &text).await;
                    }
                    Ok(Some(_)) => {}
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        warn!("stdin read error: {}", e);
                        stdin_open = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down (state {:?})", manager.state());
                manager.deactivate().await;
                break;
            }
        }
    }

    Ok(())
}

/// Parse one operator-submitted message and hand it to the manager
async fn dispatch_outbound(manager: &mut ConnectionManager, text: &str) {
    match serde_json::from_str::<OutboundMessage>(text) {
        Ok(msg) => match manager.send(msg).await {
            Ok(SendOutcome::Transmitted) => info!("Message transmitted"),
            Ok(SendOutcome::BroadcastOnly) => {
                info!("No active transport; message was not transmitted")
            }
            Err(e) => warn!("Send failed: {}", e),
        },
        Err(e) => warn!("Ignoring invalid outbound message: {}", e),
    }
}

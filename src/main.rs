use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voice_bridge::config::Overrides;
use voice_bridge::{Config, Daemon};

/// Voice Bridge - voice assistant gateway for FHEM home automation
#[derive(Parser)]
#[command(name = "voicebridge", version, about)]
struct Cli {
    /// Config file (default: ~/.config/voice-bridge/config.toml)
    #[arg(short, long, env = "VOICE_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the custom slot types for the skill interaction model
    SlotTypes,
    /// Validate the configuration and print a summary
    CheckConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,voice_bridge=info",
        1 => "info,voice_bridge=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = Overrides {
        port: cli.port,
        bind: cli.bind,
    };
    let config = Config::load(cli.config.as_deref(), &overrides)?;

    if let Some(cmd) = cli.command {
        match cmd {
            Command::SlotTypes => println!("{}", voice_bridge::slot_types(&config)),
            Command::CheckConfig => print_summary(&config),
        }
        return Ok(());
    }

    tracing::info!(
        bind = %config.server.bind,
        port = config.server.port,
        connections = config.connections.len(),
        devices = config.device_count(),
        "starting voice bridge"
    );
    if config.skill.application_ids.is_empty() && config.skill.client_ids.is_empty() {
        tracing::warn!("no application or client ids configured, every request will be rejected");
    }

    let daemon = Daemon::new(config)?;
    daemon.run().await?;

    Ok(())
}

fn print_summary(config: &Config) {
    println!("Configuration OK");
    println!("  listen:          {}:{}", config.server.bind, config.server.port);
    println!("  application ids: {}", config.skill.application_ids.len());
    println!("  client ids:      {}", config.skill.client_ids.len());
    println!("  tokeninfo:       {}", config.skill.tokeninfo_url);
    println!("  session idle:    {}s", config.session_idle.as_secs());
    for connection in &config.connections {
        println!(
            "  connection {}: {} ({} devices, confirmation level {})",
            connection.name,
            connection.base_url,
            connection.devices.len(),
            connection.confirmation_level
        );
    }
}

//! modlink command-line tool
//!
//! Thin wrapper over the library: every networked subcommand builds one
//! fabric endpoint, runs a discovery scan, then performs its operation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use modlink::cli::{Cli, Commands, ConfigSubcommand};
use modlink::config::LinkConfig;
use modlink::error::Result;
use modlink::{logging, version, MdnsDiscovery, Messaging};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Light subcommands skip the full logging stack
    match &cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand.clone(), cli.config);
        }
        _ => {}
    }

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(LinkConfig::default_path);
    let config = LinkConfig::load_or_default(&config_path)?;

    // The guards must be kept alive for the lifetime of the program
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    info!(
        version = %version::version_string(),
        module = config.module.id,
        "Starting modlink"
    );

    let discovery = Arc::new(MdnsDiscovery::new(
        config.discovery.clone(),
        config.transport.clone(),
    ));
    let fabric = Messaging::new(&config, discovery)?;

    match cli.command {
        Commands::Scan { duration } => run_scan(&fabric, duration),
        Commands::Listen {
            tag,
            count,
            duration,
        } => run_listen(&fabric, tag, count, duration),
        Commands::Send {
            destination,
            tag,
            payload,
            best_effort,
            duration,
        } => run_send(&fabric, destination, tag, payload, best_effort, duration),
        Commands::Call {
            destination,
            function,
            params,
            duration,
        } => run_call(&fabric, destination, function, params, duration),
        Commands::Version | Commands::Config { .. } => unreachable!(),
    }
}

fn run_scan(fabric: &Messaging, duration: u64) -> Result<()> {
    let found = fabric.find_connected_modules(Duration::from_secs(duration))?;
    let modules = fabric.modules();

    println!("Found {} module(s):", found.len());
    let mut records: Vec<_> = modules.values().collect();
    records.sort_by_key(|r| r.id);
    for record in records {
        println!(
            "  {:>3}  {:<12}  {}  {}  connected: {:?}",
            record.id, record.module_type.to_string(), record.ip, record.hostname, record.connected
        );
    }
    Ok(())
}

fn run_listen(fabric: &Messaging, tag: u8, count: u64, duration: u64) -> Result<()> {
    fabric.find_connected_modules(Duration::from_secs(duration))?;
    println!("Listening on tag {}...", tag);

    let mut received = 0u64;
    while count == 0 || received < count {
        if let Some((sender, payload)) = fabric.recv(tag)? {
            received += 1;
            println!("[{}] from {}: {}", received, sender, render_payload(&payload));
        }
    }
    Ok(())
}

fn run_send(
    fabric: &Messaging,
    destination: u8,
    tag: u8,
    payload: String,
    best_effort: bool,
    duration: u64,
) -> Result<()> {
    fabric.find_connected_modules(Duration::from_secs(duration))?;
    let sent = fabric.send(destination, tag, payload.into_bytes(), !best_effort)?;
    println!("Sent {} byte(s) to module {} on tag {}", sent, destination, tag);
    Ok(())
}

fn run_call(
    fabric: &Messaging,
    destination: u8,
    function: u8,
    params: String,
    duration: u64,
) -> Result<()> {
    fabric.find_connected_modules(Duration::from_secs(duration))?;
    let result = fabric.remote_call(destination, function, params.into_bytes())?;
    println!("{}", render_payload(&result));
    Ok(())
}

/// Printable text as-is, everything else as hex.
fn render_payload(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if text.chars().all(|c| !c.is_control() || c.is_whitespace()) => {
            text.to_string()
        }
        _ => payload
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(" "),
    }
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand, config_path: Option<PathBuf>) -> Result<()> {
    let path = config_path.unwrap_or_else(LinkConfig::default_path);

    match subcommand {
        ConfigSubcommand::Show => {
            let config = LinkConfig::load_or_default(&path)?;
            println!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigSubcommand::Init { path: init_path, force } => {
            let target = init_path.unwrap_or(path);
            if target.exists() && !force {
                eprintln!(
                    "Configuration already exists at {} (use --force to overwrite)",
                    target.display()
                );
                std::process::exit(1);
            }
            LinkConfig::default().save(&target)?;
            println!("Configuration written to {}", target.display());
        }
        ConfigSubcommand::Validate => match LinkConfig::load(&path) {
            Ok(_) => println!("Configuration is valid."),
            Err(e) => {
                eprintln!("Configuration is invalid: {}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

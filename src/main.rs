use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use log::debug;

use lhcontrol_rs::config::AppConfig;
use lhcontrol_rs::radio::btle::BtleRadio;
use lhcontrol_rs::{Manager, StationInfo};

#[derive(Parser, Debug)]
#[command(version, about = "Power control for Bluetooth LE base stations")]
struct Cli {
    /// Path to the config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Print the station list as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan for stations and read their power state
    Scan,
    /// Scan, then re-check every station
    Status,
    /// Power on one station, or all of them
    On { address: Option<String> },
    /// Power off one station, or all of them
    Off { address: Option<String> },
    /// Set the display name of a station; omit NAME to clear it
    Rename { original: String, name: Option<String> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let mut config = AppConfig::load(&cli.config)?;
    debug!("Config: {:?}", config);

    if let Command::Rename { original, name } = &cli.command {
        config.rename_station(original, name.as_deref());
        return config.save(&cli.config);
    }

    let radio = BtleRadio::initialize(config.adapter.as_deref())
        .await
        .context("initializing bluetooth")?;
    let manager = Manager::new(Arc::new(radio), config.timings())
        .with_renamed_stations(config.renamed_stations.clone());

    let result = run(&manager, cli.command).await;
    manager.shutdown().await;
    print_stations(&result?, cli.json)
}

async fn run(manager: &Manager, command: Command) -> anyhow::Result<Vec<StationInfo>> {
    // The station map starts empty in a fresh process.
    let stations = manager.scan_and_merge().await?;

    match command {
        Command::Scan => Ok(stations),
        Command::Status => Ok(manager.check_all_statuses().await),
        Command::On { address } => {
            match address {
                Some(address) => manager.power_on_station(&address).await?,
                None => manager.power_on_all().await?,
            }
            Ok(manager.snapshot())
        }
        Command::Off { address } => {
            match address {
                Some(address) => manager.power_off_station(&address).await?,
                None => manager.power_off_all().await?,
            }
            Ok(manager.snapshot())
        }
        // Handled before the radio is opened.
        Command::Rename { .. } => Ok(stations),
    }
}

fn print_stations(stations: &[StationInfo], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(stations)?);
        return Ok(());
    }
    if stations.is_empty() {
        println!("No stations found");
    }
    for station in stations {
        println!(
            "{:<20} {:<16} {}  {}",
            station.name, station.original_name, station.address, station.power_state
        );
    }
    Ok(())
}

use std::fs;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use bundleman::blob::FsBlobStore;
use bundleman::config::Config;
use bundleman::market::{HttpMarketClient, MarketClientConfig};
use bundleman::notify::LogNotifier;
use bundleman::run::Updater;
use bundleman::signer::ArtifactSigner;
use bundleman::store::{SqliteStore, Store};
use bundleman::types::{NewApp, NewDevice};

#[derive(Parser)]
#[command(name = "bundleman")]
#[command(about = "Mirrors Android app artifacts and publishes signed bundles", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Run one update pass over all devices and apps
    Run {
        /// Path to the configuration file
        #[arg(long, short, default_value = "bundleman.toml")]
        config: String,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the registry database
    Init {
        /// Data directory for the database and blob storage
        #[arg(long, default_value = "./data")]
        data_dir: String,
    },

    /// Seed device profiles and tracked apps from JSON files
    Import {
        /// Data directory for the database and blob storage
        #[arg(long, default_value = "./data")]
        data_dir: String,

        /// JSON array of device profiles
        #[arg(long)]
        devices: Option<String>,

        /// JSON array of tracked applications
        #[arg(long)]
        apps: Option<String>,
    },
}

fn open_store(data_dir: &str) -> anyhow::Result<SqliteStore> {
    let data_path: std::path::PathBuf = data_dir.into();
    fs::create_dir_all(&data_path)?;
    let store = SqliteStore::new(data_path.join("bundleman.db"))?;
    store.initialize()?;
    Ok(store)
}

fn run_import(
    data_dir: String,
    devices: Option<String>,
    apps: Option<String>,
) -> anyhow::Result<()> {
    if devices.is_none() && apps.is_none() {
        bail!("nothing to import; pass --devices and/or --apps");
    }

    let store = open_store(&data_dir)?;

    if let Some(path) = devices {
        let raw = fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
        let entries: Vec<NewDevice> = serde_json::from_str(&raw)?;
        let count = entries.len();
        for device in &entries {
            store.create_device(device)?;
        }
        println!("Imported {count} device profile(s)");
    }

    if let Some(path) = apps {
        let raw = fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
        let entries: Vec<NewApp> = serde_json::from_str(&raw)?;
        let count = entries.len();
        for app in &entries {
            store.create_app(app)?;
        }
        println!("Imported {count} tracked app(s)");
    }

    Ok(())
}

fn run_pass(config_path: &str) -> anyhow::Result<()> {
    let config =
        Config::load(config_path).with_context(|| format!("loading {config_path}"))?;

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;

    let blob = FsBlobStore::new(&config.data_dir);
    let market = HttpMarketClient::new(&MarketClientConfig {
        base_url: config.market.base_url.clone(),
    })?;
    let signer = ArtifactSigner::from_pem_file(
        &config.signing.private_key_path,
        &config.signing.passphrase,
    )?;
    let notifier = LogNotifier;

    let updater = Updater {
        store: &store,
        blob: &blob,
        market: &market,
        signer: &signer,
        notifier: &notifier,
        config: &config,
    };

    let summary = updater.run()?;

    info!(
        "update pass finished: {} app(s) updated, {} device(s) processed, {} skipped, {} error(s)",
        summary.updated_apps.len(),
        summary.devices_processed,
        summary.devices_skipped,
        summary.log.error_count()
    );
    for name in &summary.updated_apps {
        println!("updated: {name}");
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("bundleman=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init { data_dir } => {
                open_store(&data_dir)?;
                println!("Initialized registry database in {data_dir}");
            }
            AdminCommands::Import {
                data_dir,
                devices,
                apps,
            } => {
                run_import(data_dir, devices, apps)?;
            }
        },
        Commands::Run { config } => {
            run_pass(&config)?;
        }
    }

    Ok(())
}

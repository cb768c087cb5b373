pub mod catalog;
pub mod commands;
pub mod consensus;
pub mod db;
pub mod device;
pub mod feed;
pub mod gate;
pub mod geo;
pub mod kv;
pub mod models;
pub mod remote;
pub mod session;
pub mod settings;
pub mod signals;
mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

use catalog::load_catalog;
use commands::Command;
use db::Database;
use feed::{FeedController, ServerStatusBoard};
use gate::{FixedLocationProvider, ReportGate};
use kv::KeyValueStore;
use remote::{LoggingSink, LotReader, PostgrestClient, PostgrestConfig, RemoteLotStatus, ReportSink};
use session::ParkingSession;
use settings::SettingsStore;

pub(crate) struct AppState {
    pub(crate) db: Database,
    pub(crate) session: ParkingSession,
    pub(crate) settings: SettingsStore,
    pub(crate) location: Arc<FixedLocationProvider>,
    pub(crate) board: Arc<Mutex<ServerStatusBoard>>,
}

impl AppState {
    pub(crate) async fn server_status(&self, lot_id: &str) -> Option<RemoteLotStatus> {
        self.board.lock().await.get(lot_id).cloned()
    }
}

fn data_dir() -> Result<PathBuf> {
    let dir = std::env::var_os("SPARK_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".spark"));
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create data directory {}", dir.display()))?;
    Ok(dir)
}

pub async fn run() -> Result<()> {
    // RUST_LOG overrides the info default.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Spark starting up...");

    let data_dir = data_dir()?;
    let database = Database::new(data_dir.join("spark.sqlite3"))?;

    let settings_store = SettingsStore::new(data_dir.join("settings.json"))?;
    if !settings_store.path().exists() {
        settings_store.save()?;
    }
    let settings = settings_store.get();

    let kv: Arc<dyn KeyValueStore> = Arc::new(database.clone());
    let device_id = device::device_id(kv.as_ref()).await?;

    let remote = match PostgrestConfig::from_env() {
        Some(config) => Some(Arc::new(PostgrestClient::new(config)?)),
        None => {
            info!("no remote configured; reports stay on this device");
            None
        }
    };

    let catalog = load_catalog(
        &database,
        remote.as_deref().map(|client| client as &dyn LotReader),
    )
    .await;

    let sink: Arc<dyn ReportSink> = match &remote {
        Some(client) => client.clone(),
        None => Arc::new(LoggingSink),
    };

    let location = Arc::new(FixedLocationProvider::without_fix());
    let gate = ReportGate::new(settings.gate.clone(), kv.clone(), location.clone());
    let session = ParkingSession::new(
        catalog,
        settings.consensus.clone(),
        &settings.session,
        gate,
        sink,
        Some(device_id),
    );

    if let Some(client) = &remote {
        if let Err(err) = session.hydrate(client.as_ref(), Utc::now()).await {
            warn!("Failed to hydrate recent reports: {err:#}");
        }
    }
    session.start().await;

    let mut feed = FeedController::new();
    if let Some(client) = &remote {
        feed.start(client.clone(), None, settings.session.poll_interval())?;
    }

    let state = AppState {
        db: database,
        session,
        settings: settings_store,
        location,
        board: feed.board(),
    };

    println!("{}", commands::HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match Command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => match commands::execute(&state, command).await {
                        Ok(output) => println!("{output}"),
                        Err(err) => println!("{err}"),
                    },
                    Err(err) => println!("{err}"),
                }
            }
        }
    }

    state.session.stop().await;
    feed.stop().await?;
    info!(
        "Spark shutting down (db at {}, settings at {})",
        state.db.path().display(),
        state.settings.path().display()
    );
    Ok(())
}

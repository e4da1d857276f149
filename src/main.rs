use std::{fs, path::Path, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;

use ledger::{SystemClock, ThreadRngDraw};
use repositories::{LedgerStore, MemoryStore, PgStore};
use services::{AdminAllowList, Notifier, ServiceContext};

mod ledger;
mod models;
mod repositories;
mod services;
mod settings;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "brickearner.toml")]
    config: String,
    /// Overrides `server.listen`.
    #[arg(short, long)]
    listen: Option<String>,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
    /// Keep everything in process memory instead of Postgres.
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let mut settings = settings::Settings::load(&args.config).context("Failed to load settings.")?;
    if let Some(listen) = args.listen {
        settings.server.listen = listen;
    }

    init_logging(&args.log4rs)?;
    log::info!("Starting Brickearner ledger.");

    match (&settings.postgres, args.in_memory) {
        (Some(postgres), false) => {
            let store = PgStore::connect(&postgres.url, postgres.max_connections)
                .await
                .context("Could not connect to database.")?;
            run(store, settings).await
        }
        _ => {
            log::warn!("Running with the in-memory store, nothing will be persisted.");
            run(MemoryStore::new(), settings).await
        }
    }
}

async fn run<S: LedgerStore>(store: S, settings: settings::Settings) -> Result<()> {
    let clock = SystemClock::new(settings.clock.utc_offset_minutes)
        .with_context(|| format!("Invalid UTC offset: {} minutes", settings.clock.utc_offset_minutes))?;
    let current_settings = store.get_settings().await?.unwrap_or_default();

    let context = ServiceContext {
        store,
        clock: Arc::new(clock),
        draws: Arc::new(ThreadRngDraw),
        notifier: Notifier::new(current_settings),
        admins: AdminAllowList::new(&settings.admin.email, &settings.admin.uid),
    };

    services::start_services(context, settings)
        .await
        .context("Could not start services.")
}

fn init_logging(path: &str) -> Result<()> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow::anyhow!("Could not initialize logging: {}", e))
        }
    }
}

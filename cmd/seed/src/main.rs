//! # clipshare-seed
//!
//! Creates demo sessions in the configured backend and prints their codes.
//!
//! Usage: `clipshare-seed [COUNT]` (default 3). Backend and logging come
//! from `clipshare.toml` / `CLIPSHARE_*` variables.

use std::sync::Arc;

use anyhow::Context;
use configs::{Backend, Settings};
use domains::{ClipboardStore, ItemType, SessionRepository};
use services::{ServiceOptions, SessionService};
use storage_adapters::FileSessionRepository;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SEED_DEVICE_ID: &str = "seed-device";
const SEED_DEVICE_NAME: &str = "Seeder";

fn init_tracing(settings: &configs::LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if settings.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn open_repository(settings: &configs::StorageSettings) -> anyhow::Result<Arc<dyn SessionRepository>> {
    let retention = chrono::Duration::days(i64::from(settings.retention_days));

    let repo: Arc<dyn SessionRepository> = match settings.backend {
        #[cfg(feature = "db-sqlite")]
        Backend::Sqlite => {
            use secrecy::{ExposeSecret, SecretString};
            use storage_adapters::{SqliteConnector, SqliteSessionRepository};

            let url = SecretString::from(settings.database_url.expose_secret().to_owned());
            let connector = Arc::new(SqliteConnector::new(url, settings.max_connections));
            connector.connect().await.context("failed to open the SQLite database")?;
            Arc::new(SqliteSessionRepository::new(connector, retention))
        }
        #[cfg(not(feature = "db-sqlite"))]
        Backend::Sqlite => anyhow::bail!("built without the db-sqlite feature"),
        Backend::File => Arc::new(
            FileSessionRepository::open(&settings.data_file, retention)
                .await
                .context("failed to open the session file")?,
        ),
        Backend::Memory => Arc::new(FileSessionRepository::in_memory(retention)),
    };
    Ok(repo)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    init_tracing(&settings.log);

    let count: usize = match std::env::args().nth(1) {
        Some(arg) => arg.parse().with_context(|| format!("invalid session count '{arg}'"))?,
        None => 3,
    };

    let repo = open_repository(&settings.storage).await?;
    let store = SessionService::with_options(
        repo,
        ServiceOptions {
            code_attempts: settings.sessions.code_attempts,
            write_attempts: settings.sessions.write_attempts,
        },
    );

    info!(backend = ?settings.storage.backend, count, "seeding sessions");
    for n in 1..=count {
        let session = store.create_session(SEED_DEVICE_ID).await?;
        store
            .add_item(
                session.id,
                ItemType::Text,
                format!("Welcome to shared clipboard #{n}"),
                SEED_DEVICE_ID,
                SEED_DEVICE_NAME,
            )
            .await?;
        println!("{}\t{}", session.code, session.id);
    }

    Ok(())
}

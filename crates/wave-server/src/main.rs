mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use wave_index::{IndexConfig, ParticipationIndex};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wave=debug,wave_index=debug,wave_db=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let config = IndexConfig::from_env()?;
    let db_path = std::env::var("WAVE_DB_PATH").unwrap_or_else(|_| "wave.db".into());
    let host = std::env::var("WAVE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("WAVE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let migrate_on_start = std::env::var("WAVE_MIGRATE_ON_START").is_ok_and(|v| v.trim() == "true");

    // Init database and index
    let db = Arc::new(wave_db::Database::open(&PathBuf::from(&db_path))?);
    let index = ParticipationIndex::open(db, config)?;

    if migrate_on_start {
        let report = index.run_all_migrations()?;
        info!(
            participants = report.participants,
            key_ids = report.key_ids,
            metadata = report.metadata,
            "Startup migration finished"
        );
    }

    let app = routes::router(index);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Wave participation server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

use anyhow::{Context, Result};
use rollcall_facedb::FaceDb;
use rollcall_server::{app, spawn_engine, AppState, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::from_env();
    let facedb_config = config.facedb();
    tracing::info!(
        models = %facedb_config.model_dir.display(),
        db = %facedb_config.db_path.display(),
        threshold = facedb_config.similarity_threshold,
        "opening face database"
    );
    let db = FaceDb::open(&facedb_config).context("failed to open face database")?;
    tracing::info!(faces = db.len()?, "face database ready");

    let engine = spawn_engine(db, config.upload_path.clone())?;
    let router = app(AppState { engine }, &config)?;

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    tracing::info!(
        addr = %config.bind,
        origin = %config.allowed_origin,
        "rollcalld ready"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("rollcalld shutting down");
        })
        .await?;

    Ok(())
}

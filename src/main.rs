use anyhow::Context;
use nctr_ledger::orchestration::LockService;
use nctr_ledger::{api, config::Config, db::open_store, DataSource, PartnerDataSource, Repository};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("configuration error")?;
    let port = config.port;

    let pool = open_store(&config.database_path, config.store_options())
        .await
        .with_context(|| format!("failed to initialize database at {}", config.database_path))?;

    let repo = Arc::new(Repository::new(pool));
    let levels = repo
        .load_status_levels()
        .await
        .context("failed to load status levels")?;
    let datasource: Arc<dyn DataSource> = Arc::new(PartnerDataSource::new(
        config.partner_api_url.clone(),
        config.partner_timeout(),
    ));

    let sweep_interval = config.lock_sweep_interval_secs;
    let state = api::AppState::new(repo, config, datasource, levels);

    if sweep_interval > 0 {
        let locks: Arc<LockService> = state.locks.clone();
        tokio::spawn(locks.run_sweeper(Duration::from_secs(sweep_interval)));
        tracing::info!(interval_secs = sweep_interval, "lock release sweep scheduled");
    }

    let app = api::create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

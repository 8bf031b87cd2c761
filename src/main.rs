use std::process;
use std::sync::Arc;

use tile_keeper::config::Settings;
use tile_keeper::{http, telemetry, DiskTileStore, Error, PostgisSource, TileCoordinator};
use tokio::net::TcpListener;
use tracing::{dispatcher, error, info};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        if dispatcher::has_been_set() {
            error!(error = %err, "exiting");
        } else {
            eprintln!("tile_keeper: {}", err);
        }
        process::exit(1);
    }
}

async fn run() -> Result<(), Error> {
    let settings = Settings::load()?;
    telemetry::init(&settings.logging)?;

    let store = DiskTileStore::new(&settings.cache_dir);
    let source = PostgisSource::connect_lazy(&settings.database)?;
    let coordinator = TileCoordinator::new(Arc::new(store), Arc::new(source));

    let listener = TcpListener::bind(settings.listen)
        .await
        .map_err(Error::Server)?;
    info!(
        listen = %settings.listen,
        cache_dir = %settings.cache_dir.display(),
        "serving vector tiles"
    );

    axum::serve(listener, http::build_router(coordinator))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(Error::Server)?;

    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "unable to listen for shutdown signal");
    }
}

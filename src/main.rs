use std::error::Error;
use std::sync::Arc;

use boorucache::cache::{spawn_janitor, ResourceCache};
use boorucache::config::{self, AppConfig};
use boorucache::debounce::Debouncer;
use boorucache::server::{self, AppState, OriginServer};
use boorucache::upstream::{SearchService, UpstreamClient};
use dotenv::dotenv;
use env_logger::Env;
use log::{error, info};
use tokio_util::sync::CancellationToken;

#[rocket::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    // Load config
    let figment = config::figment();
    let config = figment.extract::<AppConfig>()?;
    info!("Configuration loaded successfully");

    // One token drives every shutdown step
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Got interrupt, shutting down"),
                Err(e) => error!("Failed to listen for interrupt: {}", e),
            }
            shutdown.cancel();
        });
    }

    let cache = Arc::new(ResourceCache::new());
    let janitor = spawn_janitor(Arc::clone(&cache), config.cleanup_interval(), shutdown.clone());
    info!(
        "Resource cache initialized (image ttl {}s, body ttl {}s)",
        config.image_ttl, config.body_ttl
    );

    let upstream = UpstreamClient::new(&config, Arc::clone(&cache))?;
    let search = SearchService::new(&config, upstream);
    let debouncer = Debouncer::new(shutdown.clone());

    info!(
        "Starting origin server on {}:{}, serving as {}",
        config.address, config.port, config.public_base_url
    );

    let rocket = server::build(
        figment,
        AppState {
            config,
            cache: Arc::clone(&cache),
            debouncer,
            search,
        },
    );
    let served = OriginServer::spawn(rocket, shutdown.clone()).await?.join().await;

    // The server also stops when it cannot bind; release everything else too.
    shutdown.cancel();
    if let Err(e) = janitor.await {
        error!("Cache janitor failed: {}", e);
    }
    cache.flush_all();

    served?;
    info!("Shut down cleanly");
    Ok(())
}

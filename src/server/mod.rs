use std::sync::Arc;

use log::info;
use rocket::figment::Figment;
use rocket::{Build, Rocket};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api;
use crate::cache::ResourceCache;
use crate::config::AppConfig;
use crate::debounce::Debouncer;
use crate::upstream::SearchService;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Origin server failed to launch: {0}")]
    Launch(String),
}

pub struct AppState {
    pub config: AppConfig,
    pub cache: Arc<ResourceCache>,
    pub debouncer: Debouncer<String>,
    pub search: SearchService,
}

pub fn build(figment: Figment, state: AppState) -> Rocket<Build> {
    rocket::custom(figment)
        .manage(state.cache)
        .manage(state.debouncer)
        .manage(state.search)
        .manage(state.config.settle_windows())
        .manage(state.config)
        .mount(
            "/",
            routes![api::images::get_image, api::inline::inline],
        )
}

/// The running rocket instance serving cached thumbnails and inline queries.
pub struct OriginServer {
    task: JoinHandle<Result<(), ServerError>>,
}

impl OriginServer {
    /// Ignites `rocket`, launches it in the background and arranges for its
    /// listener to close once `shutdown` fires.
    pub async fn spawn(rocket: Rocket<Build>, shutdown: CancellationToken) -> Result<Self, ServerError> {
        let rocket = rocket
            .ignite()
            .await
            .map_err(|e| ServerError::Launch(e.to_string()))?;

        let handle = rocket.shutdown();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            info!("Closing origin server listener");
            handle.notify();
        });

        let task = tokio::spawn(async move {
            rocket
                .launch()
                .await
                .map(|_| ())
                .map_err(|e| ServerError::Launch(e.to_string()))
        });

        Ok(Self { task })
    }

    /// Resolves once the server has stopped, either after shutdown or
    /// because it could not bind its listener.
    pub async fn join(self) -> Result<(), ServerError> {
        self.task
            .await
            .map_err(|e| ServerError::Launch(e.to_string()))?
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::upstream::UpstreamClient;
    use rocket::local::asynchronous::Client;

    pub(crate) fn state(config: AppConfig, release: CancellationToken) -> (AppState, Arc<ResourceCache>) {
        let cache = Arc::new(ResourceCache::new());
        let upstream = UpstreamClient::new(&config, Arc::clone(&cache)).unwrap();
        let state = AppState {
            search: SearchService::new(&config, upstream),
            debouncer: Debouncer::new(release),
            cache: Arc::clone(&cache),
            config,
        };
        (state, cache)
    }

    pub(crate) async fn client() -> (Client, Arc<ResourceCache>) {
        let (state, cache) = state(AppConfig::default(), CancellationToken::new());
        let figment = Figment::from(rocket::Config::debug_default());
        let client = Client::tracked(build(figment, state)).await.unwrap();
        (client, cache)
    }

    #[rocket::async_test]
    async fn shutdown_token_stops_the_server() {
        let shutdown = CancellationToken::new();
        let (state, _cache) = state(AppConfig::default(), shutdown.clone());
        let figment = Figment::from(rocket::Config::debug_default())
            .merge(("port", 0))
            .merge(("shutdown.ctrlc", false));

        let server = OriginServer::spawn(build(figment, state), shutdown.clone())
            .await
            .unwrap();
        shutdown.cancel();

        server.join().await.unwrap();
    }
}

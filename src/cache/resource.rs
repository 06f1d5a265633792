use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, info};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::store::{CacheError, Namespace, TtlStore};
use crate::images::CachedImage;

/// Payload handed to [`ResourceCache::put`]; the variant picks the namespace.
#[derive(Debug, Clone)]
pub enum Resource {
    Image(CachedImage),
    Body(Bytes),
}

/// Process-wide cache of decoded thumbnails (keyed by post identity) and raw
/// upstream bodies (keyed by request URL).
pub struct ResourceCache {
    images: TtlStore<Arc<CachedImage>>,
    bodies: TtlStore<Bytes>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self {
            images: TtlStore::new(Namespace::Images),
            bodies: TtlStore::new(Namespace::Bodies),
        }
    }

    pub fn put(&self, key: &str, resource: Resource, ttl: Duration) -> Result<(), CacheError> {
        match resource {
            Resource::Image(image) => self.put_image(key, image, ttl),
            Resource::Body(body) => self.put_body(key, body, ttl),
        }
    }

    pub fn put_image(&self, key: &str, image: CachedImage, ttl: Duration) -> Result<(), CacheError> {
        self.images.insert(key, Arc::new(image), ttl)?;
        debug!("Cached thumbnail {} for {:?}", key, ttl);
        Ok(())
    }

    pub fn get_image(&self, key: &str) -> Result<Arc<CachedImage>, CacheError> {
        self.images.get(key)
    }

    pub fn image_expires_in(&self, key: &str) -> Option<Duration> {
        self.images.expires_in(key)
    }

    pub fn put_body(&self, key: &str, body: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let len = body.len();
        self.bodies.insert(key, body, ttl)?;
        debug!("Cached {} byte body for {}", len, key);
        Ok(())
    }

    pub fn get_body(&self, key: &str) -> Result<Bytes, CacheError> {
        self.bodies.get(key)
    }

    pub fn has_body(&self, key: &str) -> bool {
        self.bodies.contains(key)
    }

    pub fn purge_expired(&self) -> usize {
        self.images.purge_expired() + self.bodies.purge_expired()
    }

    /// Drops every entry in both namespaces and returns how many went.
    pub fn flush_all(&self) -> usize {
        let removed = self.images.clear() + self.bodies.clear();
        info!("Flushed {} cached resources", removed);
        removed
    }

    pub fn entry_count(&self) -> usize {
        self.images.entry_count() + self.bodies.entry_count()
    }
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Purges expired entries every `every` until `shutdown` fires.
pub fn spawn_janitor(
    cache: Arc<ResourceCache>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let purged = cache.purge_expired();
                    if purged > 0 {
                        debug!("Janitor purged {} expired resources", purged);
                    }
                }
            }
        }

        debug!("Cache janitor stopped");
    })
}

mod identity;
mod resource;
mod store;

pub use identity::{identity, post_identity, IdentityError};
pub use resource::{spawn_janitor, Resource, ResourceCache};
pub use store::{CacheEntry, CacheError, Namespace, TtlStore};

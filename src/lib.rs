//! Inline search front for Philomena image boards.
//!
//! Bursts of inline queries are coalesced per user by [`debounce::Debouncer`].
//! Upstream bodies and decoded thumbnails are kept in a [`cache::ResourceCache`].
//! The rocket server in [`server`] re-serves those thumbnails under stable
//! local URLs, so the chat platform's media fetcher never hits the upstream
//! CDN directly.

#[macro_use]
extern crate rocket;

pub mod api;
pub mod cache;
pub mod config;
pub mod debounce;
pub mod images;
pub mod models;
pub mod server;
pub mod upstream;

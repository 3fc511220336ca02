//! Photo timeline map
//!
//! Fetches geotagged photo metadata from a PhotoPrism instance, narrows it to
//! a capture-time window, serves it as a timeline endpoint, and renders the
//! result as thumbnail markers on a map with bounded retries.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;

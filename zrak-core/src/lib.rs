//! Core types and service wiring for the zrak air-quality aggregator.

/// Expiring key/value cache with per-key single-flight production.
pub mod cache;
/// Side-by-side comparison of several cities fetched concurrently.
pub mod compare;
/// Immutable configuration values handed to each component.
pub mod config;
/// Seven-day gap-filled timelines built from recorded snapshots.
pub mod history;
/// Domain models and identifiers shared by all sources.
pub mod model;
/// Traits describing the live, forecast, and history interfaces.
pub mod ports;
/// High-level service facade used by clients.
pub mod service;
/// Caching and recording decorators over the source ports.
pub mod sources;
/// City-to-station lookup table.
pub mod stations;

pub use cache::*;
pub use compare::*;
pub use config::*;
pub use history::*;
pub use model::*;
pub use ports::*;
pub use service::*;
pub use sources::*;
pub use stations::*;

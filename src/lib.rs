//! Orbital Arena - surface-locked avatar combat replicated through a shared
//! key-value store
//!
//! - `game`: spherical movement, thrust, projectiles, remote interpolation
//!   and the per-client session loop
//! - `replication`: wire records, snapshot reconciliation, cleanup leadership
//! - `store`: the shared store abstraction and its backends

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod replication;
pub mod store;
pub mod util;

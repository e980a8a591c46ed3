//! Facade crate re-exporting the FSFS commit core's public surface.
//!
//! Embedders depend on this crate rather than reaching into individual
//! workspace members directly; see `fsfs-engine::repo::Repo` for the entry
//! point.

pub use fsfs_core as core;
pub use fsfs_concurrency as concurrency;
pub use fsfs_durability as durability;
pub use fsfs_engine as engine;
pub use fsfs_storage as storage;

pub use fsfs_engine::repo::Repo;

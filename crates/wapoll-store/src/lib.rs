//! # wapoll-store
//!
//! Durable storage for device identities.
//!
//! - **Connection**: r2d2 pool over `rusqlite`, opened from a connection string
//! - **Migrations**: `PRAGMA user_version`-tracked schema upgrades
//! - **Repositories**: stateless [`DeviceRepo`] taking `&Connection`
//! - **Store**: [`IdentityStore`], the transactional API the runtime uses
//!
//! ## Crate Position
//!
//! Depends on: wapoll-core.
//! Depended on by: wapoll-runtime, wapoll-agent.

#![deny(unsafe_code)]

pub mod errors;
pub mod sqlite;
pub mod store;
pub mod types;

pub use errors::{Result, StoreError};
pub use sqlite::connection::{
    ConnectionConfig, ConnectionPool, PooledConnection, new_file, new_in_memory, open_url,
};
pub use sqlite::migrations::run_migrations;
pub use sqlite::repositories::device::DeviceRepo;
pub use store::identity_store::IdentityStore;
pub use types::{ActiveIdentity, DeviceIdentity};

//! High-level store API over the repositories.

pub mod identity_store;

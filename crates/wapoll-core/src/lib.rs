//! # wapoll-core
//!
//! Foundation types, branded IDs, and utilities for wapoll.
//!
//! This crate provides the shared vocabulary that all other wapoll crates depend on:
//!
//! - **Branded IDs**: [`ids::IdentityId`], [`ids::SessionId`] as newtypes
//! - **Addresses**: [`jid::Jid`] chat/user references with server constants
//! - **Events**: [`events::InboundEvent`] for the live stream, [`events::PairingEvent`] for the QR channel
//! - **Polls**: [`poll::PollRequest`] validated on construction
//! - **Presence**: [`presence::PresenceState`]
//! - **Errors**: [`errors::CoreError`] via `thiserror`
//! - **Retry**: [`retry::RetryConfig`] and backoff calculation
//! - **Logging**: [`logging::init_subscriber`]
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other wapoll crates.

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod jid;
pub mod logging;
pub mod poll;
pub mod presence;
pub mod retry;

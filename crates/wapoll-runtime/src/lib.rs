//! # wapoll-runtime
//!
//! Session lifecycle and event dispatch for one paired device.
//!
//! - **Backend**: [`MessagingBackend`] / [`BackendClient`] traits over the chat
//!   network, plus the in-process [`LoopbackBackend`]
//! - **Pairing**: [`PairingFlow`] drives the QR handshake and always releases
//!   its connection
//! - **Sessions**: [`SessionManager`] owns connect/disconnect/logout and never
//!   lets one identity hold two live connections
//! - **Dispatch**: [`EventDispatcher`] routes inbound events to registered
//!   [`EventHandler`]s, isolating handler failures
//! - **Outbound**: [`OutboundComposer`] sends presence and polls
//! - **Service**: [`PollService`] is the `login`/`logout`/`listen`/`create_poll` surface
//!
//! ## Crate Position
//!
//! Depends on: wapoll-core, wapoll-settings, wapoll-store.
//! Depended on by: wapoll-agent.

#![deny(unsafe_code)]

pub mod backend;
pub mod dispatch;
pub mod errors;
pub mod outbound;
pub mod pairing;
pub mod service;
pub mod session;

pub use backend::loopback::LoopbackBackend;
pub use backend::{BackendClient, MessagingBackend, OutboundMessage, SendReceipt};
pub use dispatch::{
    DispatchContext, EventDispatcher, EventHandler, HandlerError, HandlerRegistry, LoggingHandler,
};
pub use errors::{BackendError, RuntimeError};
pub use outbound::OutboundComposer;
pub use pairing::{PairingCode, PairingFlow};
pub use service::PollService;
pub use session::{Session, SessionManager, SessionState};

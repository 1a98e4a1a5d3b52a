//! # wapoll-agent
//!
//! The `wapoll` command-line front-end.
//!
//! - [`cli`]: argument definitions
//! - [`commands`]: settings resolution and subcommand execution
//! - [`render`]: pairing code output (terminal QR or plain text)

#![deny(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod render;

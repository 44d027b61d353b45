//! ovpn-mgmt — a small Rust client for the OpenVPN management interface.
//!
//! This crate speaks the line-oriented text protocol an OpenVPN daemon exposes
//! with `--management`, over TCP or a UNIX socket. A [`Session`] sends one
//! command at a time and frames the reply from the stream; the `status` and
//! `load-stats` replies are parsed into [`StatusReport`] and
//! [`StatsSnapshot`].
//!
//! ### Status
//! The client is synchronous and deliberately small. It does not subscribe
//! to real-time `>` notifications and never reconnects on its own: after a
//! timeout or a truncated reply, close the session and open a new one.
//!
//! See the `demos/` folder for usage.
//!
//! **Not an official project of the OpenVPN team.**
#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod reply;
pub mod stats;
pub mod status;

// Re-export primary types
pub use crate::client::{Session, Transport};
pub use crate::command::{KillTarget, Signal};
pub use crate::config::ConnectOptions;
pub use crate::error::{Error, Result};
pub use crate::reply::CommandResult;
pub use crate::stats::StatsSnapshot;
pub use crate::status::{ClientRecord, RouteRecord, StatusReport};

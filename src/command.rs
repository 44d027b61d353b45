//! Command line builders.
//!
//! Arguments are validated here, before anything reaches the transport.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Signals the daemon accepts through `signal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Restart and re-read the configuration.
    Hup,
    /// Exit.
    Term,
    /// Conditional restart.
    Usr1,
    /// Print connection statistics to the log.
    Usr2,
}

impl Signal {
    /// Every accepted signal.
    pub const ALL: [Signal; 4] = [Signal::Hup, Signal::Term, Signal::Usr1, Signal::Usr2];

    /// Name as sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Signal::Hup => "SIGHUP",
            Signal::Term => "SIGTERM",
            Signal::Usr1 => "SIGUSR1",
            Signal::Usr2 => "SIGUSR2",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Signal::ALL.into_iter().find(|sig| sig.as_str() == s).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "unsupported signal '{s}' (supported signals: SIGHUP, SIGTERM, SIGUSR1, SIGUSR2)"
            ))
        })
    }
}

/// Which client instance(s) `kill` should disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillTarget {
    /// Every instance connected with this common name.
    CommonName(String),
    /// The instance connecting from this real address.
    Address {
        /// Peer host.
        host: String,
        /// Peer port.
        port: u16,
    },
}

impl KillTarget {
    /// Build a target from optional parts.
    ///
    /// A common name takes precedence; otherwise both host and port are
    /// required.
    pub fn from_parts(common_name: Option<&str>, host: Option<&str>, port: Option<u16>) -> Result<Self> {
        match (common_name, host, port) {
            (Some(cn), _, _) => Ok(KillTarget::CommonName(cn.to_string())),
            (None, Some(host), Some(port)) => Ok(KillTarget::Address { host: host.to_string(), port }),
            _ => Err(Error::InvalidArgument(
                "common name or host + port combination needed".into(),
            )),
        }
    }
}

impl fmt::Display for KillTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KillTarget::CommonName(cn) => f.write_str(cn),
            KillTarget::Address { host, port } => write!(f, "{host}:{port}"),
        }
    }
}

/// `status`
pub const STATUS: &str = "status";
/// `load-stats`
pub const LOAD_STATS: &str = "load-stats";
/// `version`
pub const VERSION: &str = "version";
/// `pid`
pub const PID: &str = "pid";

/// `signal <SIG>`
pub fn signal(sig: Signal) -> String {
    format!("signal {sig}")
}

/// `verb` or `verb <n>`.
pub fn verb(level: Option<u32>) -> String {
    level_command("verb", level)
}

/// `mute` or `mute <n>`.
pub fn mute(level: Option<u32>) -> String {
    level_command("mute", level)
}

/// `kill <cn>` or `kill <host>:<port>`.
pub fn kill(target: &KillTarget) -> Result<String> {
    let target = target.to_string();
    // A line break would smuggle a second command onto the wire.
    if target.is_empty() || target.contains(['\n', '\r']) {
        return Err(Error::InvalidArgument(format!("invalid kill target {target:?}")));
    }
    Ok(format!("kill {target}"))
}

fn level_command(name: &str, level: Option<u32>) -> String {
    match level {
        Some(n) => format!("{name} {n}"),
        None => name.to_string(),
    }
}

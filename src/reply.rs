//! Reply framing and classification (outside the report parsers).
//!
//! Every command is answered either by a single `SUCCESS: <text>` /
//! `ERROR: <text>` line, or by a multi-line block whose last line starts with
//! `END`. Lines starting with `>` are asynchronous notifications and never
//! belong to a reply.

use std::fmt;

use crate::error::{Error, Result};

const SUCCESS_PREFIX: &str = "SUCCESS: ";
const ERROR_PREFIX: &str = "ERROR: ";
const SUCCESS_MARKER: &str = "SUCCESS:";
const ERROR_MARKER: &str = "ERROR:";
const END_PREFIX: &str = "END";
const NOTIFICATION_PREFIX: char = '>';

/// The three ways the daemon can answer a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// `SUCCESS: <payload>`.
    Success(String),
    /// `ERROR: <message>`.
    Error(String),
    /// A multi-line block, terminator line included.
    Raw(Vec<String>),
}

impl CommandResult {
    /// Classify a reply block by looking at its terminator (last) line only.
    pub fn classify(lines: Vec<String>) -> Self {
        let single = lines.last().and_then(|last| {
            if let Some(message) = strip_marker(last, ERROR_PREFIX) {
                Some(CommandResult::Error(message.to_string()))
            } else {
                strip_marker(last, SUCCESS_PREFIX)
                    .map(|payload| CommandResult::Success(payload.to_string()))
            }
        });
        single.unwrap_or(CommandResult::Raw(lines))
    }

    /// Reply as plain text.
    ///
    /// A `Raw` block is joined with `\n`, without its `END` line.
    pub fn into_text(self) -> Result<String> {
        match self {
            CommandResult::Success(payload) => Ok(payload),
            CommandResult::Error(message) => Err(Error::Remote(message)),
            CommandResult::Raw(mut lines) => {
                if lines.last().is_some_and(|l| l.starts_with(END_PREFIX)) {
                    lines.pop();
                }
                Ok(lines.join("\n"))
            }
        }
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandResult::Success(s) => write!(f, "{SUCCESS_PREFIX}{s}"),
            CommandResult::Error(s) => write!(f, "{ERROR_PREFIX}{s}"),
            CommandResult::Raw(lines) => {
                for line in lines {
                    writeln!(f, "{line}")?;
                }
                Ok(())
            }
        }
    }
}

/// Whether `line` closes a reply.
///
/// Any `SUCCESS:` or `ERROR:` line ends the reply, payload or not; only
/// [`CommandResult::classify`] requires a payload.
pub fn is_terminator(line: &str) -> bool {
    line.starts_with(SUCCESS_MARKER) || line.starts_with(ERROR_MARKER) || line.starts_with(END_PREFIX)
}

/// Whether `line` is an asynchronous `>`-prefixed notification.
pub fn is_notification(line: &str) -> bool {
    line.starts_with(NOTIFICATION_PREFIX)
}

/// `prefix` followed by at least one character.
fn strip_marker<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    line.strip_prefix(prefix).filter(|rest| !rest.is_empty())
}

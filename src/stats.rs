//! Parser for the single-line `load-stats` payload.

use crate::error::{Error, Result};

/// Server-wide counters reported by `load-stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatsSnapshot {
    /// Connected clients.
    pub clients: u64,
    /// Bytes received by the server (`bytesin`).
    pub bytes_download: u64,
    /// Bytes sent by the server (`bytesout`).
    pub bytes_upload: u64,
}

impl StatsSnapshot {
    /// Parse `nclients=<n>,bytesin=<n>,bytesout=<n>`.
    ///
    /// Fields are positional; anything after the third is ignored.
    pub fn parse(payload: &str) -> Result<Self> {
        let payload = payload.trim_end_matches(['\r', '\n']);
        let mut fields = payload.split(',');
        let mut next = |prefix: &'static str| -> Result<u64> {
            let field = fields
                .next()
                .ok_or_else(|| Error::parse(payload, "expected 3 load-stats fields"))?;
            let value = field
                .strip_prefix(prefix)
                .ok_or_else(|| Error::parse(payload, "load-stats field out of order"))?;
            value
                .parse()
                .map_err(|_| Error::parse(payload, "load-stats counter is not an integer"))
        };

        Ok(Self {
            clients: next("nclients=")?,
            bytes_download: next("bytesin=")?,
            bytes_upload: next("bytesout=")?,
        })
    }
}

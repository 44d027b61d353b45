//! Parser for the `status` report.
//!
//! The report is a flat list of lines grouped into sections by literal
//! marker lines:
//!
//! ```text
//! OpenVPN CLIENT LIST
//! Updated,Thu Jan  1 00:00:00 1970
//! Common Name,Real Address,Bytes Received,Bytes Sent,Connected Since
//! <client rows>
//! ROUTING TABLE
//! Virtual Address,Common Name,Real Address,Last Ref
//! <route rows>
//! GLOBAL STATS
//! Max bcast/mcast queue length,0
//! END
//! ```
//!
//! Lines outside the two tables are ignored.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Header line opening the client list.
pub const CLIENT_LIST_HEADER: &str =
    "Common Name,Real Address,Bytes Received,Bytes Sent,Connected Since";
/// Header line opening the routing table.
pub const ROUTING_TABLE_HEADER: &str = "Virtual Address,Common Name,Real Address,Last Ref";
/// Title line that follows the client list.
pub const ROUTING_TABLE_MARKER: &str = "ROUTING TABLE";
/// Title line that follows the routing table.
pub const GLOBAL_STATS_MARKER: &str = "GLOBAL STATS";

const CLIENT_FIELDS: usize = 5;
const ROUTE_FIELDS: usize = 4;

/// One connected peer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientRecord {
    /// `ip:port` the peer connects from.
    pub real_address: String,
    /// Bytes received from the peer.
    pub bytes_received: String,
    /// Bytes sent to the peer.
    pub bytes_sent: String,
    /// Connection timestamp as printed by the daemon.
    pub connected_since: String,
}

/// One routing-table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RouteRecord {
    /// Common name of the peer owning the route.
    pub common_name: String,
    /// `ip:port` of that peer.
    pub real_address: String,
    /// Last time the route was used.
    pub last_ref: String,
}

/// Parsed `status` report.
///
/// A common name may be connected several times, so clients map to a list
/// in report order. Virtual addresses are unique: a repeated one replaces the
/// earlier route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusReport {
    /// Common name -> connections.
    pub clients: BTreeMap<String, Vec<ClientRecord>>,
    /// Virtual address -> route.
    pub routes: BTreeMap<String, RouteRecord>,
}

impl StatusReport {
    /// Parse the lines of a `status` reply.
    pub fn parse<I, S>(lines: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = StatusReport::default();
        let mut in_clients = false;
        let mut in_routes = false;

        for line in lines {
            let line = line.as_ref().trim_end_matches(['\r', '\n']);

            // Footers first: a title line must never be read as a row.
            if line == ROUTING_TABLE_MARKER {
                in_clients = false;
            }
            if line == GLOBAL_STATS_MARKER || line.starts_with("END") {
                in_clients = false;
                in_routes = false;
            }

            if in_clients {
                let [cn, real_address, bytes_received, bytes_sent, connected_since] =
                    split_fields::<CLIENT_FIELDS>(line, "expected 5 client list fields")?;
                report.clients.entry(cn.to_string()).or_default().push(ClientRecord {
                    real_address: real_address.to_string(),
                    bytes_received: bytes_received.to_string(),
                    bytes_sent: bytes_sent.to_string(),
                    connected_since: connected_since.to_string(),
                });
            }

            if in_routes {
                let [virtual_address, common_name, real_address, last_ref] =
                    split_fields::<ROUTE_FIELDS>(line, "expected 4 routing table fields")?;
                report.routes.insert(
                    virtual_address.to_string(),
                    RouteRecord {
                        common_name: common_name.to_string(),
                        real_address: real_address.to_string(),
                        last_ref: last_ref.to_string(),
                    },
                );
            }

            // Headers last: the section starts on the next line.
            if line == CLIENT_LIST_HEADER {
                in_clients = true;
            }
            if line == ROUTING_TABLE_HEADER {
                in_routes = true;
            }
        }

        Ok(report)
    }

    /// Total number of client connections across all common names.
    pub fn connection_count(&self) -> usize {
        self.clients.values().map(Vec::len).sum()
    }
}

fn split_fields<'a, const N: usize>(line: &'a str, reason: &'static str) -> Result<[&'a str; N]> {
    let mut fields = [""; N];
    let mut parts = line.split(',');
    for field in fields.iter_mut() {
        *field = parts.next().ok_or_else(|| Error::parse(line, reason))?;
    }
    if parts.next().is_some() {
        return Err(Error::parse(line, reason));
    }
    Ok(fields)
}

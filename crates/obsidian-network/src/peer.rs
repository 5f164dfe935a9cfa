//! Peer RPC surface and the transport seam.
//!
//! The wire protocol (framing, message encoding, request/response matching)
//! lives outside this crate. The host supplies a [`PeerTransport`] that
//! turns sockets into typed [`PeerRpc`] handles; the workers here only see
//! the typed calls.

use crate::{NetworkError, NetworkResult};
use obsidian_chain::{Block, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::{IpAddr, TcpStream};
use std::time::Duration;

/// Per-peer transport statistics, as reported by the wire layer and
/// augmented with the peer's advertised version and height.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerStats {
    /// Last advertised protocol version.
    pub version: String,
    /// Last advertised tip height.
    pub height: u64,
    /// Bytes received from this peer.
    pub bytes_received: u64,
    /// Bytes sent to this peer.
    pub bytes_sent: u64,
    /// Smoothed request latency in milliseconds.
    pub latency_ms: u64,
}

/// Typed RPC surface over one remote peer.
///
/// Every call may fail with [`NetworkError::Transport`] on connection loss,
/// timeout, or an undecodable response.
pub trait PeerRpc: Send {
    /// Fetch the peer's self-description. The payload is free-form; see
    /// [`RemoteInfo`] for the schema this crate requires of it.
    fn get_info(&mut self) -> NetworkResult<Value>;

    /// Relay transactions to the peer.
    fn send_transactions(&mut self, transactions: &[Transaction]) -> NetworkResult<()>;

    /// Relay a block to the peer.
    fn send_block(&mut self, block: &Block) -> NetworkResult<()>;

    /// Fetch the peer's unconfirmed transactions.
    fn unconfirmed_transactions(&mut self) -> NetworkResult<Vec<Transaction>>;

    /// Fetch a single block by height and id.
    fn get_block(&mut self, height: u64, id: &str) -> NetworkResult<Block>;

    /// Fetch the blocks with heights in `start..=end`, ascending. The peer
    /// may return fewer blocks than requested, or none.
    fn get_blocks(&mut self, start: u64, end: u64) -> NetworkResult<Vec<Block>>;

    /// Fetch transport statistics for this peer.
    fn peer_stats(&mut self) -> NetworkResult<PeerStats>;
}

/// Factory for peer handles, implemented by the wire layer.
pub trait PeerTransport: Send + Sync {
    /// Dial a peer and perform the wire-level handshake.
    fn dial(
        &self,
        addr: IpAddr,
        port: u16,
        timeout: Duration,
    ) -> NetworkResult<Box<dyn PeerRpc + Send>>;

    /// Wrap an accepted inbound stream in a peer handle.
    fn accept(&self, stream: TcpStream, addr: IpAddr) -> NetworkResult<Box<dyn PeerRpc + Send>>;
}

/// The fields this crate requires of a peer's info payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteInfo {
    /// Peer's protocol version.
    pub version: String,
    /// Peer's tip height.
    pub tip_height: u64,
    /// Addresses of peers the remote node is advertising.
    pub peers: Vec<String>,
}

impl RemoteInfo {
    /// Extract the typed fields from a free-form info payload.
    ///
    /// Any missing or ill-typed field is a schema violation and yields
    /// [`NetworkError::MalformedInfo`].
    pub fn from_value(value: &Value) -> NetworkResult<Self> {
        let version = value
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| NetworkError::MalformedInfo("missing version".to_string()))?
            .to_string();

        let tip_height = value
            .get("tipHeight")
            .and_then(Value::as_u64)
            .ok_or_else(|| NetworkError::MalformedInfo("missing tipHeight".to_string()))?;

        let peers = match value.get("peers") {
            Some(Value::Array(entries)) => entries
                .iter()
                .map(|entry| {
                    entry
                        .as_str()
                        .map(str::to_string)
                        .ok_or_else(|| {
                            NetworkError::MalformedInfo("non-string peer entry".to_string())
                        })
                })
                .collect::<NetworkResult<Vec<String>>>()?,
            Some(_) => {
                return Err(NetworkError::MalformedInfo(
                    "peers is not a list".to_string(),
                ))
            }
            None => return Err(NetworkError::MalformedInfo("missing peers".to_string())),
        };

        Ok(Self {
            version,
            tip_height,
            peers,
        })
    }
}

/// The major component of a dotted version string.
pub fn major_version(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remote_info_parses() {
        let value = json!({
            "version": "1.2.3",
            "tipHeight": 42,
            "peers": ["10.0.0.2", "10.0.0.3"],
        });

        let info = RemoteInfo::from_value(&value).unwrap();
        assert_eq!(info.version, "1.2.3");
        assert_eq!(info.tip_height, 42);
        assert_eq!(info.peers, vec!["10.0.0.2", "10.0.0.3"]);
    }

    #[test]
    fn test_remote_info_schema_violations() {
        let missing_version = json!({ "tipHeight": 1, "peers": [] });
        assert!(matches!(
            RemoteInfo::from_value(&missing_version),
            Err(NetworkError::MalformedInfo(_))
        ));

        let bad_height = json!({ "version": "1.0.0", "tipHeight": "tall", "peers": [] });
        assert!(matches!(
            RemoteInfo::from_value(&bad_height),
            Err(NetworkError::MalformedInfo(_))
        ));

        let bad_peers = json!({ "version": "1.0.0", "tipHeight": 1, "peers": [7] });
        assert!(matches!(
            RemoteInfo::from_value(&bad_peers),
            Err(NetworkError::MalformedInfo(_))
        ));
    }

    #[test]
    fn test_major_version() {
        assert_eq!(major_version("1.4.0"), "1");
        assert_eq!(major_version("2.0.0"), "2");
        assert_eq!(major_version("3"), "3");
    }
}

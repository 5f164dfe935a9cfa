//! Temporary address bans.

use dashmap::DashMap;
use tracing::debug;

/// How long a ban lasts, in seconds.
pub const BAN_DURATION_SECS: u64 = 24 * 60 * 60;

/// In-memory table of banned addresses.
///
/// Not persisted: after a restart, bans re-establish themselves through
/// score accumulation.
#[derive(Default)]
pub struct BanList {
    /// Address to ban-expiry epoch seconds.
    banned: DashMap<String, u64>,
}

impl BanList {
    /// Create an empty ban list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ban an address for [`BAN_DURATION_SECS`] from `now`.
    pub fn ban(&self, addr: &str, now: u64) {
        let expiry = now + BAN_DURATION_SECS;
        debug!(peer = %addr, expiry, "Address banned");
        self.banned.insert(addr.to_string(), expiry);
    }

    /// Whether an address is banned at `now`.
    pub fn is_banned(&self, addr: &str, now: u64) -> bool {
        self.banned
            .get(addr)
            .map(|expiry| *expiry > now)
            .unwrap_or(false)
    }

    /// Current ban expiry for an address, if any entry exists.
    pub fn expiry(&self, addr: &str) -> Option<u64> {
        self.banned.get(addr).map(|expiry| *expiry)
    }
}

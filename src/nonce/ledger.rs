//! Nonce ledger for replay attack prevention.
//!
//! Client nonces move from absent to `USED` exactly once. Server nonces are
//! recorded against the address they were issued to, and only that address
//! may move them to `USED`.
//!
//! Without a cache the ledger accepts every nonce: callers that configure no
//! cache get no replay protection.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ApiSecurityError, ApiSecurityResult, NonceErrorKind};

use super::cache::NonceCache;

/// Marker stored for consumed nonces.
pub const USED: &str = "USED";

const CLIENT_PREFIX: &str = "cnonce::";
const SERVER_PREFIX: &str = "snonce::";

/// Tracks client and server nonce state in a [`NonceCache`].
#[derive(Clone)]
pub struct NonceLedger {
    cache: Option<Arc<dyn NonceCache>>,
}

impl NonceLedger {
    /// Create a ledger backed by `cache`, or a disabled ledger for `None`.
    pub fn new(cache: Option<Arc<dyn NonceCache>>) -> Self {
        Self { cache }
    }

    /// Create a ledger backed by `cache`.
    pub fn with_cache(cache: Arc<dyn NonceCache>) -> Self {
        Self::new(Some(cache))
    }

    /// Create a ledger with no cache. Every nonce check passes.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Consume a client nonce.
    ///
    /// Fails with `ReplayedClientNonce` if it was consumed before.
    pub fn consume_client_nonce(&self, cnonce: &str) -> ApiSecurityResult<()> {
        let Some(cache) = &self.cache else {
            debug!("No nonce cache configured, skipping client nonce check");
            return Ok(());
        };

        if !cache.add(&client_key(cnonce), USED) {
            warn!(cnonce, "Client nonce already used (replay attack detected)");
            return Err(ApiSecurityError::nonce(NonceErrorKind::ReplayedClientNonce));
        }

        Ok(())
    }

    /// Record a freshly issued server nonce against the requesting address.
    ///
    /// Returns `false` if the token is already known to the cache.
    pub fn issue_server_nonce(&self, snonce: &str, ip: IpAddr) -> bool {
        let Some(cache) = &self.cache else {
            debug!("No nonce cache configured, server nonce not recorded");
            return true;
        };

        cache.add(&server_key(snonce), &ip.to_string())
    }

    /// Consume a server nonce presented from `ip`.
    ///
    /// The nonce must have been issued to `ip` and not consumed before.
    pub fn consume_server_nonce(&self, snonce: &str, ip: IpAddr) -> ApiSecurityResult<()> {
        let Some(cache) = &self.cache else {
            debug!("No nonce cache configured, skipping server nonce check");
            return Ok(());
        };

        let key = server_key(snonce);
        let ip = ip.to_string();

        let kind = match cache.get(&key) {
            None => NonceErrorKind::ServerNonceUnknown,
            Some(value) if value == USED => NonceErrorKind::ServerNonceUsed,
            Some(value) if value != ip => NonceErrorKind::ServerNonceWrongIp { ip },
            // Another request from the same address may have won the race
            Some(_) if !cache.replace(&key, &ip, USED) => NonceErrorKind::ServerNonceUsed,
            Some(_) => return Ok(()),
        };

        warn!(snonce, error = %kind, "Server nonce rejected");
        Err(ApiSecurityError::nonce(kind))
    }
}

impl std::fmt::Debug for NonceLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceLedger")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

fn client_key(cnonce: &str) -> String {
    format!("{}{}", CLIENT_PREFIX, cnonce)
}

fn server_key(snonce: &str) -> String {
    format!("{}{}", SERVER_PREFIX, snonce)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nonce::MemoryCache;
    use std::time::Duration;

    fn ledger() -> (NonceLedger, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::new(Duration::from_secs(3600)));
        (NonceLedger::with_cache(cache.clone()), cache)
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_client_nonce_used_once() {
        let (ledger, cache) = ledger();

        assert!(ledger.consume_client_nonce("abc").is_ok());
        assert_eq!(cache.get("cnonce::abc").as_deref(), Some(USED));

        let result = ledger.consume_client_nonce("abc");
        assert!(matches!(
            result,
            Err(ApiSecurityError::Nonce {
                kind: NonceErrorKind::ReplayedClientNonce
            })
        ));
    }

    #[test]
    fn test_server_nonce_recorded_against_ip() {
        let (ledger, cache) = ledger();

        assert!(ledger.issue_server_nonce("xyz", ip("192.168.1.10")));
        assert_eq!(cache.get("snonce::xyz").as_deref(), Some("192.168.1.10"));
    }

    #[test]
    fn test_server_nonce_consumed_once() {
        let (ledger, cache) = ledger();
        let client = ip("192.168.1.10");
        ledger.issue_server_nonce("xyz", client);

        assert!(ledger.consume_server_nonce("xyz", client).is_ok());
        assert_eq!(cache.get("snonce::xyz").as_deref(), Some(USED));

        let result = ledger.consume_server_nonce("xyz", client);
        assert!(matches!(
            result,
            Err(ApiSecurityError::Nonce {
                kind: NonceErrorKind::ServerNonceUsed
            })
        ));
    }

    #[test]
    fn test_server_nonce_wrong_ip() {
        let (ledger, _) = ledger();
        ledger.issue_server_nonce("xyz", ip("192.168.1.10"));

        let result = ledger.consume_server_nonce("xyz", ip("192.168.1.11"));
        assert!(matches!(
            result,
            Err(ApiSecurityError::Nonce {
                kind: NonceErrorKind::ServerNonceWrongIp { .. }
            })
        ));

        // The rightful owner can still redeem it
        assert!(ledger.consume_server_nonce("xyz", ip("192.168.1.10")).is_ok());
    }

    #[test]
    fn test_server_nonce_never_issued() {
        let (ledger, _) = ledger();

        let result = ledger.consume_server_nonce("never", ip("127.0.0.1"));
        assert!(matches!(
            result,
            Err(ApiSecurityError::Nonce {
                kind: NonceErrorKind::ServerNonceUnknown
            })
        ));
    }

    #[test]
    fn test_ipv6_addresses() {
        let (ledger, _) = ledger();
        let client = ip("::1");
        ledger.issue_server_nonce("v6", client);

        assert!(ledger.consume_server_nonce("v6", client).is_ok());
    }

    #[test]
    fn test_disabled_ledger_accepts_everything() {
        let ledger = NonceLedger::disabled();
        assert!(!ledger.is_enabled());

        assert!(ledger.consume_client_nonce("abc").is_ok());
        assert!(ledger.consume_client_nonce("abc").is_ok());
        assert!(ledger.issue_server_nonce("xyz", ip("127.0.0.1")));
        assert!(ledger.consume_server_nonce("never", ip("127.0.0.1")).is_ok());
    }

    #[test]
    fn test_concurrent_client_nonce_single_winner() {
        let (ledger, _) = ledger();

        let accepted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let ledger = ledger.clone();
                    scope.spawn(move || ledger.consume_client_nonce("race").is_ok() as usize)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(accepted, 1);
    }
}

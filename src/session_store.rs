use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Injected time source so expiry logic is testable without real delays.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

const SESSION_TTL_DAYS: i64 = 7;

#[derive(Clone, Debug)]
struct Session {
    phone: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid token")]
    Invalid,
    #[error("token expired")]
    Expired,
}

/// In-memory bearer-token store. All state dies with the process.
///
/// Validity is always decided against `expires_at`, never mere presence;
/// expired entries are evicted lazily on lookup and periodically by the
/// background sweep.
#[derive(Clone)]
pub struct SessionStore {
    tokens: Arc<RwLock<HashMap<String, Session>>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tokens: Arc::new(RwLock::new(HashMap::new())),
            clock,
            ttl: Duration::days(SESSION_TTL_DAYS),
        }
    }

    /// Issue a fresh 128-bit opaque token for a verified subject.
    pub fn issue(&self, phone: &str) -> String {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let session = Session {
            phone: phone.to_string(),
            expires_at: self.clock.now() + self.ttl,
        };
        self.tokens.write().unwrap().insert(token.clone(), session);
        token
    }

    /// Resolve a token to its subject phone number. An entry found at or past
    /// its expiry instant is removed and reported as `Expired`; once expired a
    /// token can never validate again.
    pub fn validate(&self, token: &str) -> Result<String, SessionError> {
        let session = self
            .tokens
            .read()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or(SessionError::Invalid)?;

        if self.clock.now() >= session.expires_at {
            self.tokens.write().unwrap().remove(token);
            return Err(SessionError::Expired);
        }
        Ok(session.phone)
    }

    /// Remove a token unconditionally (logout).
    pub fn revoke(&self, token: &str) {
        self.tokens.write().unwrap().remove(token);
    }

    /// Drop every expired entry; returns how many were removed. Lazy eviction
    /// in `validate` stays the correctness mechanism, this only bounds memory
    /// under login churn.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut guard = self.tokens.write().unwrap();
        let before = guard.len();
        guard.retain(|_, session| session.expires_at > now);
        before - guard.len()
    }

    #[cfg(test)]
    fn contains(&self, token: &str) -> bool {
        self.tokens.read().unwrap().contains_key(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockClock {
        now: RwLock<DateTime<Utc>>,
    }

    impl MockClock {
        fn starting_at(now: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self {
                now: RwLock::new(now),
            })
        }

        fn advance(&self, delta: Duration) {
            let mut guard = self.now.write().unwrap();
            *guard += delta;
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.read().unwrap()
        }
    }

    fn epoch() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn unknown_token_is_invalid() {
        let store = SessionStore::new();
        assert_eq!(store.validate("no-such-token"), Err(SessionError::Invalid));
    }

    #[test]
    fn issued_token_resolves_to_subject() {
        let store = SessionStore::new();
        let token = store.issue("+15551234567");
        assert_eq!(store.validate(&token).unwrap(), "+15551234567");
    }

    #[test]
    fn tokens_are_fixed_length_and_unique() {
        let store = SessionStore::new();
        let a = store.issue("+15551234567");
        let b = store.issue("+15551234567");
        assert_eq!(a.len(), 32);
        assert_eq!(b.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn token_valid_until_expiry_then_never_again() {
        let clock = MockClock::starting_at(epoch());
        let store = SessionStore::with_clock(clock.clone());
        let token = store.issue("+15551234567");

        clock.advance(Duration::days(7) - Duration::seconds(1));
        assert!(store.validate(&token).is_ok());

        // At the expiry instant the entry is removed as a side effect
        clock.advance(Duration::seconds(1));
        assert_eq!(store.validate(&token), Err(SessionError::Expired));
        assert!(!store.contains(&token));

        // Monotonic: once expired, never valid again
        assert_eq!(store.validate(&token), Err(SessionError::Invalid));
    }

    #[test]
    fn revoke_removes_live_token() {
        let store = SessionStore::new();
        let token = store.issue("+15551234567");
        store.revoke(&token);
        assert_eq!(store.validate(&token), Err(SessionError::Invalid));
    }

    #[test]
    fn sweep_drops_only_expired_entries() {
        let clock = MockClock::starting_at(epoch());
        let store = SessionStore::with_clock(clock.clone());
        let stale = store.issue("+15550000001");
        clock.advance(Duration::days(4));
        let fresh = store.issue("+15550000002");
        clock.advance(Duration::days(4));

        assert_eq!(store.sweep_expired(), 1);
        assert!(!store.contains(&stale));
        assert!(store.validate(&fresh).is_ok());
    }
}

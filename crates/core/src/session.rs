//! Cookie-based session state, persisted per [`ConnectionIdentity`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ports::{StateStore, StateStoreExt};
use crate::{AtelierError, ConnectionIdentity};

/// Ordered cookie jar for one identity.
///
/// Entries are `name=value` pairs. Names are unique; updating a cookie
/// replaces the entry in place so the order of first appearance is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    cookies: Vec<String>,
}

impl Session {
    /// Builds a session from stored `name=value` pairs.
    pub fn from_cookies<I, S>(cookies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut session = Self::default();
        session.update(cookies);
        session
    }

    /// Merges `Set-Cookie` values (attributes after `;` are dropped).
    pub fn update<I, S>(&mut self, set_cookies: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for raw in set_cookies {
            let Some(pair) = cookie_pair(raw.as_ref()) else {
                continue;
            };
            let name = cookie_name(pair);
            match self.cookies.iter_mut().find(|c| cookie_name(c) == name) {
                Some(existing) => *existing = pair.to_string(),
                None => self.cookies.push(pair.to_string()),
            }
        }
    }

    /// Returns the cookies in order.
    pub fn cookies(&self) -> &[String] {
        &self.cookies
    }

    /// Returns `true` if no cookie is held.
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Value for a `Cookie` request header.
    pub fn header_value(&self) -> String {
        self.cookies.join("; ")
    }
}

fn cookie_pair(raw: &str) -> Option<&str> {
    let pair = raw.split(';').next().unwrap_or_default().trim();
    if pair.is_empty() || !pair.contains('=') {
        None
    } else {
        Some(pair)
    }
}

fn cookie_name(pair: &str) -> &str {
    pair.split('=').next().unwrap_or_default().trim()
}

/// Stored form of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSession {
    cookies: Vec<String>,
    updated_at: DateTime<Utc>,
}

/// Persistent per-identity session cookies over a [`StateStore`].
///
/// Reads and writes are not transactional: two concurrent updates for the
/// same identity interleave with last-write-wins per cookie name.
#[derive(Clone)]
pub struct SessionCache {
    store: Arc<dyn StateStore>,
}

impl SessionCache {
    /// Creates a cache backed by `store`.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Returns the session for `identity` (empty if none is stored).
    pub fn session(&self, identity: &ConnectionIdentity) -> Session {
        self.store
            .get_as::<StoredSession>(&identity.session_key())
            .map(|stored| Session::from_cookies(stored.cookies))
            .unwrap_or_default()
    }

    /// Returns the cookies stored for `identity`.
    pub fn cookies(&self, identity: &ConnectionIdentity) -> Vec<String> {
        self.session(identity).cookies
    }

    /// Replaces the cookies stored for `identity`.
    pub fn set_cookies(
        &self,
        identity: &ConnectionIdentity,
        cookies: Vec<String>,
    ) -> Result<(), AtelierError> {
        let stored = StoredSession {
            cookies,
            updated_at: Utc::now(),
        };
        self.store.put(&identity.session_key(), &stored)
    }

    /// Forgets the session for `identity`.
    pub fn clear(&self, identity: &ConnectionIdentity) -> Result<(), AtelierError> {
        self.store.remove(&identity.session_key())
    }

    /// Merges `Set-Cookie` values into the stored session and persists the
    /// result. Returns the merged cookies.
    pub fn update_cookies<I, S>(
        &self,
        identity: &ConnectionIdentity,
        set_cookies: I,
    ) -> Result<Vec<String>, AtelierError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut session = self.session(identity);
        let before = session.clone();
        session.update(set_cookies);
        if session != before {
            self.set_cookies(identity, session.cookies.clone())?;
        }
        Ok(session.cookies)
    }

    /// Time of the last write for `identity`, if a session is stored.
    pub fn updated_at(&self, identity: &ConnectionIdentity) -> Option<DateTime<Utc>> {
        self.store
            .get_as::<StoredSession>(&identity.session_key())
            .map(|stored| stored.updated_at)
    }
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use serde_json::Value;

    use super::*;

    #[derive(Default)]
    struct MapStore(Mutex<HashMap<String, Value>>);

    impl StateStore for MapStore {
        fn get(&self, key: &str) -> Option<Value> {
            self.0.lock().unwrap().get(key).cloned()
        }

        fn update(&self, key: &str, value: Option<Value>) -> Result<(), AtelierError> {
            let mut map = self.0.lock().unwrap();
            match value {
                Some(v) => map.insert(key.to_string(), v),
                None => map.remove(key),
            };
            Ok(())
        }
    }

    fn identity() -> ConnectionIdentity {
        ConnectionIdentity::new("localhost", 52773)
    }

    #[test]
    fn update_replaces_by_name_and_keeps_first_order() {
        let cache = SessionCache::new(Arc::new(MapStore::default()));
        cache.update_cookies(&identity(), ["a=1", "b=2"]).unwrap();
        let merged = cache.update_cookies(&identity(), ["a=3"]).unwrap();
        assert_eq!(merged, vec!["a=3", "b=2"]);
        assert_eq!(cache.cookies(&identity()), vec!["a=3", "b=2"]);
    }

    #[test]
    fn update_is_idempotent() {
        let cache = SessionCache::new(Arc::new(MapStore::default()));
        let first = cache.update_cookies(&identity(), ["a=1", "b=2"]).unwrap();
        let second = cache.update_cookies(&identity(), ["a=1", "b=2"]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn set_cookie_attributes_are_stripped() {
        let mut session = Session::default();
        session.update([
            "CSPSESSIONID-SP-52773-UP-api-=0010000; path=/api/; httpOnly;",
            "CSPWSERVERID=abc; path=/",
        ]);
        assert_eq!(
            session.header_value(),
            "CSPSESSIONID-SP-52773-UP-api-=0010000; CSPWSERVERID=abc"
        );
    }

    #[test]
    fn names_are_matched_exactly_not_by_prefix() {
        let mut session = Session::from_cookies(["ab=1"]);
        session.update(["a=2"]);
        assert_eq!(session.cookies(), ["ab=1", "a=2"]);
    }

    #[test]
    fn sessions_are_keyed_by_identity_and_clearable() {
        let cache = SessionCache::new(Arc::new(MapStore::default()));
        let other = ConnectionIdentity::new("localhost", 1972);
        cache.update_cookies(&identity(), ["a=1"]).unwrap();
        assert!(cache.cookies(&other).is_empty());
        assert!(cache.updated_at(&identity()).is_some());

        cache.clear(&identity()).unwrap();
        assert!(cache.cookies(&identity()).is_empty());
    }
}

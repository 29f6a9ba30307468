//! TTL-gated proxy snapshot cache
//!
//! Each validator tag cycles through STALE → REFRESHING → FRESH → STALE.
//! A snapshot is stale while it is empty or once it is older than the TTL.
//! Fresh snapshots are served from memory. A stale snapshot triggers one
//! store query; callers arriving while that query is in flight receive the
//! previous snapshot instead of waiting for it.

use crate::proxy::ProxyEndpoint;
use crate::storage::{lock_storage, SharedStorage, Storage};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Snapshot of the proxies for one validator tag
#[derive(Debug, Clone, Default)]
struct CachedProxies {
    /// Endpoints from the last non-empty store result
    endpoints: Arc<Vec<ProxyEndpoint>>,

    /// When the store was last queried, successfully or not
    last_refreshed: Option<DateTime<Utc>>,
}

impl CachedProxies {
    /// Checks whether the snapshot needs a store query
    ///
    /// An empty snapshot is always stale, so proxies added to the store are
    /// picked up on the next call. A non-empty one is stale once its last
    /// query is at least `ttl` old.
    fn is_stale(&self, ttl: Duration) -> bool {
        if self.endpoints.is_empty() {
            return true;
        }
        match self.last_refreshed {
            None => true,
            Some(at) => Utc::now() - at >= ttl,
        }
    }
}

/// Removes a tag from the in-flight set when the refresh finishes
struct RefreshGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    validator: String,
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&self.validator);
        }
    }
}

/// Rotating, TTL-refreshed set of egress proxies
///
/// Safe to share between workers. Reads take a read lock only; at most one
/// refresh per validator tag runs at a time.
pub struct ProxyCache<S: Storage> {
    storage: SharedStorage<S>,
    ttl: Duration,
    snapshots: RwLock<HashMap<String, CachedProxies>>,
    in_flight: Mutex<HashSet<String>>,
    cursor: AtomicUsize,
}

impl<S: Storage> ProxyCache<S> {
    /// Creates an empty cache backed by `storage`
    ///
    /// # Arguments
    ///
    /// * `storage` - The catalog store holding proxy endpoints
    /// * `ttl` - How long a fetched snapshot is served without re-querying
    pub fn new(storage: SharedStorage<S>, ttl: std::time::Duration) -> Self {
        Self {
            storage,
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::weeks(520)),
            snapshots: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Returns the active proxies for a validator tag
    ///
    /// Serves the cached snapshot while it is fresh. Once stale, queries the
    /// store and replaces the snapshot only if the query returned at least one
    /// endpoint; an empty result or a store error keeps the previous set. The
    /// refresh timestamp moves forward on every query attempt.
    pub fn get_active_proxies(&self, validator: &str) -> Arc<Vec<ProxyEndpoint>> {
        let current = self.snapshot(validator);
        if !current.is_stale(self.ttl) {
            return current.endpoints;
        }

        let Some(_guard) = self.begin_refresh(validator) else {
            tracing::debug!("Proxy refresh for {} in flight, serving previous set", validator);
            return current.endpoints;
        };

        // Another caller may have finished a refresh between the two checks
        let current = self.snapshot(validator);
        if !current.is_stale(self.ttl) {
            return current.endpoints;
        }

        let queried = lock_storage(&self.storage).and_then(|storage| storage.query_proxies(validator));

        let endpoints = match queried {
            Ok(found) if !found.is_empty() => {
                tracing::info!("Refreshed {} proxies for {}", found.len(), validator);
                Arc::new(found)
            }
            Ok(_) if current.endpoints.is_empty() => {
                tracing::debug!("No proxies found for {}, probing direct", validator);
                current.endpoints
            }
            Ok(_) => {
                tracing::warn!(
                    "No proxies found for {}, keeping {} cached",
                    validator,
                    current.endpoints.len()
                );
                current.endpoints
            }
            Err(e) => {
                tracing::warn!(
                    "Proxy refresh for {} failed: {}, keeping {} cached",
                    validator,
                    e,
                    current.endpoints.len()
                );
                current.endpoints
            }
        };

        let refreshed = CachedProxies {
            endpoints: Arc::clone(&endpoints),
            last_refreshed: Some(Utc::now()),
        };
        match self.snapshots.write() {
            Ok(mut snapshots) => {
                snapshots.insert(validator.to_string(), refreshed);
            }
            Err(_) => tracing::error!("Proxy snapshot lock poisoned, refresh dropped"),
        }

        endpoints
    }

    /// Picks the next proxy in round-robin order
    ///
    /// Returns `None` for an empty pool, in which case the probe goes out
    /// without a proxy.
    pub fn pick<'a>(&self, endpoints: &'a [ProxyEndpoint]) -> Option<&'a ProxyEndpoint> {
        if endpoints.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % endpoints.len();
        endpoints.get(index)
    }

    fn snapshot(&self, validator: &str) -> CachedProxies {
        self.snapshots
            .read()
            .ok()
            .and_then(|snapshots| snapshots.get(validator).cloned())
            .unwrap_or_default()
    }

    fn begin_refresh(&self, validator: &str) -> Option<RefreshGuard<'_>> {
        let mut in_flight = self.in_flight.lock().ok()?;
        if !in_flight.insert(validator.to_string()) {
            return None;
        }
        Some(RefreshGuard {
            in_flight: &self.in_flight,
            validator: validator.to_string(),
        })
    }

    /// Moves a snapshot's refresh time into the past
    #[cfg(test)]
    fn backdate(&self, validator: &str, by: Duration) {
        let mut snapshots = self.snapshots.write().unwrap();
        if let Some(cached) = snapshots.get_mut(validator) {
            cached.last_refreshed = cached.last_refreshed.map(|at| at - by);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;
    use std::time::Duration as StdDuration;

    const TAG: &str = "Market_Hiapk";

    fn cache_with(proxies: &[&str]) -> (SharedStorage<SqliteStorage>, ProxyCache<SqliteStorage>) {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        for address in proxies {
            storage.insert_proxy(&ProxyEndpoint::new(*address, TAG)).unwrap();
        }
        let shared = Arc::new(Mutex::new(storage));
        let cache = ProxyCache::new(Arc::clone(&shared), StdDuration::from_secs(600));
        (shared, cache)
    }

    fn replace_proxies(storage: &SharedStorage<SqliteStorage>, proxies: &[&str]) {
        let mut storage = storage.lock().unwrap();
        // Simulate the external validator rotating its vetted set
        *storage = SqliteStorage::new_in_memory().unwrap();
        for address in proxies {
            storage.insert_proxy(&ProxyEndpoint::new(*address, TAG)).unwrap();
        }
    }

    #[test]
    fn test_first_call_queries_store() {
        let (_, cache) = cache_with(&["http://10.0.0.1:8080", "http://10.0.0.2:8080"]);
        let proxies = cache.get_active_proxies(TAG);
        assert_eq!(proxies.len(), 2);
        assert_eq!(proxies[0].validator, TAG);
    }

    #[test]
    fn test_within_ttl_returns_same_snapshot() {
        let (storage, cache) = cache_with(&["http://10.0.0.1:8080"]);
        let first = cache.get_active_proxies(TAG);

        // A store change must not be visible while the snapshot is fresh
        replace_proxies(&storage, &["http://10.0.0.9:8080"]);
        let second = cache.get_active_proxies(TAG);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second[0].address, "http://10.0.0.1:8080");
    }

    #[test]
    fn test_expired_snapshot_replaced_by_non_empty_result() {
        let (storage, cache) = cache_with(&["http://10.0.0.1:8080"]);
        let first = cache.get_active_proxies(TAG);

        replace_proxies(&storage, &["http://10.0.0.9:8080", "http://10.0.0.8:8080"]);
        cache.backdate(TAG, Duration::seconds(601));
        let second = cache.get_active_proxies(TAG);

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].address, "http://10.0.0.9:8080");
    }

    #[test]
    fn test_expired_snapshot_kept_on_empty_result() {
        let (storage, cache) = cache_with(&["http://10.0.0.1:8080"]);
        let first = cache.get_active_proxies(TAG);

        replace_proxies(&storage, &[]);
        cache.backdate(TAG, Duration::seconds(601));
        let second = cache.get_active_proxies(TAG);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second[0].address, "http://10.0.0.1:8080");
    }

    #[test]
    fn test_empty_cache_picks_up_new_proxies_immediately() {
        let (storage, cache) = cache_with(&[]);
        assert!(cache.get_active_proxies(TAG).is_empty());

        replace_proxies(&storage, &["http://10.0.0.1:8080"]);
        let proxies = cache.get_active_proxies(TAG);

        assert_eq!(proxies.len(), 1);
        assert_eq!(proxies[0].address, "http://10.0.0.1:8080");
    }

    #[test]
    fn test_kept_set_restarts_ttl_after_empty_result() {
        let (storage, cache) = cache_with(&["http://10.0.0.1:8080"]);
        let first = cache.get_active_proxies(TAG);

        replace_proxies(&storage, &[]);
        cache.backdate(TAG, Duration::seconds(601));
        assert!(Arc::ptr_eq(&first, &cache.get_active_proxies(TAG)));

        // The empty refresh above counts as a query, so the kept set is fresh
        replace_proxies(&storage, &["http://10.0.0.9:8080"]);
        let second = cache.get_active_proxies(TAG);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second[0].address, "http://10.0.0.1:8080");
    }

    #[test]
    fn test_poisoned_store_keeps_previous_set() {
        let (storage, cache) = cache_with(&["http://10.0.0.1:8080"]);
        let first = cache.get_active_proxies(TAG);

        let poisoner = Arc::clone(&storage);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the store lock");
        })
        .join();

        cache.backdate(TAG, Duration::seconds(601));
        let second = cache.get_active_proxies(TAG);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_refresh_in_flight_serves_previous_snapshot() {
        let (storage, cache) = cache_with(&["http://10.0.0.1:8080"]);
        let first = cache.get_active_proxies(TAG);
        cache.backdate(TAG, Duration::seconds(601));
        replace_proxies(&storage, &["http://10.0.0.9:8080"]);

        let guard = cache.begin_refresh(TAG).unwrap();
        let during = cache.get_active_proxies(TAG);
        assert!(Arc::ptr_eq(&first, &during));
        drop(guard);

        let after = cache.get_active_proxies(TAG);
        assert_eq!(after[0].address, "http://10.0.0.9:8080");
    }

    #[test]
    fn test_validator_tags_are_independent() {
        let (storage, cache) = cache_with(&["http://10.0.0.1:8080"]);
        storage
            .lock()
            .unwrap()
            .insert_proxy(&ProxyEndpoint::new("http://10.0.1.1:8080", "Market_Other"))
            .unwrap();

        assert_eq!(cache.get_active_proxies(TAG)[0].address, "http://10.0.0.1:8080");
        assert_eq!(
            cache.get_active_proxies("Market_Other")[0].address,
            "http://10.0.1.1:8080"
        );
    }

    #[test]
    fn test_pick_rotates() {
        let (_, cache) = cache_with(&[]);
        let pool = vec![
            ProxyEndpoint::new("http://a:1", TAG),
            ProxyEndpoint::new("http://b:1", TAG),
        ];

        let picked: Vec<_> = (0..4)
            .map(|_| cache.pick(&pool).unwrap().address.clone())
            .collect();
        assert_eq!(picked, vec!["http://a:1", "http://b:1", "http://a:1", "http://b:1"]);
        assert!(cache.pick(&[]).is_none());
    }
}

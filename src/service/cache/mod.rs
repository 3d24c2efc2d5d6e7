// =============================================================================
// FitPulse Social Fitness Backend - Read-Through Page Cache
// =============================================================================
//
// Project: FitPulse - Real-time messaging and presence backend
// License: Apache 2.0 / MIT
//
// Description:
//   Cache for paginated, append-mostly lists (message history, challenge
//   rosters). Backed by Redis when configured, otherwise by an in-process
//   LRU. The cache is advisory: every backend failure is logged and
//   swallowed, so a cache outage degrades to direct store reads instead of
//   failing requests.
//
//   Invalidation is a coarse sweep over a bounded page x limit matrix per
//   container rather than a pattern scan. Cursor-qualified keys are left to
//   expire by TTL.
//
// =============================================================================

use lru::LruCache;
use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{de::DeserializeOwned, Serialize};
use std::num::NonZeroUsize;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::Config;

/// Limits swept on invalidation. Pages cached under another limit are not
/// swept; they expire by TTL.
const SWEEP_LIMITS: [u32; 3] = [20, 50, 100];
const LOCAL_CAPACITY: usize = 4096;

struct LocalEntry {
    value: String,
    expires_at: Instant,
}

enum Backend {
    Redis(ConnectionManager),
    Local(StdMutex<LruCache<String, LocalEntry>>),
}

pub struct Service {
    backend: Backend,
    first_page_ttl: Duration,
    deep_page_ttl: Duration,
    roster_ttl: Duration,
    sweep_pages: u32,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("cache::Service")
            .field(
                "backend",
                &match self.backend {
                    Backend::Redis(_) => "redis",
                    Backend::Local(_) => "local",
                },
            )
            .finish()
    }
}

impl Service {
    pub async fn new(redis_url: Option<&str>, config: &Config) -> Self {
        let backend = match redis_url {
            Some(url) => match connect(url).await {
                Ok(manager) => Backend::Redis(manager),
                Err(e) => {
                    warn!(error = %e, "cache redis unreachable, using in-process cache");
                    local_backend()
                }
            },
            None => local_backend(),
        };
        Self {
            backend,
            first_page_ttl: Duration::from_secs(config.first_page_ttl_secs),
            deep_page_ttl: Duration::from_secs(config.deep_page_ttl_secs),
            roster_ttl: Duration::from_secs(config.roster_ttl_secs),
            sweep_pages: config.invalidation_sweep_pages,
        }
    }

    /// In-process cache with explicit TTLs, used by tests.
    pub fn local(first_page_ttl: Duration, deep_page_ttl: Duration, roster_ttl: Duration) -> Self {
        Self {
            backend: local_backend(),
            first_page_ttl,
            deep_page_ttl,
            roster_ttl,
            sweep_pages: 10,
        }
    }

    pub fn first_page_ttl(&self) -> Duration {
        self.first_page_ttl
    }

    pub fn deep_page_ttl(&self) -> Duration {
        self.deep_page_ttl
    }

    pub fn roster_ttl(&self) -> Duration {
        self.roster_ttl
    }

    pub fn page_key(container: &str, page: u32, limit: u32, before_millis: Option<i64>) -> String {
        match before_millis {
            Some(cursor) => format!("pages:{container}:p{page}:l{limit}:b{cursor}"),
            None => format!("pages:{container}:p{page}:l{limit}"),
        }
    }

    pub fn roster_key(room_id: i64) -> String {
        format!("roster:{room_id}")
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                match conn.get::<_, Option<String>>(key).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(error = %e, key, "cache get failed");
                        None
                    }
                }
            }
            Backend::Local(cache) => {
                let mut cache = cache.lock().expect("cache mutex");
                match cache.get(key) {
                    Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
                    Some(_) => {
                        cache.pop(key);
                        None
                    }
                    None => None,
                }
            }
        };
        raw.and_then(|raw| match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(error = %e, key, "discarding undecodable cache entry");
                None
            }
        })
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(error = %e, key, "unserializable cache value dropped");
                return;
            }
        };
        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                let seconds = ttl.as_secs().max(1) as u64;
                if let Err(e) = conn.set_ex::<_, _, ()>(key, raw, seconds).await {
                    warn!(error = %e, key, "cache set failed");
                }
            }
            Backend::Local(cache) => {
                cache.lock().expect("cache mutex").put(
                    key.to_owned(),
                    LocalEntry {
                        value: raw,
                        expires_at: Instant::now() + ttl,
                    },
                );
            }
        }
    }

    pub async fn delete(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }
        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                if let Err(e) = conn.del::<_, i64>(keys.to_vec()).await {
                    warn!(error = %e, "cache delete failed");
                }
            }
            Backend::Local(cache) => {
                let mut cache = cache.lock().expect("cache mutex");
                for key in keys {
                    cache.pop(key);
                }
            }
        }
    }

    /// Coarse over-invalidation: drop every cursorless page key in the swept
    /// page x limit matrix for this container.
    pub async fn invalidate_container(&self, container: &str) {
        let mut keys = Vec::with_capacity(self.sweep_pages as usize * SWEEP_LIMITS.len());
        for page in 1..=self.sweep_pages {
            for limit in SWEEP_LIMITS {
                keys.push(Self::page_key(container, page, limit, None));
            }
        }
        self.delete(&keys).await;
    }

    pub async fn invalidate_roster(&self, room_id: i64) {
        self.delete(&[Self::roster_key(room_id)]).await;
    }
}

fn local_backend() -> Backend {
    Backend::Local(StdMutex::new(LruCache::new(
        NonZeroUsize::new(LOCAL_CAPACITY).expect("capacity is non-zero"),
    )))
}

async fn connect(url: &str) -> redis::RedisResult<ConnectionManager> {
    let client = redis::Client::open(url)?;
    ConnectionManager::new(client).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cache() -> Service {
        Service::local(
            Duration::from_secs(30),
            Duration::from_secs(3600),
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let cache = test_cache();
        let key = Service::page_key("room:1", 2, 50, None);
        cache.set(&key, &vec![1, 2, 3], Duration::from_secs(60)).await;
        assert_eq!(cache.get::<Vec<i32>>(&key).await, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = test_cache();
        cache.set("k", &"v", Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get::<String>("k").await, None);
    }

    #[tokio::test]
    async fn test_invalidation_sweeps_page_matrix() {
        let cache = test_cache();
        let page2 = Service::page_key("room:7", 2, 50, None);
        let page9 = Service::page_key("room:7", 9, 20, None);
        let other_room = Service::page_key("room:8", 2, 50, None);
        cache.set(&page2, &"a", Duration::from_secs(60)).await;
        cache.set(&page9, &"b", Duration::from_secs(60)).await;
        cache.set(&other_room, &"c", Duration::from_secs(60)).await;

        cache.invalidate_container("room:7").await;

        assert_eq!(cache.get::<String>(&page2).await, None);
        assert_eq!(cache.get::<String>(&page9).await, None);
        assert_eq!(
            cache.get::<String>(&other_room).await,
            Some("c".to_owned()),
            "other containers are untouched"
        );
    }

    #[test]
    fn test_page_key_includes_cursor() {
        assert_eq!(
            Service::page_key("dm:abc", 1, 50, Some(1700000000000)),
            "pages:dm:abc:p1:l50:b1700000000000"
        );
        assert_eq!(Service::page_key("room:3", 4, 20, None), "pages:room:3:p4:l20");
    }
}

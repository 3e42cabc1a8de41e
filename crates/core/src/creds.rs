//! Process-wide credential cache
//!
//! One cache per process, keyed by logical account identity and guarded by a
//! single lock. Authentication failures invalidate the cache wholesale; the
//! failed operation is then retried exactly once before the failure is
//! surfaced. Adapters populate the cache; the core only invalidates it.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use crate::error::{Error, Result};

/// Opaque credential record stored per account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Bearer/auth token or storage-access token
    pub token: String,
    /// Storage endpoint the token was issued for
    pub endpoint: String,
}

/// Account-keyed credential cache with wholesale invalidation
#[derive(Debug, Default)]
pub struct CredentialCache {
    inner: Mutex<HashMap<String, Credentials>>,
}

impl CredentialCache {
    /// The process-wide cache instance
    pub fn global() -> &'static CredentialCache {
        static GLOBAL: OnceLock<CredentialCache> = OnceLock::new();
        GLOBAL.get_or_init(CredentialCache::default)
    }

    /// Cached credentials for an account, if any
    pub fn get(&self, account: &str) -> Option<Credentials> {
        self.inner.lock().expect("credential cache lock").get(account).cloned()
    }

    /// Return the cached credentials for `account`, creating them with
    /// `authenticate` on a miss. The creator runs outside any retry logic;
    /// its errors surface unchanged.
    pub fn get_or_insert_with<F>(&self, account: &str, authenticate: F) -> Result<Credentials>
    where
        F: FnOnce() -> Result<Credentials>,
    {
        if let Some(creds) = self.get(account) {
            return Ok(creds);
        }
        let creds = authenticate()?;
        self.inner
            .lock()
            .expect("credential cache lock")
            .insert(account.to_string(), creds.clone());
        Ok(creds)
    }

    /// Drop one account's cached credentials
    pub fn invalidate(&self, account: &str) {
        self.inner.lock().expect("credential cache lock").remove(account);
    }

    /// Drop every cached credential. Called when settings change or an
    /// authentication failure is observed.
    pub fn invalidate_all(&self) {
        self.inner.lock().expect("credential cache lock").clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("credential cache lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Run `op`; on `Unauthorized`, clear the cache and re-run exactly once.
///
/// Cached tokens can expire between operations. Re-running after a wholesale
/// invalidation forces re-authentication; a second `Unauthorized` is a real
/// credential problem and surfaces to the caller.
pub async fn with_auth_retry<T, F, Fut>(cache: &CredentialCache, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    match op().await {
        Err(Error::Unauthorized(msg)) => {
            tracing::info!(error = %msg, "authorization failed, clearing credential cache and retrying once");
            cache.invalidate_all();
            op().await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn creds(token: &str) -> Credentials {
        Credentials {
            token: token.to_string(),
            endpoint: "https://storage.example.com".to_string(),
        }
    }

    #[test]
    fn test_get_or_insert_caches() {
        let cache = CredentialCache::default();
        let calls = AtomicU32::new(0);

        let make = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(creds("t1"))
        };
        assert_eq!(cache.get_or_insert_with("acct", make).unwrap().token, "t1");

        let make_again = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(creds("t2"))
        };
        // hit: creator not invoked again
        assert_eq!(cache.get_or_insert_with("acct", make_again).unwrap().token, "t1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalidation() {
        let cache = CredentialCache::default();
        cache.get_or_insert_with("a", || Ok(creds("ta"))).unwrap();
        cache.get_or_insert_with("b", || Ok(creds("tb"))).unwrap();
        assert_eq!(cache.len(), 2);

        cache.invalidate("a");
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());

        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_failed_authentication_not_cached() {
        let cache = CredentialCache::default();
        let result = cache.get_or_insert_with("acct", || {
            Err(Error::Unauthorized("bad password".into()))
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_auth_retry_invalidates_and_retries_once() {
        let cache = CredentialCache::default();
        cache.get_or_insert_with("acct", || Ok(creds("stale"))).unwrap();

        let calls = AtomicU32::new(0);
        let result = with_auth_retry(&cache, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(Error::Unauthorized("token expired".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // the stale token was dropped along the way
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_auth_retry_surfaces_second_failure() {
        let cache = CredentialCache::default();
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_auth_retry(&cache, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Unauthorized("really denied".into())) }
        })
        .await;

        assert!(matches!(result, Err(Error::Unauthorized(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_retry_ignores_other_errors() {
        let cache = CredentialCache::default();
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_auth_retry(&cache, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Unavailable("busy".into())) }
        })
        .await;

        assert!(matches!(result, Err(Error::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

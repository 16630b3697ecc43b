//! Signing-key sources and the read-through key cache.
//!
//! [`KeyCache`] serves verifying keys by `kid` to many concurrent readers.
//! A miss (unknown `kid` or an expired TTL) triggers a refresh from the
//! [`KeySource`]; concurrent misses share a single fetch, whether it
//! succeeds or fails. After a failed fetch, further attempts wait out
//! `min_refresh_interval`. The read lock is never held while fetching.

use anyhow::{Context, Result, anyhow};
use jsonwebtoken::{
    Algorithm, DecodingKey,
    jwk::{AlgorithmParameters, EllipticCurve, Jwk, JwkSet},
};
use std::{
    collections::HashMap,
    str::FromStr,
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::decision::InvalidToken;

/// A key able to verify token signatures, with the algorithm it is used for.
#[derive(Clone)]
pub struct VerifyingKey {
    pub kid: String,
    pub algorithm: Algorithm,
    pub key: DecodingKey,
}

impl std::fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifyingKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Where the cache gets its keys from.
pub trait KeySource: Send + Sync + 'static {
    /// Fetch the full current key set.
    fn fetch(&self) -> impl Future<Output = Result<Vec<VerifyingKey>>> + Send;
}

/// Fetches a JWKS document from the identity authority.
#[derive(Clone, Debug)]
pub struct JwksSource {
    client: reqwest::Client,
    url: String,
}

impl JwksSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

}

impl KeySource for JwksSource {
    async fn fetch(&self) -> Result<Vec<VerifyingKey>> {
        let jwks = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("failed to fetch JWKS")?
            .error_for_status()
            .context("JWKS endpoint returned an error")?
            .json::<JwkSet>()
            .await
            .context("failed to parse JWKS")?;

        let keys = jwks
            .keys
            .iter()
            .filter_map(|jwk| match verifying_key(jwk) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::debug!(kid = ?jwk.common.key_id, "skipping JWK: {e}");
                    None
                }
            })
            .collect();
        Ok(keys)
    }
}

/// Convert a JWK into a [`VerifyingKey`]. Keys without a `kid` are unusable
/// since tokens select their key by `kid`.
pub fn verifying_key(jwk: &Jwk) -> Result<VerifyingKey> {
    let kid = jwk
        .common
        .key_id
        .clone()
        .ok_or_else(|| anyhow!("JWK has no kid"))?;
    let algorithm = match &jwk.common.key_algorithm {
        Some(alg) => Algorithm::from_str(&alg.to_string())
            .map_err(|_| anyhow!("unsupported JWK algorithm {alg}"))?,
        None => match &jwk.algorithm {
            AlgorithmParameters::RSA(_) => Algorithm::RS256,
            AlgorithmParameters::EllipticCurve(ec) => match ec.curve {
                EllipticCurve::P384 => Algorithm::ES384,
                _ => Algorithm::ES256,
            },
            AlgorithmParameters::OctetKeyPair(_) => Algorithm::EdDSA,
            AlgorithmParameters::OctetKey(_) => Algorithm::HS256,
        },
    };
    let key = DecodingKey::from_jwk(jwk).context("invalid JWK")?;
    Ok(VerifyingKey {
        kid,
        algorithm,
        key,
    })
}

/// A fixed key set, for deployments that pin their keys (or share an HMAC
/// secret with the issuer).
#[derive(Clone, Debug, Default)]
pub struct StaticKeys {
    keys: Vec<VerifyingKey>,
}

impl StaticKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hmac(mut self, kid: impl Into<String>, secret: &[u8]) -> Self {
        self.keys.push(VerifyingKey {
            kid: kid.into(),
            algorithm: Algorithm::HS256,
            key: DecodingKey::from_secret(secret),
        });
        self
    }

    pub fn key(mut self, key: VerifyingKey) -> Self {
        self.keys.push(key);
        self
    }
}

impl KeySource for StaticKeys {
    async fn fetch(&self) -> Result<Vec<VerifyingKey>> {
        Ok(self.keys.clone())
    }
}

/// Key lookup failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("unknown kid `{0}`")]
    Unknown(String),
    #[error("{0}")]
    Unavailable(String),
}

impl From<KeyError> for InvalidToken {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::Unknown(kid) => InvalidToken::UnknownKey(kid),
            KeyError::Unavailable(msg) => InvalidToken::KeysUnavailable(msg),
        }
    }
}

#[derive(Default)]
struct Snapshot {
    keys: HashMap<String, Arc<VerifyingKey>>,
    fetched_at: Option<Instant>,
}

impl Snapshot {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.is_some_and(|at| at.elapsed() < ttl)
    }
}

/// The last refresh that did not produce a key set.
struct Failure {
    at: Instant,
    message: String,
}

/// Timing knobs for [`KeyCache`].
#[derive(Clone, Copy, Debug)]
pub struct CachePolicy {
    /// How long a fetched key set is trusted.
    pub ttl: Duration,
    /// Minimum spacing between refreshes forced by an unknown `kid`, and
    /// between retries after a failed fetch.
    pub min_refresh_interval: Duration,
    /// Upper bound on a single fetch.
    pub fetch_timeout: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            min_refresh_interval: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

/// Concurrency-safe read-through cache of verifying keys.
pub struct KeyCache<S> {
    source: S,
    policy: CachePolicy,
    snapshot: RwLock<Snapshot>,
    // single-flight guard for refreshes, holding the last failure
    refresh: Mutex<Option<Failure>>,
}

impl<S: KeySource> KeyCache<S> {
    pub fn new(source: S, policy: CachePolicy) -> Self {
        Self {
            source,
            policy,
            snapshot: RwLock::new(Snapshot::default()),
            refresh: Mutex::new(None),
        }
    }

    /// Look up the key for `kid`, refreshing the set on a miss.
    pub async fn get(&self, kid: &str) -> Result<Arc<VerifyingKey>, KeyError> {
        let requested = Instant::now();
        {
            let snapshot = self.snapshot.read().await;
            if snapshot.is_fresh(self.policy.ttl) {
                if let Some(key) = snapshot.keys.get(kid) {
                    return Ok(key.clone());
                }
            }
        }

        let mut flight = self.refresh.lock().await;
        {
            let snapshot = self.snapshot.read().await;
            if snapshot.is_fresh(self.policy.ttl) {
                if let Some(key) = snapshot.keys.get(kid) {
                    return Ok(key.clone());
                }
                // Another task refreshed while we waited, or a refresh happened
                // recently enough that fetching again would just hammer the
                // authority with an unknown kid.
                let recent = snapshot.fetched_at.is_some_and(|at| {
                    at >= requested || at.elapsed() < self.policy.min_refresh_interval
                });
                if recent {
                    return Err(KeyError::Unknown(kid.to_string()));
                }
            }
        }

        if let Some(failure) = flight.as_ref() {
            // A fetch failed while we queued, or too recently to retry.
            if failure.at >= requested
                || failure.at.elapsed() < self.policy.min_refresh_interval
            {
                return Err(KeyError::Unavailable(failure.message.clone()));
            }
        }

        self.refresh_locked(&mut flight).await?;
        self.snapshot
            .read()
            .await
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| KeyError::Unknown(kid.to_string()))
    }

    /// Force a refresh, returning the number of keys now cached.
    pub async fn refresh(&self) -> Result<usize, KeyError> {
        let mut flight = self.refresh.lock().await;
        self.refresh_locked(&mut flight).await
    }

    async fn refresh_locked(&self, failure: &mut Option<Failure>) -> Result<usize, KeyError> {
        let fetched = match tokio::time::timeout(self.policy.fetch_timeout, self.source.fetch())
            .await
        {
            Ok(Ok(keys)) => keys,
            Ok(Err(e)) => {
                tracing::warn!("signing key refresh failed: {e:#}");
                return Err(Self::failed(failure, format!("{e:#}")));
            }
            Err(_) => {
                tracing::warn!("signing key refresh timed out");
                return Err(Self::failed(failure, "key fetch timed out".into()));
            }
        };
        *failure = None;

        let keys: HashMap<_, _> = fetched
            .into_iter()
            .map(|key| (key.kid.clone(), Arc::new(key)))
            .collect();
        let count = keys.len();
        *self.snapshot.write().await = Snapshot {
            keys,
            fetched_at: Some(Instant::now()),
        };
        tracing::info!(count, "refreshed signing keys");
        Ok(count)
    }

    fn failed(failure: &mut Option<Failure>, message: String) -> KeyError {
        *failure = Some(Failure {
            at: Instant::now(),
            message: message.clone(),
        });
        KeyError::Unavailable(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    struct Counting {
        inner: StaticKeys,
        calls: Arc<AtomicUsize>,
        delay: Duration,
        fail: bool,
    }

    impl Counting {
        fn new(inner: StaticKeys) -> Self {
            Self {
                inner,
                calls: Arc::new(AtomicUsize::new(0)),
                delay: Duration::ZERO,
                fail: false,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl KeySource for Counting {
        async fn fetch(&self) -> Result<Vec<VerifyingKey>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(anyhow!("authority unreachable"));
            }
            self.inner.fetch().await
        }
    }

    fn policy() -> CachePolicy {
        CachePolicy {
            ttl: Duration::from_secs(60),
            min_refresh_interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn fetches_lazily_and_serves_from_cache() {
        let source = Counting::new(StaticKeys::new().hmac("k1", b"secret"));
        let cache = KeyCache::new(source.clone(), policy());
        assert_eq!(source.calls(), 0);

        assert_eq!(cache.get("k1").await.unwrap().kid, "k1");
        assert_eq!(cache.get("k1").await.unwrap().kid, "k1");
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_kid_refresh_is_rate_limited() {
        let source = Counting::new(StaticKeys::new().hmac("k1", b"secret"));
        let cache = KeyCache::new(source.clone(), policy());

        cache.get("k1").await.unwrap();
        assert_eq!(
            cache.get("nope").await.unwrap_err(),
            KeyError::Unknown("nope".into())
        );
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_kid_refreshes_after_interval() {
        let source = Counting::new(StaticKeys::new().hmac("k1", b"secret"));
        let cache = KeyCache::new(
            source.clone(),
            CachePolicy {
                min_refresh_interval: Duration::ZERO,
                ..policy()
            },
        );

        cache.get("k1").await.unwrap();
        assert!(cache.get("rotated").await.is_err());
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn expired_ttl_triggers_refresh() {
        let source = Counting::new(StaticKeys::new().hmac("k1", b"secret"));
        let cache = KeyCache::new(
            source.clone(),
            CachePolicy {
                ttl: Duration::from_millis(20),
                ..policy()
            },
        );

        cache.get("k1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.get("k1").await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_fetch() {
        let mut source = Counting::new(StaticKeys::new().hmac("k1", b"secret"));
        source.delay = Duration::from_millis(50);
        let cache = Arc::new(KeyCache::new(source.clone(), policy()));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get("k1").await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn unreachable_authority_fails_closed() {
        let mut source = Counting::new(StaticKeys::new());
        source.fail = true;
        let cache = KeyCache::new(source, policy());

        let err = cache.get("k1").await.unwrap_err();
        assert!(matches!(err, KeyError::Unavailable(_)));
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_failed_fetch() {
        let mut source = Counting::new(StaticKeys::new());
        source.fail = true;
        source.delay = Duration::from_millis(20);
        let cache = Arc::new(KeyCache::new(source.clone(), policy()));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get("k1").await })
            })
            .collect();
        for task in tasks {
            assert!(matches!(
                task.await.unwrap(),
                Err(KeyError::Unavailable(_))
            ));
        }
        assert_eq!(source.calls(), 1);

        // still inside the retry interval
        assert!(cache.get("k1").await.is_err());
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn retries_after_failure_interval() {
        let mut source = Counting::new(StaticKeys::new());
        source.fail = true;
        let cache = KeyCache::new(
            source.clone(),
            CachePolicy {
                min_refresh_interval: Duration::ZERO,
                ..policy()
            },
        );

        assert!(cache.get("k1").await.is_err());
        assert!(cache.get("k1").await.is_err());
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn slow_authority_times_out() {
        let mut source = Counting::new(StaticKeys::new().hmac("k1", b"secret"));
        source.delay = Duration::from_millis(200);
        let cache = KeyCache::new(
            source,
            CachePolicy {
                fetch_timeout: Duration::from_millis(20),
                ..policy()
            },
        );

        assert_eq!(
            cache.get("k1").await.unwrap_err(),
            KeyError::Unavailable("key fetch timed out".into())
        );
    }

    #[test]
    fn rsa_jwk_without_alg_defaults_to_rs256() {
        let jwk: Jwk = serde_json::from_str(include_str!("../tests/fixtures/rsa_public.jwk.json"))
            .unwrap();
        let key = verifying_key(&jwk).unwrap();
        assert_eq!(key.kid, "test-key-1");
        assert_eq!(key.algorithm, Algorithm::RS256);
    }
}

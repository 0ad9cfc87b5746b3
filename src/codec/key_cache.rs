//! Lazily fetched, TTL-bounded public-key cache for resource servers.

// self
use crate::{
	_prelude::*,
	codec::{AccessTokenClaims, TokenVerifier},
};

/// Boxed future returned by [`PublicKeySource`] implementations.
pub type KeyFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + 'a + Send>>;

/// Supplies the broker's public key in PEM form.
pub trait PublicKeySource
where
	Self: Send + Sync,
{
	/// Fetches the current public key.
	fn fetch_public_key(&self) -> KeyFuture<'_>;
}

/// Source that always returns the same PEM, for deployments that ship the key with the config.
#[derive(Clone, Debug)]
pub struct StaticKeySource(String);
impl StaticKeySource {
	/// Wraps a PEM-encoded public key.
	pub fn new(pem: impl Into<String>) -> Self {
		Self(pem.into())
	}
}
impl PublicKeySource for StaticKeySource {
	fn fetch_public_key(&self) -> KeyFuture<'_> {
		let pem = self.0.clone();

		Box::pin(async move { Ok(pem) })
	}
}

struct CachedKey {
	verifier: Arc<TokenVerifier>,
	fetched_at: OffsetDateTime,
}

/// Caches the verifier built from a [`PublicKeySource`].
///
/// Concurrent callers share a single in-flight fetch. A signature failure against a cached
/// key triggers one refetch, which covers broker key rotation without waiting out the TTL.
pub struct PublicKeyCache {
	source: Arc<dyn PublicKeySource>,
	ttl: Duration,
	slot: AsyncMutex<Option<CachedKey>>,
}
impl PublicKeyCache {
	/// Default time a fetched key is trusted before refetching.
	pub const DEFAULT_TTL: Duration = Duration::hours(1);

	/// Creates an empty cache over the provided source.
	pub fn new(source: Arc<dyn PublicKeySource>) -> Self {
		Self { source, ttl: Self::DEFAULT_TTL, slot: AsyncMutex::new(None) }
	}

	/// Overrides the cache TTL.
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = ttl;

		self
	}

	/// Returns a verifier, fetching the key when the cache is empty or stale at `instant`.
	pub async fn verifier_at(&self, instant: OffsetDateTime) -> Result<Arc<TokenVerifier>> {
		let mut slot = self.slot.lock().await;

		if let Some(cached) = slot.as_ref().filter(|cached| instant - cached.fetched_at < self.ttl)
		{
			return Ok(cached.verifier.clone());
		}

		let pem = self.source.fetch_public_key().await?;
		let verifier = Arc::new(TokenVerifier::from_rsa_pem(pem.as_bytes())?);

		*slot = Some(CachedKey { verifier: verifier.clone(), fetched_at: instant });

		Ok(verifier)
	}

	/// Drops the cached key so the next call refetches.
	pub async fn invalidate(&self) {
		*self.slot.lock().await = None;
	}

	/// Verifies an access token for `expected_resource` using the cached key.
	pub async fn verify_for(
		&self,
		token: &str,
		expected_resource: &str,
		instant: OffsetDateTime,
	) -> Result<AccessTokenClaims> {
		let verifier = self.verifier_at(instant).await?;

		match verifier.verify_for(token, expected_resource, instant) {
			Err(e) if e.is_signature_failure() => {
				self.invalidate().await;

				let verifier = self.verifier_at(instant).await?;

				Ok(verifier.verify_for(token, expected_resource, instant)?)
			},
			result => Ok(result?),
		}
	}
}
impl Debug for PublicKeyCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PublicKeyCache").field("ttl", &self.ttl).finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::codec::{Subject, TokenSigner};

	const PRIVATE_KEY: &str = include_str!("../../tests/fixtures/broker_private.pem");
	const PUBLIC_KEY: &str = include_str!("../../tests/fixtures/broker_public.pem");
	const OTHER_PRIVATE_KEY: &str = include_str!("../../tests/fixtures/other_private.pem");
	const OTHER_PUBLIC_KEY: &str = include_str!("../../tests/fixtures/other_public.pem");

	/// Serves a scripted sequence of keys and counts fetches.
	struct ScriptedSource {
		keys: Vec<&'static str>,
		fetches: AtomicUsize,
	}
	impl PublicKeySource for ScriptedSource {
		fn fetch_public_key(&self) -> KeyFuture<'_> {
			let index = self.fetches.fetch_add(1, Ordering::SeqCst);
			let pem = self.keys[index.min(self.keys.len() - 1)].to_owned();

			Box::pin(async move { Ok(pem) })
		}
	}

	fn token(private_key: &str, exp: i64) -> String {
		TokenSigner::from_rsa_pem(private_key.as_bytes())
			.expect("Signer fixture should load.")
			.sign(&AccessTokenClaims {
				client_id: "app.example.com".into(),
				resource: "https://amcat.example.com".into(),
				subject: Subject::default(),
				exp,
				issuer: "https://middlecat.example.com".into(),
			})
			.expect("Claims should sign.")
	}

	#[tokio::test]
	async fn keys_are_cached_until_the_ttl_lapses() {
		let source = Arc::new(ScriptedSource { keys: vec![PUBLIC_KEY], fetches: AtomicUsize::new(0) });
		let cache = PublicKeyCache::new(source.clone()).with_ttl(Duration::minutes(5));
		let start = macros::datetime!(2025-01-01 00:00 UTC);

		cache.verifier_at(start).await.expect("First fetch should succeed.");
		cache.verifier_at(start + Duration::minutes(4)).await.expect("Cached key should serve.");

		assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

		cache.verifier_at(start + Duration::minutes(5)).await.expect("Stale key should refetch.");

		assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn signature_failure_triggers_one_refetch() {
		let source = Arc::new(ScriptedSource {
			keys: vec![OTHER_PUBLIC_KEY, PUBLIC_KEY],
			fetches: AtomicUsize::new(0),
		});
		let cache = PublicKeyCache::new(source.clone());
		let now = OffsetDateTime::now_utc();
		let genuine = token(PRIVATE_KEY, now.unix_timestamp() + 60);
		let forged = token(OTHER_PRIVATE_KEY, now.unix_timestamp() + 60);
		let claims = cache
			.verify_for(&genuine, "https://amcat.example.com", now)
			.await
			.expect("Rotated key should be picked up.");

		assert_eq!(claims.client_id, "app.example.com");
		assert_eq!(source.fetches.load(Ordering::SeqCst), 2);

		let err = cache
			.verify_for(&forged, "https://amcat.example.com", now)
			.await
			.expect_err("Forged token must be rejected.");

		assert!(matches!(err, Error::Verification(_)));
	}
}

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::jwk::{AlgorithmParameters, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde_json::Value;
use serde_json::map::Map;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::config::Config;
use crate::rbac::{AuthContext, TokenStatus};

const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const JWKS_MAX_KEYS: usize = 5;
const JWKS_KEY_TTL: Duration = Duration::from_secs(600);

#[derive(thiserror::Error, Debug)]
pub enum JwkError {
	#[error("failed to fetch JWKS: {0}")]
	Fetch(#[from] reqwest::Error),
	#[error("failed to parse JWKS: {0}")]
	Parse(#[from] serde_json::Error),
	#[error("token uses the unknown key {0:?}")]
	UnknownKeyId(String),
	#[error("could not construct a decoding key for {kid:?}: {error:?}")]
	Decoding {
		kid: String,
		error: jsonwebtoken::errors::Error,
	},
}

struct CacheEntry {
	key: Arc<DecodingKey>,
	fetched_at: Instant,
}

/// Bounded signing-key cache in front of the JWKS endpoint. Lookups by
/// `kid`; a miss (or a stale entry) triggers a fetch of the whole document.
/// Fetches for the same `kid` are single-flighted per key so a stampede on
/// one kid resolves with one HTTP call without serializing fetches for
/// other kids.
pub struct JwksCache {
	url: String,
	client: reqwest::Client,
	entries: std::sync::Mutex<HashMap<String, CacheEntry>>,
	inflight: AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl JwksCache {
	pub fn new(url: String) -> Result<Self, JwkError> {
		let client = reqwest::ClientBuilder::new()
			.timeout(JWKS_FETCH_TIMEOUT)
			.build()?;
		Ok(Self {
			url,
			client,
			entries: std::sync::Mutex::new(HashMap::new()),
			inflight: AsyncMutex::new(HashMap::new()),
		})
	}

	pub async fn key_for(&self, kid: &str) -> Result<Arc<DecodingKey>, JwkError> {
		if let Some(key) = self.fresh(kid) {
			return Ok(key);
		}

		let gate = {
			let mut inflight = self.inflight.lock().await;
			inflight
				.entry(kid.to_string())
				.or_insert_with(|| Arc::new(AsyncMutex::new(())))
				.clone()
		};
		let _guard = gate.lock().await;

		// Another waiter may have refreshed while we queued on the gate.
		if let Some(key) = self.fresh(kid) {
			return Ok(key);
		}

		debug!(%kid, url = %self.url, "jwks cache miss, fetching");
		let result = self.fetch().await.and_then(|jwks| self.store(jwks, kid));
		self.inflight.lock().await.remove(kid);
		result
	}

	fn fresh(&self, kid: &str) -> Option<Arc<DecodingKey>> {
		let entries = self.entries.lock().expect("jwks cache lock poisoned");
		let entry = entries.get(kid)?;
		if entry.fetched_at.elapsed() >= JWKS_KEY_TTL {
			return None;
		}
		Some(entry.key.clone())
	}

	async fn fetch(&self) -> Result<JwkSet, JwkError> {
		let response = self
			.client
			.get(&self.url)
			.send()
			.await?
			.error_for_status()?;
		let body = response.text().await?;
		Ok(serde_json::from_str(&body)?)
	}

	fn store(&self, jwks: JwkSet, want: &str) -> Result<Arc<DecodingKey>, JwkError> {
		let now = Instant::now();
		let mut found = None;
		let mut entries = self.entries.lock().expect("jwks cache lock poisoned");
		for jwk in jwks.keys {
			let Some(kid) = jwk.common.key_id.clone() else {
				continue;
			};
			let decoding = match &jwk.algorithm {
				AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
					.map_err(|error| JwkError::Decoding {
						kid: kid.clone(),
						error,
					})?,
				other => {
					warn!(%kid, ?other, "skipping non-RSA key in JWKS");
					continue;
				},
			};
			let key = Arc::new(decoding);
			if kid == want {
				found = Some(key.clone());
			}
			entries.insert(
				kid,
				CacheEntry {
					key,
					fetched_at: now,
				},
			);
		}
		while entries.len() > JWKS_MAX_KEYS {
			let oldest = entries
				.iter()
				.min_by_key(|(_, entry)| entry.fetched_at)
				.map(|(kid, _)| kid.clone());
			match oldest {
				Some(kid) => {
					entries.remove(&kid);
				},
				None => break,
			}
		}
		found.ok_or_else(|| JwkError::UnknownKeyId(want.to_string()))
	}
}

enum Mode {
	/// No user pool configured: claims are projected but nothing is ever
	/// marked verified. Must not be reachable in production deployments.
	DecodeOnly,
	Verify {
		jwks: JwksCache,
		issuer: String,
		audience: Option<String>,
	},
}

/// Classifies the Authorization header and produces the per-request
/// `AuthContext`. Classification never escapes as an error; the pipeline
/// translates the resulting status into HTTP semantics.
pub struct JwtVerifier {
	mode: Mode,
}

impl JwtVerifier {
	pub fn new(config: &Config) -> Result<Self, JwkError> {
		let mode = match (config.issuer(), config.jwks_url()) {
			(Some(issuer), Some(url)) => Mode::Verify {
				jwks: JwksCache::new(url)?,
				issuer,
				audience: config.client_id.clone(),
			},
			_ => {
				warn!("no user pool configured, running decode-only: tokens will never verify");
				Mode::DecodeOnly
			},
		};
		Ok(Self { mode })
	}

	pub async fn authenticate(&self, header: Option<&str>) -> AuthContext {
		let token = match extract_bearer(header) {
			Ok(token) => token,
			Err(status) => return AuthContext::anonymous(status),
		};
		let Some((jose, claims)) = decode_segments(token) else {
			return AuthContext::anonymous(TokenStatus::Malformed);
		};

		let alg = jose.get("alg").and_then(Value::as_str);
		let kid = match (alg, jose.get("kid").and_then(Value::as_str)) {
			(None, _) | (Some("none"), _) | (_, None) => {
				return AuthContext::from_claims(token, claims, TokenStatus::Unsigned, false);
			},
			(Some(_), Some(kid)) => kid,
		};

		match &self.mode {
			Mode::DecodeOnly => {
				AuthContext::from_claims(token, claims, TokenStatus::DecodeOnly, false)
			},
			Mode::Verify {
				jwks,
				issuer,
				audience,
			} => match verify_signed(jwks, issuer, audience.as_deref(), token, kid).await {
				Ok(verified_claims) => {
					AuthContext::from_claims(token, verified_claims, TokenStatus::Verified, true)
				},
				Err(status) => {
					debug!(reason = status.reason(), "token failed verification");
					AuthContext::from_claims(token, claims, status, false)
				},
			},
		}
	}
}

async fn verify_signed(
	jwks: &JwksCache,
	issuer: &str,
	audience: Option<&str>,
	token: &str,
	kid: &str,
) -> Result<Map<String, Value>, TokenStatus> {
	let key = jwks.key_for(kid).await.map_err(|error| {
		warn!(%kid, %error, "could not resolve signing key");
		TokenStatus::Unknown
	})?;

	let mut validation = Validation::new(Algorithm::RS256);
	validation.set_issuer(&[issuer]);
	match audience {
		Some(audience) => validation.set_audience(&[audience]),
		None => validation.validate_aud = false,
	}
	validation.validate_nbf = true;

	let data = decode::<Map<String, Value>>(token, &key, &validation).map_err(classify)?;
	Ok(data.claims)
}

fn classify(error: jsonwebtoken::errors::Error) -> TokenStatus {
	use jsonwebtoken::errors::ErrorKind;
	match error.kind() {
		ErrorKind::ExpiredSignature => TokenStatus::Expired,
		ErrorKind::ImmatureSignature => TokenStatus::NotYetValid,
		ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenStatus::InvalidSignature,
		ErrorKind::InvalidIssuer => TokenStatus::WrongIssuer,
		ErrorKind::InvalidAudience => TokenStatus::WrongAudience,
		_ => TokenStatus::Unknown,
	}
}

/// Scheme check is case-sensitive with exactly one space, per RFC 6750's
/// `Bearer` production as the original clients send it.
fn extract_bearer(header: Option<&str>) -> Result<&str, TokenStatus> {
	let header = header.ok_or(TokenStatus::Missing)?;
	let rest = header.strip_prefix("Bearer ").ok_or(TokenStatus::BadFormat)?;
	let token = rest.trim();
	if token.is_empty() {
		return Err(TokenStatus::Empty);
	}
	Ok(token)
}

type Claims = Map<String, Value>;

/// Structural decode of the compact form: at least two segments, both
/// base64url JSON objects. No verification happens here.
fn decode_segments(token: &str) -> Option<(Claims, Claims)> {
	let mut segments = token.split('.');
	let jose = decode_json_segment(segments.next()?)?;
	let claims = decode_json_segment(segments.next()?)?;
	Some((jose, claims))
}

fn decode_json_segment(segment: &str) -> Option<Claims> {
	let bytes = URL_SAFE_NO_PAD.decode(segment).ok()?;
	serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	// {"alg":"none","typ":"JWT"}.{"sub":"user1","custom:tenantId":"ABC123"}
	const UNSIGNED: &str = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.eyJzdWIiOiJ1c2VyMSIsImN1c3RvbTp0ZW5hbnRJZCI6IkFCQzEyMyJ9.";

	fn decode_only() -> JwtVerifier {
		JwtVerifier {
			mode: Mode::DecodeOnly,
		}
	}

	#[test]
	fn bearer_extraction_classifies_failures() {
		assert_eq!(extract_bearer(None), Err(TokenStatus::Missing));
		assert_eq!(extract_bearer(Some("Basic abc")), Err(TokenStatus::BadFormat));
		assert_eq!(extract_bearer(Some("bearer abc")), Err(TokenStatus::BadFormat));
		assert_eq!(extract_bearer(Some("Bearer")), Err(TokenStatus::BadFormat));
		assert_eq!(extract_bearer(Some("Bearer ")), Err(TokenStatus::Empty));
		assert_eq!(extract_bearer(Some("Bearer   ")), Err(TokenStatus::Empty));
		assert_eq!(extract_bearer(Some("Bearer abc")), Ok("abc"));
	}

	#[tokio::test]
	async fn unsigned_token_is_classified_and_projected() {
		let verifier = decode_only();
		let cx = verifier
			.authenticate(Some(&format!("Bearer {UNSIGNED}")))
			.await;
		assert_eq!(cx.status, TokenStatus::Unsigned);
		assert!(!cx.verified);
		assert_eq!(cx.user_id, "user1");
		assert_eq!(cx.tenant_id, "ABC123");
	}

	#[tokio::test]
	async fn garbage_token_is_malformed() {
		let verifier = decode_only();
		let cx = verifier.authenticate(Some("Bearer not-a-jwt")).await;
		assert_eq!(cx.status, TokenStatus::Malformed);
		assert!(!cx.verified);
	}

	#[tokio::test]
	async fn signed_token_without_pool_is_decode_only() {
		// alg RS256 with a kid, signature irrelevant: header and claims decode
		// but nothing verifies in decode-only mode.
		let jose = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","kid":"k1"}"#);
		let claims = URL_SAFE_NO_PAD.encode(r#"{"sub":"u2","custom:tenantId":"T1"}"#);
		let token = format!("{jose}.{claims}.sig");
		let verifier = decode_only();
		let cx = verifier.authenticate(Some(&format!("Bearer {token}"))).await;
		assert_eq!(cx.status, TokenStatus::DecodeOnly);
		assert!(!cx.verified);
		assert_eq!(cx.user_id, "u2");
		assert_eq!(cx.tenant_id, "T1");
	}

	fn synthetic_jwks(kids: &[&str]) -> JwkSet {
		let modulus = URL_SAFE_NO_PAD.encode([0x42u8; 256]);
		let keys: Vec<serde_json::Value> = kids
			.iter()
			.map(|kid| {
				serde_json::json!({
					"kty": "RSA",
					"kid": kid,
					"alg": "RS256",
					"use": "sig",
					"n": modulus,
					"e": "AQAB",
				})
			})
			.collect();
		serde_json::from_value(serde_json::json!({ "keys": keys })).unwrap()
	}

	fn empty_cache() -> JwksCache {
		JwksCache {
			url: "http://unused.invalid/jwks.json".to_string(),
			client: reqwest::Client::new(),
			entries: std::sync::Mutex::new(HashMap::new()),
			inflight: AsyncMutex::new(HashMap::new()),
		}
	}

	#[test]
	fn cache_is_bounded_to_five_keys() {
		let cache = empty_cache();
		cache
			.store(synthetic_jwks(&["a", "b", "c", "d", "e", "f", "g"]), "g")
			.unwrap();
		assert_eq!(
			cache.entries.lock().unwrap().len(),
			JWKS_MAX_KEYS,
			"store must evict down to the bound"
		);
	}

	#[test]
	fn stale_entries_are_not_returned() {
		let cache = empty_cache();
		cache.store(synthetic_jwks(&["a"]), "a").unwrap();
		assert!(cache.fresh("a").is_some());
		{
			let mut entries = cache.entries.lock().unwrap();
			let entry = entries.get_mut("a").unwrap();
			entry.fetched_at = Instant::now() - (JWKS_KEY_TTL + Duration::from_secs(1));
		}
		assert!(cache.fresh("a").is_none());
	}

	#[test]
	fn unknown_kid_is_an_error() {
		let cache = empty_cache();
		let err = match cache.store(synthetic_jwks(&["a"]), "missing") {
			Ok(_) => panic!("expected store to fail for an unknown key id"),
			Err(err) => err,
		};
		assert!(matches!(err, JwkError::UnknownKeyId(kid) if kid == "missing"));
	}
}

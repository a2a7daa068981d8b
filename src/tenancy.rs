use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_sts::types::Tag;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::config::Config;

const SESSION_DURATION_SECS: i32 = 900;
const SESSION_TAG_KEY: &str = "tenantId";
const MAX_CACHED_TENANTS: usize = 64;
/// Cached credentials are evicted this long before they actually expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(thiserror::Error, Debug)]
pub enum VendError {
	#[error("tenant id is empty, refusing to vend credentials")]
	EmptyTenant,
	#[error("ROLE_ARN is not configured")]
	NotConfigured,
	#[error("sts assume-role failed: {0}")]
	Sts(String),
	#[error("sts response carried no credentials")]
	NoCredentials,
}

/// Short-lived credentials scoped to one tenant. The session tag rides on
/// the assumed identity, so downstream policies keyed on
/// `${aws:PrincipalTag/tenantId}` confine every data-plane call to the
/// tenant's partition regardless of what the handler asks for.
#[derive(Clone)]
pub struct TenantCredentials {
	pub tenant_id: String,
	access_key_id: String,
	secret_access_key: SecretString,
	session_token: SecretString,
	pub expires_at: SystemTime,
}

impl TenantCredentials {
	pub fn provider(&self) -> aws_credential_types::Credentials {
		aws_credential_types::Credentials::new(
			self.access_key_id.clone(),
			self.secret_access_key.expose_secret().to_string(),
			Some(self.session_token.expose_secret().to_string()),
			Some(self.expires_at),
			"tenantgate-sts",
		)
	}
}

struct CachedCredentials {
	credentials: TenantCredentials,
	vended_at: Instant,
}

/// Vends per-call credentials by assuming the data-plane role with exactly
/// one session tag carrying the tenant id. Results are cached per tenant,
/// bounded, and evicted before the underlying credential expiry. Issuance
/// failures bubble up to the handler; there is no retry path and never a
/// fallback to another tenant.
pub struct CredentialVendor {
	sts: aws_sdk_sts::Client,
	role_arn: Option<String>,
	cache: std::sync::Mutex<HashMap<String, CachedCredentials>>,
}

impl CredentialVendor {
	pub async fn new(config: &Config) -> Self {
		let shared = aws_config::defaults(BehaviorVersion::latest())
			.region(Region::new(config.region.clone()))
			.load()
			.await;
		Self {
			sts: aws_sdk_sts::Client::new(&shared),
			role_arn: config.role_arn.clone(),
			cache: std::sync::Mutex::new(HashMap::new()),
		}
	}

	pub async fn assume_for(&self, tenant_id: &str) -> Result<TenantCredentials, VendError> {
		if tenant_id.is_empty() {
			return Err(VendError::EmptyTenant);
		}
		if let Some(credentials) = self.cached(tenant_id) {
			debug!(%tenant_id, "using cached tenant credentials");
			return Ok(credentials);
		}
		let role_arn = self.role_arn.as_deref().ok_or(VendError::NotConfigured)?;

		let tag = Tag::builder()
			.key(SESSION_TAG_KEY)
			.value(tenant_id)
			.build()
			.map_err(|e| VendError::Sts(e.to_string()))?;
		let output = self
			.sts
			.assume_role()
			.role_arn(role_arn)
			.role_session_name(session_name(tenant_id))
			.duration_seconds(SESSION_DURATION_SECS)
			.tags(tag)
			.send()
			.await
			.map_err(|e| {
				VendError::Sts(format!("{}", aws_sdk_sts::error::DisplayErrorContext(&e)))
			})?;
		let vended = output.credentials().ok_or(VendError::NoCredentials)?;

		let expires_at =
			UNIX_EPOCH + Duration::from_secs(vended.expiration().secs().max(0) as u64);
		let credentials = TenantCredentials {
			tenant_id: tenant_id.to_string(),
			access_key_id: vended.access_key_id().to_string(),
			secret_access_key: SecretString::new(vended.secret_access_key().into()),
			session_token: SecretString::new(vended.session_token().into()),
			expires_at,
		};
		info!(%tenant_id, "assumed tenant-scoped role");
		self.insert(credentials.clone());
		Ok(credentials)
	}

	fn cached(&self, tenant_id: &str) -> Option<TenantCredentials> {
		let cache = self.cache.lock().expect("credential cache lock poisoned");
		let entry = cache.get(tenant_id)?;
		let usable_until = entry.credentials.expires_at.checked_sub(EXPIRY_MARGIN)?;
		if SystemTime::now() >= usable_until {
			return None;
		}
		Some(entry.credentials.clone())
	}

	fn insert(&self, credentials: TenantCredentials) {
		let mut cache = self.cache.lock().expect("credential cache lock poisoned");
		if cache.len() >= MAX_CACHED_TENANTS
			&& !cache.contains_key(&credentials.tenant_id)
		{
			let oldest = cache
				.iter()
				.min_by_key(|(_, entry)| entry.vended_at)
				.map(|(tenant, _)| tenant.clone());
			if let Some(tenant) = oldest {
				cache.remove(&tenant);
			}
		}
		cache.insert(
			credentials.tenant_id.clone(),
			CachedCredentials {
				credentials,
				vended_at: Instant::now(),
			},
		);
	}
}

/// Role session names are limited to `[\w+=,.@-]{2,64}`.
fn session_name(tenant_id: &str) -> String {
	let safe: String = tenant_id
		.chars()
		.filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '=' | ',' | '.' | '@' | '-' | '_'))
		.collect();
	let mut name = format!("tenantgate-{safe}");
	name.truncate(64);
	if name.len() < 2 {
		name = "tenantgate".to_string();
	}
	name
}

/// Data-plane clients are built per call from vended credentials, never
/// from the process identity.
pub fn dynamodb_client(
	config: &Config,
	credentials: &TenantCredentials,
) -> aws_sdk_dynamodb::Client {
	let conf = aws_sdk_dynamodb::Config::builder()
		.behavior_version(BehaviorVersion::latest())
		.region(aws_sdk_dynamodb::config::Region::new(config.region.clone()))
		.credentials_provider(credentials.provider())
		.build();
	aws_sdk_dynamodb::Client::from_conf(conf)
}

pub fn s3_client(config: &Config, credentials: &TenantCredentials) -> aws_sdk_s3::Client {
	let conf = aws_sdk_s3::Config::builder()
		.behavior_version(BehaviorVersion::latest())
		.region(aws_sdk_s3::config::Region::new(config.region.clone()))
		.credentials_provider(credentials.provider())
		.build();
	aws_sdk_s3::Client::from_conf(conf)
}

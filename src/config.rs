use serde::Serialize;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_TABLE: &str = "TravelBookings";
const DEFAULT_BUCKET: &str = "travel-policies";

/// Process configuration, derived from the environment once at startup.
///
/// When `user_pool_id` is absent the verifier runs in decode-only mode:
/// tokens are classified and their claims projected, but nothing is ever
/// marked verified. That mode exists for local development only.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
	pub user_pool_id: Option<String>,
	pub client_id: Option<String>,
	pub region: String,
	/// Override for the IdP base URL (e.g. a cognito-local endpoint).
	pub idp_endpoint: Option<String>,
	pub role_arn: Option<String>,
	pub table_name: String,
	pub bucket_name: String,
	pub port: u16,
}

impl Config {
	pub fn from_env() -> Result<Self, anyhow::Error> {
		let port = match std::env::var("PORT") {
			Ok(raw) => raw
				.parse::<u16>()
				.map_err(|e| anyhow::anyhow!("invalid PORT {:?}: {}", raw, e))?,
			Err(_) => DEFAULT_PORT,
		};
		Ok(Config {
			user_pool_id: env_non_empty("IDP_USER_POOL_ID"),
			client_id: env_non_empty("IDP_CLIENT_ID"),
			region: env_non_empty("IDP_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
			idp_endpoint: env_non_empty("IDP_ENDPOINT"),
			role_arn: env_non_empty("ROLE_ARN"),
			table_name: env_non_empty("TABLE_NAME").unwrap_or_else(|| DEFAULT_TABLE.to_string()),
			bucket_name: env_non_empty("BUCKET_NAME").unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
			port,
		})
	}

	/// Expected `iss` claim: `https://<idp-host>/<pool>`.
	pub fn issuer(&self) -> Option<String> {
		let pool = self.user_pool_id.as_ref()?;
		Some(match &self.idp_endpoint {
			Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), pool),
			None => format!("https://cognito-idp.{}.amazonaws.com/{}", self.region, pool),
		})
	}

	pub fn jwks_url(&self) -> Option<String> {
		Some(format!("{}/.well-known/jwks.json", self.issuer()?))
	}
}

fn env_non_empty(key: &str) -> Option<String> {
	match std::env::var(key) {
		Ok(value) if !value.trim().is_empty() => Some(value),
		_ => None,
	}
}

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use serde_json::map::Map;

use crate::jsonrpc;

pub const ANONYMOUS_USER: &str = "anonymous";
pub const DEFAULT_TIER: &str = "basic";

/// Outcome of classifying the Authorization header. Never an error: the
/// verifier always produces a status, and the pipeline decides what each
/// status means for the requested method.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenStatus {
	Missing,
	BadFormat,
	Empty,
	Malformed,
	Unsigned,
	/// Signed token, but no user pool is configured so verification is
	/// unavailable. Local development only.
	DecodeOnly,
	Verified,
	Expired,
	NotYetValid,
	InvalidSignature,
	WrongIssuer,
	WrongAudience,
	Unknown,
}

impl TokenStatus {
	/// Fine-grained classification, reported by the whoami tool.
	pub fn reason(&self) -> &'static str {
		match self {
			TokenStatus::Missing => "missing",
			TokenStatus::BadFormat => "bad-format",
			TokenStatus::Empty => "empty",
			TokenStatus::Malformed => "malformed",
			TokenStatus::Unsigned => "unsigned",
			TokenStatus::DecodeOnly => "decode-only",
			TokenStatus::Verified => "verified",
			TokenStatus::Expired => "expired",
			TokenStatus::NotYetValid => "not-yet-valid",
			TokenStatus::InvalidSignature => "invalid-signature",
			TokenStatus::WrongIssuer => "wrong-issuer",
			TokenStatus::WrongAudience => "wrong-audience",
			TokenStatus::Unknown => "unknown",
		}
	}

	/// Stable message for 401 responses on protected calls.
	pub fn wire_message(&self) -> &'static str {
		match self {
			TokenStatus::Missing => "missing-token",
			TokenStatus::BadFormat => "bad-auth-format",
			TokenStatus::Empty => "empty-token",
			TokenStatus::Expired => "token-expired",
			TokenStatus::Unsigned => "unsigned-token-not-accepted",
			TokenStatus::Verified => "ok",
			_ => "token-invalid",
		}
	}

	pub fn is_unsigned(&self) -> bool {
		matches!(self, TokenStatus::Unsigned)
	}

	/// Whether the caller may proceed as anonymous. Absent and unsigned
	/// tokens are the deliberately tolerated classes; anything else is a
	/// failed authentication attempt and is rejected on protected calls.
	pub fn tolerates_anonymous(&self) -> bool {
		matches!(self, TokenStatus::Missing | TokenStatus::Unsigned)
	}
}

/// Per-request caller identity. Derived from the Authorization header on
/// receipt of the POST and dropped with the response; never persisted.
#[derive(Clone)]
pub struct AuthContext {
	pub user_id: String,
	pub tenant_id: String,
	pub tenant_tier: String,
	token: SecretString,
	pub claims: Map<String, Value>,
	pub verified: bool,
	pub status: TokenStatus,
}

impl std::fmt::Debug for AuthContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AuthContext")
			.field("user_id", &self.user_id)
			.field("tenant_id", &self.tenant_id)
			.field("tenant_tier", &self.tenant_tier)
			.field("verified", &self.verified)
			.field("status", &self.status)
			.finish()
	}
}

impl AuthContext {
	pub fn anonymous(status: TokenStatus) -> Self {
		Self {
			user_id: ANONYMOUS_USER.to_string(),
			tenant_id: String::new(),
			tenant_tier: DEFAULT_TIER.to_string(),
			token: SecretString::new("".into()),
			claims: Map::new(),
			verified: false,
			status,
		}
	}

	/// Project decoded claims into a caller identity. `verified` is
	/// downgraded when the claims carry no subject, which keeps the
	/// invariant `verified => user_id != "anonymous"`.
	pub fn from_claims(
		token: &str,
		claims: Map<String, Value>,
		status: TokenStatus,
		verified: bool,
	) -> Self {
		let user_id = claim_str(&claims, "sub");
		let tenant_id =
			claim_str(&claims, "custom:tenantId").or_else(|| claim_str(&claims, "tenantId"));
		let tenant_tier = claim_str(&claims, "custom:tenantTier");
		let (user_id, verified, status) = match user_id {
			Some(sub) => (sub, verified, status),
			None if verified => (ANONYMOUS_USER.to_string(), false, TokenStatus::Unknown),
			None => (ANONYMOUS_USER.to_string(), false, status),
		};
		Self {
			user_id,
			tenant_id: tenant_id.unwrap_or_default(),
			tenant_tier: tenant_tier.unwrap_or_else(|| DEFAULT_TIER.to_string()),
			token: SecretString::new(token.into()),
			claims,
			verified,
			status,
		}
	}

	/// Raw compact token; empty for anonymous callers.
	pub fn token(&self) -> &str {
		self.token.expose_secret()
	}

	pub fn has_token(&self) -> bool {
		!self.token.expose_secret().is_empty()
	}
}

/// Sidecar handed to the whoami handler alongside validated arguments: the
/// raw bearer value and the verifier's classification. Passed explicitly so
/// concurrent requests can never observe each other's headers.
#[derive(Clone)]
pub struct AuthInfo {
	token: SecretString,
	pub status: TokenStatus,
}

impl AuthInfo {
	pub fn new(token: &str, status: TokenStatus) -> Self {
		Self {
			token: SecretString::new(token.into()),
			status,
		}
	}

	pub fn token(&self) -> &str {
		self.token.expose_secret()
	}
}

/// Public-access policy, computed over the `(method, tool-name)` pair.
/// `tools/call` is public only when the named tool is itself public, so
/// protected tool names are never confirmed to exist for unverified callers.
pub fn is_public_request(request: &jsonrpc::Request) -> bool {
	match request.method.as_str() {
		"initialize" | "notifications/initialized" | "tools/list" => true,
		"tools/call" => request
			.params
			.as_ref()
			.and_then(|params| params.get("name"))
			.and_then(|name| name.as_str())
			.map(|name| crate::tools::PUBLIC_TOOLS.contains(&name))
			.unwrap_or(false),
		_ => false,
	}
}

/// Whether a request from an unverified caller may be dispatched at all.
///
/// Public requests always dispatch. `tools/call` also dispatches for the
/// tolerated anonymous classes: the per-request registry then answers
/// tool-not-found for protected names, so their existence is never
/// confirmed. Every other combination is rejected with 401 before
/// dispatch.
pub fn may_dispatch_unverified(request: &jsonrpc::Request, status: &TokenStatus) -> bool {
	if is_public_request(request) {
		return true;
	}
	request.method == "tools/call" && status.tolerates_anonymous()
}

fn claim_str(claims: &Map<String, Value>, key: &str) -> Option<String> {
	claims
		.get(key)
		.and_then(|value| value.as_str())
		.filter(|s| !s.is_empty())
		.map(|s| s.to_string())
}

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::mcp::ToolResult;
use crate::registry::{CallContext, InputSchema, Tool, ToolHandler, Visibility};

const FINGERPRINT_CHARS: usize = 12;

pub fn tool() -> Tool {
	Tool {
		name: "whoami",
		description: "Report the caller's identity, decoded token claims, and the trust decision",
		schema: InputSchema::empty(),
		visibility: Visibility::Public,
		handler: Arc::new(Whoami),
	}
}

struct Whoami;

#[async_trait]
impl ToolHandler for Whoami {
	async fn call(
		&self,
		_args: Map<String, Value>,
		cx: &CallContext,
	) -> Result<ToolResult, anyhow::Error> {
		let auth = &cx.auth;
		let info = &cx.auth_info;
		let token = info.token();
		let payload = json!({
			"authenticated": auth.verified,
			"userInfo": {
				"userId": auth.user_id,
				"tenantId": auth.tenant_id,
				"tenantTier": auth.tenant_tier,
			},
			"tokenInfo": {
				"present": !token.is_empty(),
				"isUnsigned": info.status.is_unsigned(),
				"status": info.status.reason(),
				"fingerprint": fingerprint(token),
				"claims": auth.claims,
			},
		});
		Ok(ToolResult::text(serde_json::to_string_pretty(&payload)?))
	}
}

fn fingerprint(token: &str) -> Value {
	if token.is_empty() {
		return Value::Null;
	}
	let head: String = token.chars().take(FINGERPRINT_CHARS).collect();
	Value::String(format!("{head}..."))
}

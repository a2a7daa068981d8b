//! Tenant travel-policy resource, served from the policy bucket under the
//! tenant's prefix with vended credentials.

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;

use crate::mcp::ResourceContents;
use crate::rbac::AuthContext;
use crate::registry::{CallContext, Resource, ResourceHandler};
use crate::tenancy::s3_client;

const POLICY_KEY: &str = "policy.md";
const POLICY_MIME: &str = "text/markdown";

pub fn resource(auth: &AuthContext) -> Resource {
	Resource {
		uri: format!("travelpolicy://{}/{POLICY_KEY}", auth.tenant_id),
		name: "travel-policy",
		description: "The tenant's travel policy document",
		mime_type: POLICY_MIME,
		handler: Arc::new(PolicyResource),
	}
}

struct PolicyResource;

#[async_trait]
impl ResourceHandler for PolicyResource {
	async fn read(
		&self,
		uri: &str,
		cx: &CallContext,
	) -> Result<ResourceContents, anyhow::Error> {
		// The object key comes from the verified context, not the URI, so a
		// crafted URI can never reach another tenant's prefix.
		let tenant = &cx.auth.tenant_id;
		let credentials = cx.vendor.assume_for(tenant).await?;
		let client = s3_client(&cx.config, &credentials);

		let output = client
			.get_object()
			.bucket(&cx.config.bucket_name)
			.key(format!("{tenant}/{POLICY_KEY}"))
			.send()
			.await
			.map_err(|e| anyhow::anyhow!("policy fetch failed: {}", DisplayErrorContext(&e)))?;
		let bytes = output
			.body
			.collect()
			.await
			.map_err(|e| anyhow::anyhow!("policy body read failed: {e}"))?
			.into_bytes();

		Ok(ResourceContents {
			uri: uri.to_string(),
			mime_type: Some(POLICY_MIME.to_string()),
			text: String::from_utf8_lossy(&bytes).into_owned(),
		})
	}
}

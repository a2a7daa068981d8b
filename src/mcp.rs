//! Wire types for the MCP methods this server implements.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PROTOCOL_VERSION: &str = "2025-03-26";
pub const SERVER_NAME: &str = env!("CARGO_PKG_NAME");
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
	pub protocol_version: String,
	pub capabilities: ServerCapabilities,
	pub server_info: Implementation,
}

impl Default for InitializeResult {
	fn default() -> Self {
		Self {
			protocol_version: PROTOCOL_VERSION.to_string(),
			capabilities: ServerCapabilities::default(),
			server_info: Implementation::default(),
		}
	}
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
	pub tools: ToolsCapability,
	pub resources: ResourcesCapability,
	pub prompts: PromptsCapability,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesCapability {}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptsCapability {}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Implementation {
	pub name: String,
	pub version: String,
}

impl Default for Implementation {
	fn default() -> Self {
		Self {
			name: SERVER_NAME.to_string(),
			version: SERVER_VERSION.to_string(),
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
	pub name: String,
	pub description: String,
	pub input_schema: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListToolsResult {
	pub tools: Vec<ToolInfo>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CallToolParams {
	pub name: String,
	#[serde(default)]
	pub arguments: Map<String, Value>,
}

/// One part of a tool result. Text for most handlers, image for handlers
/// that return rendered artifacts.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Content {
	#[serde(rename = "text")]
	Text { text: String },
	#[serde(rename = "image")]
	#[serde(rename_all = "camelCase")]
	Image { mime_type: String, data: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
	pub content: Vec<Content>,
	pub is_error: bool,
}

impl ToolResult {
	pub fn text(text: impl Into<String>) -> Self {
		Self {
			content: vec![Content::Text { text: text.into() }],
			is_error: false,
		}
	}

	/// Business failure: travels on the normal response channel so the
	/// model can read it, not as a JSON-RPC error.
	pub fn error(text: impl Into<String>) -> Self {
		Self {
			content: vec![Content::Text { text: text.into() }],
			is_error: true,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
	pub uri: String,
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub mime_type: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListResourcesResult {
	pub resources: Vec<ResourceInfo>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReadResourceParams {
	pub uri: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
	pub uri: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub mime_type: Option<String>,
	pub text: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReadResourceResult {
	pub contents: Vec<ResourceContents>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PromptArgumentInfo {
	pub name: String,
	pub description: String,
	pub required: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PromptInfo {
	pub name: String,
	pub description: String,
	pub arguments: Vec<PromptArgumentInfo>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListPromptsResult {
	pub prompts: Vec<PromptInfo>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GetPromptParams {
	pub name: String,
	#[serde(default)]
	pub arguments: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PromptMessage {
	pub role: String,
	pub content: Content,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetPromptResult {
	pub description: String,
	pub messages: Vec<PromptMessage>,
}

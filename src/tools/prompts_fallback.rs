//! Fallback tools exposing the prompt catalog to clients that do not
//! implement the `prompts/*` methods. The payloads are identical to what
//! `prompts/list` and `prompts/get` return.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::mcp::{self, ToolResult};
use crate::registry::{CallContext, Field, FieldKind, InputSchema, Tool, ToolHandler, Visibility};

pub fn list_prompts_tool() -> Tool {
	Tool {
		name: "list_prompts",
		description: "List the available prompt templates and their arguments",
		schema: InputSchema::empty(),
		visibility: Visibility::Authenticated,
		handler: Arc::new(ListPrompts),
	}
}

pub fn get_prompt_tool() -> Tool {
	Tool {
		name: "get_prompt",
		description: "Render a prompt template with the given arguments",
		schema: InputSchema::new(vec![
			Field {
				name: "name",
				description: "Prompt template name",
				kind: FieldKind::String,
				required: true,
			},
			Field {
				name: "arguments",
				description: "Template arguments",
				kind: FieldKind::Object,
				required: false,
			},
		]),
		visibility: Visibility::Authenticated,
		handler: Arc::new(GetPrompt),
	}
}

struct ListPrompts;

#[async_trait]
impl ToolHandler for ListPrompts {
	async fn call(
		&self,
		_args: Map<String, Value>,
		cx: &CallContext,
	) -> Result<ToolResult, anyhow::Error> {
		let prompts: Vec<mcp::PromptInfo> = cx
			.catalog
			.templates()
			.iter()
			.map(|template| template.info())
			.collect();
		let result = mcp::ListPromptsResult { prompts };
		Ok(ToolResult::text(serde_json::to_string_pretty(&result)?))
	}
}

struct GetPrompt;

#[async_trait]
impl ToolHandler for GetPrompt {
	async fn call(
		&self,
		args: Map<String, Value>,
		cx: &CallContext,
	) -> Result<ToolResult, anyhow::Error> {
		let name = args
			.get("name")
			.and_then(Value::as_str)
			.ok_or_else(|| anyhow::anyhow!("argument name missing after validation"))?;
		let arguments = match args.get("arguments") {
			Some(Value::Object(map)) => map.clone(),
			_ => Map::new(),
		};
		match cx.catalog.render_named(name, &arguments) {
			Ok((template, text)) => {
				let result = mcp::GetPromptResult {
					description: template.description.to_string(),
					messages: vec![mcp::PromptMessage {
						role: "user".to_string(),
						content: mcp::Content::Text { text },
					}],
				};
				Ok(ToolResult::text(serde_json::to_string_pretty(&result)?))
			},
			// Caller mistakes travel on the tool-result channel.
			Err(error) => Ok(ToolResult::error(error.to_string())),
		}
	}
}

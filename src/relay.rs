use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::jsonrpc::{self, ErrorObject, Request, Response};
use crate::mcp;
use crate::metrics::{self, IncrementRecorder, Metrics};
use crate::registry::{CallContext, Registry};

/// Per-request MCP dispatcher. Constructed fresh for every POST, bound to
/// that request's `AuthContext`, and dropped when the response closes, so
/// no caller state can leak across requests.
pub struct Relay {
	registry: Registry,
	cx: CallContext,
	metrics: Arc<Metrics>,
}

impl Relay {
	pub fn new(cx: CallContext, metrics: Arc<Metrics>) -> Self {
		let registry = Registry::for_request(&cx.auth, &cx.catalog);
		Self {
			registry,
			cx,
			metrics,
		}
	}

	/// Route one JSON-RPC request. Notifications produce no response.
	pub async fn handle(&self, request: Request) -> Option<Response> {
		let Some(id) = request.id.clone() else {
			self.handle_notification(&request);
			return None;
		};
		if request.jsonrpc != jsonrpc::VERSION {
			return Some(Response::error(
				id,
				ErrorObject::invalid_request("unsupported jsonrpc version"),
			));
		}
		debug!(method = %request.method, verified = self.cx.auth.verified, "dispatch");
		let result = match request.method.as_str() {
			"initialize" => self.initialize(),
			"tools/list" => self.list_tools(),
			"tools/call" => self.call_tool(request.params).await,
			"resources/list" => self.list_resources(),
			"resources/read" => self.read_resource(request.params).await,
			"prompts/list" => self.list_prompts(),
			"prompts/get" => self.get_prompt(request.params),
			other => Err(ErrorObject::method_not_found(format!(
				"method not found: {other}"
			))),
		};
		Some(match result {
			Ok(value) => Response::success(id, value),
			Err(error) => Response::error(id, error),
		})
	}

	fn handle_notification(&self, request: &Request) {
		match request.method.as_str() {
			"notifications/initialized" => {
				debug!("client initialized");
			},
			other => {
				debug!(method = %other, "ignoring notification");
			},
		}
	}

	fn initialize(&self) -> Result<Value, ErrorObject> {
		to_value(&mcp::InitializeResult::default())
	}

	fn list_tools(&self) -> Result<Value, ErrorObject> {
		self.metrics.increment(&metrics::ListCall {
			resource_type: "tool".to_string(),
		});
		let tools = self
			.registry
			.tools()
			.iter()
			.map(|tool| mcp::ToolInfo {
				name: tool.name.to_string(),
				description: tool.description.to_string(),
				input_schema: tool.schema.to_json_schema(),
			})
			.collect();
		to_value(&mcp::ListToolsResult { tools })
	}

	async fn call_tool(&self, params: Option<Value>) -> Result<Value, ErrorObject> {
		let params: mcp::CallToolParams = parse_params(params)?;
		// Protected tools are not registered for unverified callers, so an
		// invisible tool and an unknown tool answer identically.
		let Some(tool) = self.registry.tool(&params.name) else {
			return Err(ErrorObject::method_not_found(format!(
				"tool not found: {}",
				params.name
			)));
		};
		tool.schema
			.validate(&params.arguments)
			.map_err(ErrorObject::invalid_params)?;

		self.metrics.increment(&metrics::ToolCall {
			tool: tool.name.to_string(),
		});
		info!(tool = tool.name, tenant = %self.cx.auth.tenant_id, "tool call");
		match tool.handler.call(params.arguments, &self.cx).await {
			Ok(result) => {
				debug_assert!(
					!result.content.is_empty(),
					"handlers must return at least one content part"
				);
				if result.is_error {
					self.metrics.increment(&metrics::ToolCallError {
						tool: tool.name.to_string(),
						error_type: "business".to_string(),
					});
				}
				to_value(&result)
			},
			Err(error) => {
				error!(tool = tool.name, %error, "tool handler failed");
				self.metrics.increment(&metrics::ToolCallError {
					tool: tool.name.to_string(),
					error_type: "internal".to_string(),
				});
				Err(ErrorObject::internal())
			},
		}
	}

	fn list_resources(&self) -> Result<Value, ErrorObject> {
		self.metrics.increment(&metrics::ListCall {
			resource_type: "resource".to_string(),
		});
		let resources = self
			.registry
			.resources()
			.iter()
			.map(|resource| mcp::ResourceInfo {
				uri: resource.uri.clone(),
				name: resource.name.to_string(),
				description: Some(resource.description.to_string()),
				mime_type: Some(resource.mime_type.to_string()),
			})
			.collect();
		to_value(&mcp::ListResourcesResult { resources })
	}

	async fn read_resource(&self, params: Option<Value>) -> Result<Value, ErrorObject> {
		let params: mcp::ReadResourceParams = parse_params(params)?;
		let Some(resource) = self.registry.resource(&params.uri) else {
			return Err(ErrorObject::invalid_params(format!(
				"resource not found: {}",
				params.uri
			)));
		};
		self.metrics.increment(&metrics::ResourceRead {
			uri: params.uri.clone(),
		});
		match resource.handler.read(&params.uri, &self.cx).await {
			Ok(contents) => to_value(&mcp::ReadResourceResult {
				contents: vec![contents],
			}),
			Err(error) => {
				error!(uri = %params.uri, %error, "resource read failed");
				Err(ErrorObject::internal())
			},
		}
	}

	fn list_prompts(&self) -> Result<Value, ErrorObject> {
		self.metrics.increment(&metrics::ListCall {
			resource_type: "prompt".to_string(),
		});
		let prompts = self
			.registry
			.prompts()
			.iter()
			.map(|template| template.info())
			.collect();
		to_value(&mcp::ListPromptsResult { prompts })
	}

	fn get_prompt(&self, params: Option<Value>) -> Result<Value, ErrorObject> {
		let params: mcp::GetPromptParams = parse_params(params)?;
		let Some(template) = self.registry.prompt(&params.name) else {
			return Err(ErrorObject::invalid_params(format!(
				"prompt not found: {}",
				params.name
			)));
		};
		self.metrics.increment(&metrics::PromptGet {
			name: params.name.clone(),
		});
		let text = self
			.cx
			.catalog
			.render(template, &params.arguments)
			.map_err(|error| match error {
				crate::prompts::PromptError::Render(e) => {
					error!(prompt = template.name, %e, "prompt render failed");
					ErrorObject::internal()
				},
				other => ErrorObject::invalid_params(other.to_string()),
			})?;
		to_value(&mcp::GetPromptResult {
			description: template.description.to_string(),
			messages: vec![mcp::PromptMessage {
				role: "user".to_string(),
				content: mcp::Content::Text { text },
			}],
		})
	}
}

impl Drop for Relay {
	fn drop(&mut self) {
		debug!("dispatcher closed");
	}
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, ErrorObject> {
	serde_json::from_value(params.unwrap_or(Value::Null))
		.map_err(|e| ErrorObject::invalid_params(format!("invalid params: {e}")))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ErrorObject> {
	serde_json::to_value(value).map_err(|e| {
		error!(%e, "result serialization failed");
		ErrorObject::internal()
	})
}

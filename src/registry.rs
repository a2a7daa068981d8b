use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::config::Config;
use crate::mcp::{ResourceContents, ToolResult};
use crate::prompts::{PromptCatalog, PromptTemplate};
use crate::rbac::{AuthContext, AuthInfo};
use crate::tenancy::CredentialVendor;

/// Everything a handler may need for one call. Assembled per request and
/// dropped with it; the vendor, config and catalog inside are the only
/// process-lived pieces.
pub struct CallContext {
	pub auth: AuthContext,
	pub auth_info: AuthInfo,
	pub config: Arc<Config>,
	pub vendor: Arc<CredentialVendor>,
	pub catalog: Arc<PromptCatalog>,
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
	async fn call(
		&self,
		args: Map<String, Value>,
		cx: &CallContext,
	) -> Result<ToolResult, anyhow::Error>;
}

#[async_trait]
pub trait ResourceHandler: Send + Sync {
	async fn read(&self, uri: &str, cx: &CallContext)
	-> Result<ResourceContents, anyhow::Error>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
	Public,
	Authenticated,
}

pub struct Tool {
	pub name: &'static str,
	pub description: &'static str,
	pub schema: InputSchema,
	pub visibility: Visibility,
	pub handler: Arc<dyn ToolHandler>,
}

pub struct Resource {
	pub uri: String,
	pub name: &'static str,
	pub description: &'static str,
	pub mime_type: &'static str,
	pub handler: Arc<dyn ResourceHandler>,
}

/// Declarative argument schema. Renders to JSON Schema for `tools/list`
/// and validates `tools/call` arguments before the handler runs.
pub struct InputSchema {
	fields: Vec<Field>,
}

pub struct Field {
	pub name: &'static str,
	pub description: &'static str,
	pub kind: FieldKind,
	pub required: bool,
}

pub enum FieldKind {
	String,
	/// ISO calendar date, `YYYY-MM-DD`.
	Date,
	Integer {
		min: i64,
		max: i64,
	},
	Enum(&'static [&'static str]),
	/// Free-form JSON object, validated only for shape.
	Object,
}

impl InputSchema {
	pub fn new(fields: Vec<Field>) -> Self {
		Self { fields }
	}

	pub fn empty() -> Self {
		Self { fields: Vec::new() }
	}

	pub fn to_json_schema(&self) -> Value {
		let mut properties = Map::new();
		let mut required = Vec::new();
		for field in &self.fields {
			let property = match &field.kind {
				FieldKind::String => json!({"type": "string", "description": field.description}),
				FieldKind::Date => json!({
					"type": "string",
					"format": "date",
					"description": field.description,
				}),
				FieldKind::Integer { min, max } => json!({
					"type": "integer",
					"minimum": min,
					"maximum": max,
					"description": field.description,
				}),
				FieldKind::Enum(values) => json!({
					"type": "string",
					"enum": values,
					"description": field.description,
				}),
				FieldKind::Object => json!({"type": "object", "description": field.description}),
			};
			properties.insert(field.name.to_string(), property);
			if field.required {
				required.push(Value::String(field.name.to_string()));
			}
		}
		json!({
			"type": "object",
			"properties": properties,
			"required": required,
		})
	}

	pub fn validate(&self, args: &Map<String, Value>) -> Result<(), String> {
		for key in args.keys() {
			if !self.fields.iter().any(|field| field.name == key) {
				return Err(format!("unknown argument: {key}"));
			}
		}
		for field in &self.fields {
			let value = match args.get(field.name) {
				Some(value) => value,
				None if field.required => {
					return Err(format!("missing required argument: {}", field.name));
				},
				None => continue,
			};
			field.kind.check(field.name, value)?;
		}
		Ok(())
	}
}

impl FieldKind {
	fn check(&self, name: &str, value: &Value) -> Result<(), String> {
		match self {
			FieldKind::String => {
				value
					.as_str()
					.ok_or_else(|| format!("argument {name} must be a string"))?;
				Ok(())
			},
			FieldKind::Date => {
				let raw = value
					.as_str()
					.ok_or_else(|| format!("argument {name} must be a date string"))?;
				chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
					.map_err(|_| format!("argument {name} must be a YYYY-MM-DD date"))?;
				Ok(())
			},
			FieldKind::Integer { min, max } => {
				let n = value
					.as_i64()
					.ok_or_else(|| format!("argument {name} must be an integer"))?;
				if n < *min || n > *max {
					return Err(format!("argument {name} must be between {min} and {max}"));
				}
				Ok(())
			},
			FieldKind::Enum(values) => {
				let raw = value
					.as_str()
					.ok_or_else(|| format!("argument {name} must be a string"))?;
				if !values.contains(&raw) {
					return Err(format!("argument {name} must be one of {values:?}"));
				}
				Ok(())
			},
			FieldKind::Object => {
				if !value.is_object() {
					return Err(format!("argument {name} must be an object"));
				}
				Ok(())
			},
		}
	}
}

/// Per-request view of the tool/resource/prompt surface, built from the
/// caller's verification state. An unverified caller's registry simply
/// does not contain protected entries, so `tools/list` visibility and
/// `tools/call` reachability can never disagree.
pub struct Registry {
	tools: Vec<Tool>,
	resources: Vec<Resource>,
	prompts: Vec<&'static PromptTemplate>,
}

impl Registry {
	pub fn for_request(auth: &AuthContext, catalog: &PromptCatalog) -> Self {
		let mut registry = Self {
			tools: Vec::new(),
			resources: Vec::new(),
			prompts: Vec::new(),
		};
		for tool in crate::tools::public_tools() {
			registry.register_tool(tool);
		}
		if auth.verified {
			for tool in crate::tools::protected_tools() {
				registry.register_tool(tool);
			}
			registry.register_resource(crate::tools::policy::resource(auth));
			registry.prompts = catalog.templates().iter().collect();
		}
		registry
	}

	fn register_tool(&mut self, tool: Tool) {
		assert!(
			!self.tools.iter().any(|t| t.name == tool.name),
			"duplicate tool name: {}",
			tool.name
		);
		self.tools.push(tool);
	}

	fn register_resource(&mut self, resource: Resource) {
		assert!(
			!self.resources.iter().any(|r| r.uri == resource.uri),
			"duplicate resource uri: {}",
			resource.uri
		);
		self.resources.push(resource);
	}

	pub fn tools(&self) -> &[Tool] {
		&self.tools
	}

	pub fn tool(&self, name: &str) -> Option<&Tool> {
		self.tools.iter().find(|tool| tool.name == name)
	}

	pub fn resources(&self) -> &[Resource] {
		&self.resources
	}

	pub fn resource(&self, uri: &str) -> Option<&Resource> {
		self.resources.iter().find(|resource| resource.uri == uri)
	}

	pub fn prompts(&self) -> &[&'static PromptTemplate] {
		&self.prompts
	}

	pub fn prompt(&self, name: &str) -> Option<&PromptTemplate> {
		self.prompts
			.iter()
			.find(|prompt| prompt.name == name)
			.copied()
	}
}

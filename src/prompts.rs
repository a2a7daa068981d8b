//! Prompt catalog and `{{var}}` rendering.
//!
//! Substitution is not escaped in any way: rendered prompts are LLM-facing
//! text and must not be embedded into HTML or JSON contexts downstream.

use minijinja::{Environment, UndefinedBehavior};
use serde_json::{Map, Value};

use crate::mcp;

#[derive(thiserror::Error, Debug)]
pub enum PromptError {
	#[error("prompt not found: {0}")]
	Unknown(String),
	#[error("missing required argument: {0}")]
	MissingArgument(&'static str),
	#[error("template render failed: {0}")]
	Render(#[from] minijinja::Error),
}

#[derive(Debug)]
pub struct PromptArgument {
	pub name: &'static str,
	pub description: &'static str,
	pub required: bool,
}

#[derive(Debug)]
pub struct PromptTemplate {
	pub name: &'static str,
	pub description: &'static str,
	pub arguments: &'static [PromptArgument],
	template: &'static str,
	/// Computes synthetic variables from the supplied arguments before
	/// substitution runs.
	synthesize: fn(&mut Map<String, Value>),
}

impl PromptTemplate {
	pub fn info(&self) -> mcp::PromptInfo {
		mcp::PromptInfo {
			name: self.name.to_string(),
			description: self.description.to_string(),
			arguments: self
				.arguments
				.iter()
				.map(|arg| mcp::PromptArgumentInfo {
					name: arg.name.to_string(),
					description: arg.description.to_string(),
					required: arg.required,
				})
				.collect(),
		}
	}
}

static TEMPLATES: &[PromptTemplate] = &[
	PromptTemplate {
		name: "plan_trip",
		description: "Draft a trip plan using the tenant's hotel inventory and booking tools",
		arguments: &[
			PromptArgument {
				name: "destination",
				description: "City to travel to",
				required: true,
			},
			PromptArgument {
				name: "start_date",
				description: "First day of the trip, YYYY-MM-DD",
				required: true,
			},
			PromptArgument {
				name: "nights",
				description: "Number of nights to stay",
				required: false,
			},
			PromptArgument {
				name: "budget",
				description: "Total budget in USD",
				required: false,
			},
			PromptArgument {
				name: "preferences",
				description: "Traveler preferences to honor",
				required: false,
			},
		],
		template: "Plan a trip to {{destination}} starting {{start_date}} for {{nights_text}}{{budget_text}}. \
			Traveler preferences: {{preferences}}. \
			Use the find_hotels tool to check availability, the travel policy resource to stay compliant, \
			and book_hotel only after confirming the traveler's choice.",
		synthesize: plan_trip_vars,
	},
	PromptTemplate {
		name: "review_policy",
		description: "Summarize the tenant travel policy for a topic",
		arguments: &[PromptArgument {
			name: "topic",
			description: "Policy area to focus on",
			required: false,
		}],
		template: "Read the tenant travel policy resource and summarize the rules about {{topic}}. \
			Cross-check the latest entries from list_bookings and flag any booking that looks non-compliant.",
		synthesize: review_policy_vars,
	},
];

fn plan_trip_vars(vars: &mut Map<String, Value>) {
	let budget_text = match vars.get("budget") {
		Some(budget) => format!(" with a budget of {} USD", stringify(budget)),
		None => String::new(),
	};
	vars.insert("budget_text".to_string(), Value::String(budget_text));

	let nights_text = match vars.get("nights") {
		Some(nights) => format!("{} nights", stringify(nights)),
		None => "a few nights".to_string(),
	};
	vars.insert("nights_text".to_string(), Value::String(nights_text));

	vars.entry("preferences")
		.or_insert_with(|| Value::String("no special preferences".to_string()));
}

fn review_policy_vars(vars: &mut Map<String, Value>) {
	vars.entry("topic")
		.or_insert_with(|| Value::String("general travel".to_string()));
}

fn stringify(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}

/// Process-lived, immutable after startup.
pub struct PromptCatalog {
	env: Environment<'static>,
}

impl Default for PromptCatalog {
	fn default() -> Self {
		let mut env = Environment::new();
		env.set_undefined_behavior(UndefinedBehavior::Lenient);
		Self { env }
	}
}

impl PromptCatalog {
	pub fn templates(&self) -> &'static [PromptTemplate] {
		TEMPLATES
	}

	pub fn get(&self, name: &str) -> Option<&'static PromptTemplate> {
		TEMPLATES.iter().find(|template| template.name == name)
	}

	/// Pure: the same `(template, arguments)` pair always renders the same
	/// string.
	pub fn render(
		&self,
		template: &PromptTemplate,
		args: &Map<String, Value>,
	) -> Result<String, PromptError> {
		for arg in template.arguments {
			if arg.required && !args.contains_key(arg.name) {
				return Err(PromptError::MissingArgument(arg.name));
			}
		}
		let mut vars = args.clone();
		(template.synthesize)(&mut vars);
		Ok(self.env.render_str(template.template, &vars)?)
	}

	pub fn render_named(
		&self,
		name: &str,
		args: &Map<String, Value>,
	) -> Result<(&'static PromptTemplate, String), PromptError> {
		let template = self
			.get(name)
			.ok_or_else(|| PromptError::Unknown(name.to_string()))?;
		let text = self.render(template, args)?;
		Ok((template, text))
	}
}

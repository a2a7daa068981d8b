use std::sync::Arc;

use axum::{Router, extract::State, http::StatusCode, routing::get};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

pub fn sub_registry(registry: &mut Registry) -> &mut Registry {
	registry.sub_registry_with_prefix("tenantgate")
}

pub trait Recorder<E, T> {
	/// Record the given event
	fn record(&self, event: &E, meta: T);
}

pub trait IncrementRecorder<E>: Recorder<E, u64> {
	/// Record the given event by incrementing the counter
	fn increment(&self, event: &E);
}

impl<E, R> IncrementRecorder<E> for R
where
	R: Recorder<E, u64>,
{
	fn increment(&self, event: &E) {
		self.record(event, 1);
	}
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ToolCall {
	pub tool: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ToolCallError {
	pub tool: String,
	pub error_type: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ListCall {
	pub resource_type: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ResourceRead {
	pub uri: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PromptGet {
	pub name: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct AuthFailure {
	pub reason: String,
}

pub struct Metrics {
	tool_calls: Family<ToolCall, Counter>,
	tool_call_errors: Family<ToolCallError, Counter>,
	list_calls: Family<ListCall, Counter>,
	resource_reads: Family<ResourceRead, Counter>,
	prompt_gets: Family<PromptGet, Counter>,
	auth_failures: Family<AuthFailure, Counter>,
}

impl Metrics {
	pub fn new(registry: &mut Registry) -> Self {
		let tool_calls = Family::default();
		registry.register(
			"tool_calls",
			"The total number of tool calls",
			tool_calls.clone(),
		);

		let tool_call_errors = Family::default();
		registry.register(
			"tool_call_errors",
			"The total number of tool call errors",
			tool_call_errors.clone(),
		);

		let list_calls = Family::default();
		registry.register(
			"list_calls",
			"The total number of list calls",
			list_calls.clone(),
		);

		let resource_reads = Family::default();
		registry.register(
			"resource_reads",
			"The total number of resource reads",
			resource_reads.clone(),
		);

		let prompt_gets = Family::default();
		registry.register(
			"prompt_gets",
			"The total number of prompt renders",
			prompt_gets.clone(),
		);

		let auth_failures = Family::default();
		registry.register(
			"auth_failures",
			"The total number of rejected protected calls, by reason",
			auth_failures.clone(),
		);

		Self {
			tool_calls,
			tool_call_errors,
			list_calls,
			resource_reads,
			prompt_gets,
			auth_failures,
		}
	}
}

impl Recorder<ToolCall, u64> for Metrics {
	fn record(&self, event: &ToolCall, count: u64) {
		self.tool_calls.get_or_create(event).inc_by(count);
	}
}

impl Recorder<ToolCallError, u64> for Metrics {
	fn record(&self, event: &ToolCallError, count: u64) {
		self.tool_call_errors.get_or_create(event).inc_by(count);
	}
}

impl Recorder<ListCall, u64> for Metrics {
	fn record(&self, event: &ListCall, count: u64) {
		self.list_calls.get_or_create(event).inc_by(count);
	}
}

impl Recorder<ResourceRead, u64> for Metrics {
	fn record(&self, event: &ResourceRead, count: u64) {
		self.resource_reads.get_or_create(event).inc_by(count);
	}
}

impl Recorder<PromptGet, u64> for Metrics {
	fn record(&self, event: &PromptGet, count: u64) {
		self.prompt_gets.get_or_create(event).inc_by(count);
	}
}

impl Recorder<AuthFailure, u64> for Metrics {
	fn record(&self, event: &AuthFailure, count: u64) {
		self.auth_failures.get_or_create(event).inc_by(count);
	}
}

/// Admin app serving the metrics registry.
#[derive(Clone, Default)]
pub struct App {
	registry: Arc<Registry>,
}

impl App {
	pub fn new(registry: Arc<Registry>) -> Self {
		Self { registry }
	}
	pub fn router(&self) -> Router {
		Router::new()
			.route("/metrics", get(metrics_handler))
			.with_state(self.clone())
	}
}

async fn metrics_handler(State(app): State<App>) -> Result<String, StatusCode> {
	let mut buffer = String::new();
	encode(&mut buffer, &app.registry).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
	Ok(buffer)
}

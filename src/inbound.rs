use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use bytes::Bytes;
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};

use crate::authn::JwtVerifier;
use crate::config::Config;
use crate::jsonrpc::{self, Envelope, ErrorObject, Id};
use crate::mcp;
use crate::metrics::{self, IncrementRecorder, Metrics};
use crate::prompts::PromptCatalog;
use crate::rbac::{self, AuthInfo};
use crate::registry::CallContext;
use crate::relay::Relay;
use crate::tenancy::CredentialVendor;
use crate::transport;

/// Bodies above this limit answer 413 before any parsing happens.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Process-lived state behind the HTTP front door. Everything per-request
/// (dispatcher, transport framing, AuthContext) is built inside the POST
/// handler and dropped when the response closes.
#[derive(Clone)]
pub struct App {
	config: Arc<Config>,
	verifier: Arc<JwtVerifier>,
	vendor: Arc<CredentialVendor>,
	catalog: Arc<PromptCatalog>,
	metrics: Arc<Metrics>,
	started: Instant,
}

impl App {
	pub async fn new(config: Arc<Config>, metrics: Arc<Metrics>) -> Result<Self, anyhow::Error> {
		let verifier = Arc::new(JwtVerifier::new(&config)?);
		let vendor = Arc::new(CredentialVendor::new(&config).await);
		Ok(Self {
			config,
			verifier,
			vendor,
			catalog: Arc::new(PromptCatalog::default()),
			metrics,
			started: Instant::now(),
		})
	}

	pub fn router(&self) -> Router {
		let cors = CorsLayer::new()
			.allow_origin(Any)
			.allow_methods([
				Method::GET,
				Method::POST,
				Method::DELETE,
				Method::PUT,
				Method::PATCH,
			])
			.allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
		Router::new()
			.route("/health", get(health_handler))
			.route(
				"/mcp",
				post(mcp_post_handler)
					.get(transport::method_not_allowed)
					.delete(transport::method_not_allowed),
			)
			.layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
			.layer(cors)
			.layer(CatchPanicLayer::custom(panic_handler))
			.with_state(self.clone())
	}
}

async fn health_handler(State(app): State<App>) -> Json<serde_json::Value> {
	Json(json!({
		"status": "ok",
		"name": mcp::SERVER_NAME,
		"version": mcp::SERVER_VERSION,
		"protocolVersion": mcp::PROTOCOL_VERSION,
		"uptimeSecs": app.started.elapsed().as_secs(),
	}))
}

async fn mcp_post_handler(
	State(app): State<App>,
	headers: HeaderMap,
	body: Bytes,
) -> Response {
	let auth_header = headers
		.get(header::AUTHORIZATION)
		.map(|value| value.to_str().unwrap_or(""));
	let auth = app.verifier.authenticate(auth_header).await;

	let envelope: Envelope = match serde_json::from_slice(&body) {
		Ok(envelope) => envelope,
		Err(e) => {
			return Json(jsonrpc::Response::error(
				Id::Null,
				ErrorObject::invalid_request(format!("invalid JSON-RPC envelope: {e}")),
			))
			.into_response();
		},
	};

	// Public requests tolerate missing or invalid tokens, and tool calls
	// from the tolerated anonymous classes fall through to the registry's
	// deniability answer. Everything else fails fast before dispatch.
	if !auth.verified {
		if let Some(protected) = envelope
			.requests()
			.iter()
			.find(|request| !rbac::may_dispatch_unverified(request, &auth.status))
		{
			let reason = auth.status.wire_message();
			app.metrics.increment(&metrics::AuthFailure {
				reason: reason.to_string(),
			});
			warn!(method = %protected.method, reason, "rejecting unverified protected call");
			let id = protected.id.clone().unwrap_or(Id::Null);
			let error = ErrorObject::new(jsonrpc::AUTH_ERROR, reason).with_data(json!({
				"reason": reason,
				"detail": format!("authentication required ({})", auth.status.reason()),
			}));
			return (
				StatusCode::UNAUTHORIZED,
				Json(jsonrpc::Response::error(id, error)),
			)
				.into_response();
		}
	}

	let wants_sse = transport::wants_event_stream(&headers);
	let auth_info = AuthInfo::new(auth.token(), auth.status);
	let cx = CallContext {
		auth,
		auth_info,
		config: app.config.clone(),
		vendor: app.vendor.clone(),
		catalog: app.catalog.clone(),
	};
	let relay = Relay::new(cx, app.metrics.clone());
	transport::serve(relay, envelope, wants_sse).await
}

fn panic_handler(_err: Box<dyn std::any::Any + Send + 'static>) -> Response {
	error!("request handler panicked");
	(
		StatusCode::INTERNAL_SERVER_ERROR,
		Json(jsonrpc::Response::error(Id::Null, ErrorObject::internal())),
	)
		.into_response()
}

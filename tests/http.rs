//! Black-box tests driving the real router: discovery, token
//! classification, visibility gating, transport framing, and the error
//! surface, with a wiremock-served JWKS endpoint for the signed paths.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http_body_util::BodyExt;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use once_cell::sync::Lazy;
use prometheus_client::registry::Registry;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::LineEnding;
use rsa::traits::PublicKeyParts;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tenantgate::config::Config;
use tenantgate::inbound::{App, MAX_BODY_BYTES};
use tenantgate::metrics::{self, Metrics};

const POOL: &str = "us-east-1_TestPool";
const CLIENT_ID: &str = "client-abc";
const KID: &str = "test-key-1";

// Unsigned token: {"alg":"none","typ":"JWT"}.{"sub":"user1","custom:tenantId":"ABC123"}
const UNSIGNED_TOKEN: &str = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.eyJzdWIiOiJ1c2VyMSIsImN1c3RvbTp0ZW5hbnRJZCI6IkFCQzEyMyJ9.";

struct TestKey {
	pem: String,
	n: String,
	e: String,
}

static KEYPAIR: Lazy<TestKey> = Lazy::new(|| {
	let mut rng = rand::thread_rng();
	let private = rsa::RsaPrivateKey::new(&mut rng, 2048).expect("generate RSA key");
	let pem = private
		.to_pkcs1_pem(LineEnding::LF)
		.expect("encode private key")
		.to_string();
	let public = private.to_public_key();
	TestKey {
		pem,
		n: URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
		e: URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
	}
});

fn base_config() -> Config {
	Config {
		user_pool_id: None,
		client_id: None,
		region: "us-east-1".to_string(),
		idp_endpoint: None,
		role_arn: None,
		table_name: "TravelBookings".to_string(),
		bucket_name: "travel-policies".to_string(),
		port: 0,
	}
}

async fn anonymous_app() -> Router {
	build_app(base_config()).await
}

async fn build_app(config: Config) -> Router {
	let mut registry = Registry::default();
	let app_metrics = Arc::new(Metrics::new(metrics::sub_registry(&mut registry)));
	App::new(Arc::new(config), app_metrics)
		.await
		.expect("app construction")
		.router()
}

/// App wired to a wiremock JWKS endpoint so signed tokens verify.
async fn verified_app() -> (Router, MockServer) {
	let server = MockServer::start().await;
	let jwks = json!({
		"keys": [{
			"kty": "RSA",
			"kid": KID,
			"alg": "RS256",
			"use": "sig",
			"n": KEYPAIR.n,
			"e": KEYPAIR.e,
		}]
	});
	Mock::given(method("GET"))
		.and(path(format!("/{POOL}/.well-known/jwks.json")))
		.respond_with(ResponseTemplate::new(200).set_body_json(jwks))
		.mount(&server)
		.await;

	let mut config = base_config();
	config.user_pool_id = Some(POOL.to_string());
	config.client_id = Some(CLIENT_ID.to_string());
	config.idp_endpoint = Some(server.uri());
	let router = build_app(config).await;
	(router, server)
}

fn issuer(server: &MockServer) -> String {
	format!("{}/{POOL}", server.uri())
}

fn now_secs() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("clock before epoch")
		.as_secs()
}

fn sign_token(claims: &Value) -> String {
	let header = Header {
		alg: Algorithm::RS256,
		kid: Some(KID.to_string()),
		..Default::default()
	};
	let key = EncodingKey::from_rsa_pem(KEYPAIR.pem.as_bytes()).expect("load signing key");
	jsonwebtoken::encode(&header, claims, &key).expect("sign token")
}

fn valid_claims(server: &MockServer) -> Value {
	json!({
		"sub": "user-42",
		"iss": issuer(server),
		"aud": CLIENT_ID,
		"iat": now_secs(),
		"exp": now_secs() + 3600,
		"custom:tenantId": "ABC123",
		"custom:tenantTier": "premium",
	})
}

async fn post_mcp(
	router: &Router,
	body: Value,
	bearer: Option<&str>,
	accept: Option<&str>,
) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
	let mut request = Request::builder()
		.method("POST")
		.uri("/mcp")
		.header(header::CONTENT_TYPE, "application/json");
	if let Some(token) = bearer {
		request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
	}
	if let Some(accept) = accept {
		request = request.header(header::ACCEPT, accept);
	}
	let request = request
		.body(Body::from(body.to_string()))
		.expect("build request");
	let response = router.clone().oneshot(request).await.expect("send request");
	let status = response.status();
	let headers = response.headers().clone();
	let bytes = response
		.into_body()
		.collect()
		.await
		.expect("read body")
		.to_bytes()
		.to_vec();
	(status, headers, bytes)
}

fn parse(bytes: &[u8]) -> Value {
	serde_json::from_slice(bytes).expect("response body is JSON")
}

fn whoami_payload(body: &Value) -> Value {
	let text = body["result"]["content"][0]["text"]
		.as_str()
		.expect("text content");
	serde_json::from_str(text).expect("whoami payload is JSON")
}

#[tokio::test]
async fn anonymous_discovery_lists_only_whoami() {
	let router = anonymous_app().await;
	let (status, _, bytes) = post_mcp(
		&router,
		json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
		None,
		None,
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	let body = parse(&bytes);
	let tools = body["result"]["tools"].as_array().unwrap();
	assert_eq!(tools.len(), 1);
	assert_eq!(tools[0]["name"], "whoami");
}

#[tokio::test]
async fn unsigned_token_reaches_whoami() {
	let router = anonymous_app().await;
	let (status, _, bytes) = post_mcp(
		&router,
		json!({
			"jsonrpc": "2.0",
			"id": 2,
			"method": "tools/call",
			"params": {"name": "whoami", "arguments": {}},
		}),
		Some(UNSIGNED_TOKEN),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	let payload = whoami_payload(&parse(&bytes));
	assert_eq!(payload["authenticated"], false);
	assert_eq!(payload["userInfo"]["tenantId"], "ABC123");
	assert_eq!(payload["tokenInfo"]["isUnsigned"], true);
}

#[tokio::test]
async fn protected_tool_with_unsigned_token_is_not_found() {
	let router = anonymous_app().await;
	let (status, _, bytes) = post_mcp(
		&router,
		json!({
			"jsonrpc": "2.0",
			"id": 3,
			"method": "tools/call",
			"params": {"name": "list_bookings", "arguments": {}},
		}),
		Some(UNSIGNED_TOKEN),
		None,
	)
	.await;
	// Deniability: JSON-RPC-level not-found, never a forbidden.
	assert_eq!(status, StatusCode::OK);
	let body = parse(&bytes);
	assert_eq!(body["error"]["code"], -32601);
}

#[tokio::test]
async fn verified_caller_sees_domain_tools_and_identity() {
	let (router, server) = verified_app().await;
	let token = sign_token(&valid_claims(&server));

	let (status, _, bytes) = post_mcp(
		&router,
		json!({"jsonrpc": "2.0", "id": 4, "method": "tools/list"}),
		Some(&token),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	let body = parse(&bytes);
	let names: Vec<&str> = body["result"]["tools"]
		.as_array()
		.unwrap()
		.iter()
		.map(|tool| tool["name"].as_str().unwrap())
		.collect();
	assert!(names.contains(&"whoami"));
	assert!(names.contains(&"list_bookings"));
	assert!(names.contains(&"find_hotels"));
	assert!(names.contains(&"book_hotel"));

	let (status, _, bytes) = post_mcp(
		&router,
		json!({
			"jsonrpc": "2.0",
			"id": 5,
			"method": "tools/call",
			"params": {"name": "whoami", "arguments": {}},
		}),
		Some(&token),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	let payload = whoami_payload(&parse(&bytes));
	assert_eq!(payload["authenticated"], true);
	assert_eq!(payload["userInfo"]["userId"], "user-42");
	assert_eq!(payload["userInfo"]["tenantId"], "ABC123");
	assert_eq!(payload["userInfo"]["tenantTier"], "premium");
}

#[tokio::test]
async fn credential_vendor_failures_surface_as_internal_errors() {
	// Verified caller, but no ROLE_ARN configured: the data-plane call
	// cannot vend credentials and the fault maps to -32603.
	let (router, server) = verified_app().await;
	let token = sign_token(&valid_claims(&server));
	let (status, _, bytes) = post_mcp(
		&router,
		json!({
			"jsonrpc": "2.0",
			"id": 6,
			"method": "tools/call",
			"params": {"name": "list_bookings", "arguments": {}},
		}),
		Some(&token),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	let body = parse(&bytes);
	assert_eq!(body["error"]["code"], -32603);
}

#[tokio::test]
async fn expired_token_is_rejected_with_reason() {
	let (router, server) = verified_app().await;
	let mut claims = valid_claims(&server);
	claims["iat"] = json!(now_secs() - 7200);
	claims["exp"] = json!(now_secs() - 3600);
	let token = sign_token(&claims);

	let (status, _, bytes) = post_mcp(
		&router,
		json!({
			"jsonrpc": "2.0",
			"id": 7,
			"method": "tools/call",
			"params": {"name": "list_bookings", "arguments": {}},
		}),
		Some(&token),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::UNAUTHORIZED);
	let body = parse(&bytes);
	assert_eq!(body["error"]["message"], "token-expired");
	assert_eq!(body["error"]["data"]["reason"], "token-expired");
}

#[tokio::test]
async fn wrong_audience_is_rejected_as_invalid() {
	let (router, server) = verified_app().await;
	let mut claims = valid_claims(&server);
	claims["aud"] = json!("someone-else");
	let token = sign_token(&claims);

	let (status, _, bytes) = post_mcp(
		&router,
		json!({"jsonrpc": "2.0", "id": 8, "method": "resources/list"}),
		Some(&token),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::UNAUTHORIZED);
	assert_eq!(parse(&bytes)["error"]["message"], "token-invalid");
}

#[tokio::test]
async fn missing_token_on_protected_method_is_401() {
	let router = anonymous_app().await;
	let (status, _, bytes) = post_mcp(
		&router,
		json!({"jsonrpc": "2.0", "id": 9, "method": "resources/list"}),
		None,
		None,
	)
	.await;
	assert_eq!(status, StatusCode::UNAUTHORIZED);
	assert_eq!(parse(&bytes)["error"]["message"], "missing-token");
}

#[tokio::test]
async fn unsigned_token_on_protected_method_is_401() {
	let router = anonymous_app().await;
	let (status, _, bytes) = post_mcp(
		&router,
		json!({"jsonrpc": "2.0", "id": 10, "method": "prompts/list"}),
		Some(UNSIGNED_TOKEN),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::UNAUTHORIZED);
	assert_eq!(
		parse(&bytes)["error"]["message"],
		"unsigned-token-not-accepted"
	);
}

#[tokio::test]
async fn empty_bearer_token_is_classified() {
	let router = anonymous_app().await;
	let (status, _, bytes) = post_mcp(
		&router,
		json!({"jsonrpc": "2.0", "id": 11, "method": "resources/list"}),
		Some(""),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::UNAUTHORIZED);
	assert_eq!(parse(&bytes)["error"]["message"], "empty-token");
}

#[tokio::test]
async fn wrong_verb_answers_405_with_allow_post() {
	let router = anonymous_app().await;
	for verb in ["GET", "DELETE"] {
		let request = Request::builder()
			.method(verb)
			.uri("/mcp")
			.body(Body::empty())
			.unwrap();
		let response = router.clone().oneshot(request).await.unwrap();
		assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{verb}");
		assert_eq!(
			response.headers().get(header::ALLOW).unwrap(),
			"POST",
			"{verb}"
		);
		let bytes = response.into_body().collect().await.unwrap().to_bytes();
		assert_eq!(parse(&bytes)["jsonrpc"], "2.0", "{verb}");
	}
}

#[tokio::test]
async fn oversize_body_is_413() {
	let router = anonymous_app().await;
	let request = Request::builder()
		.method("POST")
		.uri("/mcp")
		.header(header::CONTENT_TYPE, "application/json")
		.body(Body::from("x".repeat(MAX_BODY_BYTES + 1)))
		.unwrap();
	let response = router.clone().oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn malformed_envelope_is_invalid_request() {
	let router = anonymous_app().await;
	let request = Request::builder()
		.method("POST")
		.uri("/mcp")
		.header(header::CONTENT_TYPE, "application/json")
		.body(Body::from("{not json"))
		.unwrap();
	let response = router.clone().oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let bytes = response.into_body().collect().await.unwrap().to_bytes();
	assert_eq!(parse(&bytes)["error"]["code"], -32600);
}

#[tokio::test]
async fn sse_negotiation_frames_responses() {
	let router = anonymous_app().await;
	let (status, headers, bytes) = post_mcp(
		&router,
		json!({"jsonrpc": "2.0", "id": 12, "method": "tools/list"}),
		None,
		Some("text/event-stream"),
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	let content_type = headers.get(header::CONTENT_TYPE).unwrap().to_str().unwrap();
	assert!(content_type.starts_with("text/event-stream"), "{content_type}");
	let body = String::from_utf8(bytes).unwrap();
	let frame = body
		.lines()
		.find_map(|line| line.strip_prefix("data: "))
		.expect("one data frame");
	let response: Value = serde_json::from_str(frame).unwrap();
	assert_eq!(response["id"], 12);
	assert_eq!(response["result"]["tools"][0]["name"], "whoami");
}

#[tokio::test]
async fn batch_preserves_id_correlation() {
	let router = anonymous_app().await;
	let (status, _, bytes) = post_mcp(
		&router,
		json!([
			{"jsonrpc": "2.0", "id": 1, "method": "tools/list"},
			{"jsonrpc": "2.0", "method": "notifications/initialized"},
			{"jsonrpc": "2.0", "id": 2, "method": "initialize"},
		]),
		None,
		None,
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	let body = parse(&bytes);
	let responses = body.as_array().unwrap();
	// The notification produced no response.
	assert_eq!(responses.len(), 2);
	assert_eq!(responses[0]["id"], 1);
	assert_eq!(responses[1]["id"], 2);
	assert!(responses[1]["result"]["serverInfo"].is_object());
}

#[tokio::test]
async fn notification_only_posts_are_accepted() {
	let router = anonymous_app().await;
	let (status, _, bytes) = post_mcp(
		&router,
		json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
		None,
		None,
	)
	.await;
	assert_eq!(status, StatusCode::ACCEPTED);
	assert!(bytes.is_empty());
}

#[tokio::test]
async fn health_reports_metadata_without_auth() {
	let router = anonymous_app().await;
	let request = Request::builder()
		.method("GET")
		.uri("/health")
		.body(Body::empty())
		.unwrap();
	let response = router.clone().oneshot(request).await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let bytes = response.into_body().collect().await.unwrap().to_bytes();
	let body = parse(&bytes);
	assert_eq!(body["status"], "ok");
	assert_eq!(body["name"], "tenantgate");
	assert!(body["protocolVersion"].is_string());
}

#[tokio::test]
async fn verified_prompts_render_end_to_end() {
	let (router, server) = verified_app().await;
	let token = sign_token(&valid_claims(&server));
	let (status, _, bytes) = post_mcp(
		&router,
		json!({
			"jsonrpc": "2.0",
			"id": 13,
			"method": "prompts/get",
			"params": {
				"name": "plan_trip",
				"arguments": {"destination": "Lisbon", "start_date": "2026-09-01"},
			},
		}),
		Some(&token),
		None,
	)
	.await;
	assert_eq!(status, StatusCode::OK);
	let body = parse(&bytes);
	let text = body["result"]["messages"][0]["content"]["text"]
		.as_str()
		.unwrap();
	assert!(text.contains("Lisbon"), "{text}");
	assert!(text.contains("no special preferences"), "{text}");
}

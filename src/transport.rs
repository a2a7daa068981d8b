//! Streamable HTTP framing for the single `/mcp` endpoint.
//!
//! One POST carries one JSON-RPC envelope. Replies go back as a unary JSON
//! body unless the client advertised `Accept: text/event-stream`, in which
//! case each response becomes one unnamed SSE `data:` frame, emitted in
//! dispatch order. There is no session id and no resumability: the server
//! is strictly stateless, so GET and DELETE answer 405.

use std::convert::Infallible;

use axum::Json;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use http::{HeaderMap, HeaderValue, StatusCode, header};
use tracing::error;

use crate::jsonrpc::{self, Envelope, ErrorObject, Id, Request};
use crate::relay::Relay;

pub fn wants_event_stream(headers: &HeaderMap) -> bool {
	headers
		.get(header::ACCEPT)
		.and_then(|value| value.to_str().ok())
		.map(|accept| accept.contains("text/event-stream"))
		.unwrap_or(false)
}

/// Run one envelope through the dispatcher and frame the replies.
/// Notifications acknowledge with 202 and no body.
pub async fn serve(relay: Relay, envelope: Envelope, wants_sse: bool) -> Response {
	match envelope {
		Envelope::Single(request) => {
			if request.is_notification() {
				relay.handle(request).await;
				return StatusCode::ACCEPTED.into_response();
			}
			if wants_sse {
				return sse_responses(relay, vec![request]);
			}
			match relay.handle(request).await {
				Some(response) => Json(response).into_response(),
				None => StatusCode::ACCEPTED.into_response(),
			}
		},
		Envelope::Batch(requests) => {
			if requests.is_empty() {
				return Json(jsonrpc::Response::error(
					Id::Null,
					ErrorObject::invalid_request("empty batch"),
				))
				.into_response();
			}
			if wants_sse {
				return sse_responses(relay, requests);
			}
			// Id correlation is carried by each response; completion order
			// does not matter for a unary body.
			let responses: Vec<jsonrpc::Response> = futures::future::join_all(
				requests.into_iter().map(|request| relay.handle(request)),
			)
			.await
			.into_iter()
			.flatten()
			.collect();
			if responses.is_empty() {
				StatusCode::ACCEPTED.into_response()
			} else {
				Json(responses).into_response()
			}
		},
	}
}

/// Frames are produced lazily: when the client disconnects the stream is
/// dropped, which cancels the in-flight dispatch at its next await point
/// and closes the per-request dispatcher with it.
fn sse_responses(relay: Relay, requests: Vec<Request>) -> Response {
	let stream = async_stream::stream! {
		for request in requests {
			if let Some(response) = relay.handle(request).await {
				match serde_json::to_string(&response) {
					Ok(data) => yield Ok::<Event, Infallible>(Event::default().data(data)),
					Err(e) => {
						error!(%e, "failed to serialize response frame");
					},
				}
			}
		}
	};
	Sse::new(stream).into_response()
}

/// GET and DELETE on `/mcp`: a stateless server has no stream to resume and
/// no session to delete.
pub async fn method_not_allowed() -> Response {
	let body = jsonrpc::Response::error(
		Id::Null,
		ErrorObject::invalid_request("stateless server: only POST is supported on /mcp"),
	);
	let mut response = (StatusCode::METHOD_NOT_ALLOWED, Json(body)).into_response();
	response
		.headers_mut()
		.insert(header::ALLOW, HeaderValue::from_static("POST"));
	response
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const VERSION: &str = "2.0";

pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
/// Server-defined code carrying authentication failures.
pub const AUTH_ERROR: i32 = -32001;

/// Request id. `Null` is kept distinct from an absent id: a request with
/// `"id": null` expects a response, a request with no id is a notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
	Num(i64),
	Str(String),
	Null,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
	pub jsonrpc: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<Id>,
	pub method: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub params: Option<Value>,
}

impl Request {
	pub fn is_notification(&self) -> bool {
		self.id.is_none()
	}
}

/// One inbound POST body: a single request or a batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
	Single(Request),
	Batch(Vec<Request>),
}

impl Envelope {
	pub fn requests(&self) -> &[Request] {
		match self {
			Envelope::Single(request) => std::slice::from_ref(request),
			Envelope::Batch(requests) => requests,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
	pub jsonrpc: String,
	pub id: Id,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorObject>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
	pub code: i32,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
}

impl ErrorObject {
	pub fn new(code: i32, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
			data: None,
		}
	}

	pub fn with_data(mut self, data: Value) -> Self {
		self.data = Some(data);
		self
	}

	pub fn invalid_request(message: impl Into<String>) -> Self {
		Self::new(INVALID_REQUEST, message)
	}

	pub fn method_not_found(message: impl Into<String>) -> Self {
		Self::new(METHOD_NOT_FOUND, message)
	}

	pub fn invalid_params(message: impl Into<String>) -> Self {
		Self::new(INVALID_PARAMS, message)
	}

	pub fn internal() -> Self {
		Self::new(INTERNAL_ERROR, "internal-server-error")
	}
}

impl Response {
	pub fn success(id: Id, result: Value) -> Self {
		Self {
			jsonrpc: VERSION.to_string(),
			id,
			result: Some(result),
			error: None,
		}
	}

	pub fn error(id: Id, error: ErrorObject) -> Self {
		Self {
			jsonrpc: VERSION.to_string(),
			id,
			result: None,
			error: Some(error),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn roundtrip(raw: Value) {
		let envelope: Envelope = serde_json::from_value(raw.clone()).unwrap();
		assert_eq!(serde_json::to_value(&envelope).unwrap(), raw);
	}

	#[test]
	fn request_roundtrip_is_identity() {
		roundtrip(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}));
		roundtrip(json!({"jsonrpc": "2.0", "id": "abc", "method": "tools/call", "params": {"name": "whoami", "arguments": {}}}));
		roundtrip(json!({"jsonrpc": "2.0", "id": null, "method": "initialize"}));
	}

	#[test]
	fn notification_roundtrip_keeps_id_absent() {
		let raw = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
		let envelope: Envelope = serde_json::from_value(raw.clone()).unwrap();
		let Envelope::Single(request) = &envelope else {
			panic!("expected single request");
		};
		assert!(request.is_notification());
		assert_eq!(serde_json::to_value(&envelope).unwrap(), raw);
	}

	#[test]
	fn batch_roundtrip_is_identity() {
		roundtrip(json!([
			{"jsonrpc": "2.0", "id": 1, "method": "tools/list"},
			{"jsonrpc": "2.0", "method": "notifications/initialized"},
		]));
	}

	#[test]
	fn response_roundtrip_is_identity() {
		let raw = json!({"jsonrpc": "2.0", "id": 7, "result": {"ok": true}});
		let response: Response = serde_json::from_value(raw.clone()).unwrap();
		assert_eq!(serde_json::to_value(&response).unwrap(), raw);

		let raw = json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32600, "message": "invalid request"}});
		let response: Response = serde_json::from_value(raw.clone()).unwrap();
		assert_eq!(response.id, Id::Null);
		assert_eq!(serde_json::to_value(&response).unwrap(), raw);
	}
}

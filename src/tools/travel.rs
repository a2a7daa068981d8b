//! Travel-domain tools. Every handler vends tenant-scoped credentials
//! before touching the table, so the leading-key condition on `tenantId`
//! is enforced by the assumed identity and not by handler discipline.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{NaiveDate, Utc};
use serde_json::{Map, Value, json};
use tracing::info;

use crate::mcp::ToolResult;
use crate::registry::{CallContext, Field, FieldKind, InputSchema, Tool, ToolHandler, Visibility};
use crate::tenancy::dynamodb_client;

const BOOKING_PREFIX: &str = "BOOKING#";
const HOTEL_PREFIX: &str = "HOTEL#";
const LOYALTY_PREFIX: &str = "LOYALTY#";

pub fn tools() -> Vec<Tool> {
	vec![
		Tool {
			name: "list_bookings",
			description: "List the tenant's travel bookings, optionally for one traveler",
			schema: InputSchema::new(vec![Field {
				name: "user_id",
				description: "Only return bookings made by this traveler",
				kind: FieldKind::String,
				required: false,
			}]),
			visibility: Visibility::Authenticated,
			handler: Arc::new(ListBookings),
		},
		Tool {
			name: "find_hotels",
			description: "Search the tenant's hotel inventory for a city and date range",
			schema: InputSchema::new(vec![
				Field {
					name: "city",
					description: "Destination city",
					kind: FieldKind::String,
					required: true,
				},
				Field {
					name: "check_in",
					description: "Check-in date, YYYY-MM-DD",
					kind: FieldKind::Date,
					required: true,
				},
				Field {
					name: "nights",
					description: "Number of nights",
					kind: FieldKind::Integer { min: 1, max: 30 },
					required: true,
				},
			]),
			visibility: Visibility::Authenticated,
			handler: Arc::new(FindHotels),
		},
		Tool {
			name: "book_hotel",
			description: "Create a booking for a hotel from the tenant's inventory",
			schema: InputSchema::new(vec![
				Field {
					name: "hotel_id",
					description: "Hotel identifier returned by find_hotels",
					kind: FieldKind::String,
					required: true,
				},
				Field {
					name: "check_in",
					description: "Check-in date, YYYY-MM-DD",
					kind: FieldKind::Date,
					required: true,
				},
				Field {
					name: "nights",
					description: "Number of nights",
					kind: FieldKind::Integer { min: 1, max: 30 },
					required: true,
				},
				Field {
					name: "room_type",
					description: "Room class",
					kind: FieldKind::Enum(&["standard", "deluxe", "suite"]),
					required: false,
				},
			]),
			visibility: Visibility::Authenticated,
			handler: Arc::new(BookHotel),
		},
		Tool {
			name: "get_loyalty_status",
			description: "Report the caller's loyalty tier and points balance",
			schema: InputSchema::empty(),
			visibility: Visibility::Authenticated,
			handler: Arc::new(GetLoyaltyStatus),
		},
	]
}

struct ListBookings;

#[async_trait]
impl ToolHandler for ListBookings {
	async fn call(
		&self,
		args: Map<String, Value>,
		cx: &CallContext,
	) -> Result<ToolResult, anyhow::Error> {
		let tenant = &cx.auth.tenant_id;
		let credentials = cx.vendor.assume_for(tenant).await?;
		let client = dynamodb_client(&cx.config, &credentials);

		let mut query = client
			.query()
			.table_name(&cx.config.table_name)
			.key_condition_expression("tenantId = :tenantId AND begins_with(itemId, :prefix)")
			.expression_attribute_values(":tenantId", AttributeValue::S(tenant.clone()))
			.expression_attribute_values(":prefix", AttributeValue::S(BOOKING_PREFIX.to_string()));
		if let Some(user) = args.get("user_id").and_then(Value::as_str) {
			query = query
				.filter_expression("userId = :userId")
				.expression_attribute_values(":userId", AttributeValue::S(user.to_string()));
		}
		let output = query
			.send()
			.await
			.map_err(|e| anyhow::anyhow!("booking query failed: {}", DisplayErrorContext(&e)))?;

		let bookings: Vec<Value> = output.items().iter().map(item_to_json).collect();
		info!(%tenant, count = bookings.len(), "listed bookings");
		Ok(ToolResult::text(serde_json::to_string_pretty(&json!({
			"tenantId": tenant,
			"count": bookings.len(),
			"bookings": bookings,
		}))?))
	}
}

struct FindHotels;

#[async_trait]
impl ToolHandler for FindHotels {
	async fn call(
		&self,
		args: Map<String, Value>,
		cx: &CallContext,
	) -> Result<ToolResult, anyhow::Error> {
		let tenant = &cx.auth.tenant_id;
		let city = required_str(&args, "city")?;
		let credentials = cx.vendor.assume_for(tenant).await?;
		let client = dynamodb_client(&cx.config, &credentials);

		let output = client
			.query()
			.table_name(&cx.config.table_name)
			.key_condition_expression("tenantId = :tenantId AND begins_with(itemId, :prefix)")
			.filter_expression("city = :city")
			.expression_attribute_values(":tenantId", AttributeValue::S(tenant.clone()))
			.expression_attribute_values(":prefix", AttributeValue::S(HOTEL_PREFIX.to_string()))
			.expression_attribute_values(":city", AttributeValue::S(city.to_string()))
			.send()
			.await
			.map_err(|e| anyhow::anyhow!("hotel query failed: {}", DisplayErrorContext(&e)))?;

		let hotels: Vec<Value> = output.items().iter().map(item_to_json).collect();
		if hotels.is_empty() {
			return Ok(ToolResult::text(format!(
				"No hotels available in {city} for this tenant."
			)));
		}
		Ok(ToolResult::text(serde_json::to_string_pretty(&json!({
			"city": city,
			"checkIn": args.get("check_in"),
			"nights": args.get("nights"),
			"hotels": hotels,
		}))?))
	}
}

struct BookHotel;

#[async_trait]
impl ToolHandler for BookHotel {
	async fn call(
		&self,
		args: Map<String, Value>,
		cx: &CallContext,
	) -> Result<ToolResult, anyhow::Error> {
		let tenant = &cx.auth.tenant_id;
		let hotel_id = required_str(&args, "hotel_id")?;
		let check_in = required_str(&args, "check_in")?;
		let nights = args.get("nights").and_then(Value::as_i64).unwrap_or(1);
		let room_type = args
			.get("room_type")
			.and_then(Value::as_str)
			.unwrap_or("standard");

		// Schema validation already proved the format.
		let date = NaiveDate::parse_from_str(check_in, "%Y-%m-%d")
			.map_err(|e| anyhow::anyhow!("unparseable check_in after validation: {e}"))?;
		if date < Utc::now().date_naive() {
			return Ok(ToolResult::error(format!(
				"Booking declined: check-in date {check_in} is in the past."
			)));
		}

		let credentials = cx.vendor.assume_for(tenant).await?;
		let client = dynamodb_client(&cx.config, &credentials);

		let booking_id = format!("{BOOKING_PREFIX}{}", uuid::Uuid::new_v4());
		client
			.put_item()
			.table_name(&cx.config.table_name)
			.item("tenantId", AttributeValue::S(tenant.clone()))
			.item("itemId", AttributeValue::S(booking_id.clone()))
			.item("userId", AttributeValue::S(cx.auth.user_id.clone()))
			.item("hotelId", AttributeValue::S(hotel_id.to_string()))
			.item("checkIn", AttributeValue::S(check_in.to_string()))
			.item("nights", AttributeValue::N(nights.to_string()))
			.item("roomType", AttributeValue::S(room_type.to_string()))
			.item("status", AttributeValue::S("CONFIRMED".to_string()))
			.send()
			.await
			.map_err(|e| anyhow::anyhow!("booking write failed: {}", DisplayErrorContext(&e)))?;

		info!(%tenant, %booking_id, %hotel_id, "created booking");
		Ok(ToolResult::text(serde_json::to_string_pretty(&json!({
			"bookingId": booking_id,
			"hotelId": hotel_id,
			"checkIn": check_in,
			"nights": nights,
			"roomType": room_type,
			"status": "CONFIRMED",
		}))?))
	}
}

struct GetLoyaltyStatus;

#[async_trait]
impl ToolHandler for GetLoyaltyStatus {
	async fn call(
		&self,
		_args: Map<String, Value>,
		cx: &CallContext,
	) -> Result<ToolResult, anyhow::Error> {
		let tenant = &cx.auth.tenant_id;
		let credentials = cx.vendor.assume_for(tenant).await?;
		let client = dynamodb_client(&cx.config, &credentials);

		let output = client
			.get_item()
			.table_name(&cx.config.table_name)
			.key("tenantId", AttributeValue::S(tenant.clone()))
			.key(
				"itemId",
				AttributeValue::S(format!("{LOYALTY_PREFIX}{}", cx.auth.user_id)),
			)
			.send()
			.await
			.map_err(|e| anyhow::anyhow!("loyalty lookup failed: {}", DisplayErrorContext(&e)))?;

		let status = match output.item() {
			Some(item) => item_to_json(item),
			// No loyalty row yet: report the tier implied by the tenant plan.
			None => json!({
				"userId": cx.auth.user_id,
				"tier": cx.auth.tenant_tier,
				"points": 0,
			}),
		};
		Ok(ToolResult::text(serde_json::to_string_pretty(&status)?))
	}
}

fn required_str<'a>(args: &'a Map<String, Value>, name: &str) -> Result<&'a str, anyhow::Error> {
	args.get(name)
		.and_then(Value::as_str)
		.ok_or_else(|| anyhow::anyhow!("argument {name} missing after validation"))
}

fn item_to_json(item: &HashMap<String, AttributeValue>) -> Value {
	let mut map = Map::new();
	for (key, value) in item {
		let rendered = match value {
			AttributeValue::S(s) => Value::String(s.clone()),
			AttributeValue::N(n) => n
				.parse::<i64>()
				.map(Value::from)
				.unwrap_or_else(|_| Value::String(n.clone())),
			AttributeValue::Bool(b) => Value::Bool(*b),
			_ => continue,
		};
		map.insert(key.clone(), rendered);
	}
	Value::Object(map)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn items_render_to_json() {
		let mut item = HashMap::new();
		item.insert(
			"itemId".to_string(),
			AttributeValue::S("BOOKING#1".to_string()),
		);
		item.insert("nights".to_string(), AttributeValue::N("3".to_string()));
		item.insert("paid".to_string(), AttributeValue::Bool(true));
		let rendered = item_to_json(&item);
		assert_eq!(rendered["itemId"], "BOOKING#1");
		assert_eq!(rendered["nights"], 3);
		assert_eq!(rendered["paid"], true);
	}

	#[test]
	fn tool_schemas_validate_their_own_examples() {
		let tools = tools();
		let find = tools.iter().find(|t| t.name == "find_hotels").unwrap();
		let args = serde_json::json!({"city": "Lisbon", "check_in": "2026-09-01", "nights": 2});
		let serde_json::Value::Object(args) = args else {
			unreachable!()
		};
		assert_eq!(find.schema.validate(&args), Ok(()));

		let book = tools.iter().find(|t| t.name == "book_hotel").unwrap();
		let args = serde_json::json!({"hotel_id": "HOTEL#9", "check_in": "2026-09-01", "nights": 2, "room_type": "suite"});
		let serde_json::Value::Object(args) = args else {
			unreachable!()
		};
		assert_eq!(book.schema.validate(&args), Ok(()));
	}
}

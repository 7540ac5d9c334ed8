use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle step carried by an [`OrderEvent`].
///
/// Anything the producer sends that we do not recognise lands in `Unknown`
/// so the event still deserializes and can be skipped downstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    Created,
    Updated,
    Cancelled,
    Unknown(String),
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ORDER_CREATED" | "CREATED" => Self::Created,
            "ORDER_UPDATED" | "UPDATED" => Self::Updated,
            "ORDER_CANCELLED" | "CANCELLED" => Self::Cancelled,
            _ => Self::Unknown(value),
        }
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        match value {
            EventType::Created => "ORDER_CREATED".to_string(),
            EventType::Updated => "ORDER_UPDATED".to_string(),
            EventType::Cancelled => "ORDER_CANCELLED".to_string(),
            EventType::Unknown(name) => name,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "ORDER_CREATED"),
            Self::Updated => write!(f, "ORDER_UPDATED"),
            Self::Cancelled => write!(f, "ORDER_CANCELLED"),
            Self::Unknown(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderFields {
    pub order_id: i64,
    pub product_name: String,
    pub category_name: String,
    pub price: Decimal,
    pub quantity: i32,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub customer_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub order: OrderFields,
    #[serde(default)]
    pub timestamp: Option<NaiveDateTime>,
}

impl OrderEvent {
    pub fn new(event_id: impl Into<String>, event_type: EventType, order: OrderFields) -> Self {
        Self {
            event_id: event_id.into(),
            event_type,
            order,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// The sequencing key
    pub fn order_id(&self) -> i64 {
        self.order.order_id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Delivered,
    Cancelled,
}

/// Persisted view of an order as held by an order store
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    pub product_name: String,
    pub category_name: String,
    pub price: Decimal,
    pub quantity: i32,
    pub customer_id: Option<i64>,
    pub status: OrderStatus,
    pub version: u64,
}

impl Order {
    pub fn from_fields(fields: &OrderFields) -> Self {
        Self {
            id: fields.order_id,
            product_name: fields.product_name.clone(),
            category_name: fields.category_name.clone(),
            price: fields.price,
            quantity: fields.quantity,
            customer_id: fields.customer_id,
            status: OrderStatus::Pending,
            version: 0,
        }
    }
}

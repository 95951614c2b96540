use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use ts_rs::TS;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[strum(serialize_all = "PascalCase")]
pub enum OrderStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

/// A repair or service order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: i64,
    pub customer_id: Option<i64>,
    pub mechanic_id: Option<i64>,
    pub vehicle: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub total_amount: f64,
    pub created_at: NaiveDateTime,
    pub completed_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

impl Order {
    pub fn is_open(&self) -> bool {
        matches!(self.status, OrderStatus::Pending | OrderStatus::InProgress)
    }

    /// Sum of the line totals, for orders whose header total is not yet set.
    pub fn items_total(&self) -> f64 {
        self.items.iter().map(OrderItem::line_total).sum()
    }
}

/// A part consumed by an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: i64,
    pub inventory_item_id: i64,
    pub quantity: i32,
    pub unit_price: f64,
}

impl OrderItem {
    pub fn line_total(&self) -> f64 {
        f64::from(self.quantity) * self.unit_price
    }
}

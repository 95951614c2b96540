use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A stocked part or consumable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub part_number: Option<String>,
    pub quantity: i32,
    pub unit_price: f64,
    pub reorder_level: Option<i32>,
}

impl InventoryItem {
    /// True once stock has fallen to the configured reorder level.
    pub fn needs_reorder(&self) -> bool {
        self.reorder_level
            .is_some_and(|level| self.quantity <= level)
    }

    pub fn stock_value(&self) -> f64 {
        f64::from(self.quantity.max(0)) * self.unit_price
    }
}

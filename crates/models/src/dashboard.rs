use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::order::Order;

/// Workload summary for the signed-in mechanic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct MechanicDashboard {
    #[serde(default)]
    pub assigned_orders: Vec<Order>,
    #[serde(default)]
    pub completed_today: u32,
    #[serde(default)]
    pub pending_orders: u32,
}

impl MechanicDashboard {
    pub fn open_orders(&self) -> impl Iterator<Item = &Order> {
        self.assigned_orders.iter().filter(|order| order.is_open())
    }
}

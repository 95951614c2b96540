use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use ts_rs::TS;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[strum(serialize_all = "PascalCase")]
pub enum InvoiceStatus {
    #[default]
    Unpaid,
    Paid,
    Overdue,
    Cancelled,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: i64,
    pub order_id: i64,
    pub amount: f64,
    #[serde(default)]
    pub status: InvoiceStatus,
    pub issued_at: NaiveDateTime,
    pub due_date: Option<NaiveDate>,
}

impl Invoice {
    /// Whether the invoice still expects a payment.
    pub fn is_outstanding(&self) -> bool {
        matches!(self.status, InvoiceStatus::Unpaid | InvoiceStatus::Overdue)
    }

    /// Outstanding and past its due date as of `today`, even when the
    /// backend has not flipped the status to `Overdue` yet.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status == InvoiceStatus::Overdue
            || (self.is_outstanding() && self.due_date.is_some_and(|due| due < today))
    }
}

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A bookable service window. Seat counting happens server-side; the client
/// only reports what the backend says is left.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub id: i64,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub capacity: u32,
    #[serde(default)]
    pub booked_count: u32,
}

impl TimeSlot {
    pub fn available_seats(&self) -> u32 {
        self.capacity.saturating_sub(self.booked_count)
    }

    pub fn is_available(&self) -> bool {
        self.available_seats() > 0
    }
}

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReviewValidationError {
    #[error("rating must be between 1 and 5, got {0}")]
    RatingOutOfRange(u8),
    #[error("comment must not exceed {max} characters")]
    CommentTooLong { max: usize },
}

/// A customer review of a completed order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: i64,
    pub order_id: i64,
    pub user_id: Option<i64>,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: NaiveDateTime,
}

/// A completed order the current user still has to review before
/// continuing to use the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct PendingReview {
    pub order_id: i64,
    pub description: Option<String>,
    pub completed_at: Option<NaiveDateTime>,
}

/// Request body for submitting a review
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct CreateReview {
    pub order_id: i64,
    pub rating: u8,
    pub comment: Option<String>,
}

impl CreateReview {
    pub const MAX_COMMENT_LEN: usize = 1000;

    pub fn new(
        order_id: i64,
        rating: u8,
        comment: Option<String>,
    ) -> Result<Self, ReviewValidationError> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(ReviewValidationError::RatingOutOfRange(rating));
        }

        // Blank comments are sent as absent
        let comment = comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        if comment
            .as_ref()
            .is_some_and(|c| c.chars().count() > Self::MAX_COMMENT_LEN)
        {
            return Err(ReviewValidationError::CommentTooLong {
                max: Self::MAX_COMMENT_LEN,
            });
        }

        Ok(Self {
            order_id,
            rating,
            comment,
        })
    }
}

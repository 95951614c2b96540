//! Gate that sends users to the review screen while they have completed
//! orders left to review.

use std::{sync::Arc, time::Duration};

use models::review::PendingReview;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    api_client::{ApiError, RequestOptions},
    workshop_api::WorkshopApi,
};

#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Clear,
    ReviewsRequired(Vec<PendingReview>),
}

/// Sends the user to the mandatory review screen
pub trait ReviewPrompt: Send + Sync {
    fn require_reviews(&self, pending: &[PendingReview]);
}

pub struct ReviewGate {
    api: WorkshopApi,
}

impl ReviewGate {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

    pub fn new(api: WorkshopApi) -> Self {
        Self { api }
    }

    /// Check once. Polling failures are not surfaced as notifications.
    pub async fn check(&self) -> Result<GateDecision, ApiError> {
        self.check_with(RequestOptions::default().silent()).await
    }

    async fn check_with(&self, options: RequestOptions) -> Result<GateDecision, ApiError> {
        let pending = self.api.pending_reviews(options).await?;
        if pending.is_empty() {
            Ok(GateDecision::Clear)
        } else {
            Ok(GateDecision::ReviewsRequired(pending))
        }
    }

    /// Spawn the background poller. It stops when `cancel` fires or the
    /// session ends (a 401 has already redirected to login by then).
    pub fn spawn(
        self,
        poll_interval: Duration,
        prompt: Arc<dyn ReviewPrompt>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.start(poll_interval, prompt, cancel).await;
        })
    }

    async fn start(
        &self,
        poll_interval: Duration,
        prompt: Arc<dyn ReviewPrompt>,
        cancel: CancellationToken,
    ) {
        info!("Starting pending review gate with interval {:?}", poll_interval);

        let mut interval = interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Pending review gate stopped");
                    return;
                }
                _ = interval.tick() => {}
            }

            let options = RequestOptions::default()
                .silent()
                .cancel_with(cancel.child_token());

            match self.check_with(options).await {
                Ok(GateDecision::ReviewsRequired(pending)) => {
                    info!(pending = pending.len(), "Pending reviews must be completed");
                    prompt.require_reviews(&pending);
                }
                Ok(GateDecision::Clear) => {
                    debug!("No pending reviews");
                }
                Err(ApiError::Unauthorized) => {
                    info!("Session ended, stopping pending review gate");
                    return;
                }
                Err(ApiError::Cancelled) => return,
                Err(e) => {
                    warn!(error = %e, "Error checking pending reviews");
                }
            }
        }
    }
}

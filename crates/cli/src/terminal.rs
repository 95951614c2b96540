//! Terminal renditions of the UI hooks: toasts go to stderr, redirects become
//! instructions.

use models::review::PendingReview;
use services::services::{
    notification::Notifier, review_gate::ReviewPrompt, session::AuthRedirect,
};

pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify_error(&self, message: &str) {
        eprintln!("error: {message}");
    }
}

pub struct TerminalRedirect;

impl AuthRedirect for TerminalRedirect {
    fn redirect_to_login(&self, _login_route: &str) {
        eprintln!("Your session has expired. Run `workshop login <email>` to sign in again.");
    }
}

pub struct TerminalReviewPrompt;

impl ReviewPrompt for TerminalReviewPrompt {
    fn require_reviews(&self, pending: &[PendingReview]) {
        print_pending(pending);
    }
}

pub fn print_pending(pending: &[PendingReview]) {
    eprintln!(
        "{} completed order(s) are waiting for your review:",
        pending.len()
    );
    for review in pending {
        let description = review.description.as_deref().unwrap_or("(no description)");
        eprintln!("  #{:<6} {description}", review.order_id);
    }
    eprintln!("Submit them with `workshop review <order-id> --rating <1-5>`.");
}

//! Forced re-authentication when the backend rejects the bearer token.

use std::sync::{Mutex, PoisonError};

use tracing::{error, info};

use super::credential_store::CredentialStore;

/// Sends the user to the login entry point
pub trait AuthRedirect: Send + Sync {
    fn redirect_to_login(&self, login_route: &str);
}

/// Keeps every redirect so a host (or a test) can act on it
#[derive(Debug, Default)]
pub struct RecordingRedirect {
    routes: Mutex<Vec<String>>,
}

impl RecordingRedirect {
    pub fn routes(&self) -> Vec<String> {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self) -> usize {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl AuthRedirect for RecordingRedirect {
    fn redirect_to_login(&self, login_route: &str) {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(login_route.to_string());
    }
}

/// Drop the stored token and redirect once. The failed request is not retried.
pub(crate) fn end_session(
    credentials: &dyn CredentialStore,
    redirect: &dyn AuthRedirect,
    login_route: &str,
) {
    if let Err(e) = credentials.clear() {
        error!(error = %e, "failed to clear bearer token after 401");
    }
    info!(login_route, "session rejected by backend, redirecting to login");
    redirect.redirect_to_login(login_route);
}

//! User-facing error notifications for failed requests.
//!
//! The API client is the only place that raises them, so feature code that
//! catches an [`ApiError`](super::api_client::ApiError) must not show its own.

use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use tracing::warn;

pub const FALLBACK_ERROR_MESSAGE: &str = "Something went wrong. Please try again.";

/// A transient, non-blocking notification surface (a toast in a UI)
pub trait Notifier: Send + Sync {
    fn notify_error(&self, message: &str);
}

/// Best-effort message from a normalized error body: its `message` field,
/// or the body itself when the backend returned a bare string.
pub fn error_message(data: Option<&Value>) -> String {
    let message = match data {
        Some(Value::String(s)) => Some(s.as_str()),
        Some(body) => body.get("message").and_then(Value::as_str),
        None => None,
    };

    message
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| FALLBACK_ERROR_MESSAGE.to_string())
}

/// Routes notifications into the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify_error(&self, message: &str) {
        warn!(message, "request failed");
    }
}

/// Keeps every notification so a host can drain and display them
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.messages.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Notifier for RecordingNotifier {
    fn notify_error(&self, message: &str) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}

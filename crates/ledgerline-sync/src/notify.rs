//! User-facing notifications raised by failed requests.

use crossbeam_channel::{Receiver, Sender, unbounded};
use ledgerline_core::error::ErrorCode;
use serde::Serialize;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Error,
    Warning,
}

/// A banner message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: Level,
    pub code: ErrorCode,
    pub message: String,
    pub hint: Option<&'static str>,
}

impl Notification {
    #[must_use]
    pub fn error(code: ErrorCode, detail: impl fmt::Display) -> Self {
        Self {
            level: Level::Error,
            code,
            message: format!("{}: {detail}", code.message()),
            hint: code.hint(),
        }
    }

    #[must_use]
    pub fn warning(code: ErrorCode, detail: impl fmt::Display) -> Self {
        Self {
            level: Level::Warning,
            ..Self::error(code, detail)
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(hint) = self.hint {
            write!(f, " ({hint})")?;
        }
        Ok(())
    }
}

/// Sending half of the notification stream. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Notifier(Sender<Notification>);

impl Notifier {
    /// A connected notifier and the receiver the surface drains.
    #[must_use]
    pub fn channel() -> (Self, Receiver<Notification>) {
        let (tx, rx) = unbounded();
        (Self(tx), rx)
    }

    pub fn notify(&self, notification: Notification) {
        warn!(code = %notification.code, "{}", notification.message);
        if self.0.send(notification).is_err() {
            warn!("notification receiver dropped");
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::guard::{ContentTier, RejectReason, SuppressReason};
use crate::types::Outcome;

/// Every state change in the guard service produces an Event.
/// Hosts subscribe to them for UI and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// An overlay was handed to the presenter.
    OverlayRequested {
        ticket: u64,
        app_id: String,
        app_name: String,
        attempt_number: u32,
        pause_duration_secs: u32,
        tier: ContentTier,
        at: DateTime<Utc>,
    },
    /// A foreground change did not lead to an overlay.
    Suppressed {
        app_id: String,
        reason: SuppressReason,
        at: DateTime<Utc>,
    },
    /// The presenter refused or the lookup never returned.
    PresentationFailed {
        app_id: String,
        message: String,
        at: DateTime<Utc>,
    },
    /// Pause elapsed; the proceed choice is available.
    ChoicesUnlocked {
        ticket: u64,
        at: DateTime<Utc>,
    },
    Resolved {
        app_id: String,
        outcome: Outcome,
        attempt_number: u32,
        /// `None` when the log write failed.
        log_id: Option<i64>,
        at: DateTime<Utc>,
    },
    ResolutionRejected {
        app_id: String,
        reason: RejectReason,
        at: DateTime<Utc>,
    },
    GuardedSetInvalidated {
        at: DateTime<Utc>,
    },
    SnoozeChanged {
        until: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    },
    /// Last event before the service stops.
    Stopped {
        at: DateTime<Utc>,
    },
}

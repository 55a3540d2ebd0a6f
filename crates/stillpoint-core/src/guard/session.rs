//! Session and debounce tracking.
//!
//! Two independent mechanisms keep a single physical app switch from
//! producing several overlays:
//!
//! - **Dismiss grace** is time-bounded and kept per app: the OS tends to
//!   re-report an app right after its overlay goes away.
//! - **Active session** is event-bounded: once the user proceeds into an app
//!   it is exempt until they switch to something that is not guarded.
//!
//! State lives for the process lifetime only.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Outcome;

pub const DEFAULT_DEBOUNCE_MS: i64 = 2000;
pub const DEFAULT_DISMISS_GRACE_MS: i64 = 3000;

/// Which rule suppressed an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Suppression {
    Debounce,
    DismissGrace,
    ActiveSession,
}

impl fmt::Display for Suppression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Suppression::Debounce => "debounce",
            Suppression::DismissGrace => "dismiss_grace",
            Suppression::ActiveSession => "active_session",
        })
    }
}

#[derive(Debug, Clone)]
pub struct SessionTracker {
    debounce: Duration,
    dismiss_grace: Duration,
    last_overlay: Option<(String, DateTime<Utc>)>,
    active_session: Option<String>,
    dismissals: HashMap<String, DateTime<Utc>>,
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new(
            Duration::milliseconds(DEFAULT_DEBOUNCE_MS),
            Duration::milliseconds(DEFAULT_DISMISS_GRACE_MS),
        )
    }
}

/// Elapsed time, with a clock stepped backwards counting as zero.
fn elapsed(now: DateTime<Utc>, then: DateTime<Utc>) -> Duration {
    (now - then).max(Duration::zero())
}

impl SessionTracker {
    pub fn new(debounce: Duration, dismiss_grace: Duration) -> Self {
        Self {
            debounce,
            dismiss_grace,
            last_overlay: None,
            active_session: None,
            dismissals: HashMap::new(),
        }
    }

    /// The first rule that suppresses `app_id` at `now`, if any.
    pub fn should_suppress(&self, app_id: &str, now: DateTime<Utc>) -> Option<Suppression> {
        if let Some((app, at)) = &self.last_overlay {
            if app == app_id && elapsed(now, *at) < self.debounce {
                return Some(Suppression::Debounce);
            }
        }

        if let Some(at) = self.dismissals.get(app_id) {
            if elapsed(now, *at) < self.dismiss_grace {
                return Some(Suppression::DismissGrace);
            }
        }

        if self.active_session.as_deref() == Some(app_id) {
            return Some(Suppression::ActiveSession);
        }

        None
    }

    /// Leave detection. Returns `true` if an active session ended.
    pub fn on_foreground_change(&mut self, app_id: &str, is_guarded: bool) -> bool {
        match &self.active_session {
            Some(active) if active != app_id && !is_guarded => {
                self.active_session = None;
                true
            }
            _ => false,
        }
    }

    pub fn record_overlay_shown(&mut self, app_id: &str, now: DateTime<Utc>) {
        self.last_overlay = Some((app_id.to_string(), now));
    }

    pub fn record_dismissal(&mut self, app_id: &str, outcome: Outcome, now: DateTime<Utc>) {
        let grace = self.dismiss_grace;
        self.dismissals.retain(|_, at| elapsed(now, *at) < grace);
        self.dismissals.insert(app_id.to_string(), now);

        if outcome == Outcome::Proceeded {
            self.active_session = Some(app_id.to_string());
        }
    }

    pub fn active_session(&self) -> Option<&str> {
        self.active_session.as_deref()
    }
}

//! Intervention orchestrator.
//!
//! The state machine that decides, for every foreground change, whether an
//! overlay goes up, with what pacing, and how its outcome is logged.
//!
//! ## Gate order
//!
//! Each step is a terminal suppress exit:
//!
//! 1. the host application itself
//! 2. (dirty cache: refresh guarded set and settings)
//! 3. (session leave detection)
//! 4. app not guarded
//! 5. debounce / dismiss grace / active session
//! 6. an overlay is already pending or showing
//! 7. overlay permission missing
//! 8. snoozed
//! 9. outside the schedule
//!
//! Passing the gate moves the overlay state to `Pending` and hands back a
//! [`PendingIntervention`]. The caller then runs the one I/O step
//! ([`Lookup::gather`]) wherever it likes and feeds the result to
//! [`Orchestrator::complete`], which re-checks the state before presenting.
//!
//! ```text
//! Idle -> Pending -> Showing -> Idle
//!            \-> Idle (superseded / failed)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::boundary::{OverlayPresenter, PresentationRequest, ReflectionContent, Resolution};
use super::cache::{GuardedSetCache, InvalidationChannel};
use super::escalation::{EscalationCalculator, EscalationDecision};
use super::schedule;
use super::session::{SessionTracker, Suppression};
use crate::content::{ContentProvider, DailyContent};
use crate::storage::{GuardConfig, Store};
use crate::types::{NewIntervention, Outcome, Settings};

/// Engine tunables, usually built from [`GuardConfig`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub host_app_id: String,
    pub debounce: Duration,
    pub dismiss_grace: Duration,
    pub time_saved_estimate_secs: u32,
}

impl From<&GuardConfig> for OrchestratorConfig {
    fn from(cfg: &GuardConfig) -> Self {
        Self {
            host_app_id: cfg.host_app_id.clone(),
            debounce: Duration::from_std(cfg.debounce_window()).unwrap_or(Duration::MAX),
            dismiss_grace: Duration::from_std(cfg.dismiss_grace_window()).unwrap_or(Duration::MAX),
            time_saved_estimate_secs: cfg.time_saved_estimate_secs,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&GuardConfig::default())
    }
}

/// Why an event did not lead to an overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    HostApp,
    NotGuarded,
    Session(Suppression),
    OverlayActive,
    NoPermission,
    Snoozed,
    OutsideSchedule,
    /// The admitted attempt was overtaken before it could be presented.
    Superseded,
}

impl fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuppressReason::HostApp => f.write_str("host_app"),
            SuppressReason::NotGuarded => f.write_str("not_guarded"),
            SuppressReason::Session(rule) => write!(f, "{rule}"),
            SuppressReason::OverlayActive => f.write_str("overlay_active"),
            SuppressReason::NoPermission => f.write_str("no_permission"),
            SuppressReason::Snoozed => f.write_str("snoozed"),
            SuppressReason::OutsideSchedule => f.write_str("outside_schedule"),
            SuppressReason::Superseded => f.write_str("superseded"),
        }
    }
}

/// An event that passed the gate and awaits its lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingIntervention {
    pub ticket: u64,
    pub app_id: String,
    pub app_name: String,
    /// Local calendar day the attempt is counted on.
    pub day: NaiveDate,
    pub at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Suppressed(SuppressReason),
    Admitted(PendingIntervention),
}

/// Result of the I/O step for an admitted event.
#[derive(Debug, Clone)]
pub struct Lookup {
    /// `None` when the count query failed.
    pub prior_count: Option<u32>,
    pub content: DailyContent,
}

impl Lookup {
    /// Query today's resolved count for `app_id` and the day's content.
    ///
    /// Blocking; the service runs this on a worker thread.
    pub fn gather(
        store: &dyn Store,
        content: &dyn ContentProvider,
        app_id: &str,
        day: NaiveDate,
    ) -> Self {
        let prior_count = match store.today_attempt_count(app_id, day) {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(app = app_id, error = %e, "attempt count query failed");
                None
            }
        };
        Self { prior_count, content: content.content_for(day) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Presented(PresentationRequest),
    Suppressed(SuppressReason),
    /// The presenter refused the overlay.
    Failed { app_id: String, message: String },
}

/// Why a resolution was ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    NoOverlay,
    AppMismatch { showing: String },
    PauseNotElapsed { remaining_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// Overlay dismissed. `log_id` is `None` when the log write failed.
    Resolved { record: NewIntervention, log_id: Option<i64> },
    Rejected(RejectReason),
}

#[derive(Debug, Clone)]
struct ActiveOverlay {
    ticket: u64,
    app_id: String,
    app_name: String,
    decision: EscalationDecision,
    content: DailyContent,
    shown_at: DateTime<Local>,
    unlocked: bool,
}

#[derive(Debug, Clone)]
enum OverlayState {
    Idle,
    Pending(u64),
    Showing(ActiveOverlay),
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn Store>,
    content: Arc<dyn ContentProvider>,
    presenter: Box<dyn OverlayPresenter>,
    cache: GuardedSetCache,
    tracker: SessionTracker,
    calculator: EscalationCalculator,
    settings: Settings,
    state: OverlayState,
    next_ticket: u64,
    /// Last resolved count seen per (app, day); fallback when the query fails.
    known_counts: HashMap<(String, NaiveDate), u32>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn Store>,
        content: Arc<dyn ContentProvider>,
        presenter: Box<dyn OverlayPresenter>,
        invalidation: InvalidationChannel,
    ) -> Self {
        let tracker = SessionTracker::new(config.debounce, config.dismiss_grace);
        Self {
            cache: GuardedSetCache::new(store.clone(), invalidation),
            config,
            store,
            content,
            presenter,
            tracker,
            calculator: EscalationCalculator::new(),
            settings: Settings::default(),
            state: OverlayState::Idle,
            next_ticket: 1,
            known_counts: HashMap::new(),
        }
    }

    pub fn invalidation(&self) -> InvalidationChannel {
        self.cache.invalidation().clone()
    }

    pub fn mark_guarded_set_dirty(&self) {
        debug!("guarded set marked dirty");
        self.cache.invalidation().mark_dirty();
    }

    /// Set or clear the snooze deadline.
    ///
    /// The in-memory snapshot always changes; returns `false` if persisting
    /// it failed.
    pub fn set_snooze_until(&mut self, until: Option<DateTime<Utc>>) -> bool {
        self.settings.snooze_until = until;
        match self.store.set_snooze_until(until) {
            Ok(()) => {
                info!(until = ?until, "snooze updated");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to persist snooze");
                false
            }
        }
    }

    pub fn clear_snooze(&mut self) -> bool {
        self.set_snooze_until(None)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn active_session(&self) -> Option<&str> {
        self.tracker.active_session()
    }

    /// Ticket of the pending or showing overlay.
    pub fn current_ticket(&self) -> Option<u64> {
        match &self.state {
            OverlayState::Idle => None,
            OverlayState::Pending(ticket) => Some(*ticket),
            OverlayState::Showing(overlay) => Some(overlay.ticket),
        }
    }

    pub fn is_showing(&self) -> bool {
        matches!(self.state, OverlayState::Showing(_))
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub fn content_provider(&self) -> Arc<dyn ContentProvider> {
        self.content.clone()
    }

    /// Steps 1 to 9. On admission the overlay state becomes `Pending`.
    pub fn begin(&mut self, app_id: &str, at: DateTime<Local>) -> Gate {
        if app_id == self.config.host_app_id {
            return Gate::Suppressed(SuppressReason::HostApp);
        }

        if self.cache.is_dirty() {
            self.refresh_snapshots();
        }

        let is_guarded = self.cache.contains(app_id);
        if self.tracker.on_foreground_change(app_id, is_guarded) {
            debug!(app = app_id, "active session ended");
        }

        let Some(app_name) = self.cache.lookup(app_id).map(|a| a.display_name.clone()) else {
            return Gate::Suppressed(SuppressReason::NotGuarded);
        };

        let now_utc = at.with_timezone(&Utc);
        if let Some(rule) = self.tracker.should_suppress(app_id, now_utc) {
            return self.suppress(app_id, SuppressReason::Session(rule));
        }

        if !matches!(self.state, OverlayState::Idle) || self.presenter.is_presenting() {
            return self.suppress(app_id, SuppressReason::OverlayActive);
        }

        if !self.presenter.has_overlay_permission() {
            warn!(app = app_id, "overlay permission not granted, intervention skipped");
            return Gate::Suppressed(SuppressReason::NoPermission);
        }

        if self.settings.is_snoozed(now_utc) {
            return self.suppress(app_id, SuppressReason::Snoozed);
        }

        if !schedule::is_active(&at, &self.settings) {
            return self.suppress(app_id, SuppressReason::OutsideSchedule);
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.state = OverlayState::Pending(ticket);
        debug!(app = app_id, ticket, "intervention admitted");

        Gate::Admitted(PendingIntervention {
            ticket,
            app_id: app_id.to_string(),
            app_name,
            day: at.date_naive(),
            at,
        })
    }

    fn suppress(&self, app_id: &str, reason: SuppressReason) -> Gate {
        debug!(app = app_id, %reason, "suppressed");
        Gate::Suppressed(reason)
    }

    fn refresh_snapshots(&mut self) {
        let apps_ok = self.cache.refresh();
        let settings_ok = match self.store.settings() {
            Ok(settings) => {
                self.settings = settings;
                true
            }
            Err(e) => {
                warn!(error = %e, "settings refresh failed, keeping last snapshot");
                false
            }
        };
        if apps_ok && settings_ok {
            self.cache.clear_dirty();
        }
    }

    /// Step 10: compute the decision and present, unless overtaken.
    ///
    /// `presented_at` is when the overlay goes up; the pause is measured from
    /// it, not from the foreground event.
    pub fn complete(
        &mut self,
        pending: &PendingIntervention,
        lookup: Lookup,
        presented_at: DateTime<Local>,
    ) -> Decision {
        if !matches!(self.state, OverlayState::Pending(t) if t == pending.ticket) {
            debug!(app = %pending.app_id, ticket = pending.ticket, "stale lookup dropped");
            return Decision::Suppressed(SuppressReason::Superseded);
        }

        if self.tracker.active_session() == Some(pending.app_id.as_str())
            || self.presenter.is_presenting()
        {
            self.state = OverlayState::Idle;
            debug!(app = %pending.app_id, ticket = pending.ticket, "superseded before presentation");
            return Decision::Suppressed(SuppressReason::Superseded);
        }

        let key = (pending.app_id.clone(), pending.day);
        let prior = match lookup.prior_count {
            Some(count) => {
                self.remember_count(key, count);
                count
            }
            None => self.known_counts.get(&key).copied().unwrap_or(0),
        };

        let decision = self
            .calculator
            .compute(&pending.app_id, prior, &lookup.content, pending.day);
        let request = PresentationRequest {
            ticket: pending.ticket,
            app_id: pending.app_id.clone(),
            app_name: pending.app_name.clone(),
            decision: decision.clone(),
        };

        if let Err(e) = self.presenter.present(&request) {
            self.state = OverlayState::Idle;
            error!(app = %pending.app_id, error = %e, "overlay presentation failed");
            return Decision::Failed { app_id: pending.app_id.clone(), message: e.to_string() };
        }

        self.tracker
            .record_overlay_shown(&pending.app_id, presented_at.with_timezone(&Utc));
        self.state = OverlayState::Showing(ActiveOverlay {
            ticket: pending.ticket,
            app_id: pending.app_id.clone(),
            app_name: pending.app_name.clone(),
            decision,
            content: lookup.content,
            shown_at: presented_at,
            unlocked: false,
        });
        info!(
            app = %pending.app_id,
            ticket = pending.ticket,
            attempt = request.decision.attempt_number,
            pause = request.decision.pause_duration_secs,
            "overlay presented"
        );

        Decision::Presented(request)
    }

    /// Drop a pending attempt whose lookup never came back.
    pub fn cancel_pending(&mut self, ticket: u64) -> bool {
        if matches!(self.state, OverlayState::Pending(t) if t == ticket) {
            self.state = OverlayState::Idle;
            true
        } else {
            false
        }
    }

    /// Run the full sequence inline, lookup included.
    pub fn handle_foreground(&mut self, app_id: &str, at: DateTime<Local>) -> Decision {
        match self.begin(app_id, at) {
            Gate::Suppressed(reason) => Decision::Suppressed(reason),
            Gate::Admitted(pending) => {
                let lookup =
                    Lookup::gather(&*self.store, &*self.content, &pending.app_id, pending.day);
                self.complete(&pending, lookup, at)
            }
        }
    }

    /// The countdown for `ticket` finished. Returns `true` if the presenter
    /// was told to unlock the proceed choice.
    pub fn on_pause_elapsed(&mut self, ticket: u64) -> bool {
        match &mut self.state {
            OverlayState::Showing(overlay) if overlay.ticket == ticket && !overlay.unlocked => {
                overlay.unlocked = true;
                self.presenter.unlock_proceed(ticket);
                true
            }
            _ => false,
        }
    }

    /// Apply the user's choice on the showing overlay.
    pub fn resolve(&mut self, resolution: &Resolution, at: DateTime<Local>) -> ResolveOutcome {
        let overlay = match &self.state {
            OverlayState::Showing(overlay) => overlay,
            _ => {
                warn!(app = %resolution.app_id, "resolution with no overlay showing, ignored");
                return ResolveOutcome::Rejected(RejectReason::NoOverlay);
            }
        };

        if overlay.app_id != resolution.app_id {
            warn!(
                app = %resolution.app_id,
                showing = %overlay.app_id,
                "resolution for a different app, ignored"
            );
            return ResolveOutcome::Rejected(RejectReason::AppMismatch {
                showing: overlay.app_id.clone(),
            });
        }

        if resolution.outcome == Outcome::Proceeded && !overlay.unlocked {
            let unlock_at =
                overlay.shown_at + Duration::seconds(i64::from(overlay.decision.pause_duration_secs));
            if at < unlock_at {
                let remaining_ms = (unlock_at - at).num_milliseconds().max(0) as u64;
                debug!(app = %resolution.app_id, remaining_ms, "proceed before pause elapsed");
                return ResolveOutcome::Rejected(RejectReason::PauseNotElapsed { remaining_ms });
            }
        }

        let OverlayState::Showing(overlay) = std::mem::replace(&mut self.state, OverlayState::Idle)
        else {
            return ResolveOutcome::Rejected(RejectReason::NoOverlay);
        };

        self.presenter.dismiss();
        let now_utc = at.with_timezone(&Utc);
        self.tracker
            .record_dismissal(&overlay.app_id, resolution.outcome, now_utc);

        let day = at.date_naive();
        let attempt_number = if day == overlay.decision.day {
            overlay.decision.attempt_number
        } else {
            self.recount(&overlay.app_id, day) + 1
        };

        let record = NewIntervention {
            timestamp: now_utc,
            source_identifier: overlay.app_id.clone(),
            source_name: overlay.app_name.clone(),
            outcome: resolution.outcome,
            scripture_reference: overlay.decision.scripture_reference.clone(),
            pause_duration_secs: overlay.decision.pause_duration_secs,
            attempt_number,
            estimated_time_saved_secs: match resolution.outcome {
                Outcome::Resisted => self.config.time_saved_estimate_secs,
                Outcome::Proceeded => 0,
            },
        };

        let log_id = match self.store.append_intervention(&record) {
            Ok(id) => {
                self.remember_count((overlay.app_id.clone(), day), attempt_number);
                Some(id)
            }
            Err(e) => {
                error!(app = %overlay.app_id, error = %e, "failed to log intervention");
                None
            }
        };

        info!(
            app = %overlay.app_id,
            outcome = %resolution.outcome,
            attempt = attempt_number,
            "overlay resolved"
        );

        if resolution.outcome == Outcome::Resisted {
            self.presenter.deliver_reflection(&ReflectionContent {
                scripture_reference: overlay.content.scripture_reference.clone(),
                scripture_text: overlay.content.scripture_text.clone(),
                reflection: overlay.content.reflection.clone(),
                personal_commitment: self.settings.personal_commitment.clone(),
            });
        }

        ResolveOutcome::Resolved { record, log_id }
    }

    /// Resolved count for `app_id` on `day`, from storage or the last known value.
    fn recount(&mut self, app_id: &str, day: NaiveDate) -> u32 {
        let key = (app_id.to_string(), day);
        match self.store.today_attempt_count(app_id, day) {
            Ok(count) => {
                self.remember_count(key, count);
                count
            }
            Err(e) => {
                warn!(app = app_id, error = %e, "attempt recount failed");
                self.known_counts.get(&key).copied().unwrap_or(0)
            }
        }
    }

    fn remember_count(&mut self, key: (String, NaiveDate), count: u32) {
        let day = key.1;
        self.known_counts.retain(|(_, d), _| *d >= day);
        self.known_counts.insert(key, count);
    }

    /// Teardown. Force-dismisses anything pending or showing.
    pub fn shutdown(&mut self) -> bool {
        let had_overlay = !matches!(self.state, OverlayState::Idle);
        if had_overlay || self.presenter.is_presenting() {
            self.presenter.force_dismiss();
        }
        self.state = OverlayState::Idle;
        if had_overlay {
            info!("overlay force-dismissed on shutdown");
        }
        had_overlay
    }
}

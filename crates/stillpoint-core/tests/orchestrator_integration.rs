//! Integration tests for the intervention orchestrator.
//!
//! Drives the full gate / present / resolve cycle against a memory store and a
//! recording presenter, with explicit event times.

mod common;

use chrono::{Duration, Utc};
use common::{harness, local, ms, noon, secs};
use stillpoint_core::guard::{
    ContentTier, Decision, Gate, Lookup, RejectReason, ResolveOutcome, Resolution,
    SuppressReason, Suppression,
};
use stillpoint_core::{BuiltinContent, NewIntervention, Outcome, ScheduleMode, Settings, Store};

fn presented(decision: Decision) -> stillpoint_core::PresentationRequest {
    match decision {
        Decision::Presented(request) => request,
        other => panic!("expected presentation, got {other:?}"),
    }
}

fn resolved(outcome: ResolveOutcome) -> (NewIntervention, Option<i64>) {
    match outcome {
        ResolveOutcome::Resolved { record, log_id } => (record, log_id),
        other => panic!("expected resolution, got {other:?}"),
    }
}

// ============================================================================
// Debounce, grace and session
// ============================================================================

#[test]
fn test_duplicate_events_produce_one_overlay() {
    let mut h = harness(&[("photo.app", "Photos")]);
    let t0 = noon();

    presented(h.orchestrator.handle_foreground("photo.app", t0));
    let second = h.orchestrator.handle_foreground("photo.app", t0 + ms(500));

    assert!(matches!(second, Decision::Suppressed(_)));
    assert_eq!(h.presenter.screen().presented.len(), 1);
}

#[test]
fn test_dismiss_grace_then_new_overlay() {
    let mut h = harness(&[("photo.app", "Photos")]);
    let t0 = noon();

    presented(h.orchestrator.handle_foreground("photo.app", t0));
    let dismissed_at = t0 + secs(1);
    resolved(h.orchestrator.resolve(&Resolution::resisted("photo.app"), dismissed_at));

    assert_eq!(
        h.orchestrator.handle_foreground("photo.app", dismissed_at + ms(1000)),
        Decision::Suppressed(SuppressReason::Session(Suppression::DismissGrace))
    );

    let again = presented(h.orchestrator.handle_foreground("photo.app", dismissed_at + ms(3500)));
    assert_eq!(again.decision.attempt_number, 2);
}

#[test]
fn test_proceeded_app_exempt_until_user_leaves() {
    let mut h = harness(&[("photo.app", "Photos"), ("chat.app", "Chat")]);
    let t0 = noon();

    presented(h.orchestrator.handle_foreground("photo.app", t0));
    resolved(h.orchestrator.resolve(&Resolution::proceeded("photo.app"), t0 + secs(2)));
    assert_eq!(h.orchestrator.active_session(), Some("photo.app"));

    assert_eq!(
        h.orchestrator.handle_foreground("photo.app", t0 + secs(10)),
        Decision::Suppressed(SuppressReason::Session(Suppression::ActiveSession))
    );

    // Another guarded app does not count as leaving.
    presented(h.orchestrator.handle_foreground("chat.app", t0 + secs(11)));
    resolved(h.orchestrator.resolve(&Resolution::resisted("chat.app"), t0 + secs(12)));
    assert_eq!(
        h.orchestrator.handle_foreground("photo.app", t0 + secs(20)),
        Decision::Suppressed(SuppressReason::Session(Suppression::ActiveSession))
    );

    assert_eq!(
        h.orchestrator.handle_foreground("launcher", t0 + secs(21)),
        Decision::Suppressed(SuppressReason::NotGuarded)
    );
    assert_eq!(h.orchestrator.active_session(), None);

    let back = presented(h.orchestrator.handle_foreground("photo.app", t0 + secs(22)));
    assert_eq!(back.decision.attempt_number, 2);
}

// ============================================================================
// Escalation and attempt numbering
// ============================================================================

#[test]
fn test_photo_app_escalation_ladder() {
    let mut h = harness(&[("photo.app", "Photos")]);
    let mut t = noon();
    let mut seen = Vec::new();

    for _ in 0..5 {
        let request = presented(h.orchestrator.handle_foreground("photo.app", t));
        seen.push((
            request.decision.attempt_number,
            request.decision.pause_duration_secs,
            request.decision.tier,
        ));
        resolved(h.orchestrator.resolve(&Resolution::resisted("photo.app"), t + secs(1)));
        t = t + secs(30);
    }

    assert_eq!(seen[0], (1, 2, ContentTier::BreathPrayer));
    assert_eq!(seen[1], (2, 5, ContentTier::Scripture));
    assert_eq!(seen[2], (3, 10, ContentTier::ScriptureDeeper));
    assert_eq!(seen[3], (4, 15, ContentTier::ScriptureCompanion));
    assert_eq!(seen[4], (5, 15, ContentTier::ScriptureCompanion));
}

#[test]
fn test_attempt_numbers_sequence_and_reset_next_day() {
    let mut h = harness(&[("photo.app", "Photos")]);
    let mut t = noon();

    for _ in 0..4 {
        presented(h.orchestrator.handle_foreground("photo.app", t));
        resolved(h.orchestrator.resolve(&Resolution::resisted("photo.app"), t + secs(1)));
        t = t + secs(10);
    }

    let next_morning = local(2026, 3, 3, 9, 0, 0);
    presented(h.orchestrator.handle_foreground("photo.app", next_morning));
    resolved(h.orchestrator.resolve(&Resolution::resisted("photo.app"), next_morning + secs(1)));

    let attempts: Vec<u32> = h
        .store
        .interventions()
        .unwrap()
        .iter()
        .map(|i| i.attempt_number)
        .collect();
    assert_eq!(attempts, vec![1, 2, 3, 4, 1]);
}

#[test]
fn test_attempts_are_counted_per_app() {
    let mut h = harness(&[("photo.app", "Photos"), ("chat.app", "Chat")]);
    let t0 = noon();

    presented(h.orchestrator.handle_foreground("photo.app", t0));
    resolved(h.orchestrator.resolve(&Resolution::resisted("photo.app"), t0 + secs(1)));

    let chat = presented(h.orchestrator.handle_foreground("chat.app", t0 + secs(5)));
    assert_eq!(chat.decision.attempt_number, 1);
}

#[test]
fn test_resolution_across_midnight_counts_for_new_day() {
    let mut h = harness(&[("photo.app", "Photos")]);
    let morning = local(2026, 3, 2, 8, 0, 0).with_timezone(&Utc);
    for attempt in 1..=2 {
        h.store
            .append_intervention(&NewIntervention {
                timestamp: morning + Duration::minutes(attempt.into()),
                source_identifier: "photo.app".into(),
                source_name: "Photos".into(),
                outcome: Outcome::Resisted,
                scripture_reference: "Psalm 46:10".into(),
                pause_duration_secs: 2,
                attempt_number: attempt,
                estimated_time_saved_secs: 300,
            })
            .unwrap();
    }

    let late = local(2026, 3, 2, 23, 59, 50);
    let request = presented(h.orchestrator.handle_foreground("photo.app", late));
    assert_eq!(request.decision.attempt_number, 3);

    let (record, _) = resolved(
        h.orchestrator
            .resolve(&Resolution::resisted("photo.app"), local(2026, 3, 3, 0, 0, 5)),
    );
    assert_eq!(record.attempt_number, 1);
    assert_eq!(record.pause_duration_secs, 10);
}

// ============================================================================
// Resolution rules
// ============================================================================

#[test]
fn test_early_proceed_is_rejected_and_overlay_stays() {
    let mut h = harness(&[("photo.app", "Photos")]);
    let t0 = noon();
    presented(h.orchestrator.handle_foreground("photo.app", t0));

    assert_eq!(
        h.orchestrator.resolve(&Resolution::proceeded("photo.app"), t0 + ms(1500)),
        ResolveOutcome::Rejected(RejectReason::PauseNotElapsed { remaining_ms: 500 })
    );
    assert!(h.orchestrator.is_showing());
    assert!(h.presenter.screen().showing);

    let (record, log_id) =
        resolved(h.orchestrator.resolve(&Resolution::proceeded("photo.app"), t0 + secs(2)));
    assert_eq!(record.outcome, Outcome::Proceeded);
    assert_eq!(record.estimated_time_saved_secs, 0);
    assert!(log_id.is_some());
}

#[test]
fn test_resist_is_allowed_immediately() {
    let mut h = harness(&[("photo.app", "Photos")]);
    let t0 = noon();
    presented(h.orchestrator.handle_foreground("photo.app", t0));

    let (record, _) = resolved(h.orchestrator.resolve(&Resolution::resisted("photo.app"), t0));
    assert_eq!(record.estimated_time_saved_secs, 300);
    assert_eq!(h.presenter.screen().dismissed, 1);
}

#[test]
fn test_reflection_delivered_only_on_resist() {
    let mut h = harness(&[("photo.app", "Photos")]);
    h.store
        .update_settings(Settings {
            personal_commitment: Some("Phones stay in the hall at dinner".into()),
            ..Settings::default()
        })
        .unwrap();
    let t0 = noon();

    presented(h.orchestrator.handle_foreground("photo.app", t0));
    resolved(h.orchestrator.resolve(&Resolution::resisted("photo.app"), t0 + secs(1)));

    presented(h.orchestrator.handle_foreground("photo.app", t0 + secs(30)));
    resolved(h.orchestrator.resolve(&Resolution::proceeded("photo.app"), t0 + secs(40)));

    let screen = h.presenter.screen();
    assert_eq!(screen.reflections.len(), 1);
    assert_eq!(
        screen.reflections[0].personal_commitment.as_deref(),
        Some("Phones stay in the hall at dinner")
    );
    assert_eq!(
        screen.reflections[0].scripture_reference,
        screen.presented[0].decision.scripture_reference
    );
}

#[test]
fn test_each_overlay_logs_exactly_once() {
    let mut h = harness(&[("photo.app", "Photos")]);
    let t0 = noon();
    presented(h.orchestrator.handle_foreground("photo.app", t0));
    resolved(h.orchestrator.resolve(&Resolution::resisted("photo.app"), t0 + secs(1)));

    assert_eq!(
        h.orchestrator.resolve(&Resolution::resisted("photo.app"), t0 + secs(2)),
        ResolveOutcome::Rejected(RejectReason::NoOverlay)
    );
    assert_eq!(h.store.interventions().unwrap().len(), 1);
}

#[test]
fn test_resolution_for_other_app_is_ignored() {
    let mut h = harness(&[("photo.app", "Photos")]);
    let t0 = noon();
    presented(h.orchestrator.handle_foreground("photo.app", t0));

    assert_eq!(
        h.orchestrator.resolve(&Resolution::resisted("chat.app"), t0 + secs(1)),
        ResolveOutcome::Rejected(RejectReason::AppMismatch { showing: "photo.app".into() })
    );
    assert!(h.orchestrator.is_showing());
    assert!(h.store.interventions().unwrap().is_empty());
}

#[test]
fn test_abandoned_overlay_writes_nothing() {
    let mut h = harness(&[("photo.app", "Photos")]);
    presented(h.orchestrator.handle_foreground("photo.app", noon()));
    h.orchestrator.shutdown();
    assert!(h.store.interventions().unwrap().is_empty());
    assert_eq!(h.presenter.screen().force_dismissed, 1);
}

// ============================================================================
// Snooze and schedule
// ============================================================================

#[test]
fn test_snooze_window() {
    let mut h = harness(&[("photo.app", "Photos")]);
    let t0 = noon();
    assert!(h.orchestrator.set_snooze_until(Some(t0.with_timezone(&Utc) + ms(60_000))));

    assert_eq!(
        h.orchestrator.handle_foreground("photo.app", t0 + ms(30_000)),
        Decision::Suppressed(SuppressReason::Snoozed)
    );
    presented(h.orchestrator.handle_foreground("photo.app", t0 + ms(61_000)));
}

#[test]
fn test_clear_snooze_reopens_gate() {
    let mut h = harness(&[("photo.app", "Photos")]);
    let t0 = noon();
    h.orchestrator
        .set_snooze_until(Some(t0.with_timezone(&Utc) + Duration::hours(1)));
    assert_eq!(
        h.orchestrator.handle_foreground("photo.app", t0),
        Decision::Suppressed(SuppressReason::Snoozed)
    );

    h.orchestrator.clear_snooze();
    assert_eq!(h.store.settings().unwrap().snooze_until, None);
    presented(h.orchestrator.handle_foreground("photo.app", t0 + secs(1)));
}

#[test]
fn test_evening_schedule_gate() {
    let mut h = harness(&[("photo.app", "Photos")]);
    h.store
        .update_settings(Settings { schedule_mode: ScheduleMode::Evening, ..Settings::default() })
        .unwrap();

    assert_eq!(
        h.orchestrator.handle_foreground("photo.app", local(2026, 3, 2, 10, 0, 0)),
        Decision::Suppressed(SuppressReason::OutsideSchedule)
    );
    presented(h.orchestrator.handle_foreground("photo.app", local(2026, 3, 2, 19, 0, 0)));
}

#[test]
fn test_unrecognized_mode_fails_open() {
    let mut h = harness(&[("photo.app", "Photos")]);
    h.store
        .update_settings(Settings {
            schedule_mode: ScheduleMode::Unrecognized,
            ..Settings::default()
        })
        .unwrap();
    presented(h.orchestrator.handle_foreground("photo.app", local(2026, 3, 2, 10, 0, 0)));
}

// ============================================================================
// Capability and presentation races
// ============================================================================

#[test]
fn test_missing_permission_suppresses_without_presenting() {
    let mut h = harness(&[("photo.app", "Photos")]);
    h.presenter.screen().permission_denied = true;
    assert_eq!(
        h.orchestrator.handle_foreground("photo.app", noon()),
        Decision::Suppressed(SuppressReason::NoPermission)
    );
    assert!(h.presenter.screen().presented.is_empty());
}

#[test]
fn test_events_during_lookup_are_gated() {
    let mut h = harness(&[("photo.app", "Photos"), ("chat.app", "Chat")]);
    let t0 = noon();

    let Gate::Admitted(pending) = h.orchestrator.begin("photo.app", t0) else {
        panic!("expected admission");
    };
    assert_eq!(
        h.orchestrator.begin("chat.app", t0 + ms(200)),
        Gate::Suppressed(SuppressReason::OverlayActive)
    );

    let lookup = Lookup::gather(&*h.store, &BuiltinContent, "photo.app", pending.day);
    let request = presented(h.orchestrator.complete(&pending, lookup, t0 + ms(300)));
    assert_eq!(request.app_id, "photo.app");
    assert_eq!(h.presenter.screen().presented.len(), 1);
}

#[test]
fn test_pause_counts_from_presentation_after_slow_lookup() {
    let mut h = harness(&[("photo.app", "Photos")]);
    let t0 = noon();

    let Gate::Admitted(pending) = h.orchestrator.begin("photo.app", t0) else {
        panic!("expected admission");
    };
    let lookup = Lookup::gather(&*h.store, &BuiltinContent, "photo.app", pending.day);
    let request = presented(h.orchestrator.complete(&pending, lookup, t0 + secs(3)));
    assert_eq!(request.decision.pause_duration_secs, 2);

    // Two seconds after the event, but only one after the overlay went up.
    assert_eq!(
        h.orchestrator.resolve(&Resolution::proceeded("photo.app"), t0 + secs(4)),
        ResolveOutcome::Rejected(RejectReason::PauseNotElapsed { remaining_ms: 1000 })
    );
    assert!(h.orchestrator.is_showing());

    let (record, _) = resolved(
        h.orchestrator.resolve(&Resolution::proceeded("photo.app"), t0 + secs(5)),
    );
    assert_eq!(record.outcome, Outcome::Proceeded);
}

#[test]
fn test_recheck_drops_attempt_when_boundary_busy() {
    let mut h = harness(&[("photo.app", "Photos")]);
    let Gate::Admitted(pending) = h.orchestrator.begin("photo.app", noon()) else {
        panic!("expected admission");
    };
    h.presenter.screen().showing = true;

    let lookup = Lookup::gather(&*h.store, &BuiltinContent, "photo.app", pending.day);
    assert_eq!(
        h.orchestrator.complete(&pending, lookup, noon()),
        Decision::Suppressed(SuppressReason::Superseded)
    );
    assert_eq!(h.orchestrator.current_ticket(), None);
}

#[test]
fn test_shutdown_while_pending_force_dismisses() {
    let mut h = harness(&[("photo.app", "Photos")]);
    let Gate::Admitted(pending) = h.orchestrator.begin("photo.app", noon()) else {
        panic!("expected admission");
    };
    assert!(h.orchestrator.shutdown());
    assert_eq!(h.presenter.screen().force_dismissed, 1);

    let lookup = Lookup::gather(&*h.store, &BuiltinContent, "photo.app", pending.day);
    assert_eq!(
        h.orchestrator.complete(&pending, lookup, noon()),
        Decision::Suppressed(SuppressReason::Superseded)
    );
    assert!(h.presenter.screen().presented.is_empty());
}

// ============================================================================
// Storage failures
// ============================================================================

#[test]
fn test_log_failure_still_updates_session_state() {
    let mut h = harness(&[("photo.app", "Photos")]);
    let t0 = noon();
    presented(h.orchestrator.handle_foreground("photo.app", t0));

    h.store.set_failing(true);
    let (_, log_id) =
        resolved(h.orchestrator.resolve(&Resolution::proceeded("photo.app"), t0 + secs(3)));
    assert_eq!(log_id, None);
    assert!(!h.orchestrator.is_showing());
    assert_eq!(h.orchestrator.active_session(), Some("photo.app"));
    assert_eq!(
        h.orchestrator.handle_foreground("photo.app", t0 + secs(4)),
        Decision::Suppressed(SuppressReason::Session(Suppression::DismissGrace))
    );
}

#[test]
fn test_count_failure_falls_back_to_last_known_count() {
    let mut h = harness(&[("photo.app", "Photos")]);
    let t0 = noon();
    presented(h.orchestrator.handle_foreground("photo.app", t0));
    resolved(h.orchestrator.resolve(&Resolution::resisted("photo.app"), t0 + secs(1)));

    h.store.set_failing(true);
    let request = presented(h.orchestrator.handle_foreground("photo.app", t0 + secs(10)));
    assert_eq!(request.decision.attempt_number, 2);
}

#[test]
fn test_initial_refresh_failure_retries_on_next_event() {
    let mut h = harness(&[("photo.app", "Photos")]);
    h.store.set_failing(true);
    assert_eq!(
        h.orchestrator.handle_foreground("photo.app", noon()),
        Decision::Suppressed(SuppressReason::NotGuarded)
    );

    h.store.set_failing(false);
    presented(h.orchestrator.handle_foreground("photo.app", noon() + secs(1)));
}

#[test]
fn test_refresh_failure_keeps_last_snapshot() {
    let mut h = harness(&[("photo.app", "Photos")]);
    let t0 = noon();
    presented(h.orchestrator.handle_foreground("photo.app", t0));
    resolved(h.orchestrator.resolve(&Resolution::resisted("photo.app"), t0 + secs(1)));

    h.invalidation.mark_dirty();
    h.store.set_failing(true);
    // Still guarded from the previous snapshot; count falls back too.
    let request = presented(h.orchestrator.handle_foreground("photo.app", t0 + secs(10)));
    assert_eq!(request.decision.attempt_number, 2);
}

#[test]
fn test_mark_dirty_picks_up_new_app() {
    let mut h = harness(&[("photo.app", "Photos")]);
    let t0 = noon();
    assert_eq!(
        h.orchestrator.handle_foreground("chat.app", t0),
        Decision::Suppressed(SuppressReason::NotGuarded)
    );

    h.store
        .upsert_guarded_app(stillpoint_core::GuardedApp::new("chat.app", "Chat"))
        .unwrap();
    assert_eq!(
        h.orchestrator.handle_foreground("chat.app", t0 + secs(1)),
        Decision::Suppressed(SuppressReason::NotGuarded)
    );

    h.orchestrator.mark_guarded_set_dirty();
    presented(h.orchestrator.handle_foreground("chat.app", t0 + secs(2)));
}

#[test]
fn test_clean_cache_is_not_reloaded() {
    let mut h = harness(&[("photo.app", "Photos")]);
    h.orchestrator.handle_foreground("launcher", noon());
    h.orchestrator.handle_foreground("mail.app", noon() + secs(1));
    h.orchestrator.handle_foreground("notes.app", noon() + secs(2));
    assert_eq!(h.store.app_loads(), 1);
}

#[test]
fn test_host_app_never_triggers() {
    let mut h = harness(&[("app.stillpoint", "Stillpoint")]);
    assert_eq!(
        h.orchestrator.handle_foreground("app.stillpoint", noon()),
        Decision::Suppressed(SuppressReason::HostApp)
    );
}

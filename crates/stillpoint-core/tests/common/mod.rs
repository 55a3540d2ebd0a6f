//! Shared fixtures for the guard engine integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Local, TimeZone};
use stillpoint_core::error::PresentError;
use stillpoint_core::guard::{
    InvalidationChannel, Orchestrator, OrchestratorConfig, OverlayPresenter, PresentationRequest,
    ReflectionContent,
};
use stillpoint_core::{BuiltinContent, GuardedApp, MemoryStore};

// ============================================================================
// Recording presenter
// ============================================================================

#[derive(Debug, Default)]
pub struct Screen {
    pub presented: Vec<PresentationRequest>,
    pub showing: bool,
    pub permission_denied: bool,
    pub refuse: bool,
    pub dismissed: usize,
    pub force_dismissed: usize,
    pub unlocked: Vec<u64>,
    pub reflections: Vec<ReflectionContent>,
}

/// Presenter that records every call. Clones share the same screen.
#[derive(Clone, Default)]
pub struct RecordingPresenter(Arc<Mutex<Screen>>);

impl RecordingPresenter {
    pub fn screen(&self) -> MutexGuard<'_, Screen> {
        self.0.lock().unwrap()
    }
}

impl OverlayPresenter for RecordingPresenter {
    fn present(&mut self, request: &PresentationRequest) -> Result<(), PresentError> {
        let mut screen = self.screen();
        if screen.refuse {
            return Err(PresentError::Rejected("refused by test".into()));
        }
        if screen.showing {
            return Err(PresentError::AlreadyPresenting);
        }
        screen.presented.push(request.clone());
        screen.showing = true;
        Ok(())
    }

    fn dismiss(&mut self) {
        let mut screen = self.screen();
        screen.showing = false;
        screen.dismissed += 1;
    }

    fn force_dismiss(&mut self) {
        let mut screen = self.screen();
        screen.showing = false;
        screen.force_dismissed += 1;
    }

    fn is_presenting(&self) -> bool {
        self.screen().showing
    }

    fn has_overlay_permission(&self) -> bool {
        !self.screen().permission_denied
    }

    fn unlock_proceed(&mut self, ticket: u64) {
        self.screen().unlocked.push(ticket);
    }

    fn deliver_reflection(&mut self, content: &ReflectionContent) {
        self.screen().reflections.push(content.clone());
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub presenter: RecordingPresenter,
    pub invalidation: InvalidationChannel,
    pub orchestrator: Orchestrator,
}

/// Orchestrator over a memory store guarding `apps` (identifier, name).
pub fn harness(apps: &[(&str, &str)]) -> Harness {
    let store = Arc::new(MemoryStore::new());
    for (id, name) in apps {
        store.upsert_guarded_app(GuardedApp::new(*id, *name)).unwrap();
    }
    let presenter = RecordingPresenter::default();
    let invalidation = InvalidationChannel::new();
    let orchestrator = Orchestrator::new(
        OrchestratorConfig::default(),
        store.clone(),
        Arc::new(BuiltinContent),
        Box::new(presenter.clone()),
        invalidation.clone(),
    );
    Harness { store, presenter, invalidation, orchestrator }
}

pub fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

/// 2026-03-02 12:00:00 local.
pub fn noon() -> DateTime<Local> {
    local(2026, 3, 2, 12, 0, 0)
}

pub fn ms(n: i64) -> Duration {
    Duration::milliseconds(n)
}

pub fn secs(n: i64) -> Duration {
    Duration::seconds(n)
}

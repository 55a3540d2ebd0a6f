//! The intervention guard engine.
//!
//! Leaves first: [`cache`], [`schedule`], [`session`], [`escalation`], then
//! the [`orchestrator`] that ties them to the [`boundary`] traits.

pub mod boundary;
pub mod cache;
pub mod escalation;
pub mod orchestrator;
pub mod schedule;
pub mod session;

pub use boundary::{OverlayPresenter, PresentationRequest, ReflectionContent, Resolution};
pub use cache::{GuardedSetCache, InvalidationChannel};
pub use escalation::{
    pause_duration_secs, CompanionAttribution, ContentTier, EscalationCalculator,
    EscalationDecision, MAX_PAUSE_SECS,
};
pub use orchestrator::{
    Decision, Gate, Lookup, Orchestrator, OrchestratorConfig, PendingIntervention, RejectReason,
    ResolveOutcome, SuppressReason,
};
pub use schedule::is_active;
pub use session::{SessionTracker, Suppression};

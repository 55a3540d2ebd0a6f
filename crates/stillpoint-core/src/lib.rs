//! # Stillpoint Core Library
//!
//! This library provides the intervention gating and escalation engine behind
//! Stillpoint: when a guarded application comes to the foreground it decides
//! whether to put up a reflection overlay, how long the pause lasts, what
//! content it carries, and how the outcome is logged.
//!
//! ## Architecture
//!
//! - **Guard engine**: a synchronous state machine ([`Orchestrator`]) built
//!   from the guarded-set cache, schedule evaluator, session tracker and
//!   escalation calculator
//! - **Service**: a tokio task that serializes foreground events and runs the
//!   one blocking lookup off the event path
//! - **Storage**: SQLite-based guarded apps, settings and intervention log, plus
//!   TOML-based configuration
//! - **Content**: daily scripture keyed by liturgical season
//!
//! ## Key Components
//!
//! - [`Orchestrator`]: Core gate and resolution state machine
//! - [`GuardService`]: Async runtime around the orchestrator
//! - [`Database`]: Persistence for apps, settings and the intervention log
//! - [`Config`]: Application configuration management
//! - [`OverlayPresenter`]: Trait implemented by the host's overlay surface

pub mod content;
pub mod error;
pub mod events;
pub mod guard;
pub mod service;
pub mod stats;
pub mod storage;
pub mod types;

pub use content::{BuiltinContent, ContentProvider, DailyContent, Season, StoredContent};
pub use error::{ConfigError, CoreError, DatabaseError, PresentError, ValidationError};
pub use events::Event;
pub use guard::{
    ContentTier, Decision, EscalationCalculator, EscalationDecision, InvalidationChannel,
    Orchestrator, OrchestratorConfig, OverlayPresenter, PresentationRequest, ReflectionContent,
    Resolution, ResolveOutcome, SuppressReason,
};
pub use service::{Command, GuardService, ServiceHandle};
pub use stats::{AppSummary, TodayStats};
pub use storage::{Config, Database, MemoryStore, Store};
pub use types::{CustomSchedule, GuardedApp, Intervention, NewIntervention, Outcome, ScheduleMode, Settings};

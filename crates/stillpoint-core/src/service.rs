//! Guard service runtime.
//!
//! One tokio task owns the [`Orchestrator`] and handles commands strictly one
//! at a time. The attempt-count lookup for an admitted event runs on the
//! blocking pool; its completion comes back into the same loop, so new
//! foreground events keep flowing while it is in flight and the orchestrator's
//! re-check settles any race. Log writes happen inside the loop, so a count
//! query never runs ahead of the previous intervention's record.
//!
//! ```ignore
//! let handle = GuardService::spawn(orchestrator);
//! let mut events = handle.subscribe();
//! handle.foreground("photo.app")?;
//! ```

use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::guard::{
    Decision, Gate, InvalidationChannel, Lookup, Orchestrator, PendingIntervention,
    ResolveOutcome, Resolution,
};

const EVENT_CAPACITY: usize = 128;

/// Messages accepted by the service loop.
#[derive(Debug, Clone)]
pub enum Command {
    Foreground { app_id: String, at: DateTime<Local> },
    Resolve { resolution: Resolution, at: DateTime<Local> },
    MarkGuardedSetDirty,
    SetSnooze(DateTime<Utc>),
    ClearSnooze,
    Shutdown,
}

/// Completions produced by tasks the loop spawned.
enum Internal {
    LookupDone {
        pending: PendingIntervention,
        lookup: Option<Lookup>,
        /// When the gate admitted the event, on the runtime clock.
        admitted: Instant,
    },
    PauseElapsed {
        ticket: u64,
    },
}

/// Handle to a running service. Dropping it closes the command channel, which
/// stops the loop the same way as [`ServiceHandle::shutdown`] without waiting
/// for it to exit.
pub struct ServiceHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<Event>,
    invalidation: InvalidationChannel,
    task: JoinHandle<()>,
}

impl ServiceHandle {
    pub fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| CoreError::ServiceStopped)
    }

    /// Report a foreground change observed now.
    pub fn foreground(&self, app_id: impl Into<String>) -> Result<()> {
        self.foreground_at(app_id, Local::now())
    }

    pub fn foreground_at(&self, app_id: impl Into<String>, at: DateTime<Local>) -> Result<()> {
        self.send(Command::Foreground { app_id: app_id.into(), at })
    }

    pub fn resolve(&self, resolution: Resolution) -> Result<()> {
        self.resolve_at(resolution, Local::now())
    }

    pub fn resolve_at(&self, resolution: Resolution, at: DateTime<Local>) -> Result<()> {
        self.send(Command::Resolve { resolution, at })
    }

    pub fn mark_guarded_set_dirty(&self) -> Result<()> {
        self.send(Command::MarkGuardedSetDirty)
    }

    pub fn set_snooze_until(&self, until: DateTime<Utc>) -> Result<()> {
        self.send(Command::SetSnooze(until))
    }

    pub fn clear_snooze(&self) -> Result<()> {
        self.send(Command::ClearSnooze)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Invalidation channel shared with the orchestrator's cache. Marking it
    /// dirty directly skips the `GuardedSetInvalidated` event.
    pub fn invalidation(&self) -> InvalidationChannel {
        self.invalidation.clone()
    }

    /// Stop the service and wait for its loop to exit.
    pub async fn shutdown(self) {
        // Already stopped if the send fails.
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            error!(error = %e, "guard service task failed");
        }
    }
}

pub struct GuardService {
    orchestrator: Orchestrator,
    events: broadcast::Sender<Event>,
    internal: mpsc::UnboundedSender<Internal>,
    countdown: Option<JoinHandle<()>>,
}

impl GuardService {
    /// Start the service loop on the current tokio runtime.
    pub fn spawn(orchestrator: Orchestrator) -> ServiceHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let invalidation = orchestrator.invalidation();

        let service = Self {
            orchestrator,
            events: events.clone(),
            internal: internal_tx,
            countdown: None,
        };
        let task = tokio::spawn(service.run(command_rx, internal_rx));

        ServiceHandle { commands: command_tx, events, invalidation, task }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        info!("guard service started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(message) = internal.recv() => self.handle_internal(message),
            }
        }
        self.stop();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Foreground { app_id, at } => match self.orchestrator.begin(&app_id, at) {
                Gate::Suppressed(reason) => self.emit(Event::Suppressed {
                    app_id,
                    reason,
                    at: Utc::now(),
                }),
                Gate::Admitted(pending) => self.spawn_lookup(pending),
            },
            Command::Resolve { resolution, at } => {
                match self.orchestrator.resolve(&resolution, at) {
                    ResolveOutcome::Resolved { record, log_id } => {
                        self.cancel_countdown();
                        self.emit(Event::Resolved {
                            app_id: record.source_identifier,
                            outcome: record.outcome,
                            attempt_number: record.attempt_number,
                            log_id,
                            at: Utc::now(),
                        });
                    }
                    ResolveOutcome::Rejected(reason) => self.emit(Event::ResolutionRejected {
                        app_id: resolution.app_id,
                        reason,
                        at: Utc::now(),
                    }),
                }
            }
            Command::MarkGuardedSetDirty => {
                self.orchestrator.mark_guarded_set_dirty();
                self.emit(Event::GuardedSetInvalidated { at: Utc::now() });
            }
            Command::SetSnooze(until) => {
                self.orchestrator.set_snooze_until(Some(until));
                self.emit(Event::SnoozeChanged { until: Some(until), at: Utc::now() });
            }
            Command::ClearSnooze => {
                self.orchestrator.clear_snooze();
                self.emit(Event::SnoozeChanged { until: None, at: Utc::now() });
            }
            Command::Shutdown => {}
        }
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::LookupDone { pending, lookup: Some(lookup), admitted } => {
                let lookup_time = chrono::Duration::from_std(admitted.elapsed())
                    .unwrap_or_else(|_| chrono::Duration::zero());
                let presented_at = pending.at + lookup_time;
                match self.orchestrator.complete(&pending, lookup, presented_at) {
                    Decision::Presented(request) => {
                        self.start_countdown(request.ticket, request.decision.pause_duration_secs);
                        self.emit(Event::OverlayRequested {
                            ticket: request.ticket,
                            app_id: request.app_id,
                            app_name: request.app_name,
                            attempt_number: request.decision.attempt_number,
                            pause_duration_secs: request.decision.pause_duration_secs,
                            tier: request.decision.tier,
                            at: Utc::now(),
                        });
                    }
                    Decision::Suppressed(reason) => self.emit(Event::Suppressed {
                        app_id: pending.app_id,
                        reason,
                        at: Utc::now(),
                    }),
                    Decision::Failed { app_id, message } => {
                        self.emit(Event::PresentationFailed { app_id, message, at: Utc::now() })
                    }
                }
            }
            Internal::LookupDone { pending, lookup: None, .. } => {
                self.orchestrator.cancel_pending(pending.ticket);
                self.emit(Event::PresentationFailed {
                    app_id: pending.app_id,
                    message: "attempt lookup did not complete".into(),
                    at: Utc::now(),
                });
            }
            Internal::PauseElapsed { ticket } => {
                if self.orchestrator.on_pause_elapsed(ticket) {
                    self.emit(Event::ChoicesUnlocked { ticket, at: Utc::now() });
                }
            }
        }
    }

    fn spawn_lookup(&self, pending: PendingIntervention) {
        let store = self.orchestrator.store();
        let content = self.orchestrator.content_provider();
        let internal = self.internal.clone();
        let admitted = Instant::now();

        tokio::spawn(async move {
            let app_id = pending.app_id.clone();
            let day = pending.day;
            let joined = tokio::task::spawn_blocking(move || {
                Lookup::gather(&*store, &*content, &app_id, day)
            })
            .await;

            let lookup = match joined {
                Ok(lookup) => Some(lookup),
                Err(e) => {
                    error!(app = %pending.app_id, error = %e, "attempt lookup task failed");
                    None
                }
            };
            // The loop is gone after shutdown; nothing to deliver to.
            let _ = internal.send(Internal::LookupDone { pending, lookup, admitted });
        });
    }

    fn start_countdown(&mut self, ticket: u64, pause_secs: u32) {
        self.cancel_countdown();
        let internal = self.internal.clone();
        self.countdown = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(u64::from(pause_secs))).await;
            let _ = internal.send(Internal::PauseElapsed { ticket });
        }));
    }

    fn cancel_countdown(&mut self) {
        if let Some(countdown) = self.countdown.take() {
            countdown.abort();
        }
    }

    fn stop(&mut self) {
        self.cancel_countdown();
        self.orchestrator.shutdown();
        self.emit(Event::Stopped { at: Utc::now() });
        info!("guard service stopped");
    }

    fn emit(&self, event: Event) {
        debug!(?event, "event");
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

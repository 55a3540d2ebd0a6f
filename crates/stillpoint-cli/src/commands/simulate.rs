//! Interactive driver for the guard service.
//!
//! Reads one command per line from stdin and prints overlay activity and
//! service events to stdout. Events are printed as JSON lines.

use std::io::BufRead;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use stillpoint_core::error::PresentError;
use stillpoint_core::guard::{
    InvalidationChannel, Orchestrator, OrchestratorConfig, OverlayPresenter, PresentationRequest,
    ReflectionContent, Resolution,
};
use stillpoint_core::{Config, Database, GuardService, ServiceHandle, StoredContent};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::snooze_deadline;

const HELP: &str = "commands: open <app-id> | resist | proceed | dirty | snooze <minutes> | unsnooze | help | quit";

#[derive(Default)]
struct Overlay {
    /// App id of the overlay on screen.
    showing: Option<String>,
}

/// Prints the overlay to the terminal. Clones share state.
#[derive(Clone, Default)]
struct TerminalPresenter(Arc<Mutex<Overlay>>);

impl TerminalPresenter {
    fn overlay(&self) -> MutexGuard<'_, Overlay> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn showing(&self) -> Option<String> {
        self.overlay().showing.clone()
    }
}

impl OverlayPresenter for TerminalPresenter {
    fn present(&mut self, request: &PresentationRequest) -> Result<(), PresentError> {
        let mut overlay = self.overlay();
        if overlay.showing.is_some() {
            return Err(PresentError::AlreadyPresenting);
        }
        overlay.showing = Some(request.app_id.clone());

        let d = &request.decision;
        println!();
        println!("  ── {} (attempt {}) ──", request.app_name, d.attempt_number);
        println!("  {}", d.breath_prayer);
        println!("  \"{}\" ({})", d.scripture_text, d.scripture_reference);
        if let Some(prompt) = &d.sub_prompt {
            println!("  {prompt}");
        }
        if let Some(companion) = &d.companion {
            println!("  \"{}\" ({})", companion.quote, companion.name);
        }
        println!("  wait {}s, then: resist | proceed", d.pause_duration_secs);
        Ok(())
    }

    fn dismiss(&mut self) {
        self.overlay().showing = None;
    }

    fn force_dismiss(&mut self) {
        if self.overlay().showing.take().is_some() {
            println!("  (overlay closed)");
        }
    }

    fn is_presenting(&self) -> bool {
        self.overlay().showing.is_some()
    }

    fn has_overlay_permission(&self) -> bool {
        true
    }

    fn unlock_proceed(&mut self, _ticket: u64) {
        println!("  proceed is now available");
    }

    fn deliver_reflection(&mut self, content: &ReflectionContent) {
        println!("  {}", content.reflection);
        if let Some(commitment) = &content.personal_commitment {
            println!("  Remember: {commitment}");
        }
    }
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Arc::new(Database::open_at(&config.database_path()?)?);
    let presenter = TerminalPresenter::default();

    let orchestrator = Orchestrator::new(
        OrchestratorConfig::from(&config.guard),
        db.clone(),
        Arc::new(StoredContent::new(db)),
        Box::new(presenter.clone()),
        InvalidationChannel::new(),
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(drive(orchestrator, presenter))
}

async fn drive(
    orchestrator: Orchestrator,
    presenter: TerminalPresenter,
) -> Result<(), Box<dyn std::error::Error>> {
    let handle = GuardService::spawn(orchestrator);
    let mut events = handle.subscribe();

    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!(error = %e, "failed to encode event"),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("{HELP}");
    loop {
        let line = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|n| (n > 0).then_some(line))
        })
        .await??;

        let Some(line) = line else { break };
        match dispatch(&handle, &presenter, line.trim()) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("error: {e}"),
        }
    }

    handle.shutdown().await;
    printer.await?;
    Ok(())
}

/// Returns false when the session should end.
fn dispatch(
    handle: &ServiceHandle,
    presenter: &TerminalPresenter,
    line: &str,
) -> Result<bool, Box<dyn std::error::Error>> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(true);
    };

    match (command, words.next()) {
        ("open", Some(app_id)) => handle.foreground(app_id)?,
        ("resist", _) => handle.resolve(Resolution::resisted(showing(presenter)?))?,
        ("proceed", _) => handle.resolve(Resolution::proceeded(showing(presenter)?))?,
        ("dirty", _) => handle.mark_guarded_set_dirty()?,
        ("snooze", Some(minutes)) => {
            let minutes: i64 = minutes.parse()?;
            handle.set_snooze_until(snooze_deadline(Utc::now(), minutes)?)?;
        }
        ("unsnooze", _) => handle.clear_snooze()?,
        ("help", _) => println!("{HELP}"),
        ("quit" | "exit", _) => return Ok(false),
        _ => println!("{HELP}"),
    }
    Ok(true)
}

fn showing(presenter: &TerminalPresenter) -> Result<String, Box<dyn std::error::Error>> {
    presenter
        .showing()
        .ok_or_else(|| "no overlay is showing".into())
}

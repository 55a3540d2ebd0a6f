//! Overlay presentation boundary.
//!
//! The engine never renders anything. It hands a [`PresentationRequest`] to an
//! [`OverlayPresenter`] and later receives the user's choice back as a
//! [`Resolution`] message.

use serde::{Deserialize, Serialize};

use super::escalation::EscalationDecision;
use crate::error::PresentError;
use crate::types::Outcome;

/// One overlay to put on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationRequest {
    /// Distinguishes this presentation from earlier and later ones.
    pub ticket: u64,
    pub app_id: String,
    pub app_name: String,
    pub decision: EscalationDecision,
}

/// The user's terminal choice on an overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub app_id: String,
    pub outcome: Outcome,
}

impl Resolution {
    pub fn resisted(app_id: impl Into<String>) -> Self {
        Self { app_id: app_id.into(), outcome: Outcome::Resisted }
    }

    pub fn proceeded(app_id: impl Into<String>) -> Self {
        Self { app_id: app_id.into(), outcome: Outcome::Proceeded }
    }
}

/// Shown after the user resists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectionContent {
    pub scripture_reference: String,
    pub scripture_text: String,
    pub reflection: String,
    pub personal_commitment: Option<String>,
}

/// Host-side overlay surface.
pub trait OverlayPresenter: Send {
    /// Put the overlay on screen. The proceed choice starts locked.
    fn present(&mut self, request: &PresentationRequest) -> Result<(), PresentError>;

    /// Remove the overlay after a resolution.
    fn dismiss(&mut self);

    /// Remove whatever is on screen during teardown.
    fn force_dismiss(&mut self);

    fn is_presenting(&self) -> bool;

    fn has_overlay_permission(&self) -> bool;

    /// The pause for `ticket` has elapsed; the proceed choice may be offered.
    fn unlock_proceed(&mut self, _ticket: u64) {}

    fn deliver_reflection(&mut self, _content: &ReflectionContent) {}
}

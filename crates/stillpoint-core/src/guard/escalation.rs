//! Escalation ladder.
//!
//! The first interruption of the day is nearly frictionless; repeated reuse of
//! the same app accrues longer pauses and heavier content.
//!
//! | prior today | pause | tier                  |
//! |-------------|-------|-----------------------|
//! | 0           | 2s    | `BreathPrayer`        |
//! | 1           | 5s    | `Scripture`           |
//! | 2           | 10s   | `ScriptureDeeper`     |
//! | 3+          | 15s   | `ScriptureCompanion`  |

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::content::{DailyContent, DEFAULT_COMPANION_NAME, DEFAULT_COMPANION_QUOTE};

/// How much content the overlay carries. Ordered from lightest to heaviest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentTier {
    /// Symbol and one short line.
    BreathPrayer,
    /// Scripture plus a basic prompt.
    Scripture,
    /// Scripture plus a prompt naming the attempt count.
    ScriptureDeeper,
    /// Adds a companion quote.
    ScriptureCompanion,
}

impl ContentTier {
    pub fn for_prior_count(prior: u32) -> Self {
        match prior {
            0 => ContentTier::BreathPrayer,
            1 => ContentTier::Scripture,
            2 => ContentTier::ScriptureDeeper,
            _ => ContentTier::ScriptureCompanion,
        }
    }
}

/// Pause before "proceed" unlocks, in seconds.
pub fn pause_duration_secs(prior: u32) -> u32 {
    match prior {
        0 => 2,
        1 => 5,
        2 => 10,
        _ => 15,
    }
}

pub const MAX_PAUSE_SECS: u32 = 15;

const BASIC_PROMPT: &str = "What are you looking for right now?";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanionAttribution {
    pub name: String,
    pub quote: String,
}

/// Everything the overlay needs for one presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationDecision {
    /// 1-based attempt for this app on `day`.
    pub attempt_number: u32,
    pub pause_duration_secs: u32,
    pub tier: ContentTier,
    pub scripture_text: String,
    pub scripture_reference: String,
    pub breath_prayer: String,
    pub sub_prompt: Option<String>,
    pub companion: Option<CompanionAttribution>,
    /// Local calendar day the attempt number was counted on.
    pub day: NaiveDate,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EscalationCalculator;

impl EscalationCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Decision for the next overlay, given how many interventions for this
    /// app were already resolved on `day`.
    pub fn compute(
        &self,
        app_id: &str,
        prior_count: u32,
        content: &DailyContent,
        day: NaiveDate,
    ) -> EscalationDecision {
        let attempt_number = prior_count.saturating_add(1);
        let pause = pause_duration_secs(prior_count);
        let tier = ContentTier::for_prior_count(prior_count);

        let sub_prompt = match tier {
            ContentTier::BreathPrayer => None,
            ContentTier::Scripture => Some(BASIC_PROMPT.to_string()),
            ContentTier::ScriptureDeeper | ContentTier::ScriptureCompanion => Some(format!(
                "You've returned {attempt_number} times. What is your heart seeking?"
            )),
        };

        let companion = (tier == ContentTier::ScriptureCompanion).then(|| match (
            &content.companion_name,
            &content.companion_quote,
        ) {
            (Some(name), Some(quote)) => CompanionAttribution {
                name: name.clone(),
                quote: quote.clone(),
            },
            _ => CompanionAttribution {
                name: DEFAULT_COMPANION_NAME.to_string(),
                quote: DEFAULT_COMPANION_QUOTE.to_string(),
            },
        });

        debug!(app = app_id, attempt = attempt_number, pause, ?tier, "escalation computed");

        EscalationDecision {
            attempt_number,
            pause_duration_secs: pause,
            tier,
            scripture_text: content.scripture_text.clone(),
            scripture_reference: content.scripture_reference.clone(),
            breath_prayer: content.breath_prayer.clone(),
            sub_prompt,
            companion,
            day,
        }
    }
}

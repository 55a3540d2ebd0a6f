//! Daily reflection content.
//!
//! Content is keyed by liturgical season and day-in-season. The store may
//! hold a seeded library; when it has nothing for a day (or is unreachable)
//! a small built-in rotation is used so an overlay always has text.

use std::fmt;
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::Store;

/// Liturgical season.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Advent,
    Christmas,
    Lent,
    Easter,
    Ordinary,
}

impl Season {
    pub fn as_str(self) -> &'static str {
        match self {
            Season::Advent => "advent",
            Season::Christmas => "christmas",
            Season::Lent => "lent",
            Season::Easter => "easter",
            Season::Ordinary => "ordinary",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A season plus the 1-based day within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonDay {
    pub season: Season,
    pub day_in_season: u32,
}

/// One day's worth of reflection material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyContent {
    pub season: Season,
    pub day_in_season: u32,
    pub liturgical_label: Option<String>,
    pub scripture_reference: String,
    pub scripture_text: String,
    pub breath_prayer: String,
    pub reflection: String,
    pub companion_name: Option<String>,
    pub companion_quote: Option<String>,
}

/// Source of daily content for the escalation calculator.
pub trait ContentProvider: Send + Sync {
    fn content_for(&self, day: NaiveDate) -> DailyContent;
}

/// Easter Sunday for `year` (anonymous Gregorian computus).
pub fn easter_sunday(year: i32) -> NaiveDate {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    ymd(year, month as u32, day as u32)
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

/// First Sunday of Advent: the fourth Sunday before Christmas Day.
pub fn advent_sunday(year: i32) -> NaiveDate {
    let christmas = ymd(year, 12, 25);
    let back = match christmas.weekday() {
        Weekday::Sun => 7,
        other => other.num_days_from_sunday() as i64,
    };
    christmas - Duration::days(back + 21)
}

/// Season and day-in-season for a calendar date.
pub fn season_for(date: NaiveDate) -> SeasonDay {
    let year = date.year();
    let day_from = |start: NaiveDate| ((date - start).num_days() + 1) as u32;

    let epiphany_eve = ymd(year, 1, 5);
    if date <= epiphany_eve {
        let start = ymd(year - 1, 12, 25);
        return SeasonDay { season: Season::Christmas, day_in_season: day_from(start) };
    }

    let christmas = ymd(year, 12, 25);
    if date >= christmas {
        return SeasonDay { season: Season::Christmas, day_in_season: day_from(christmas) };
    }

    let advent = advent_sunday(year);
    if date >= advent {
        return SeasonDay { season: Season::Advent, day_in_season: day_from(advent) };
    }

    let easter = easter_sunday(year);
    let ash_wednesday = easter - Duration::days(46);
    let pentecost = easter + Duration::days(49);
    if date >= ash_wednesday && date < easter {
        return SeasonDay { season: Season::Lent, day_in_season: day_from(ash_wednesday) };
    }
    if date >= easter && date <= pentecost {
        return SeasonDay { season: Season::Easter, day_in_season: day_from(easter) };
    }

    SeasonDay { season: Season::Ordinary, day_in_season: date.ordinal() }
}

/// Companion used at the highest tier when the day has none.
pub const DEFAULT_COMPANION_NAME: &str = "Thomas Merton";
pub const DEFAULT_COMPANION_QUOTE: &str =
    "We are not at peace with others because we are not at peace with ourselves.";

struct Passage {
    reference: &'static str,
    text: &'static str,
    breath_prayer: &'static str,
    reflection: &'static str,
}

const ROTATION: &[Passage] = &[
    Passage {
        reference: "Psalm 46:10",
        text: "Be still, and know that I am God.",
        breath_prayer: "Be still.",
        reflection: "Stillness is not emptiness. Let the noise settle before you choose.",
    },
    Passage {
        reference: "Psalm 51:10",
        text: "Create in me a clean heart, O God, and renew a right spirit within me.",
        breath_prayer: "Renew me.",
        reflection: "What would a renewed spirit reach for in this moment?",
    },
    Passage {
        reference: "Matthew 11:28",
        text: "Come to me, all you who are weary and burdened, and I will give you rest.",
        breath_prayer: "Give me rest.",
        reflection: "Weariness often looks for distraction. It is asking for rest.",
    },
    Passage {
        reference: "Isaiah 30:15",
        text: "In returning and rest you shall be saved; in quietness and in trust shall be your strength.",
        breath_prayer: "Return and rest.",
        reflection: "Returning is always available. It starts with one breath.",
    },
    Passage {
        reference: "Philippians 4:8",
        text: "Whatever is true, whatever is noble, whatever is right, think about such things.",
        breath_prayer: "Fix my mind.",
        reflection: "Notice what you were about to feed your attention.",
    },
];

/// Deterministic rotation keyed on the day. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinContent;

impl ContentProvider for BuiltinContent {
    fn content_for(&self, day: NaiveDate) -> DailyContent {
        let SeasonDay { season, day_in_season } = season_for(day);
        let passage = &ROTATION[day.num_days_from_ce().unsigned_abs() as usize % ROTATION.len()];
        DailyContent {
            season,
            day_in_season,
            liturgical_label: None,
            scripture_reference: passage.reference.to_string(),
            scripture_text: passage.text.to_string(),
            breath_prayer: passage.breath_prayer.to_string(),
            reflection: passage.reflection.to_string(),
            companion_name: None,
            companion_quote: None,
        }
    }
}

/// Seeded library in the store, falling back to [`BuiltinContent`].
pub struct StoredContent {
    store: Arc<dyn Store>,
    fallback: BuiltinContent,
}

impl StoredContent {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, fallback: BuiltinContent }
    }
}

impl ContentProvider for StoredContent {
    fn content_for(&self, day: NaiveDate) -> DailyContent {
        let key = season_for(day);
        match self.store.daily_content(key.season, key.day_in_season) {
            Ok(Some(content)) => content,
            Ok(None) => self.fallback.content_for(day),
            Err(e) => {
                warn!(error = %e, season = %key.season, "daily content lookup failed, using built-in");
                self.fallback.content_for(day)
            }
        }
    }
}

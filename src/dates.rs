//! Trailing date window matching.
//!
//! Listing pages print publication dates as free text ("Samedi 18 octobre
//! 2026", "18 Octobre 2026 - 09:12", "October 18, 2026"). Rather than parsing
//! those, the matcher enumerates every literal form it knows for each day in
//! the window and checks whether the candidate's context contains one of them.
//! A phrasing that is not enumerated is simply missed.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use itertools::Itertools;
use tracing::debug;

const FR_MONTHS: [&str; 12] = [
    "janvier",
    "février",
    "mars",
    "avril",
    "mai",
    "juin",
    "juillet",
    "août",
    "septembre",
    "octobre",
    "novembre",
    "décembre",
];

const EN_MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

fn fr_weekday(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "lundi",
        Weekday::Tue => "mardi",
        Weekday::Wed => "mercredi",
        Weekday::Thu => "jeudi",
        Weekday::Fri => "vendredi",
        Weekday::Sat => "samedi",
        Weekday::Sun => "dimanche",
    }
}

fn en_weekday(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Lower-case and capitalized forms, in that order.
fn casings(word: &str) -> [String; 2] {
    [word.to_string(), crate::utils::upcase(word)]
}

/// Literal forms of a single day, French first then English.
fn day_patterns(date: NaiveDate) -> Vec<String> {
    let day = date.day();
    let year = date.year();
    let month_index = date.month0() as usize;
    let weekday = date.weekday();

    let mut day_forms = vec![day.to_string(), format!("{day:02}")];
    if day == 1 {
        day_forms.push("1er".to_string());
    }

    let mut patterns = Vec::new();

    for month in casings(FR_MONTHS[month_index]) {
        let bare: Vec<String> = day_forms
            .iter()
            .map(|d| format!("{d} {month} {year}"))
            .collect();
        for weekday_name in casings(fr_weekday(weekday)) {
            for date_text in &bare {
                patterns.push(format!("{weekday_name} {date_text}"));
            }
        }
        patterns.extend(bare);
    }

    for month in casings(EN_MONTHS[month_index]) {
        let mut bare: Vec<String> = day_forms
            .iter()
            .filter(|d| d.as_str() != "1er")
            .map(|d| format!("{d} {month} {year}"))
            .collect();
        bare.push(format!("{month} {day}, {year}"));
        for weekday_name in casings(en_weekday(weekday)) {
            for date_text in &bare {
                patterns.push(format!("{weekday_name}, {date_text}"));
                patterns.push(format!("{weekday_name} {date_text}"));
            }
        }
        patterns.extend(bare);
    }

    patterns
}

/// The accepted date strings for a trailing window ending today.
#[derive(Debug, Clone)]
pub struct DateWindow {
    patterns: Vec<String>,
    case_insensitive_fallback: bool,
    lowered: Vec<String>,
}

impl DateWindow {
    /// Build the window covering `days` days ending on `today` (1 = today only).
    pub fn new(today: NaiveDate, days: u32, case_insensitive_fallback: bool) -> Self {
        let patterns = date_patterns(today, days);
        debug!(count = patterns.len(), patterns = ?patterns, "Generated date patterns");
        let lowered = patterns.iter().map(|p| p.to_lowercase()).unique().collect();
        Self {
            patterns,
            case_insensitive_fallback,
            lowered,
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Return the first pattern found in `text`, if any.
    ///
    /// The raw patterns are tried first; with the fallback enabled, a second
    /// pass compares lower-cased text against lower-cased patterns.
    pub fn find_in<'a>(&'a self, text: &str) -> Option<&'a str> {
        if let Some(hit) = self.patterns.iter().find(|p| text.contains(p.as_str())) {
            return Some(hit);
        }
        if !self.case_insensitive_fallback {
            return None;
        }
        let text = text.to_lowercase();
        self.lowered
            .iter()
            .find(|p| text.contains(p.as_str()))
            .map(String::as_str)
    }

    pub fn matches(&self, text: &str) -> bool {
        self.find_in(text).is_some()
    }
}

/// Enumerate the literal date forms for `days` days ending on `today`.
///
/// Duplicates are dropped keeping the first occurrence, so the list reads in
/// generation order: today before yesterday, French before English.
pub fn date_patterns(today: NaiveDate, days: u32) -> Vec<String> {
    (0..days as i64)
        .map_while(|offset| today.checked_sub_signed(Duration::days(offset)))
        .flat_map(day_patterns)
        .unique()
        .collect()
}

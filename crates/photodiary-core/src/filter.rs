//! Entry filters.
//!
//! A [`Filter`] narrows a query by search text, tags and an inclusive day
//! range. It is a plain value: evaluating it against an entry with
//! [`Filter::matches`] has no side effects, and the query engine uses the same
//! criteria to drive its index lookups.
//!
//! Filters can also be parsed from a compact textual form used on the command
//! line, see [`parse_filter`].

use crate::error::{DiaryError, Result};
use crate::types::DiaryEntry;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeSet;

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// A range covering a single day
    pub fn day(day: NaiveDate) -> Self {
        DateRange::new(day, day)
    }

    /// True if no day can satisfy the range
    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

/// Query predicate over diary entries.
///
/// All present criteria must hold (AND). Within the tag set an entry needs
/// only one of the tags. When `is_active` is false, or no criterion is
/// present, the filter matches everything and queries take the unfiltered
/// fast path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    /// Case-insensitive substring of the entry's searchable text
    pub search_text: Option<String>,

    /// Lowercase tags, any of which qualifies an entry
    pub tags: Option<BTreeSet<String>>,

    /// Inclusive day range on the entry date
    pub date_range: Option<DateRange>,

    /// Whether the filter applies at all
    pub is_active: bool,
}

impl Default for Filter {
    fn default() -> Self {
        Filter {
            search_text: None,
            tags: None,
            date_range: None,
            is_active: true,
        }
    }
}

impl Filter {
    /// A filter with no criteria
    pub fn new() -> Self {
        Self::default()
    }

    /// A filter that is switched off and matches everything
    pub fn inactive() -> Self {
        Filter {
            is_active: false,
            ..Self::default()
        }
    }

    pub fn with_search_text(mut self, text: impl Into<String>) -> Self {
        self.search_text = Some(text.into());
        self
    }

    /// Require any of the given tags. Tags are compared case-insensitively.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = self.tags.get_or_insert_with(BTreeSet::new);
        set.extend(tags.into_iter().map(|t| t.as_ref().trim().to_lowercase()));
        self
    }

    pub fn with_date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.date_range = Some(DateRange::new(start, end));
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }

    /// Lowercased search needle, if one is set and not blank
    pub fn needle(&self) -> Option<String> {
        self.search_text
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    /// Tag criterion, if one is set and not empty
    pub fn tag_set(&self) -> Option<&BTreeSet<String>> {
        self.tags.as_ref().filter(|t| !t.is_empty())
    }

    /// True if the filter cannot exclude any entry
    pub fn is_noop(&self) -> bool {
        !self.is_active
            || (self.needle().is_none() && self.tag_set().is_none() && self.date_range.is_none())
    }

    /// Evaluate every criterion against one entry.
    pub fn matches(&self, entry: &DiaryEntry) -> bool {
        if self.is_noop() {
            return true;
        }

        if let Some(range) = &self.date_range {
            if !range.contains(entry.day()) {
                return false;
            }
        }

        if let Some(needle) = self.needle() {
            if !entry.searchable_text().contains(&needle) {
                return false;
            }
        }

        self.matches_tags(entry)
    }

    /// Evaluate only the tag criterion.
    pub fn matches_tags(&self, entry: &DiaryEntry) -> bool {
        match self.tag_set() {
            Some(tags) if self.is_active => tags.iter().any(|t| entry.has_tag(t)),
            _ => true,
        }
    }
}

/// Parse a textual filter.
///
/// Syntax (space separated, in any order):
/// - `tag:a,b`: entries carrying tag `a` or tag `b`
/// - `from:YYYY-MM-DD` / `to:YYYY-MM-DD`: inclusive day bounds
/// - `on:YYYY-MM-DD`: a single day
/// - anything else: search text, words joined by a single space
///
/// A missing `from:` or `to:` bound is left open by using the earliest or
/// latest representable day.
pub fn parse_filter(input: &str) -> Result<Filter> {
    let mut filter = Filter::new();
    let mut from = None;
    let mut to = None;
    let mut words = Vec::new();

    for part in input.split_whitespace() {
        if let Some(tags) = part.strip_prefix("tag:") {
            let tags: Vec<&str> = tags.split(',').filter(|t| !t.trim().is_empty()).collect();
            if !tags.is_empty() {
                filter = filter.with_tags(tags);
            }
        } else if let Some(value) = part.strip_prefix("from:") {
            from = Some(parse_day(input, value)?);
        } else if let Some(value) = part.strip_prefix("to:") {
            to = Some(parse_day(input, value)?);
        } else if let Some(value) = part.strip_prefix("on:") {
            let day = parse_day(input, value)?;
            from = Some(day);
            to = Some(day);
        } else {
            words.push(part);
        }
    }

    if from.is_some() || to.is_some() {
        filter.date_range = Some(DateRange::new(
            from.unwrap_or(NaiveDate::MIN),
            to.unwrap_or(NaiveDate::MAX),
        ));
    }

    if !words.is_empty() {
        filter.search_text = Some(words.join(" "));
    }

    Ok(filter)
}

fn parse_day(input: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| DiaryError::invalid_filter(input, format!("bad date '{}': {}", value, e)))
}

/// Parse an entry date given as `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM[:SS]`.
///
/// A bare day is taken as midnight.
pub fn parse_date_time(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|d| d.and_time(chrono::NaiveTime::MIN))
        .map_err(|e| DiaryError::invalid_filter(value, format!("bad date: {}", e)))
}

//! Id and tag filters applied to event records
//!
//! This module provides the interval set used for event id filters, the
//! include/exclude string collection used for source and user filters, and
//! the per-log filter map with wildcard fallback.
//!
//! Filter lines share one syntax: `name: include-list ;; exclude-list`,
//! where both lists are `;`-separated and the exclude half is optional.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

/// Wildcard key matching every log without its own entry
pub const WILDCARD: &str = "*";

/// Separator between the include and exclude halves of a filter line
const HALF_SEPARATOR: &str = ";;";

/// Errors that can occur while parsing filter lines
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("Missing ':' in filter line: {0}")]
    MissingSeparator(String),

    #[error("Empty log name in filter line: {0}")]
    EmptyName(String),
}

// ============================================================================
// Interval set
// ============================================================================

/// Ordered, disjoint set of half-open `[lo, hi)` intervals.
///
/// For any two stored intervals the first one's `hi` is strictly below the
/// second one's `lo`; touching input ranges are merged on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalSet<T> {
    intervals: Vec<(T, T)>,
}

impl<T> Default for IntervalSet<T> {
    fn default() -> Self {
        Self {
            intervals: Vec::new(),
        }
    }
}

impl<T: Ord + Copy> IntervalSet<T> {
    /// Check whether `value` falls into any interval
    pub fn contains(&self, value: &T) -> bool {
        // first interval whose hi is beyond value
        let idx = self.intervals.partition_point(|(_, hi)| hi <= value);
        self.intervals
            .get(idx)
            .map(|(lo, _)| lo <= value)
            .unwrap_or(false)
    }

    /// The merged intervals in ascending order
    pub fn intervals(&self) -> &[(T, T)] {
        &self.intervals
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

/// Collects raw ranges and merges them into an [`IntervalSet`]
#[derive(Debug, Clone)]
pub struct IntervalSetBuilder<T> {
    ranges: Vec<(T, T)>,
}

impl<T> Default for IntervalSetBuilder<T> {
    fn default() -> Self {
        Self { ranges: Vec::new() }
    }
}

impl<T: Ord + Copy> IntervalSetBuilder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the range `[lo, hi)`; reversed bounds are swapped
    pub fn add(&mut self, lo: T, hi: T) -> &mut Self {
        if lo <= hi {
            self.ranges.push((lo, hi));
        } else {
            self.ranges.push((hi, lo));
        }
        self
    }

    /// Sort and merge the collected ranges.
    ///
    /// Returns `None` when nothing was added.
    pub fn build(mut self) -> Option<IntervalSet<T>> {
        if self.ranges.is_empty() {
            return None;
        }
        self.ranges.sort_by(|a, b| a.0.cmp(&b.0));

        let mut merged: Vec<(T, T)> = Vec::with_capacity(self.ranges.len());
        for (lo, hi) in self.ranges {
            if lo == hi {
                continue;
            }
            match merged.last_mut() {
                Some(last) if lo <= last.1 => {
                    if hi > last.1 {
                        last.1 = hi;
                    }
                }
                _ => merged.push((lo, hi)),
            }
        }

        Some(IntervalSet { intervals: merged })
    }
}

// ============================================================================
// Tag collections
// ============================================================================

/// Optional include set plus optional exclude set of exact-match strings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDualCollection {
    include: Option<HashSet<String>>,
    exclude: Option<HashSet<String>>,
}

impl TagDualCollection {
    pub fn new(include: Option<HashSet<String>>, exclude: Option<HashSet<String>>) -> Self {
        Self { include, exclude }
    }

    /// Parse the value half of a filter line
    pub fn parse(value: &str) -> Self {
        let (include, exclude) = split_halves(value);
        Self {
            include: tokens(include).map(|t| t.map(str::to_string).collect()),
            exclude: exclude.and_then(tokens).map(|t| t.map(str::to_string).collect()),
        }
    }

    /// Exclude wins, then include if configured, else accept
    pub fn accepts(&self, tag: &str) -> bool {
        if let Some(exclude) = &self.exclude {
            if exclude.contains(tag) {
                return false;
            }
        }
        match &self.include {
            Some(include) => include.contains(tag),
            None => true,
        }
    }

    pub fn include(&self) -> Option<&HashSet<String>> {
        self.include.as_ref()
    }

    pub fn exclude(&self) -> Option<&HashSet<String>> {
        self.exclude.as_ref()
    }
}

// ============================================================================
// Filters
// ============================================================================

/// A filter that belongs to one log name (or the wildcard)
pub trait NamedFilter {
    fn name(&self) -> &str;
}

/// Event id filter for one log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdsFilter {
    name: String,
    include: Option<IntervalSet<u32>>,
    exclude: Option<IntervalSet<u32>>,
    rejected: Vec<String>,
}

impl IdsFilter {
    /// Parse `name: id;id ;; id;id`.
    ///
    /// Tokens that are not event ids are dropped and reported through
    /// [`IdsFilter::rejected_tokens`]; a half that named any token at all
    /// still counts as configured.
    pub fn parse(line: &str) -> Result<Self, FilterError> {
        let (name, value) = split_config_line(line)?;
        let (include, exclude) = split_halves(value);
        let mut rejected = Vec::new();

        let include = tokens(include).map(|t| build_id_set(t, &mut rejected));
        let exclude = exclude
            .and_then(tokens)
            .map(|t| build_id_set(t, &mut rejected));

        Ok(Self {
            name,
            include,
            exclude,
            rejected,
        })
    }

    /// Exclude wins, then include if configured, else accept
    pub fn accepts(&self, event_id: u16) -> bool {
        let id = u32::from(event_id);
        if let Some(exclude) = &self.exclude {
            if exclude.contains(&id) {
                return false;
            }
        }
        match &self.include {
            Some(include) => include.contains(&id),
            None => true,
        }
    }

    /// Tokens skipped because they are not valid event ids
    pub fn rejected_tokens(&self) -> &[String] {
        &self.rejected
    }
}

impl NamedFilter for IdsFilter {
    fn name(&self) -> &str {
        &self.name
    }
}

/// String filter for one log, used for source tags and for users
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagsFilter {
    name: String,
    tags: TagDualCollection,
}

impl TagsFilter {
    /// Parse `name: tag;tag ;; tag;tag`
    pub fn parse(line: &str) -> Result<Self, FilterError> {
        let (name, value) = split_config_line(line)?;
        Ok(Self {
            name,
            tags: TagDualCollection::parse(value),
        })
    }

    pub fn accepts(&self, tag: &str) -> bool {
        self.tags.accepts(tag)
    }

    pub fn tags(&self) -> &TagDualCollection {
        &self.tags
    }
}

impl NamedFilter for TagsFilter {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Filters keyed by case-insensitive log name with `*` fallback
#[derive(Debug, Clone)]
pub struct FilterMap<F> {
    filters: HashMap<String, F>,
}

impl<F> Default for FilterMap<F> {
    fn default() -> Self {
        Self {
            filters: HashMap::new(),
        }
    }
}

impl<F: NamedFilter> FilterMap<F> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a filter; a later filter for the same name replaces the earlier one
    pub fn insert(&mut self, filter: F) {
        self.filters.insert(filter.name().to_lowercase(), filter);
    }

    /// Filter for `log_name`, or the wildcard filter if it has none
    pub fn get(&self, log_name: &str) -> Option<&F> {
        self.filters
            .get(&log_name.to_lowercase())
            .or_else(|| self.filters.get(WILDCARD))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

// ============================================================================
// Line helpers
// ============================================================================

/// Split `name: value` into an unquoted, trimmed name and the raw value.
///
/// The name may be wrapped in single or double quotes, in which case a `:`
/// inside the quotes does not split.
pub fn split_config_line(line: &str) -> Result<(String, &str), FilterError> {
    let trimmed = line.trim_start();
    let colon = match trimmed.chars().next() {
        Some(q @ ('\'' | '"')) => trimmed[1..]
            .find(q)
            .and_then(|close| trimmed[close + 2..].find(':').map(|c| c + close + 2)),
        _ => trimmed.find(':'),
    };
    let Some(colon) = colon else {
        return Err(FilterError::MissingSeparator(line.to_string()));
    };

    let name = unquote(trimmed[..colon].trim()).trim();
    if name.is_empty() {
        return Err(FilterError::EmptyName(line.to_string()));
    }

    Ok((name.to_string(), &trimmed[colon + 1..]))
}

fn unquote(s: &str) -> &str {
    for q in ['\'', '"'] {
        if let Some(inner) = s.strip_prefix(q).and_then(|rest| rest.strip_suffix(q)) {
            return inner;
        }
    }
    s
}

fn split_halves(value: &str) -> (&str, Option<&str>) {
    match value.split_once(HALF_SEPARATOR) {
        Some((include, exclude)) => (include, Some(exclude)),
        None => (value, None),
    }
}

/// Non-empty trimmed tokens of a `;`-list, or `None` if there are none
fn tokens(list: &str) -> Option<impl Iterator<Item = &str>> {
    let mut iter = list.split(';').map(str::trim).filter(|t| !t.is_empty()).peekable();
    iter.peek()?;
    Some(iter)
}

fn build_id_set<'a>(tokens: impl Iterator<Item = &'a str>, rejected: &mut Vec<String>) -> IntervalSet<u32> {
    let mut builder = IntervalSetBuilder::new();
    for token in tokens {
        match token.parse::<u16>() {
            Ok(id) => {
                let id = u32::from(id);
                builder.add(id, id + 1);
            }
            Err(_) => rejected.push(token.to_string()),
        }
    }
    builder.build().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn build(ranges: &[(u32, u32)]) -> Option<IntervalSet<u32>> {
        let mut builder = IntervalSetBuilder::new();
        for (lo, hi) in ranges {
            builder.add(*lo, *hi);
        }
        builder.build()
    }

    #[test]
    fn test_empty_builder() {
        assert!(IntervalSetBuilder::<u32>::new().build().is_none());
    }

    #[test]
    fn test_touching_ranges_merge() {
        let set = build(&[(1, 5), (5, 9)]).unwrap();
        assert_eq!(set.intervals(), &[(1, 9)]);
        assert!(set.contains(&1));
        assert!(set.contains(&8));
        assert!(!set.contains(&9));
        assert!(!set.contains(&0));
    }

    #[test]
    fn test_reversed_and_overlapping() {
        let set = build(&[(20, 10), (12, 30), (40, 50), (1, 2)]).unwrap();
        assert_eq!(set.intervals(), &[(1, 2), (10, 30), (40, 50)]);
        assert!(!set.contains(&35));
        assert!(set.contains(&49));
    }

    proptest! {
        #[test]
        fn prop_contains_matches_union(
            ranges in prop::collection::vec((0u32..200, 0u32..200), 1..12),
            point in 0u32..210,
        ) {
            let set = build(&ranges).unwrap();
            let expected = ranges.iter().any(|(a, b)| {
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                *lo <= point && point < *hi
            });
            prop_assert_eq!(set.contains(&point), expected);
        }

        #[test]
        fn prop_intervals_strictly_disjoint(
            ranges in prop::collection::vec((0u32..200, 0u32..200), 1..12),
        ) {
            let set = build(&ranges).unwrap();
            for pair in set.intervals().windows(2) {
                prop_assert!(pair[0].1 < pair[1].0);
            }
        }
    }

    #[test]
    fn test_tag_collection_order() {
        let tags = TagDualCollection::parse("A;B ;; B;C");
        assert!(tags.accepts("A"));
        assert!(!tags.accepts("B"));
        assert!(!tags.accepts("C"));
        assert!(!tags.accepts("D"));

        let exclude_only = TagDualCollection::parse(";; Noise");
        assert!(exclude_only.include().is_none());
        assert!(exclude_only.accepts("Anything"));
        assert!(!exclude_only.accepts("Noise"));

        assert!(TagDualCollection::default().accepts("x"));
    }

    #[test]
    fn test_ids_filter_parse() {
        let filter = IdsFilter::parse("'System': 10;20 ;; 30").unwrap();
        assert_eq!(filter.name(), "System");
        assert!(filter.accepts(10));
        assert!(filter.accepts(20));
        assert!(!filter.accepts(15));
        assert!(!filter.accepts(30));
        assert!(filter.rejected_tokens().is_empty());
    }

    #[test]
    fn test_ids_filter_rejects_range_token() {
        let filter = IdsFilter::parse("System: 10-20;;").unwrap();
        assert_eq!(filter.rejected_tokens(), &["10-20".to_string()]);
        // the include half named something, so it still applies
        assert!(!filter.accepts(15));
        assert!(!filter.accepts(10));
    }

    #[test]
    fn test_ids_filter_exclude_only() {
        let filter = IdsFilter::parse("App: ;; 7").unwrap();
        assert!(filter.accepts(6));
        assert!(!filter.accepts(7));
    }

    #[test]
    fn test_filter_line_errors() {
        assert_eq!(
            IdsFilter::parse("no separator"),
            Err(FilterError::MissingSeparator("no separator".to_string()))
        );
        assert!(matches!(TagsFilter::parse("'  ': a"), Err(FilterError::EmptyName(_))));
    }

    #[test]
    fn test_quoted_name_with_colon() {
        let (name, value) = split_config_line("\"Microsoft:Odd\": 1").unwrap();
        assert_eq!(name, "Microsoft:Odd");
        assert_eq!(value.trim(), "1");
    }

    #[test]
    fn test_filter_map_wildcard_fallback() {
        let mut map = FilterMap::new();
        map.insert(TagsFilter::parse("Application: A").unwrap());
        map.insert(TagsFilter::parse("*: ;; B").unwrap());

        let app = map.get("APPLICATION").unwrap();
        assert!(app.accepts("A"));
        assert!(!app.accepts("B2"));

        let other = map.get("System").unwrap();
        assert!(other.accepts("A"));
        assert!(!other.accepts("B"));

        let mut no_wildcard = FilterMap::new();
        no_wildcard.insert(TagsFilter::parse("Application: A").unwrap());
        assert!(no_wildcard.get("System").is_none());
    }
}

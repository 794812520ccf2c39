//! Storyboard: the ordered list of segments a Run fans out over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

const NORMAL_DURATIONS: [u32; 5] = [4, 8, 10, 12, 15];
const PRO_DURATIONS: [u32; 6] = [4, 8, 10, 12, 15, 25];

/// Output aspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Horizontal,
    Vertical,
}

impl Resolution {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Horizontal => "horizontal",
            Self::Vertical => "vertical",
        }
    }
}

/// A character reference used by prompt assembly (§4.6 step 2 / §3A).
/// `id` is the bracketed anchor substituted for unambiguous occurrences of
/// `name` in the prompt text; a character with no `id` contributes no
/// substitution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterRef {
    pub name: String,
    pub id: Option<String>,
}

/// Supplementary scene metadata consumed by prompt assembly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Asset {
    #[serde(default)]
    pub characters: Vec<CharacterRef>,
    #[serde(default)]
    pub scene: Option<String>,
    #[serde(default)]
    pub props: Vec<String>,
}

/// One scene: prompt text plus generation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub segment_index: i64,
    pub prompt_text: String,
    #[serde(default)]
    pub image_url: Option<String>,
    pub duration_seconds: u32,
    pub resolution: Resolution,
    #[serde(default)]
    pub is_pro: bool,
    #[serde(default)]
    pub director_intent: Option<String>,
    #[serde(default)]
    pub asset: Option<Asset>,
}

impl Segment {
    /// Enforce the duration-vocabulary invariant (§3, §6).
    ///
    /// # Errors
    /// Returns `DomainError::InvalidDuration` if `duration_seconds` is not in
    /// the allowed set for this segment's `is_pro` flag, or
    /// `DomainError::EmptyPrompt` if `prompt_text` is blank.
    pub fn validate(&self) -> DomainResult<()> {
        if self.prompt_text.trim().is_empty() {
            return Err(DomainError::EmptyPrompt { segment_index: self.segment_index });
        }
        let allowed: &[u32] = if self.is_pro { &PRO_DURATIONS } else { &NORMAL_DURATIONS };
        if !allowed.contains(&self.duration_seconds) {
            return Err(DomainError::InvalidDuration {
                segment_index: self.segment_index,
                duration: self.duration_seconds,
                is_pro: self.is_pro,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn requires_image_to_video(&self) -> bool {
        self.image_url.is_some()
    }
}

/// Ordered collection of Segments; immutable after creation (see §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Storyboard {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub source_path: std::path::PathBuf,
    pub segments: Vec<Segment>,
}

impl Storyboard {
    /// Build a Storyboard from a set of parsed segments, validating each one
    /// and rejecting duplicate `segment_index` values.
    ///
    /// # Errors
    /// Returns `DomainError::EmptyStoryboard` if `segments` is empty,
    /// `DomainError::DuplicateSegmentIndex` if two segments share an index,
    /// or any `Segment::validate` error.
    pub fn new(name: impl Into<String>, source_path: std::path::PathBuf, segments: Vec<Segment>) -> DomainResult<Self> {
        if segments.is_empty() {
            return Err(DomainError::EmptyStoryboard);
        }
        let mut seen = BTreeSet::new();
        for segment in &segments {
            segment.validate()?;
            if !seen.insert(segment.segment_index) {
                return Err(DomainError::DuplicateSegmentIndex(segment.segment_index));
            }
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            created_at: Utc::now(),
            source_path,
            segments,
        })
    }

    #[must_use]
    pub fn segment_by_index(&self, index: i64) -> Option<&Segment> {
        self.segments.iter().find(|s| s.segment_index == index)
    }
}

/// Parse the range-specification language from §6.
///
/// `"all"` selects every index in `universe`. Otherwise the string is a
/// comma-separated list of single integers or inclusive `a-b` ranges;
/// malformed tokens are silently skipped, and reversed ranges (`a > b`)
/// contribute nothing. Returns the sorted, deduplicated intersection with
/// `universe`.
///
/// # Errors
/// Returns `DomainError::ValidationFailed` if the resulting selection is
/// empty.
pub fn parse_range(spec: &str, universe: &[i64]) -> DomainResult<Vec<i64>> {
    let universe_set: BTreeSet<i64> = universe.iter().copied().collect();

    if spec.trim() == "all" {
        let mut all: Vec<i64> = universe_set.into_iter().collect();
        all.sort_unstable();
        if all.is_empty() {
            return Err(DomainError::ValidationFailed("range selects no segments".to_string()));
        }
        return Ok(all);
    }

    let mut selected = BTreeSet::new();
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((a, b)) = part.split_once('-') {
            if let (Ok(a), Ok(b)) = (a.trim().parse::<i64>(), b.trim().parse::<i64>()) {
                if a <= b {
                    for i in a..=b {
                        if universe_set.contains(&i) {
                            selected.insert(i);
                        }
                    }
                }
                // a > b: reversed range, silently dropped per §6/§8-6.
            }
            // non-numeric tokens silently skipped.
        } else if let Ok(n) = part.parse::<i64>() {
            if universe_set.contains(&n) {
                selected.insert(n);
            }
        }
    }

    if selected.is_empty() {
        return Err(DomainError::ValidationFailed(format!("range spec '{spec}' selects no segments")));
    }
    Ok(selected.into_iter().collect())
}


#[cfg(test)]
mod range_properties {
    use super::*;
    use proptest::prelude::*;

    // §8-6: parse_range always returns a sorted, deduplicated subset of the
    // universe it was given, regardless of how the range string is shaped.
    proptest! {
        #[test]
        fn result_is_always_a_sorted_subset_of_the_universe(
            universe in prop::collection::btree_set(1i64..50, 1..20),
            spec in "[0-9,-]{0,24}",
        ) {
            let universe: Vec<i64> = universe.into_iter().collect();
            if let Ok(selected) = parse_range(&spec, &universe) {
                prop_assert!(selected.windows(2).all(|w| w[0] < w[1]), "not sorted/deduped: {selected:?}");
                prop_assert!(selected.iter().all(|i| universe.contains(i)));
            }
        }

        #[test]
        fn all_literal_always_returns_the_full_sorted_universe(
            universe in prop::collection::btree_set(1i64..50, 1..20),
        ) {
            let universe: Vec<i64> = universe.into_iter().collect();
            let selected = parse_range("all", &universe).unwrap();
            prop_assert_eq!(selected, universe);
        }
    }
}
